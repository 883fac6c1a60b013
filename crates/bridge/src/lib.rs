pub mod author;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod gravatar;
pub mod job;
pub mod project;
mod request_logging;
pub mod server;
pub mod trigger;
pub mod webhooks;
