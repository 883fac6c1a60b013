use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::{to_bytes, Body};
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

static LOG_COUNTER: AtomicU64 = AtomicU64::new(1);

const BODY_READ_LIMIT_BYTES: usize = 1_048_576;
const SHORT_BODY_MAX_CHARS: usize = 160;

pub async fn log_bridge_request(request: Request<Body>, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let route = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_string(),
        |matched_path| matched_path.as_str().to_string(),
    );

    let (parts, body) = request.into_parts();
    let (body_bytes, short_body) = match to_bytes(body, BODY_READ_LIMIT_BYTES).await {
        Ok(bytes) => {
            let shortened = shorten_request_body(&String::from_utf8_lossy(&bytes));
            (bytes, shortened)
        }
        Err(_) => (
            axum::body::Bytes::new(),
            "<request-body-unavailable>".to_string(),
        ),
    };

    let method_name = bridge_method_name(method.as_str(), route.as_str());
    let log_number = LOG_COUNTER.fetch_add(1, Ordering::Relaxed);
    println!("{log_number}\t{method_name}\t{route}\t{short_body}");

    let request = Request::from_parts(parts, Body::from(body_bytes));
    next.run(request).await
}

fn shorten_request_body(raw_body: &str) -> String {
    if raw_body.is_empty() {
        return "-".to_string();
    }

    let single_line = raw_body
        .replace(['\r', '\n', '\t'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if single_line.chars().count() <= SHORT_BODY_MAX_CHARS {
        return single_line;
    }

    let mut shortened = single_line
        .chars()
        .take(SHORT_BODY_MAX_CHARS)
        .collect::<String>();
    shortened.push_str("...");
    shortened
}

fn bridge_method_name(method: &str, route: &str) -> &'static str {
    match (method, route) {
        ("POST", "/:owner/:slug/api/bitbucket/commit/:secret") => "dispatch.commit_webhook",
        ("POST", "/:owner/:slug/api/bitbucket/pull-request/:secret") => {
            "dispatch.pull_request_webhook"
        }
        ("PUT", "/api/projects/:owner/:slug/webhooks") => "webhooks.register",
        ("DELETE", "/api/projects/:owner/:slug/webhooks") => "webhooks.remove",
        _ => "unknown.unknown_handler",
    }
}

#[cfg(test)]
mod tests {
    use super::{bridge_method_name, shorten_request_body, SHORT_BODY_MAX_CHARS};

    #[test]
    fn shorten_request_body_returns_dash_for_empty_input() {
        assert_eq!(shorten_request_body(""), "-");
    }

    #[test]
    fn shorten_request_body_normalizes_whitespace() {
        let body = "{\n  \"canon_url\":\t\"https://bitbucket.org\"\r\n}";
        assert_eq!(
            shorten_request_body(body),
            "{ \"canon_url\": \"https://bitbucket.org\" }"
        );
    }

    #[test]
    fn shorten_request_body_truncates_and_appends_ellipsis() {
        let input = "a".repeat(SHORT_BODY_MAX_CHARS + 10);
        let shortened = shorten_request_body(&input);

        assert_eq!(shortened.chars().count(), SHORT_BODY_MAX_CHARS + 3);
        assert!(shortened.ends_with("..."));
    }

    #[test]
    fn bridge_method_name_resolves_webhook_routes() {
        assert_eq!(
            bridge_method_name("POST", "/:owner/:slug/api/bitbucket/commit/:secret"),
            "dispatch.commit_webhook"
        );
        assert_eq!(
            bridge_method_name("GET", "/nope"),
            "unknown.unknown_handler"
        );
    }
}
