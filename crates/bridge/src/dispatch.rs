use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::client::{ApiError, BitbucketApi};
use crate::gravatar::AvatarResolver;
use crate::job::{self, Job};
use crate::project::Project;
use crate::trigger::{self, Normalized, PullRequestPayload, PushPayload};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("no primary email on record for bitbucket user {username}")]
    NoPrimaryEmail { username: String },
}

/// Commit path: normalize, admit, emit. Purely local; rejections are
/// logged and acknowledged, never surfaced as failures.
pub fn dispatch_commit(
    project: &Project,
    payload: &PushPayload,
    avatars: &dyn AvatarResolver,
    jobs: &UnboundedSender<Job>,
) {
    let normalized = trigger::normalize_push(payload, avatars);
    submit(project, normalized, jobs);
}

/// Pull-request path. The payload never carries the author's email, so it
/// is resolved first via the remote email listing; a missing primary email
/// aborts the dispatch rather than defaulting silently.
///
/// # Errors
///
/// Propagates email-lookup failures and the absence of a primary email.
pub async fn dispatch_pull_request(
    client: &dyn BitbucketApi,
    project: &Project,
    payload: &PullRequestPayload,
    avatars: &dyn AvatarResolver,
    jobs: &UnboundedSender<Job>,
) -> Result<(), DispatchError> {
    let emails = client.user_emails(&payload.author.username).await?;
    let primary = emails
        .into_iter()
        .find(|entry| entry.primary)
        .ok_or_else(|| DispatchError::NoPrimaryEmail {
            username: payload.author.username.clone(),
        })?;

    let event = trigger::normalize_pull_request(payload, Some(primary.email), avatars);
    submit(project, Normalized::Event(event), jobs);
    Ok(())
}

fn submit(project: &Project, normalized: Normalized, jobs: &UnboundedSender<Job>) {
    match job::decide(project, normalized) {
        Ok(job) => {
            if jobs.send(job).is_err() {
                println!("job channel closed; dropping job for {}", project.name);
            }
        }
        Err(rejection) => {
            println!(
                "webhook for {} produced no job: {rejection}",
                project.name
            );
        }
    }
}
