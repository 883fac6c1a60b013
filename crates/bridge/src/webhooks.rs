use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::client::{ApiError, BitbucketApi, ServiceRecord};

const SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("entropy source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// Result of a registration pass. `already_existed` means a matching hook
/// was found and its secret was reused; nothing was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub secret: String,
    pub already_existed: bool,
}

/// Produces the per-project webhook secret: 32 bytes from the OS entropy
/// source, hex-encoded.
///
/// # Errors
///
/// Fails only when the entropy source is unavailable.
pub fn generate_secret() -> Result<String, rand::Error> {
    let mut buffer = [0_u8; SECRET_BYTES];
    OsRng.try_fill_bytes(&mut buffer)?;
    Ok(hex::encode(buffer))
}

/// The URL prefix every hook owned by this bridge carries for a project.
fn hit_base(host: &str, project_id: &str) -> String {
    format!("{host}/{project_id}/api/bitbucket/")
}

/// Case-insensitive prefix match on the registration's URL field. The URL
/// prefix stands in for an ownership tag; the remote schema offers nothing
/// stronger. The secret suffix is never validated here.
fn matching_url<'record>(record: &'record ServiceRecord, base_lower: &str) -> Option<&'record str> {
    if !record.service.kind.contains("POST") {
        return None;
    }
    record
        .service
        .fields
        .iter()
        .find(|field| field.name == "URL" && field.value.to_lowercase().starts_with(base_lower))
        .map(|field| field.value.as_str())
}

/// Reconciles the remote webhook set towards "one push hook + one PR hook
/// sharing one secret" without assuming upsert support: scan first, create
/// only when no owned hook exists.
///
/// Known limitation, reproduced from the source design: the first matching
/// hook short-circuits the scan, so a partially registered project (one
/// hook of two) is reported as `already_existed` and left as-is. The secret
/// is recovered from the matched URL by stripping the base and the
/// event-kind segment.
///
/// # Errors
///
/// Propagates listing/creation failures and entropy-source failures. The
/// push hook is created before the PR hook; a failure in between aborts
/// the second call.
pub async fn ensure_registered(
    client: &dyn BitbucketApi,
    host: &str,
    project_id: &str,
) -> Result<EnsureOutcome, RegistrarError> {
    let base = hit_base(host, project_id);
    let base_lower = base.to_lowercase();

    let services = client.list_services(project_id).await?;
    for record in &services {
        if let Some(url) = matching_url(record, &base_lower) {
            let suffix = url.get(base.len()..).unwrap_or_default();
            let secret = suffix
                .strip_prefix("commit/")
                .or_else(|| suffix.strip_prefix("pull-request/"))
                .unwrap_or(suffix)
                .to_string();
            return Ok(EnsureOutcome {
                secret,
                already_existed: true,
            });
        }
    }

    let secret = generate_secret()?;
    let commit_url = format!("{base}commit/{secret}");
    client
        .create_service(project_id, &[("type", "POST"), ("URL", &commit_url)])
        .await?;

    let pull_request_url = format!("{base}pull-request/{secret}");
    client
        .create_service(
            project_id,
            &[
                ("type", "Pull Request POST"),
                ("create/edit/merge/decline", "on"),
                ("comments", "on"),
                ("approve/unapprove", "on"),
                ("URL", &pull_request_url),
            ],
        )
        .await?;

    Ok(EnsureOutcome {
        secret,
        already_existed: false,
    })
}

/// Removes every hook owned by this bridge for the project. Deletions fan
/// out concurrently; all are attempted and the first failure propagates.
/// Returns whether anything was removed.
///
/// Partial removal is possible on failure and safe to retry: deletion is
/// idempotent at this contract's level.
///
/// # Errors
///
/// Propagates listing failures and the first deletion failure.
pub async fn unregister(
    client: &dyn BitbucketApi,
    host: &str,
    project_id: &str,
) -> Result<bool, RegistrarError> {
    let base_lower = hit_base(host, project_id).to_lowercase();

    let services = client.list_services(project_id).await?;
    let matches = services
        .iter()
        .filter(|record| matching_url(record, &base_lower).is_some())
        .map(|record| record.id)
        .collect::<Vec<_>>();

    if matches.is_empty() {
        return Ok(false);
    }

    let deletions = matches
        .into_iter()
        .map(|service_id| client.delete_service(project_id, service_id));
    let results = futures::future::join_all(deletions).await;
    for result in results {
        result?;
    }

    Ok(true)
}
