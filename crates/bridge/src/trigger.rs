use serde::{Deserialize, Serialize};

use crate::author;
use crate::gravatar::AvatarResolver;

pub const SKIP_CI_TAG: &str = "[skip ci]";

/// Raw push/commit webhook payload (legacy POST service shape).
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub canon_url: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub absolute_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub raw_author: String,
    pub raw_node: String,
    pub branch: String,
    pub message: String,
    pub timestamp: String,
}

/// Raw pull-request webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub author: PullRequestAuthor,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub links: Option<PullRequestLinks>,
    pub source: PullRequestEndpoint,
    pub destination: PullRequestEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestAuthor {
    pub display_name: String,
    pub username: String,
    pub links: PullRequestAuthorLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestAuthorLinks {
    pub avatar: Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestLinks {
    #[serde(default)]
    pub html: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEndpoint {
    pub branch: NamedBranch,
    pub commit: CommitPointer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedBranch {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitPointer {
    pub hash: String,
}

/// Canonical trigger author. `image` is derived, never taken verbatim from
/// the commit payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerAuthor {
    pub name: String,
    pub email: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub plugin: String,
}

impl Default for TriggerSource {
    fn default() -> Self {
        Self {
            kind: "plugin".to_string(),
            plugin: "bitbucket".to_string(),
        }
    }
}

/// Canonical internal representation of an inbound event, decoupled from
/// its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TriggerEvent {
    #[serde(rename = "commit")]
    Commit(CommitTrigger),
    #[serde(rename = "pullrequest")]
    PullRequest(PullRequestTrigger),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitTrigger {
    pub author: TriggerAuthor,
    pub url: String,
    pub message: String,
    pub timestamp: String,
    pub branch: String,
    pub ref_id: String,
    pub deploy: bool,
    pub source: TriggerSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestTrigger {
    pub author: TriggerAuthor,
    pub url: String,
    pub message: String,
    pub timestamp: String,
    pub branch: String,
    pub ref_id: String,
    pub destination_branch: String,
    pub destination_ref_id: String,
    pub source: TriggerSource,
}

impl TriggerEvent {
    #[must_use]
    pub fn branch(&self) -> &str {
        match self {
            Self::Commit(commit) => &commit.branch,
            Self::PullRequest(pull_request) => &pull_request.branch,
        }
    }

    #[must_use]
    pub fn ref_id(&self) -> &str {
        match self {
            Self::Commit(commit) => &commit.ref_id,
            Self::PullRequest(pull_request) => &pull_request.ref_id,
        }
    }

    /// Destination branch and ref for pull requests; `None` for commits.
    #[must_use]
    pub fn destination(&self) -> Option<(&str, &str)> {
        match self {
            Self::Commit(_) => None,
            Self::PullRequest(pull_request) => Some((
                &pull_request.destination_branch,
                &pull_request.destination_ref_id,
            )),
        }
    }

    /// Whether this event is deploy-eligible before branch gating. Pull
    /// requests are hard-disabled here; no caller can re-enable them.
    #[must_use]
    pub fn deploy(&self) -> bool {
        match self {
            Self::Commit(commit) => commit.deploy,
            Self::PullRequest(_) => false,
        }
    }
}

/// Outcome of push normalization: either a canonical trigger or an
/// instruction to produce no job at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Skip,
    Event(TriggerEvent),
}

/// Converts a push payload into a canonical commit trigger, using the last
/// commit of the batch. A `[skip ci]` directive in that commit's message
/// (or an empty batch) yields [`Normalized::Skip`].
#[must_use]
pub fn normalize_push(payload: &PushPayload, avatars: &dyn AvatarResolver) -> Normalized {
    let Some(commit) = payload.commits.last() else {
        return Normalized::Skip;
    };

    if commit.message.contains(SKIP_CI_TAG) {
        return Normalized::Skip;
    }

    let parsed = author::parse(&commit.raw_author);
    let image = parsed
        .email
        .as_deref()
        .map(|email| avatars.avatar_url(email));

    Normalized::Event(TriggerEvent::Commit(CommitTrigger {
        author: TriggerAuthor {
            name: parsed.name,
            email: parsed.email,
            image,
        },
        url: format!(
            "{}{}commits/{}",
            payload.canon_url, payload.repository.absolute_url, commit.raw_node
        ),
        message: commit.message.clone(),
        timestamp: commit.timestamp.clone(),
        branch: commit.branch.clone(),
        ref_id: commit.raw_node.clone(),
        deploy: true,
        source: TriggerSource::default(),
    }))
}

/// Converts a pull-request payload into a canonical trigger. The payload
/// never carries the author's email inline, so the caller resolves it
/// beforehand (or passes `None` when the author has none on record).
#[must_use]
pub fn normalize_pull_request(
    payload: &PullRequestPayload,
    resolved_email: Option<String>,
    avatars: &dyn AvatarResolver,
) -> TriggerEvent {
    let image = resolved_email.as_deref().map_or_else(
        || payload.author.links.avatar.href.clone(),
        |email| avatars.avatar_url(email),
    );

    let url = payload
        .links
        .as_ref()
        .and_then(|links| links.html.as_ref())
        .map(|link| link.href.clone())
        .unwrap_or_default();

    let timestamp = payload
        .created_on
        .clone()
        .or_else(|| payload.date.clone())
        .unwrap_or_default();

    TriggerEvent::PullRequest(PullRequestTrigger {
        author: TriggerAuthor {
            name: payload.author.display_name.clone(),
            email: resolved_email,
            image: Some(image),
        },
        url,
        message: format!("{} - {}", payload.title, payload.description),
        timestamp,
        branch: payload.source.branch.name.clone(),
        ref_id: payload.source.commit.hash.clone(),
        destination_branch: payload.destination.branch.name.clone(),
        destination_ref_id: payload.destination.commit.hash.clone(),
        source: TriggerSource::default(),
    })
}
