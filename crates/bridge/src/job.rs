use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::project::{BranchConfig, Project};
use crate::trigger::{Normalized, TriggerEvent};

pub const MASTER_BRANCH: &str = "master";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    #[serde(rename = "TEST_ONLY")]
    TestOnly,
    #[serde(rename = "TEST_AND_DEPLOY")]
    TestAndDeploy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub branch: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationRef {
    pub branch: String,
    pub id: String,
}

/// A buildable job. Produced only by [`decide`]; ownership moves to the
/// emission channel immediately afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub trigger: TriggerEvent,
    pub project: String,
    pub r#ref: JobRef,
    pub user_id: String,
    pub created_at: u64,
}

/// Expected no-job outcomes. These are informational, not failures: the
/// webhook sender is acknowledged either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ExplicitSkip,
    BranchInactive,
}

impl fmt::Display for Rejection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitSkip => formatter.write_str("explicit-skip"),
            Self::BranchInactive => formatter.write_str("branch-inactive"),
        }
    }
}

/// Decides whether a normalized trigger becomes a job, and with what
/// deploy policy. Branches without explicit configuration get the
/// mirror-master fallback; mirrored non-master branches never deploy.
///
/// # Errors
///
/// Returns a [`Rejection`] when the event should produce no job. This is a
/// normal outcome, not a failure.
pub fn decide(project: &Project, normalized: Normalized) -> Result<Job, Rejection> {
    let Normalized::Event(trigger) = normalized else {
        return Err(Rejection::ExplicitSkip);
    };

    let fallback = BranchConfig::fallback(trigger.branch());
    let branch = project.branch(trigger.branch()).unwrap_or(&fallback);
    if !branch.active {
        return Err(Rejection::BranchInactive);
    }

    let deploy = if trigger.branch() != MASTER_BRANCH && branch.mirror_master {
        false
    } else {
        trigger.deploy() && branch.deploy_on_green
    };

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default();

    let r#ref = JobRef {
        branch: trigger.branch().to_string(),
        id: trigger.ref_id().to_string(),
        destination: trigger
            .destination()
            .map(|(destination_branch, destination_id)| DestinationRef {
                branch: destination_branch.to_string(),
                id: destination_id.to_string(),
            }),
    };

    Ok(Job {
        kind: if deploy {
            JobKind::TestAndDeploy
        } else {
            JobKind::TestOnly
        },
        project: project.name.clone(),
        r#ref,
        user_id: project.creator_id.clone(),
        created_at,
        trigger,
    })
}
