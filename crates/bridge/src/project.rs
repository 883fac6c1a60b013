use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Repository snapshot as returned by the Bitbucket repository endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepository {
    pub owner: String,
    pub slug: String,
    pub name: String,
    pub scm: Scm,
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scm {
    Git,
    Hg,
}

impl Scm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
        }
    }
}

/// Internal project record derived once from a [`RemoteRepository`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub display_url: String,
    pub group: String,
    pub private: bool,
    pub config: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    pub auth: AuthMethod,
    pub scm: Scm,
    pub url: String,
    pub owner: String,
    pub repo: String,
    pub pull_requests: PullRequestPolicy,
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Ssh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestPolicy {
    None,
}

/// Maps a remote repository into the project shape the orchestrator stores.
/// The id and name are both `owner/slug`; the clone URL is always ssh keyed
/// by the repository's scm.
#[must_use]
pub fn parse_repo(repo: &RemoteRepository) -> ProjectDescriptor {
    let id = format!("{}/{}", repo.owner, repo.slug);
    ProjectDescriptor {
        id: id.clone(),
        name: id.clone(),
        display_name: format!("{}/{}", repo.owner, repo.name),
        display_url: format!("https://bitbucket.org/{id}"),
        group: repo.owner.clone(),
        private: repo.is_private,
        config: ConnectionConfig {
            auth: AuthMethod::Ssh,
            scm: repo.scm,
            url: format!("ssh://{}@bitbucket.org/{id}", repo.scm.as_str()),
            owner: repo.owner.clone(),
            repo: repo.slug.clone(),
            pull_requests: PullRequestPolicy::None,
            whitelist: Vec::new(),
        },
    }
}

/// Per-branch build/deploy policy owned by the project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub mirror_master: bool,
    #[serde(default)]
    pub deploy_on_green: bool,
}

fn default_active() -> bool {
    true
}

impl BranchConfig {
    /// The policy assumed for branches with no explicit configuration:
    /// buildable, mirroring master, never deploying.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            mirror_master: true,
            deploy_on_green: false,
        }
    }
}

/// The collaborator view of a configured project: just enough to admit jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    pub creator_id: String,
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
}

impl Project {
    #[must_use]
    pub fn branch(&self, name: &str) -> Option<&BranchConfig> {
        self.branches.iter().find(|branch| branch.name == name)
    }
}

/// Project configuration lookup, owned by an external collaborator.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find(&self, name: &str) -> Option<Project>;
}

/// Config-file-backed store used by the bridge binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryProjects {
    by_name: HashMap<String, Project>,
}

impl InMemoryProjects {
    #[must_use]
    pub fn new(projects: Vec<Project>) -> Self {
        let by_name = projects
            .into_iter()
            .map(|project| (project.name.clone(), project))
            .collect();
        Self { by_name }
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjects {
    async fn find(&self, name: &str) -> Option<Project> {
        self.by_name.get(name).cloned()
    }
}
