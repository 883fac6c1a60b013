use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::client::{BitbucketApi, BitbucketHttp};
use crate::config::BridgeConfig;
use crate::dispatch;
use crate::gravatar::{AvatarResolver, Gravatar};
use crate::job::Job;
use crate::project::{InMemoryProjects, Project, ProjectStore};
use crate::request_logging::log_bridge_request;
use crate::trigger::{PullRequestPayload, PushPayload};
use crate::webhooks;

#[derive(Clone)]
pub struct BridgeState {
    pub client: Arc<dyn BitbucketApi>,
    pub projects: Arc<dyn ProjectStore>,
    pub avatars: Arc<dyn AvatarResolver>,
    pub jobs: mpsc::UnboundedSender<Job>,
    pub host: String,
}

/// Starts the bridge: loads config, wires the Bitbucket client and project
/// store into the router, and drains emitted jobs onto stdout as
/// `job.prepare` lines (standing in for the orchestrator's event channel).
///
/// # Errors
///
/// Fails on config errors, a missing public host, or bind failures.
pub async fn run() -> Result<()> {
    let config = BridgeConfig::load()?;
    let host = config
        .host()
        .context("public host is not configured; set `host` or BRIDGE_HOST")?;
    let bind_address = config.bind_address();

    let (jobs, mut job_queue) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        while let Some(job) = job_queue.recv().await {
            match serde_json::to_string(&job) {
                Ok(encoded) => println!("job.prepare\t{encoded}"),
                Err(error) => println!("job.prepare\t<unserializable job: {error}>"),
            }
        }
    });

    let state = BridgeState {
        client: Arc::new(BitbucketHttp::from_config(&config)),
        projects: Arc::new(InMemoryProjects::new(config.projects())),
        avatars: Arc::new(Gravatar),
        jobs,
        host,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    println!("Bitbucket bridge listening on: {bind_address}");

    axum::serve(listener, app).await?;
    Ok(())
}

#[must_use]
pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route(
            "/:owner/:slug/api/bitbucket/commit/:secret",
            post(commit_webhook),
        )
        .route(
            "/:owner/:slug/api/bitbucket/pull-request/:secret",
            post(pull_request_webhook),
        )
        .route(
            "/api/projects/:owner/:slug/webhooks",
            put(register_webhooks).delete(remove_webhooks),
        )
        .layer(middleware::from_fn(log_bridge_request))
        .with_state(state)
}

async fn find_project(state: &BridgeState, owner: &str, slug: &str) -> Option<Project> {
    state.projects.find(&format!("{owner}/{slug}")).await
}

/// Inbound push delivery. The sender is acknowledged whether or not a job
/// was admitted; only an unknown project is distinguishable. The secret
/// segment is carried in the URL but verified upstream (the fronting layer
/// owns inbound authentication), so it is not compared here.
async fn commit_webhook(
    State(state): State<BridgeState>,
    Path((owner, slug, _secret)): Path<(String, String, String)>,
    Json(payload): Json<PushPayload>,
) -> StatusCode {
    let Some(project) = find_project(&state, &owner, &slug).await else {
        return StatusCode::NOT_FOUND;
    };

    dispatch::dispatch_commit(&project, &payload, state.avatars.as_ref(), &state.jobs);
    StatusCode::NO_CONTENT
}

/// Inbound pull-request delivery. Secret verification is delegated upstream,
/// as on the commit route.
async fn pull_request_webhook(
    State(state): State<BridgeState>,
    Path((owner, slug, _secret)): Path<(String, String, String)>,
    Json(payload): Json<PullRequestPayload>,
) -> Result<StatusCode, (StatusCode, String)> {
    let Some(project) = find_project(&state, &owner, &slug).await else {
        return Ok(StatusCode::NOT_FOUND);
    };

    dispatch::dispatch_pull_request(
        state.client.as_ref(),
        &project,
        &payload,
        state.avatars.as_ref(),
        &state.jobs,
    )
    .await
    .map_err(|error| {
        (
            StatusCode::BAD_GATEWAY,
            format!("pull request dispatch failed: {error}"),
        )
    })?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    secret: String,
    already_existed: bool,
}

#[derive(Debug, Serialize)]
struct RemoveResponse {
    removed: bool,
}

async fn register_webhooks(
    State(state): State<BridgeState>,
    Path((owner, slug)): Path<(String, String)>,
) -> Result<Json<RegisterResponse>, (StatusCode, String)> {
    let project_id = format!("{owner}/{slug}");
    let outcome = webhooks::ensure_registered(state.client.as_ref(), &state.host, &project_id)
        .await
        .map_err(|error| {
            (
                StatusCode::BAD_GATEWAY,
                format!("webhook registration failed: {error}"),
            )
        })?;

    Ok(Json(RegisterResponse {
        secret: outcome.secret,
        already_existed: outcome.already_existed,
    }))
}

async fn remove_webhooks(
    State(state): State<BridgeState>,
    Path((owner, slug)): Path<(String, String)>,
) -> Result<Json<RemoveResponse>, (StatusCode, String)> {
    let project_id = format!("{owner}/{slug}");
    let removed = webhooks::unregister(state.client.as_ref(), &state.host, &project_id)
        .await
        .map_err(|error| {
            (
                StatusCode::BAD_GATEWAY,
                format!("webhook removal failed: {error}"),
            )
        })?;

    Ok(Json(RemoveResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeBitbucket;
    use crate::client::EmailRecord;
    use crate::project::BranchConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_state(client: FakeBitbucket) -> (BridgeState, mpsc::UnboundedReceiver<Job>) {
        let (jobs, queue) = mpsc::unbounded_channel();
        let state = BridgeState {
            client: Arc::new(client),
            projects: Arc::new(InMemoryProjects::new(vec![Project {
                name: "jaredly/tester".to_string(),
                creator_id: "user-1".to_string(),
                branches: vec![BranchConfig {
                    name: "master".to_string(),
                    active: true,
                    mirror_master: false,
                    deploy_on_green: true,
                }],
            }])),
            avatars: Arc::new(Gravatar),
            jobs,
            host: "https://ci.example.com".to_string(),
        };
        (state, queue)
    }

    fn push_body() -> String {
        serde_json::json!({
            "canon_url": "https://bitbucket.org",
            "repository": { "absolute_url": "/jaredly/tester/" },
            "commits": [{
                "raw_author": "Jared Forsyth <jared@example.com>",
                "raw_node": "abc123",
                "branch": "master",
                "message": "a change",
                "timestamp": "2013-11-06 00:29:04"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn commit_webhook_acknowledges_and_emits_a_job() {
        let (state, mut queue) = test_state(FakeBitbucket::default());
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jaredly/tester/api/bitbucket/commit/cafe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(push_body()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let job = queue.try_recv().expect("one job");
        assert_eq!(job.project, "jaredly/tester");
    }

    #[tokio::test]
    async fn commit_webhook_acknowledges_rejected_events_too() {
        let (state, mut queue) = test_state(FakeBitbucket::default());
        let app = router(state);

        let body = push_body().replace("a change", "a change [skip ci]");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jaredly/tester/api/bitbucket/commit/cafe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn commit_webhook_rejects_unknown_projects() {
        let (state, _queue) = test_state(FakeBitbucket::default());
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/other/repo/api/bitbucket/commit/cafe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(push_body()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pull_request_webhook_surfaces_email_lookup_failures() {
        let client = FakeBitbucket {
            fail_emails: true,
            ..FakeBitbucket::default()
        };
        let (state, _queue) = test_state(client);
        let app = router(state);

        let body = serde_json::json!({
            "author": {
                "display_name": "Erik van Zijst",
                "username": "evzijst",
                "links": { "avatar": { "href": "https://example.com/a.png" } }
            },
            "title": "PR title",
            "description": "description",
            "created_on": "2013-11-04T23:41:48+00:00",
            "source": {
                "branch": { "name": "dev" },
                "commit": { "hash": "325625d47b0a" }
            },
            "destination": {
                "branch": { "name": "master" },
                "commit": { "hash": "82d48819e5f7" }
            }
        })
        .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jaredly/tester/api/bitbucket/pull-request/cafe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn pull_request_webhook_emits_a_job_with_resolved_email() {
        let client = FakeBitbucket {
            emails: vec![EmailRecord {
                email: "erik@example.com".to_string(),
                primary: true,
            }],
            ..FakeBitbucket::default()
        };
        let (state, mut queue) = test_state(client);
        let app = router(state);

        let body = serde_json::json!({
            "author": {
                "display_name": "Erik van Zijst",
                "username": "evzijst",
                "links": { "avatar": { "href": "https://example.com/a.png" } }
            },
            "title": "PR title",
            "description": "description",
            "created_on": "2013-11-04T23:41:48+00:00",
            "source": {
                "branch": { "name": "dev" },
                "commit": { "hash": "325625d47b0a" }
            },
            "destination": {
                "branch": { "name": "master" },
                "commit": { "hash": "82d48819e5f7" }
            }
        })
        .to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jaredly/tester/api/bitbucket/pull-request/cafe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let job = queue.try_recv().expect("one job");
        assert_eq!(job.r#ref.branch, "dev");
    }

    #[tokio::test]
    async fn register_endpoint_returns_the_secret() {
        let (state, _queue) = test_state(FakeBitbucket::default());
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/projects/jaredly/tester/webhooks")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        let json = serde_json::from_slice::<serde_json::Value>(&body).expect("json");
        assert_eq!(
            json.get("secret")
                .and_then(serde_json::Value::as_str)
                .map(str::len),
            Some(64)
        );
        assert_eq!(
            json.get("already_existed").and_then(serde_json::Value::as_bool),
            Some(false)
        );
    }

    #[tokio::test]
    async fn remove_endpoint_reports_when_nothing_matched() {
        let (state, _queue) = test_state(FakeBitbucket::default());
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/projects/jaredly/tester/webhooks")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        let json = serde_json::from_slice::<serde_json::Value>(&body).expect("json");
        assert_eq!(
            json.get("removed").and_then(serde_json::Value::as_bool),
            Some(false)
        );
    }
}
