use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::BridgeConfig;

/// Failures talking to the Bitbucket REST API. Transport problems and
/// non-2xx responses both propagate to the caller; nothing is retried at
/// this layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bitbucket request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("bitbucket returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// One remote webhook registration ("service" in the 1.0 API).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRecord {
    pub id: u64,
    pub service: ServiceBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<ServiceField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailRecord {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
}

/// The slice of the Bitbucket 1.0 API this bridge consumes. Kept as a trait
/// so the registrar and dispatcher stay testable without a network.
#[async_trait]
pub trait BitbucketApi: Send + Sync {
    /// Lists the webhook registrations of a repository.
    ///
    /// # Errors
    /// Propagates transport failures and non-2xx responses.
    async fn list_services(&self, project_id: &str) -> Result<Vec<ServiceRecord>, ApiError>;

    /// Creates a webhook registration from form-encoded fields.
    ///
    /// # Errors
    /// Propagates transport failures and non-2xx responses.
    async fn create_service(
        &self,
        project_id: &str,
        fields: &[(&str, &str)],
    ) -> Result<(), ApiError>;

    /// Deletes a webhook registration. Deleting an already-gone
    /// registration is not an error.
    ///
    /// # Errors
    /// Propagates transport failures and non-2xx responses other than 404.
    async fn delete_service(&self, project_id: &str, service_id: u64) -> Result<(), ApiError>;

    /// Lists the email addresses registered for a Bitbucket user.
    ///
    /// # Errors
    /// Propagates transport failures and non-2xx responses.
    async fn user_emails(&self, username: &str) -> Result<Vec<EmailRecord>, ApiError>;
}

/// reqwest-backed client with HTTP basic auth against the versioned REST base.
#[derive(Debug, Clone)]
pub struct BitbucketHttp {
    http: reqwest::Client,
    api_base: String,
    username: Option<String>,
    password: Option<String>,
}

impl BitbucketHttp {
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base(),
            username: config.bitbucket_username(),
            password: config.bitbucket_password(),
        }
    }

    fn services_url(&self, project_id: &str) -> String {
        format!("{}/repositories/{project_id}/services", self.api_base)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BitbucketApi for BitbucketHttp {
    async fn list_services(&self, project_id: &str) -> Result<Vec<ServiceRecord>, ApiError> {
        let request = self.http.get(self.services_url(project_id));
        let response = ensure_success(self.authorize(request).send().await?).await?;
        Ok(response.json::<Vec<ServiceRecord>>().await?)
    }

    async fn create_service(
        &self,
        project_id: &str,
        fields: &[(&str, &str)],
    ) -> Result<(), ApiError> {
        let url = format!("{}/", self.services_url(project_id));
        let request = self.http.post(url).form(fields);
        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn delete_service(&self, project_id: &str, service_id: u64) -> Result<(), ApiError> {
        let url = format!("{}/{service_id}/", self.services_url(project_id));
        let request = self.http.delete(url);
        let response = self.authorize(request).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn user_emails(&self, username: &str) -> Result<Vec<EmailRecord>, ApiError> {
        let url = format!("{}/users/{username}/emails", self.api_base);
        let request = self.http.get(url);
        let response = ensure_success(self.authorize(request).send().await?).await?;
        Ok(response.json::<Vec<EmailRecord>>().await?)
    }
}
