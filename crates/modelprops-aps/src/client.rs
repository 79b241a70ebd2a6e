//! HTTP implementation of the indexing service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{ApsError, ErrorResponse, Result};
use crate::service::{IndexService, ServiceConnector, SharedIndexService};
use crate::types::{
    AccessToken, FieldDescriptor, IndexRequest, IndexStatus, QueryStatus, StructuredQuery,
};

/// Default service host.
pub const DEFAULT_HOST: &str = "https://developer.api.autodesk.com";

/// Path prefix of the model properties index API.
const API_PREFIX: &str = "construction/index/v2";

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings shared by every client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host of the service.
    pub host: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures (network, 429, 5xx).
    pub max_retries: u32,
    /// Initial backoff between retries, doubled after each attempt.
    pub retry_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Point the client at another host (tests, proxies).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry behaviour.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    fn api_base(&self) -> Result<Url> {
        let mut base = Url::parse(&self.host)?;
        let path = format!("{}/{}/", base.path().trim_end_matches('/'), API_PREFIX);
        base.set_path(&path);
        Ok(base)
    }

    fn build_http(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApsError::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Model properties client bound to one access token.
#[derive(Clone)]
pub struct ModelPropertiesClient {
    http: reqwest::Client,
    base_url: Url,
    token: AccessToken,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ModelPropertiesClient {
    /// Create a client with its own connection pool.
    pub fn new(config: &ClientConfig, token: AccessToken) -> Result<Self> {
        Self::with_http(config.build_http()?, config, token)
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_http(http: reqwest::Client, config: &ClientConfig, token: AccessToken) -> Result<Self> {
        Ok(Self {
            http,
            base_url: config.api_base()?,
            token,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    /// Build a URL below the API base. Each segment is percent-encoded on its
    /// own, so `/`, `?` and `#` inside an id cannot leave the resource path.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApsError::Config(format!("{} cannot be a base URL", self.base_url)))?;
            path.pop_if_empty();
            for segment in segments {
                // The url crate drops dot segments instead of encoding them.
                if segment.is_empty() || matches!(*segment, "." | "..") {
                    return Err(ApsError::NotFound(format!("no resource with id '{}'", segment)));
                }
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Send a request and return the raw body of a successful response.
    async fn execute(&self, method: Method, path: &[&str], body: Option<Value>) -> Result<String> {
        let url = self.url(path)?;
        tracing::debug!(%method, %url, "Index service request");

        retry_transient(self.max_retries, self.retry_backoff, || async {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(self.token.secret());
            if let Some(ref body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            Self::read_body(response).await
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &[&str]) -> Result<T> {
        let body = self.execute(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &[&str], body: Value) -> Result<T> {
        let body = self.execute(Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_ndjson<T: DeserializeOwned>(&self, path: &[&str]) -> Result<Vec<T>> {
        let body = self.execute(Method::GET, path, None).await?;
        parse_ndjson(&body)
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(Self::extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(response: reqwest::Response) -> ApsError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorResponse>(&body).ok();
        let code = parsed
            .as_ref()
            .and_then(|e| e.code.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let message = parsed
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 | 403 => ApsError::Auth(message),
            404 => ApsError::NotFound(message),
            _ => ApsError::Api {
                status,
                code,
                message,
            },
        }
    }
}

/// Project identifiers from the hub browser carry a `b.` prefix the index API
/// does not accept.
fn project_segment(project_id: &str) -> &str {
    project_id.strip_prefix("b.").unwrap_or(project_id)
}

/// Parse newline-delimited JSON, also accepting a plain JSON array.
fn parse_ndjson<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ApsError::from))
        .collect()
}

/// Retry an operation on transient failures with exponential backoff.
async fn retry_transient<F, Fut, T>(max_retries: u32, initial_backoff: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Index service request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct BatchStatusResponse {
    #[serde(default)]
    indexes: Vec<IndexStatus>,
}

#[async_trait]
impl IndexService for ModelPropertiesClient {
    async fn create_index(&self, project_id: &str, request: &IndexRequest) -> Result<IndexStatus> {
        let path = ["projects", project_segment(project_id), "indexes:batch-status"];
        let response: BatchStatusResponse =
            self.post_json(&path, serde_json::to_value(request)?).await?;
        response.indexes.into_iter().next().ok_or_else(|| {
            ApsError::UnexpectedResponse("batch-status response contained no indexes".to_string())
        })
    }

    async fn get_index(&self, project_id: &str, index_id: &str) -> Result<IndexStatus> {
        self.get_json(&["projects", project_segment(project_id), "indexes", index_id])
            .await
    }

    async fn list_fields(&self, project_id: &str, index_id: &str) -> Result<Vec<FieldDescriptor>> {
        let path = ["projects", project_segment(project_id), "indexes", index_id, "fields"];
        self.get_ndjson(&path).await
    }

    async fn create_query(
        &self,
        project_id: &str,
        index_id: &str,
        query: &StructuredQuery,
    ) -> Result<QueryStatus> {
        let path = ["projects", project_segment(project_id), "indexes", index_id, "queries"];
        self.post_json(&path, serde_json::to_value(query)?).await
    }

    async fn get_query(&self, project_id: &str, index_id: &str, query_id: &str) -> Result<QueryStatus> {
        let path = [
            "projects",
            project_segment(project_id),
            "indexes",
            index_id,
            "queries",
            query_id,
        ];
        self.get_json(&path).await
    }

    async fn get_query_results(
        &self,
        project_id: &str,
        index_id: &str,
        query_id: &str,
    ) -> Result<Vec<Value>> {
        let path = [
            "projects",
            project_segment(project_id),
            "indexes",
            index_id,
            "queries",
            query_id,
            "properties",
        ];
        self.get_ndjson(&path).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// Opens HTTP clients that share one connection pool.
#[derive(Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpConnector {
    /// Create a connector for the given settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http: config.build_http()?,
            config,
        })
    }
}

impl ServiceConnector for HttpConnector {
    fn connect(&self, token: &AccessToken) -> Result<SharedIndexService> {
        let client = ModelPropertiesClient::with_http(self.http.clone(), &self.config, token.clone())?;
        Ok(Arc::new(client))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
