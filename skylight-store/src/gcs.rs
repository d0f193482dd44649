//! GCS-backed object store gateway.
//!
//! Talks to the Cloud Storage JSON API with a bearer token. Construction
//! fails fast when the bucket or token is missing: a misconfigured instance
//! should refuse to start rather than limp along and fail on first use.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use skylight_core::GatewayError;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::object_store::ObjectStore;
use crate::retry::with_retry;

const STORAGE_BASE: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Object store gateway over the GCS JSON API.
#[derive(Debug)]
pub struct GcsStore {
    http: reqwest::Client,
    bucket: String,
    token: SecretString,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl GcsStore {
    /// Build a store from configuration.
    ///
    /// Fails with `MissingCredentials` when the bucket or access token is
    /// absent; the caller decides whether to fall back to the in-memory
    /// store or abort startup.
    pub fn from_config(config: &StoreConfig) -> Result<Self, GatewayError> {
        if !config.has_bucket() {
            return Err(GatewayError::MissingCredentials {
                detail: "SKYLIGHT_CACHE_BUCKET is not set".to_string(),
            });
        }
        let token = config
            .require_token()
            .map_err(|_| GatewayError::MissingCredentials {
                detail: "SKYLIGHT_GCP_ACCESS_TOKEN is not set".to_string(),
            })?
            .clone();

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            bucket: config.bucket.clone(),
            token,
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            STORAGE_BASE,
            self.bucket,
            urlencoding::encode(path)
        )
    }

    fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&name={}",
            UPLOAD_BASE,
            self.bucket,
            urlencoding::encode(path)
        )
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: 0,
        }
    } else {
        GatewayError::Transport {
            reason: e.to_string(),
        }
    }
}

/// Map a non-success HTTP status. 5xx is retryable transport trouble,
/// everything else is a hard rejection.
fn status_error(status: StatusCode) -> GatewayError {
    if status.is_server_error() {
        GatewayError::Transport {
            reason: format!("server error: {}", status),
        }
    } else {
        GatewayError::UnexpectedResponse {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    }
}

#[derive(serde::Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct ListEntry {
    name: String,
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let url = format!("{}?alt=media", self.object_url(path));
        with_retry("object store get", self.retry_attempts, self.retry_backoff, || async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(self.token.expose_secret())
                .send()
                .await
                .map_err(|e| transport_error("object store get", e))?;

            match resp.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| transport_error("object store get", e))?;
                    Ok(Some(bytes.to_vec()))
                }
                status => Err(status_error(status)),
            }
        })
        .await
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), GatewayError> {
        let url = self.upload_url(path);
        with_retry("object store put", self.retry_attempts, self.retry_backoff, || {
            let body = bytes.clone();
            async {
                let resp = self
                    .http
                    .post(&url)
                    .bearer_auth(self.token.expose_secret())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| transport_error("object store put", e))?;

                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(status_error(status))
                }
            }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        with_retry("object store list", self.retry_attempts, self.retry_backoff, || async {
            let mut names = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut url = format!(
                    "{}/b/{}/o?prefix={}&fields=items(name),nextPageToken",
                    STORAGE_BASE,
                    self.bucket,
                    urlencoding::encode(prefix)
                );
                if let Some(token) = &page_token {
                    url.push_str("&pageToken=");
                    url.push_str(&urlencoding::encode(token));
                }

                let resp = self
                    .http
                    .get(&url)
                    .bearer_auth(self.token.expose_secret())
                    .send()
                    .await
                    .map_err(|e| transport_error("object store list", e))?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(status_error(status));
                }

                let page: ListResponse = resp.json().await.map_err(|e| GatewayError::Decode {
                    reason: format!("invalid list response: {}", e),
                })?;
                names.extend(page.items.into_iter().map(|entry| entry.name));

                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => return Ok(names),
                }
            }
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let url = self.object_url(path);
        with_retry("object store delete", self.retry_attempts, self.retry_backoff, || async {
            let resp = self
                .http
                .delete(&url)
                .bearer_auth(self.token.expose_secret())
                .send()
                .await
                .map_err(|e| transport_error("object store delete", e))?;

            match resp.status() {
                // Deleting a missing object is a success: delete is idempotent.
                StatusCode::NOT_FOUND => Ok(()),
                status if status.is_success() => Ok(()),
                status => Err(status_error(status)),
            }
        })
        .await
    }
}
