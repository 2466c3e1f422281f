//! Blocking HTTP client shared by the HTTP-based repository handlers.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::StatusCode;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use super::{resolved_metadata, ArtifactConfig, FetchOutcome, SizeOutcome};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::secrets::{ResolvedAuth, SecretDecryptor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A vendor-side failure. Handlers translate it into the crate taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: Option<u16>,
    pub message: String,
}

impl HttpError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub type HttpResult<T> = std::result::Result<T, HttpError>;

pub trait RepositoryHttpClient: Send + Sync {
    /// Size of the resource at `url` without downloading it.
    fn content_length(&self, url: &str, auth: &ResolvedAuth) -> HttpResult<u64>;

    /// Open the resource body. `Ok(None)` means the server has no such resource.
    fn download(&self, url: &str, auth: &ResolvedAuth) -> HttpResult<Option<Box<dyn Read + Send>>>;
}

pub struct ReqwestRepositoryClient {
    client: Client,
}

impl ReqwestRepositoryClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("courier/{}", VERSION))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;
        Ok(Self { client })
    }

    fn authorized(&self, request: RequestBuilder, auth: &ResolvedAuth) -> RequestBuilder {
        match auth.header_value() {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }
}

fn transport_error(err: reqwest::Error) -> HttpError {
    HttpError::new(err.status().map(|s| s.as_u16()), err.to_string())
}

fn status_error(status: StatusCode) -> HttpError {
    HttpError::new(
        Some(status.as_u16()),
        status.canonical_reason().unwrap_or("unexpected status"),
    )
}

impl RepositoryHttpClient for ReqwestRepositoryClient {
    fn content_length(&self, url: &str, auth: &ResolvedAuth) -> HttpResult<u64> {
        let response = self
            .authorized(self.client.head(url), auth)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        // HEAD bodies are empty, so read the header rather than the body size hint.
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| HttpError::new(Some(status.as_u16()), "response has no Content-Length"))
    }

    fn download(&self, url: &str, auth: &ResolvedAuth) -> HttpResult<Option<Box<dyn Read + Send>>> {
        let response = self
            .authorized(self.client.get(url), auth)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status));
        }
        Ok(Some(Box::new(response)))
    }
}

/// Where one artifact lives on an HTTP repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpLocation {
    /// Repository-qualified name.
    pub name: String,
    pub url: String,
}

/// Size and fetch over HTTP, shared by every HTTP-based handler.
#[derive(Clone)]
pub struct HttpArtifactBackend {
    client: Arc<dyn RepositoryHttpClient>,
    secrets: Arc<dyn SecretDecryptor>,
    max_artifact_size: Option<u64>,
}

impl HttpArtifactBackend {
    pub fn new(
        client: Arc<dyn RepositoryHttpClient>,
        secrets: Arc<dyn SecretDecryptor>,
        max_artifact_size: Option<u64>,
    ) -> Self {
        Self {
            client,
            secrets,
            max_artifact_size,
        }
    }

    pub fn size(&self, config: &ArtifactConfig, location: &HttpLocation) -> Result<SizeOutcome> {
        let auth = ResolvedAuth::resolve(&config.connector.auth, self.secrets.as_ref())?;
        let size = self
            .client
            .content_length(&location.url, &auth)
            .map_err(|e| {
                Error::size_query_failed(&location.name, e.to_string()).redact(&auth.secrets())
            })?;

        tracing::debug!(artifact = %location.name, size, "resolved artifact size");
        Ok(SizeOutcome {
            size,
            metadata: resolved_metadata(&location.name, &location.url, Some(size)),
        })
    }

    pub fn fetch(
        &self,
        ctx: &ExecutionContext,
        config: &ArtifactConfig,
        location: &HttpLocation,
    ) -> Result<FetchOutcome> {
        let declared = ctx.declared_artifact_size();
        if let (Some(ceiling), Some(size)) = (self.max_artifact_size, declared) {
            if size > ceiling {
                return Err(Error::artifact_too_large(&location.name, size, ceiling));
            }
        }

        let auth = ResolvedAuth::resolve(&config.connector.auth, self.secrets.as_ref())?;
        let stream = self.client.download(&location.url, &auth).map_err(|e| {
            Error::artifact_download_failed(&location.name, Some(e.to_string()))
                .redact(&auth.secrets())
        })?;

        tracing::debug!(artifact = %location.name, found = stream.is_some(), "opened artifact stream");
        Ok(FetchOutcome {
            stream,
            metadata: resolved_metadata(&location.name, &location.url, declared),
        })
    }
}
