use std::collections::HashMap;
use std::sync::Arc;

use super::http::{HttpArtifactBackend, RepositoryHttpClient};
use super::{
    ArtifactConfig, ArtifactRepositoryType, ArtifactSource, ArtifactoryHandler, JenkinsHandler,
    NexusHandler, SizeOutcome,
};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::secrets::SecretDecryptor;

/// Repository type to handler lookup. Immutable once built and shared across runs.
#[derive(Default, Clone)]
pub struct ArtifactRegistry {
    handlers: HashMap<ArtifactRepositoryType, Arc<dyn ArtifactSource>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the HTTP-based handlers (Artifactory, Nexus, Jenkins).
    pub fn with_http_handlers(
        client: Arc<dyn RepositoryHttpClient>,
        secrets: Arc<dyn SecretDecryptor>,
        max_artifact_size: Option<u64>,
    ) -> Self {
        let backend = HttpArtifactBackend::new(client, secrets, max_artifact_size);
        Self::new()
            .register(Arc::new(ArtifactoryHandler::new(backend.clone())))
            .register(Arc::new(NexusHandler::new(backend.clone())))
            .register(Arc::new(JenkinsHandler::new(backend)))
    }

    /// Add or replace the handler for its repository type.
    pub fn register(mut self, handler: Arc<dyn ArtifactSource>) -> Self {
        self.handlers.insert(handler.repository_type(), handler);
        self
    }

    pub fn resolve(&self, config: &ArtifactConfig) -> Result<Arc<dyn ArtifactSource>> {
        let repository_type = config.repository_type();
        self.handlers
            .get(&repository_type)
            .cloned()
            .ok_or_else(|| Error::unsupported_artifact_source(repository_type.as_str()))
    }

    /// Size and metadata for the context's artifact, without touching the cache.
    pub fn size(&self, ctx: &ExecutionContext) -> Result<SizeOutcome> {
        let config = ctx
            .artifact
            .as_ref()
            .ok_or_else(|| Error::artifact_not_configured("any", None))?;
        self.resolve(config)?.size(ctx)
    }

    pub fn registered_types(&self) -> Vec<ArtifactRepositoryType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
