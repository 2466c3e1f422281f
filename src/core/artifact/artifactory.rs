use super::http::{HttpArtifactBackend, HttpLocation};
use super::{
    expect_config, join_url, mismatched, require_non_blank, ArtifactRepositoryType, ArtifactSource,
    ArtifactSourceSpec, FetchOutcome, SizeOutcome,
};
use crate::context::ExecutionContext;
use crate::error::Result;

/// Artifactory generic/maven repositories, addressed as `<url>/<repository>/<path>`.
pub struct ArtifactoryHandler {
    backend: HttpArtifactBackend,
}

impl ArtifactoryHandler {
    pub fn new(backend: HttpArtifactBackend) -> Self {
        Self { backend }
    }

    fn locate(ctx: &ExecutionContext) -> Result<(&super::ArtifactConfig, HttpLocation)> {
        let config = expect_config(ctx, ArtifactRepositoryType::Artifactory)?;
        let (repository_name, artifact_path) = match &config.source {
            ArtifactSourceSpec::Artifactory {
                repository_name,
                artifact_path,
            } => (repository_name, artifact_path),
            other => return Err(mismatched(ArtifactRepositoryType::Artifactory, other)),
        };

        require_non_blank("repositoryName", repository_name)?;
        require_non_blank("artifactPath", artifact_path)?;

        let path = artifact_path.trim_matches('/');
        let location = HttpLocation {
            name: format!("{}/{}", repository_name.trim_matches('/'), path),
            url: join_url(&config.connector.url, &[repository_name.as_str(), path]),
        };
        Ok((config, location))
    }
}

impl ArtifactSource for ArtifactoryHandler {
    fn repository_type(&self) -> ArtifactRepositoryType {
        ArtifactRepositoryType::Artifactory
    }

    fn size(&self, ctx: &ExecutionContext) -> Result<SizeOutcome> {
        let (config, location) = Self::locate(ctx)?;
        self.backend.size(config, &location)
    }

    fn fetch(&self, ctx: &ExecutionContext) -> Result<FetchOutcome> {
        let (config, location) = Self::locate(ctx)?;
        self.backend.fetch(ctx, config, &location)
    }
}
