use super::http::{HttpArtifactBackend, HttpLocation};
use super::{
    expect_config, join_url, mismatched, require_non_blank, ArtifactConfig,
    ArtifactRepositoryType, ArtifactSource, ArtifactSourceSpec, FetchOutcome, SizeOutcome,
};
use crate::context::ExecutionContext;
use crate::error::Result;

/// Nexus 3 maven2 repositories.
pub struct NexusHandler {
    backend: HttpArtifactBackend,
}

impl NexusHandler {
    pub fn new(backend: HttpArtifactBackend) -> Self {
        Self { backend }
    }

    fn locate(ctx: &ExecutionContext) -> Result<(&ArtifactConfig, HttpLocation)> {
        let config = expect_config(ctx, ArtifactRepositoryType::Nexus)?;
        let ArtifactSourceSpec::Nexus {
            repository_name,
            group_id,
            artifact_id,
            version,
            extension,
            classifier,
        } = &config.source
        else {
            return Err(mismatched(ArtifactRepositoryType::Nexus, &config.source));
        };

        require_non_blank("repositoryName", repository_name)?;
        require_non_blank("groupId", group_id)?;
        require_non_blank("artifactId", artifact_id)?;
        require_non_blank("version", version)?;

        let file_name = maven_file_name(artifact_id, version, extension, classifier.as_deref());
        let group_path = group_id.trim().replace('.', "/");
        let relative = format!("{}/{}/{}/{}", group_path, artifact_id, version, file_name);

        let location = HttpLocation {
            name: format!("{}/{}", repository_name, relative),
            url: join_url(
                &config.connector.url,
                &["repository", repository_name.as_str(), relative.as_str()],
            ),
        };
        Ok((config, location))
    }
}

fn maven_file_name(
    artifact_id: &str,
    version: &str,
    extension: &str,
    classifier: Option<&str>,
) -> String {
    let extension = extension.trim().trim_start_matches('.');
    match classifier.map(str::trim).filter(|c| !c.is_empty()) {
        Some(classifier) => format!("{}-{}-{}.{}", artifact_id, version, classifier, extension),
        None => format!("{}-{}.{}", artifact_id, version, extension),
    }
}

impl ArtifactSource for NexusHandler {
    fn repository_type(&self) -> ArtifactRepositoryType {
        ArtifactRepositoryType::Nexus
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
