use super::http::{HttpArtifactBackend, HttpLocation};
use super::{
    expect_config, join_url, mismatched, require_non_blank, ArtifactConfig,
    ArtifactRepositoryType, ArtifactSource, ArtifactSourceSpec, FetchOutcome, SizeOutcome,
};
use crate::context::ExecutionContext;
use crate::error::Result;

/// Archived build artifacts, `<url>/job/<job>/<build>/artifact/<path>`.
/// Folder jobs (`team/app`) expand to `job/team/job/app`.
pub struct JenkinsHandler {
    backend: HttpArtifactBackend,
}

impl JenkinsHandler {
    pub fn new(backend: HttpArtifactBackend) -> Self {
        Self { backend }
    }

    fn locate(ctx: &ExecutionContext) -> Result<(&ArtifactConfig, HttpLocation)> {
        let config = expect_config(ctx, ArtifactRepositoryType::Jenkins)?;
        let ArtifactSourceSpec::Jenkins {
            job_name,
            build,
            artifact_path,
        } = &config.source
        else {
            return Err(mismatched(ArtifactRepositoryType::Jenkins, &config.source));
        };

        require_non_blank("jobName", job_name)?;
        require_non_blank("build", build)?;
        require_non_blank("artifactPath", artifact_path)?;

        let job_path = job_name
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| format!("job/{}", s))
            .collect::<Vec<_>>()
            .join("/");
        let artifact_path = artifact_path.trim_matches('/');
        let build = build.trim();

        let location = HttpLocation {
            name: format!("{}/{}/{}", job_name.trim_matches('/'), build, artifact_path),
            url: join_url(
                &config.connector.url,
                &[job_path.as_str(), build, "artifact", artifact_path],
            ),
        };
        Ok((config, location))
    }
}

impl ArtifactSource for JenkinsHandler {
    fn repository_type(&self) -> ArtifactRepositoryType {
        ArtifactRepositoryType::Jenkins
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
