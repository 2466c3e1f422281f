//! Artifact configuration and the repository-agnostic source contract.
//!
//! One [`ArtifactSource`] implementation exists per repository type; the
//! [`ArtifactRegistry`] selects one by [`ArtifactRepositoryType`].

mod artifactory;
mod http;
mod jenkins;
mod nexus;
mod registry;

pub use artifactory::ArtifactoryHandler;
pub use http::{
    HttpArtifactBackend, HttpError, HttpLocation, RepositoryHttpClient, ReqwestRepositoryClient,
};
pub use jenkins::JenkinsHandler;
pub use nexus::NexusHandler;
pub use registry::ArtifactRegistry;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::secrets::SecretRef;

/// Repository-qualified name; forms the cache key together with the identifier.
pub const ARTIFACT_NAME: &str = "artifactName";
/// Full locator (URL) of the artifact.
pub const ARTIFACT_PATH: &str = "artifactPath";
/// Last path segment, used as the destination file name.
pub const ARTIFACT_FILE_NAME: &str = "artifactFileName";
/// Size in bytes, as a decimal string.
pub const ARTIFACT_SIZE: &str = "artifactSize";

pub type ArtifactMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactRepositoryType {
    Artifactory,
    Nexus,
    Jenkins,
    AwsS3,
    AzureArtifacts,
    GoogleCloudStorage,
    GithubPackages,
}

impl ArtifactRepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRepositoryType::Artifactory => "artifactory",
            ArtifactRepositoryType::Nexus => "nexus",
            ArtifactRepositoryType::Jenkins => "jenkins",
            ArtifactRepositoryType::AwsS3 => "awsS3",
            ArtifactRepositoryType::AzureArtifacts => "azureArtifacts",
            ArtifactRepositoryType::GoogleCloudStorage => "googleCloudStorage",
            ArtifactRepositoryType::GithubPackages => "githubPackages",
        }
    }
}

impl fmt::Display for ArtifactRepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectorAuth {
    Anonymous,
    #[serde(rename_all = "camelCase")]
    UsernamePassword {
        username: String,
        password_ref: SecretRef,
    },
    #[serde(rename_all = "camelCase")]
    Token { token_ref: SecretRef },
}

impl Default for ConnectorAuth {
    fn default() -> Self {
        ConnectorAuth::Anonymous
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    pub url: String,
    #[serde(default)]
    pub auth: ConnectorAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArtifactSourceSpec {
    #[serde(rename_all = "camelCase")]
    Artifactory {
        repository_name: String,
        artifact_path: String,
    },
    #[serde(rename_all = "camelCase")]
    Nexus {
        repository_name: String,
        group_id: String,
        artifact_id: String,
        version: String,
        #[serde(default = "default_nexus_extension")]
        extension: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        classifier: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Jenkins {
        job_name: String,
        build: String,
        artifact_path: String,
    },
    #[serde(rename_all = "camelCase")]
    AwsS3 {
        bucket: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AzureArtifacts {
        project: String,
        feed: String,
        package_name: String,
        version: String,
    },
    #[serde(rename_all = "camelCase")]
    GoogleCloudStorage { bucket: String, object: String },
    #[serde(rename_all = "camelCase")]
    GithubPackages {
        org: String,
        package_name: String,
        version: String,
    },
}

fn default_nexus_extension() -> String {
    "jar".to_string()
}

impl ArtifactSourceSpec {
    pub fn repository_type(&self) -> ArtifactRepositoryType {
        match self {
            ArtifactSourceSpec::Artifactory { .. } => ArtifactRepositoryType::Artifactory,
            ArtifactSourceSpec::Nexus { .. } => ArtifactRepositoryType::Nexus,
            ArtifactSourceSpec::Jenkins { .. } => ArtifactRepositoryType::Jenkins,
            ArtifactSourceSpec::AwsS3 { .. } => ArtifactRepositoryType::AwsS3,
            ArtifactSourceSpec::AzureArtifacts { .. } => ArtifactRepositoryType::AzureArtifacts,
            ArtifactSourceSpec::GoogleCloudStorage { .. } => {
                ArtifactRepositoryType::GoogleCloudStorage
            }
            ArtifactSourceSpec::GithubPackages { .. } => ArtifactRepositoryType::GithubPackages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    pub identifier: String,
    pub connector: ConnectorConfig,
    pub source: ArtifactSourceSpec,
}

impl ArtifactConfig {
    pub fn repository_type(&self) -> ArtifactRepositoryType {
        self.source.repository_type()
    }
}

/// Result of a size-only query.
#[derive(Debug, Clone)]
pub struct SizeOutcome {
    pub size: u64,
    pub metadata: ArtifactMetadata,
}

/// Result of opening an artifact. `stream` is `None` when the backend returned nothing,
/// which callers must treat as a failed download.
pub struct FetchOutcome {
    pub stream: Option<Box<dyn Read + Send>>,
    pub metadata: ArtifactMetadata,
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOutcome")
            .field("stream", &self.stream.as_ref().map(|_| "<stream>"))
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Fetches artifacts from one kind of repository.
///
/// Implementations validate that the context's artifact config is their own type,
/// resolve credentials, and translate vendor failures into crate errors with every
/// resolved secret redacted.
pub trait ArtifactSource: Send + Sync {
    fn repository_type(&self) -> ArtifactRepositoryType;

    fn size(&self, ctx: &ExecutionContext) -> Result<SizeOutcome>;

    fn fetch(&self, ctx: &ExecutionContext) -> Result<FetchOutcome>;
}

/// The artifact config, provided it is of `expected`'s type.
pub fn expect_config(
    ctx: &ExecutionContext,
    expected: ArtifactRepositoryType,
) -> Result<&ArtifactConfig> {
    let config = ctx
        .artifact
        .as_ref()
        .ok_or_else(|| Error::artifact_not_configured(expected.as_str(), None))?;
    if config.repository_type() != expected {
        return Err(mismatched(expected, &config.source));
    }
    Ok(config)
}

pub(crate) fn mismatched(expected: ArtifactRepositoryType, found: &ArtifactSourceSpec) -> Error {
    Error::artifact_not_configured(
        expected.as_str(),
        Some(found.repository_type().as_str().to_string()),
    )
}

/// Reject blank path components before any request is built.
pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::artifact_path_missing(field));
    }
    Ok(())
}

/// Metadata recorded by every handler for a resolved artifact.
pub fn resolved_metadata(name: &str, locator: &str, size: Option<u64>) -> ArtifactMetadata {
    let mut metadata = ArtifactMetadata::new();
    metadata.insert(ARTIFACT_NAME.to_string(), name.to_string());
    metadata.insert(ARTIFACT_PATH.to_string(), locator.to_string());
    metadata.insert(ARTIFACT_FILE_NAME.to_string(), file_name_of(name));
    if let Some(size) = size {
        metadata.insert(ARTIFACT_SIZE.to_string(), size.to_string());
    }
    metadata
}

/// Last non-empty `/`-separated segment of `path`.
pub fn file_name_of(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Join URL segments with exactly one `/` between them.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        url.push('/');
        url.push_str(segment);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_config_parses_tagged_source() {
        let config: ArtifactConfig = serde_json::from_str(
            r#"{
                "identifier": "_id123",
                "connector": {"url": "https://repo.example.com/artifactory",
                              "auth": {"type": "usernamePassword", "username": "ci",
                                       "passwordRef": {"identifier": "artifactory_pw"}}},
                "source": {"type": "artifactory", "repositoryName": "libs-release",
                           "artifactPath": "app/build.zip"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.repository_type(), ArtifactRepositoryType::Artifactory);
        assert!(matches!(
            config.connector.auth,
            ConnectorAuth::UsernamePassword { .. }
        ));
    }

    #[test]
    fn auth_defaults_to_anonymous() {
        let connector: ConnectorConfig =
            serde_json::from_str(r#"{"url": "https://nexus.example.com"}"#).unwrap();
        assert_eq!(connector.auth, ConnectorAuth::Anonymous);
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name_of("libs-release/app/build.zip"), "build.zip");
        assert_eq!(file_name_of("build.zip"), "build.zip");
        assert_eq!(file_name_of("dir/"), "dir");
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://repo/", &["/libs/", "", "a/b.zip"]),
            "https://repo/libs/a/b.zip"
        );
    }

    #[test]
    fn resolved_metadata_records_all_keys() {
        let metadata = resolved_metadata("libs/app.zip", "https://repo/libs/app.zip", Some(9));
        assert_eq!(metadata[ARTIFACT_NAME], "libs/app.zip");
        assert_eq!(metadata[ARTIFACT_FILE_NAME], "app.zip");
        assert_eq!(metadata[ARTIFACT_SIZE], "9");
    }
}
