//! Task parameters and the per-run execution context.
//!
//! `TaskParameters` is what a caller submits. `ExecutionContext` is derived from it once
//! per run and handed by value from stage to stage; stages that learn something new
//! (Init's resolved environment, an artifact handler's metadata) return it and the
//! pipeline folds it back in with the `with_*` builders.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::artifact::{ArtifactConfig, ArtifactMetadata, ARTIFACT_SIZE};
use crate::command::CommandUnit;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SshCredential {
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDelegateConfig {
    #[serde(default)]
    pub files: Vec<ConfigFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParameters {
    pub account_id: String,
    pub execution_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub execute_on_delegate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<SshCredential>,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_delegate_config: Option<FileDelegateConfig>,
    #[serde(default)]
    pub command_units: Vec<CommandUnit>,
}

/// Everything a command handler may read. Owned by exactly one pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub account_id: String,
    pub execution_id: String,
    pub command_unit_name: String,
    pub working_directory: String,
    pub host: String,
    pub execute_on_delegate: bool,
    pub credential: Option<SshCredential>,
    pub environment: BTreeMap<String, String>,
    pub artifact: Option<ArtifactConfig>,
    pub file_delegate_config: Option<FileDelegateConfig>,
    pub destination_path: Option<String>,
    pub staging_dir: String,
    pub artifact_metadata: ArtifactMetadata,
    pub resolved_environment: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn from_task(params: &TaskParameters, staging_dir_root: &str) -> Self {
        let staging_dir = format!(
            "{}/{}",
            staging_dir_root.trim_end_matches('/'),
            params.execution_id
        );
        Self {
            account_id: params.account_id.clone(),
            execution_id: params.execution_id.clone(),
            command_unit_name: String::new(),
            working_directory: params.working_directory.clone(),
            host: params.host.clone(),
            execute_on_delegate: params.execute_on_delegate,
            credential: params.credential.clone(),
            environment: params.environment.clone(),
            artifact: params.artifact.clone(),
            file_delegate_config: params.file_delegate_config.clone(),
            destination_path: None,
            staging_dir,
            artifact_metadata: ArtifactMetadata::new(),
            resolved_environment: HashMap::new(),
        }
    }

    /// Retarget the context at one command unit.
    pub fn for_unit(mut self, name: impl Into<String>, destination_path: Option<String>) -> Self {
        self.command_unit_name = name.into();
        self.destination_path = destination_path;
        self
    }

    pub fn with_resolved_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.resolved_environment = environment;
        self
    }

    /// Merge handler-reported metadata; later values replace earlier ones.
    pub fn with_artifact_metadata(mut self, metadata: ArtifactMetadata) -> Self {
        self.artifact_metadata.extend(metadata);
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.artifact_metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn declared_artifact_size(&self) -> Option<u64> {
        self.metadata(ARTIFACT_SIZE).and_then(|v| v.parse().ok())
    }

    /// Human-readable name of the target for logs and errors.
    pub fn target_label(&self) -> String {
        if self.execute_on_delegate {
            "local".to_string()
        } else {
            self.host.clone()
        }
    }
}
