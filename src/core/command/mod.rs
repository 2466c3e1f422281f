//! Command units and the pipeline that runs them.
//!
//! A task is `Init → {Script | Copy | DownloadArtifact}* → Cleanup`. Units run
//! strictly in order on one worker; Cleanup runs even after a failure.

mod cleanup;
mod copy;
mod download;
mod init;
mod pipeline;
mod script;

pub use init::parse_environment;
pub use pipeline::{AbortSignal, CommandPipeline, PipelineServices};
pub use script::{parse_outputs, ParsedOutputs, OUTPUT_MARKER, SECRET_OUTPUT_MARKER};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Hint};
use crate::executor::TransferOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopySourceType {
    Artifact,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailPattern {
    pub file_path: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommandUnit {
    Init {
        #[serde(default = "default_init_name")]
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Script {
        name: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
        #[serde(default)]
        tail_patterns: Vec<TailPattern>,
        #[serde(default)]
        output_variables: Vec<String>,
        #[serde(default)]
        secret_output_variables: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Copy {
        name: String,
        source_type: CopySourceType,
        #[serde(default)]
        destination_path: String,
    },
    #[serde(rename_all = "camelCase")]
    DownloadArtifact {
        name: String,
        #[serde(default)]
        destination_path: String,
    },
    Cleanup {
        #[serde(default = "default_cleanup_name")]
        name: String,
    },
}

fn default_init_name() -> String {
    "Initialize".to_string()
}

fn default_cleanup_name() -> String {
    "Cleanup".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    Init,
    Script,
    Copy,
    DownloadArtifact,
    Cleanup,
}

impl CommandUnit {
    pub fn name(&self) -> &str {
        match self {
            CommandUnit::Init { name }
            | CommandUnit::Script { name, .. }
            | CommandUnit::Copy { name, .. }
            | CommandUnit::DownloadArtifact { name, .. }
            | CommandUnit::Cleanup { name } => name,
        }
    }

    pub fn kind(&self) -> UnitKind {
        match self {
            CommandUnit::Init { .. } => UnitKind::Init,
            CommandUnit::Script { .. } => UnitKind::Script,
            CommandUnit::Copy { .. } => UnitKind::Copy,
            CommandUnit::DownloadArtifact { .. } => UnitKind::DownloadArtifact,
            CommandUnit::Cleanup { .. } => UnitKind::Cleanup,
        }
    }

    /// Destination for file-transfer units.
    pub fn destination_path(&self) -> Option<&str> {
        match self {
            CommandUnit::Copy {
                destination_path, ..
            }
            | CommandUnit::DownloadArtifact {
                destination_path, ..
            } => Some(destination_path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandExecutionStatus {
    Success,
    Failure,
    Aborted,
    Skipped,
}

impl CommandExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandExecutionStatus::Success => "SUCCESS",
            CommandExecutionStatus::Failure => "FAILURE",
            CommandExecutionStatus::Aborted => "ABORTED",
            CommandExecutionStatus::Skipped => "SKIPPED",
        }
    }
}

/// Serializable view of an [`Error`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitError {
    pub code: String,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
}

impl From<&Error> for UnitError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: err.hints.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub name: String,
    pub kind: UnitKind,
    pub status: CommandExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    /// Secret outputs are available to callers but never serialized.
    #[serde(skip)]
    pub secret_outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transfers: Vec<TransferOutcome>,
}

impl UnitResult {
    pub fn new(unit: &CommandUnit, status: CommandExecutionStatus) -> Self {
        Self {
            name: unit.name().to_string(),
            kind: unit.kind(),
            status,
            error: None,
            outputs: BTreeMap::new(),
            secret_outputs: BTreeMap::new(),
            transfers: Vec::new(),
        }
    }

    pub fn failed(unit: &CommandUnit, err: &Error) -> Self {
        let mut result = Self::new(unit, CommandExecutionStatus::Failure);
        result.error = Some(UnitError::from(err));
        result
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// One of SUCCESS, FAILURE, ABORTED.
    pub status: CommandExecutionStatus,
    pub units: Vec<UnitResult>,
    /// Script outputs from every unit, later units winning.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

impl PipelineResult {
    pub fn unit(&self, name: &str) -> Option<&UnitResult> {
        self.units.iter().find(|u| u.name == name)
    }
}
