use clap::{Args, Subcommand};
use serde::Serialize;

use courier::artifact::{ArtifactMetadata, ArtifactRepositoryType};
use courier::context::ExecutionContext;

use super::CmdResult;

#[derive(Args)]
pub struct ArtifactArgs {
    #[command(subcommand)]
    command: ArtifactCommand,
}

#[derive(Subcommand)]
enum ArtifactCommand {
    /// Query the size of a task's artifact without downloading it
    Size {
        /// Task spec JSON (inline, @file, or - for stdin)
        spec: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSizeOutput {
    command: String,
    identifier: String,
    repository_type: ArtifactRepositoryType,
    size: u64,
    limit: u64,
    within_limit: bool,
    metadata: ArtifactMetadata,
}

pub fn run(args: ArtifactArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ArtifactSizeOutput> {
    match args.command {
        ArtifactCommand::Size { spec } => size(&spec),
    }
}

fn size(spec: &str) -> CmdResult<ArtifactSizeOutput> {
    let params = super::parse_task_spec(spec)?;
    let config = params.artifact.clone().ok_or_else(|| {
        courier::Error::validation_missing_argument(vec!["artifact".to_string()])
    })?;
    let runtime = super::runtime()?;

    let ctx = ExecutionContext::from_task(&params, &runtime.defaults.execution.staging_dir_root)
        .for_unit("artifact.size", None);
    let outcome = runtime.registry.size(&ctx)?;
    let limit = runtime.defaults.cache.artifact_file_size_limit;

    Ok((
        ArtifactSizeOutput {
            command: "artifact.size".to_string(),
            identifier: config.identifier.clone(),
            repository_type: config.repository_type(),
            size: outcome.size,
            limit,
            within_limit: outcome.size <= limit,
            metadata: outcome.metadata,
        },
        0,
    ))
}
