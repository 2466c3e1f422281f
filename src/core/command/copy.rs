use super::pipeline::PipelineServices;
use super::{CommandUnit, CopySourceType};
use crate::artifact::ArtifactMetadata;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::executor::TransferOutcome;
use crate::log_sink::LogLevel;

pub(crate) struct TransferResult {
    pub transfers: Vec<TransferOutcome>,
    /// Artifact metadata learned from the size query, for later units.
    pub metadata: ArtifactMetadata,
}

pub(crate) fn require_destination(unit: &CommandUnit) -> Result<&str> {
    match unit.destination_path() {
        Some(dest) if !dest.trim().is_empty() => Ok(dest),
        _ => Err(Error::no_destination_path_specified(unit.name())),
    }
}

pub(crate) fn run(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    unit: &CommandUnit,
) -> Result<TransferResult> {
    let CommandUnit::Copy { source_type, .. } = unit else {
        return Err(Error::internal_unexpected(format!(
            "'{}' is not a copy unit",
            unit.name()
        )));
    };
    let destination = require_destination(unit)?;

    match source_type {
        CopySourceType::Artifact => copy_artifact(services, ctx, destination),
        CopySourceType::Config => {
            let files = ctx
                .file_delegate_config
                .as_ref()
                .map(|c| c.files.as_slice())
                .unwrap_or_default();
            if files.is_empty() {
                return Err(Error::no_config_file_provided(unit.name()));
            }

            let executor = services.factory.get_file_based_executor(ctx)?;
            let transfers = executor.copy_config_files(files, destination)?;
            services.log.save_execution_log(
                &ctx.command_unit_name,
                &format!(
                    "Copied {} config file(s) to {}:{}",
                    transfers.len(),
                    executor.executor().target(),
                    destination
                ),
                LogLevel::Info,
                None,
            );
            Ok(TransferResult {
                transfers,
                metadata: ArtifactMetadata::new(),
            })
        }
    }
}

/// Shared by Copy (artifact source) and DownloadArtifact.
pub(crate) fn copy_artifact(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    destination: &str,
) -> Result<TransferResult> {
    let executor = services.factory.get_file_based_executor(ctx)?;
    let (transfer, metadata) = executor.copy_artifact(ctx, destination)?;

    services.log.save_execution_log(
        &ctx.command_unit_name,
        &format!(
            "{} artifact to {}:{} ({} bytes)",
            if transfer.cache_hit { "Copied cached" } else { "Downloaded" },
            executor.executor().target(),
            transfer.destination,
            transfer.bytes
        ),
        LogLevel::Info,
        None,
    );
    Ok(TransferResult {
        transfers: vec![transfer],
        metadata,
    })
}
