use super::copy::{copy_artifact, require_destination, TransferResult};
use super::pipeline::PipelineServices;
use super::CommandUnit;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};

pub(crate) fn run(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    unit: &CommandUnit,
) -> Result<TransferResult> {
    if !matches!(unit, CommandUnit::DownloadArtifact { .. }) {
        return Err(Error::internal_unexpected(format!(
            "'{}' is not a download unit",
            unit.name()
        )));
    }
    let destination = require_destination(unit)?;
    copy_artifact(services, ctx, destination)
}
