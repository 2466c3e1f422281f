use super::pipeline::PipelineServices;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::log_sink::LogLevel;
use crate::utils::shell;

/// Remove the staging directory. Refuses to touch `/` or an empty path.
pub(crate) fn run(services: &PipelineServices, ctx: &ExecutionContext) -> Result<()> {
    let staging = ctx.staging_dir.trim();
    if staging.is_empty() || staging.trim_end_matches('/').is_empty() {
        return Err(Error::validation_invalid_argument(
            "stagingDir",
            "Refusing to remove an empty or root staging directory",
            Some(ctx.execution_id.clone()),
            None,
        ));
    }

    let executor = services.factory.get_executor(ctx)?;
    let output = executor.execute(&format!("rm -rf {}", shell::quote_path(staging)))?;
    if !output.success {
        return Err(Error::transport_failure(
            executor.target(),
            format!("rm -rf {}: {}", staging, output.stderr.trim()),
        ));
    }

    services.log.save_execution_log(
        &ctx.command_unit_name,
        &format!("Removed staging directory {}", staging),
        LogLevel::Info,
        None,
    );
    Ok(())
}
