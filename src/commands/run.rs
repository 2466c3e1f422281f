use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use courier::command::{
    CommandExecutionStatus, CommandPipeline, PipelineResult, PipelineServices,
};
use courier::error::codes;
use courier::executor::{ExecutorFactory, SystemTransports};
use courier::log_sink::{LogEntry, MemoryLogSink, TeeLogSink, TracingLogSink};
use courier::template::BuiltinTemplates;

use super::CmdResult;

#[derive(Args)]
pub struct RunArgs {
    /// Task spec JSON (inline, @file, or - for stdin)
    pub spec: String,

    /// Do not start the background cache eviction sweeper
    #[arg(long)]
    pub no_sweep: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    command: String,
    execution_id: String,
    result: PipelineResult,
    logs: Vec<LogEntry>,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let params = super::parse_task_spec(&args.spec)?;
    let runtime = super::runtime()?;
    if !args.no_sweep {
        runtime.cache.start()?;
    }

    let memory = Arc::new(MemoryLogSink::new());
    let execution = runtime.defaults.execution.clone();
    let services = PipelineServices {
        factory: ExecutorFactory::new(
            Arc::new(SystemTransports::new(execution.clone())),
            Arc::clone(&runtime.registry),
            Arc::clone(&runtime.cache),
        ),
        templates: Arc::new(BuiltinTemplates),
        log: Arc::new(TeeLogSink {
            first: TracingLogSink,
            second: Arc::clone(&memory),
        }),
        execution,
    };

    let pipeline = CommandPipeline::new(services);
    let result = pipeline.run(&params, params.command_units.clone());
    runtime.cache.stop();
    let result = result?;

    let exit_code = exit_code_for(&result);
    Ok((
        RunOutput {
            command: "run".to_string(),
            execution_id: params.execution_id,
            result,
            logs: memory.entries(),
        },
        exit_code,
    ))
}

/// Exit code of the first failed unit's error, or 1 for an abort.
fn exit_code_for(result: &PipelineResult) -> i32 {
    match result.status {
        CommandExecutionStatus::Success => 0,
        CommandExecutionStatus::Aborted => 1,
        _ => result
            .units
            .iter()
            .filter_map(|u| u.error.as_ref())
            .find_map(|e| codes::parse_code(&e.code))
            .map(crate::output::exit_code_for_error)
            .unwrap_or(1),
    }
}
