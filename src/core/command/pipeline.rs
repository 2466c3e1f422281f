use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{cleanup, copy, download, init, script};
use super::{CommandExecutionStatus, CommandUnit, PipelineResult, UnitResult};
use crate::context::{ExecutionContext, TaskParameters};
use crate::defaults::ExecutionConfig;
use crate::error::{Error, Result};
use crate::executor::ExecutorFactory;
use crate::log_sink::{LogLevel, LogSink};
use crate::template::TemplateRenderer;

/// Shared flag a caller raises to stop a running pipeline between units.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collaborators every handler needs.
#[derive(Clone)]
pub struct PipelineServices {
    pub factory: ExecutorFactory,
    pub templates: Arc<dyn TemplateRenderer>,
    pub log: Arc<dyn LogSink>,
    pub execution: ExecutionConfig,
}

struct RunState {
    base: ExecutionContext,
    units: Vec<CommandUnit>,
    /// Commands staged by Init, keyed by unit index.
    scripts: HashMap<usize, String>,
}

pub struct CommandPipeline {
    services: PipelineServices,
    abort: AbortSignal,
}

impl CommandPipeline {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            services,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// Init may only come first and Cleanup only last.
    pub fn validate_order(units: &[CommandUnit]) -> Result<()> {
        match order_problem(units) {
            Some((unit, problem)) => Err(order_error(unit, problem)),
            None => Ok(()),
        }
    }

    /// Run `units` in order. Only an invalid unit order is returned as `Err`;
    /// unit failures are recorded in the result.
    pub fn run(&self, params: &TaskParameters, units: Vec<CommandUnit>) -> Result<PipelineResult> {
        if let Some((unit, problem)) = order_problem(&units) {
            self.services.log.save_execution_log(
                unit.name(),
                problem,
                LogLevel::Error,
                Some(CommandExecutionStatus::Failure),
            );
            return Err(order_error(unit, problem));
        }

        let mut state = RunState {
            base: ExecutionContext::from_task(params, &self.services.execution.staging_dir_root),
            units,
            scripts: HashMap::new(),
        };
        let log = &self.services.log;
        let mut status = CommandExecutionStatus::Success;
        let mut results = Vec::with_capacity(state.units.len());
        let mut outputs = BTreeMap::new();

        tracing::info!(
            execution = %params.execution_id,
            units = state.units.len(),
            target = %state.base.target_label(),
            "pipeline started"
        );

        for index in 0..state.units.len() {
            let unit = state.units[index].clone();
            let is_cleanup = matches!(unit, CommandUnit::Cleanup { .. });

            if !is_cleanup {
                if status == CommandExecutionStatus::Success && self.abort.is_raised() {
                    status = CommandExecutionStatus::Aborted;
                    log.save_execution_log(
                        unit.name(),
                        "Abort requested; skipping remaining units",
                        LogLevel::Warn,
                        Some(CommandExecutionStatus::Aborted),
                    );
                }
                if status != CommandExecutionStatus::Success {
                    results.push(UnitResult::new(&unit, CommandExecutionStatus::Skipped));
                    continue;
                }
            }

            let ctx = state
                .base
                .clone()
                .for_unit(unit.name(), unit.destination_path().map(str::to_string));
            tracing::info!(execution = %params.execution_id, unit = unit.name(), kind = ?unit.kind(), "unit started");

            match self.run_unit(index, &unit, &ctx, &mut state) {
                Ok(result) => {
                    log.save_execution_log(
                        unit.name(),
                        "Completed",
                        LogLevel::Info,
                        Some(CommandExecutionStatus::Success),
                    );
                    outputs.extend(result.outputs.clone());
                    results.push(result);
                }
                Err(err) => {
                    let level = if is_cleanup { LogLevel::Warn } else { LogLevel::Error };
                    log.save_execution_log(
                        unit.name(),
                        &format!("{} ({})", err.message, err.code.as_str()),
                        level,
                        Some(CommandExecutionStatus::Failure),
                    );
                    if !is_cleanup {
                        status = CommandExecutionStatus::Failure;
                    }
                    results.push(UnitResult::failed(&unit, &err));
                }
            }
        }

        tracing::info!(execution = %params.execution_id, status = status.as_str(), "pipeline finished");
        Ok(PipelineResult {
            status,
            units: results,
            outputs,
        })
    }

    fn run_unit(
        &self,
        index: usize,
        unit: &CommandUnit,
        ctx: &ExecutionContext,
        state: &mut RunState,
    ) -> Result<UnitResult> {
        let services = &self.services;
        let mut result = UnitResult::new(unit, CommandExecutionStatus::Success);

        match unit {
            CommandUnit::Init { .. } => {
                let outcome = init::run(services, ctx, &state.units[index + 1..])?;
                state.base = state
                    .base
                    .clone()
                    .with_resolved_environment(outcome.environment);
                state.units.truncate(index + 1);
                state.units.extend(outcome.units);
                state.scripts = outcome
                    .scripts
                    .into_iter()
                    .map(|(offset, command)| (index + 1 + offset, command))
                    .collect();
            }
            CommandUnit::Script { .. } => {
                let staged = state.scripts.get(&index).map(String::as_str);
                let outcome = script::run(services, ctx, unit, staged)?;
                result.outputs = outcome.outputs;
                result.secret_outputs = outcome.secret_outputs;
            }
            CommandUnit::Copy { .. } => {
                let outcome = copy::run(services, ctx, unit)?;
                state.base = state.base.clone().with_artifact_metadata(outcome.metadata);
                result.transfers = outcome.transfers;
            }
            CommandUnit::DownloadArtifact { .. } => {
                let outcome = download::run(services, ctx, unit)?;
                state.base = state.base.clone().with_artifact_metadata(outcome.metadata);
                result.transfers = outcome.transfers;
            }
            CommandUnit::Cleanup { .. } => cleanup::run(services, ctx)?,
        }

        Ok(result)
    }
}

fn order_problem(units: &[CommandUnit]) -> Option<(&CommandUnit, &'static str)> {
    let last = units.len().saturating_sub(1);
    units.iter().enumerate().find_map(|(index, unit)| match unit {
        CommandUnit::Init { .. } if index != 0 => Some((unit, "Init must be the first command unit")),
        CommandUnit::Cleanup { .. } if index != last => {
            Some((unit, "Cleanup must be the last command unit"))
        }
        _ => None,
    })
}

fn order_error(unit: &CommandUnit, problem: &str) -> Error {
    Error::validation_invalid_argument(
        "commandUnits",
        problem,
        Some(unit.name().to_string()),
        None,
    )
}
