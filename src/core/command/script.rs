use std::collections::BTreeMap;

use super::pipeline::PipelineServices;
use super::{init, CommandUnit};
use crate::context::ExecutionContext;
use crate::error::{Error, Result, ScriptExecutionFailedDetails};
use crate::log_sink::LogLevel;
use crate::utils::redact;

/// Prefix of a line the bootstrap prints for each output variable.
pub const OUTPUT_MARKER: &str = "__COURIER_OUTPUT__";
/// Same, for secret output variables.
pub const SECRET_OUTPUT_MARKER: &str = "__COURIER_SECRET_OUTPUT__";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutputs {
    pub outputs: BTreeMap<String, String>,
    pub secret_outputs: BTreeMap<String, String>,
    /// Stdout with marker lines removed.
    pub log_lines: Vec<String>,
}

fn parse_marker<'a>(line: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let rest = line.strip_prefix(marker)?.strip_prefix(' ')?;
    let (name, value) = rest.split_once('=')?;
    if name.is_empty() {
        return None;
    }
    Some((name, value))
}

/// Split script stdout into output variables and ordinary log lines.
pub fn parse_outputs(stdout: &str) -> ParsedOutputs {
    let mut parsed = ParsedOutputs::default();
    for line in stdout.lines() {
        if let Some((name, value)) = parse_marker(line, SECRET_OUTPUT_MARKER) {
            parsed
                .secret_outputs
                .insert(name.to_string(), value.to_string());
        } else if let Some((name, value)) = parse_marker(line, OUTPUT_MARKER) {
            parsed.outputs.insert(name.to_string(), value.to_string());
        } else {
            parsed.log_lines.push(line.to_string());
        }
    }
    parsed
}

pub(crate) struct ScriptOutcome {
    pub outputs: BTreeMap<String, String>,
    pub secret_outputs: BTreeMap<String, String>,
}

pub(crate) fn run(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    unit: &CommandUnit,
    staged: Option<&str>,
) -> Result<ScriptOutcome> {
    let CommandUnit::Script {
        output_variables,
        secret_output_variables,
        ..
    } = unit
    else {
        return Err(Error::internal_unexpected(format!(
            "'{}' is not a script unit",
            unit.name()
        )));
    };

    let command = match staged {
        Some(command) => command.to_string(),
        None => init::inline_command(services, ctx, unit)?.ok_or_else(|| {
            Error::internal_unexpected(format!("no command rendered for '{}'", unit.name()))
        })?,
    };

    let executor = services.factory.get_executor(ctx)?;
    let output = executor.execute(&command)?;
    let mut parsed = parse_outputs(&output.stdout);

    // Only declared names count; anything else is script noise.
    parsed.outputs.retain(|name, _| output_variables.contains(name));
    parsed
        .secret_outputs
        .retain(|name, _| secret_output_variables.contains(name));

    let secrets: Vec<&str> = parsed.secret_outputs.values().map(String::as_str).collect();
    let stdout = redact::mask(&parsed.log_lines.join("\n"), &secrets);
    let stderr = redact::mask(&output.stderr, &secrets);

    let log = &services.log;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        log.save_execution_log(&ctx.command_unit_name, line, LogLevel::Info, None);
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        log.save_execution_log(&ctx.command_unit_name, line, LogLevel::Warn, None);
    }

    if !output.success {
        return Err(Error::script_execution_failed(
            ScriptExecutionFailedDetails {
                unit: ctx.command_unit_name.clone(),
                exit_code: output.exit_code,
                stdout,
                stderr,
                target: executor.target(),
            },
        ));
    }

    tracing::debug!(
        unit = %ctx.command_unit_name,
        outputs = parsed.outputs.len(),
        secret_outputs = parsed.secret_outputs.len(),
        "script finished"
    );
    Ok(ScriptOutcome {
        outputs: parsed.outputs,
        secret_outputs: parsed.secret_outputs,
    })
}
