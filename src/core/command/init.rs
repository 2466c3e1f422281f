use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::pipeline::PipelineServices;
use super::script::{OUTPUT_MARKER, SECRET_OUTPUT_MARKER};
use super::{CommandUnit, TailPattern};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::log_sink::LogLevel;
use crate::ssh::CommandOutput;
use crate::template::{BOOTSTRAP_TEMPLATE, TAIL_WRAPPER_TEMPLATE};
use crate::utils::shell;
use crate::utils::substitute::{substitute_in_place, substitute_vars};
use crate::utils::placeholder::TemplateVars;

static ENV_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").unwrap());
static VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Seconds a tail pattern may lag behind the end of its script.
const TAIL_GRACE_SECS: u32 = 30;

/// What Init learned and produced.
pub(crate) struct InitOutcome {
    pub environment: HashMap<String, String>,
    /// The units after Init, with paths substituted.
    pub units: Vec<CommandUnit>,
    /// Command that runs each staged Script unit, keyed by index into `units`.
    pub scripts: HashMap<usize, String>,
}

/// Parse `printenv` output. Lines that do not start a `NAME=` pair continue the
/// previous value.
pub fn parse_environment(output: &str) -> HashMap<String, String> {
    let mut environment = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if let Some(caps) = ENV_LINE.captures(line) {
            let name = caps[1].to_string();
            environment.insert(name.clone(), caps[2].to_string());
            current = Some(name);
        } else if let Some(name) = &current {
            if let Some(value) = environment.get_mut(name) {
                value.push('\n');
                value.push_str(line);
            }
        }
    }

    environment
}

fn require_success(
    executor: &CommandExecutor,
    action: &str,
    output: CommandOutput,
) -> Result<CommandOutput> {
    if output.success {
        return Ok(output);
    }
    Err(Error::transport_failure(
        executor.target(),
        format!("{} exited with {}: {}", action, output.exit_code, output.stderr.trim()),
    ))
}

pub(crate) fn run(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    remaining: &[CommandUnit],
) -> Result<InitOutcome> {
    let executor = services.factory.get_executor(ctx)?;
    let log = &services.log;

    let mkdir = format!("mkdir -p {}", shell::quote_path(&ctx.staging_dir));
    require_success(&executor, "mkdir", executor.execute(&mkdir)?)?;
    log.save_execution_log(
        &ctx.command_unit_name,
        &format!("Created staging directory {} on {}", ctx.staging_dir, executor.target()),
        LogLevel::Info,
        None,
    );

    let printenv = require_success(&executor, "printenv", executor.execute("printenv")?)?;
    let host_environment = parse_environment(&printenv.stdout);

    let mut environment = host_environment.clone();
    let mut task_environment = BTreeMap::new();
    for (name, value) in &ctx.environment {
        let value = substitute_vars(value, &host_environment);
        task_environment.insert(name.clone(), value.clone());
        environment.insert(name.clone(), value);
    }
    log.save_execution_log(
        &ctx.command_unit_name,
        &format!(
            "Resolved {} environment variables ({} from task)",
            environment.len(),
            task_environment.len()
        ),
        LogLevel::Info,
        None,
    );

    let default_working_dir = substitute_vars(&ctx.working_directory, &environment);
    let mut units = remaining.to_vec();
    for unit in &mut units {
        substitute_unit(unit, &environment);
    }

    let mut scripts = HashMap::new();
    for (index, unit) in units.iter().enumerate() {
        let Some((bootstrap, tail_patterns)) =
            render_unit_bootstrap(services, ctx, &task_environment, &default_working_dir, unit)?
        else {
            continue;
        };

        let stem = format!("{:02}-{}", index + 1, script_stem(unit.name()));
        let bootstrap_path = shell::join_remote_path(&ctx.staging_dir, &format!("{}.sh", stem));
        executor.write_file(&mut bootstrap.as_bytes(), &bootstrap_path)?;

        let entry = if tail_patterns.is_empty() {
            bootstrap_path
        } else {
            let wrapper = render_tail_wrapper(
                services,
                ctx,
                &shell::quote_path(&bootstrap_path),
                tail_patterns,
            )?;
            let wrapper_path =
                shell::join_remote_path(&ctx.staging_dir, &format!("{}-tail.sh", stem));
            executor.write_file(&mut wrapper.as_bytes(), &wrapper_path)?;
            wrapper_path
        };
        scripts.insert(index, format!("sh {}", shell::quote_path(&entry)));
    }

    tracing::debug!(execution = %ctx.execution_id, scripts = scripts.len(), "init rendered scripts");
    Ok(InitOutcome {
        environment,
        units,
        scripts,
    })
}

/// Command for a Script unit that Init did not stage. The bootstrap (and tail
/// wrapper, if any) is passed through `sh -c` instead of a file.
pub(crate) fn inline_command(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    unit: &CommandUnit,
) -> Result<Option<String>> {
    let default_working_dir = substitute_vars(&ctx.working_directory, &ctx.resolved_environment);
    let Some((bootstrap, tail_patterns)) =
        render_unit_bootstrap(services, ctx, &ctx.environment, &default_working_dir, unit)?
    else {
        return Ok(None);
    };

    let inline = format!("sh -c {}", shell::quote_path(&bootstrap));
    if tail_patterns.is_empty() {
        return Ok(Some(inline));
    }
    let script_ref = format!("-c {}", shell::quote_path(&bootstrap));
    let wrapper = render_tail_wrapper(services, ctx, &script_ref, tail_patterns)?;
    Ok(Some(format!("sh -c {}", shell::quote_path(&wrapper))))
}

/// Substitute `$VAR` in a unit's working directory or destination path.
pub(crate) fn substitute_unit(unit: &mut CommandUnit, environment: &HashMap<String, String>) {
    match unit {
        CommandUnit::Script {
            working_directory: Some(dir),
            ..
        } => {
            substitute_in_place(dir, environment);
        }
        CommandUnit::Copy {
            destination_path, ..
        }
        | CommandUnit::DownloadArtifact {
            destination_path, ..
        } => {
            substitute_in_place(destination_path, environment);
        }
        _ => {}
    }
}

fn script_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let stem = stem.trim_matches('-').to_string();
    if stem.is_empty() {
        "script".to_string()
    } else {
        stem
    }
}

fn capture_line(marker: &str, name: &str) -> String {
    format!(
        "printf '%s %s=%s\\n' '{}' '{}' \"${{{}-}}\"",
        marker, name, name
    )
}

pub(crate) fn output_capture(outputs: &[String], secret_outputs: &[String]) -> String {
    let lines: Vec<String> = outputs
        .iter()
        .map(|name| capture_line(OUTPUT_MARKER, name))
        .chain(
            secret_outputs
                .iter()
                .map(|name| capture_line(SECRET_OUTPUT_MARKER, name)),
        )
        .collect();
    if lines.is_empty() {
        ":".to_string()
    } else {
        lines.join("\n")
    }
}

fn validate_variable_names(unit: &str, names: &[String]) -> Result<()> {
    for name in names {
        if !VAR_NAME.is_match(name) {
            return Err(Error::validation_invalid_argument(
                "outputVariables",
                format!("'{}' is not a valid shell variable name", name),
                Some(unit.to_string()),
                None,
            ));
        }
    }
    Ok(())
}

fn render_unit_bootstrap<'u>(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    task_environment: &BTreeMap<String, String>,
    default_working_dir: &str,
    unit: &'u CommandUnit,
) -> Result<Option<(String, &'u [TailPattern])>> {
    let CommandUnit::Script {
        name,
        command,
        working_directory,
        tail_patterns,
        output_variables,
        secret_output_variables,
    } = unit
    else {
        return Ok(None);
    };

    validate_variable_names(name, output_variables)?;
    validate_variable_names(name, secret_output_variables)?;

    let working_dir = working_directory
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(default_working_dir);

    let exports = task_environment
        .iter()
        .filter(|(name, _)| VAR_NAME.is_match(name))
        .map(|(name, value)| shell::export_statement(name, value))
        .collect::<Vec<_>>()
        .join("\n");

    let mut params = HashMap::new();
    params.insert(TemplateVars::EXECUTION_ID.to_string(), ctx.execution_id.clone());
    params.insert(TemplateVars::ENV_EXPORTS.to_string(), exports);
    params.insert(
        TemplateVars::OUTPUT_CAPTURE.to_string(),
        output_capture(output_variables, secret_output_variables),
    );
    params.insert(TemplateVars::WORKING_DIR.to_string(), shell::quote_path(working_dir));
    params.insert(TemplateVars::SCRIPT.to_string(), command.clone());

    let bootstrap = services.templates.render(BOOTSTRAP_TEMPLATE, &params)?;
    Ok(Some((bootstrap, tail_patterns.as_slice())))
}

fn render_tail_wrapper(
    services: &PipelineServices,
    ctx: &ExecutionContext,
    script_ref: &str,
    patterns: &[TailPattern],
) -> Result<String> {
    let mut starts = Vec::new();
    let mut waits = Vec::new();

    for (i, tail) in patterns.iter().enumerate() {
        let file = shell::quote_path(&tail.file_path);
        let pattern = shell::quote_path(&tail.pattern);
        starts.push(format!(
            "__courier_off_{i}=$(wc -c < {file} 2>/dev/null || echo 0)",
            i = i,
            file = file
        ));
        waits.push(format!(
            concat!(
                "__courier_waited=0\n",
                "until tail -c +$((__courier_off_{i} + 1)) {file} 2>/dev/null | grep -q -e {pattern}; do\n",
                "  if [ $__courier_waited -ge {grace} ]; then\n",
                "    echo \"courier: pattern \"{pattern}\" not found in \"{file} >&2\n",
                "    [ $__courier_rc -eq 0 ] && __courier_rc=1\n",
                "    break\n",
                "  fi\n",
                "  sleep 1\n",
                "  __courier_waited=$((__courier_waited + 1))\n",
                "done"
            ),
            i = i,
            file = file,
            pattern = pattern,
            grace = TAIL_GRACE_SECS,
        ));
    }

    let mut params = HashMap::new();
    params.insert(TemplateVars::EXECUTION_ID.to_string(), ctx.execution_id.clone());
    params.insert(TemplateVars::TAIL_COMMANDS.to_string(), starts.join("\n"));
    params.insert(TemplateVars::TAIL_WAITS.to_string(), waits.join("\n"));
    params.insert(TemplateVars::SCRIPT.to_string(), script_ref.to_string());

    services.templates.render(TAIL_WRAPPER_TEMPLATE, &params)
}
