use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use courier::artifact::{ArtifactRegistry, ReqwestRepositoryClient};
use courier::cache::ArtifactCache;
use courier::context::TaskParameters;
use courier::defaults::{self, Defaults};
use courier::secrets::EnvSecretDecryptor;

pub type CmdResult<T> = courier::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

// ============================================================================
// JSON Input Parsing (CLI layer)
// ============================================================================

/// Read JSON spec from string, file (@path), or stdin (-).
fn read_json_spec_to_string(spec: &str) -> courier::Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(courier::Error::validation_invalid_argument(
                "json",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        stdin.read_to_string(&mut buf).map_err(|e| {
            courier::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(courier::Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }
        return std::fs::read_to_string(Path::new(path)).map_err(|e| {
            courier::Error::internal_io(e.to_string(), Some(format!("read {}", path)))
        });
    }

    Ok(spec.to_string())
}

/// Parse a task spec into [`TaskParameters`].
pub(crate) fn parse_task_spec(spec: &str) -> courier::Result<TaskParameters> {
    let raw = read_json_spec_to_string(spec)?;
    serde_json::from_str(&raw).map_err(|e| {
        courier::Error::validation_invalid_json(
            e,
            Some("parse task spec".to_string()),
            Some(raw.chars().take(200).collect::<String>()),
        )
    })
}

/// Registry and cache wired from the resolved configuration.
pub(crate) struct Runtime {
    pub defaults: Defaults,
    pub registry: Arc<ArtifactRegistry>,
    pub cache: Arc<ArtifactCache>,
}

pub(crate) fn runtime() -> courier::Result<Runtime> {
    let defaults = defaults::resolve_defaults()?;
    let client = ReqwestRepositoryClient::new(defaults.execution.http_timeout_secs)?;
    let registry = Arc::new(ArtifactRegistry::with_http_handlers(
        Arc::new(client),
        Arc::new(EnvSecretDecryptor),
        defaults.execution.handler_max_artifact_size,
    ));
    let cache = Arc::new(ArtifactCache::new(&defaults.cache, Arc::clone(&registry))?);
    Ok(Runtime {
        defaults,
        registry,
        cache,
    })
}

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (courier::Result<serde_json::Value>, i32) {
    crate::tty::status("courier is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Artifact(args) => dispatch!(args, global, artifact),
        crate::Commands::Cache(args) => dispatch!(args, global, cache),
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Error(args) => dispatch!(args, global, error),
    }
}
