//! Executors: where a command unit's commands and files actually go.
//!
//! A [`ShellTransport`] is the raw channel (SSH session or local `sh`). The
//! [`ExecutorFactory`] picks one per context; file-transfer units get a
//! [`FileBasedExecutor`] that is also wired to the artifact registry and cache.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::artifact::{ArtifactMetadata, ArtifactRegistry, ARTIFACT_NAME};
use crate::cache::ArtifactCache;
use crate::context::{ConfigFile, ExecutionContext};
use crate::defaults::ExecutionConfig;
use crate::error::{Error, Result};
use crate::ssh::{capture, pipe, shell_command, CommandOutput, SshClient};
use crate::utils::shell;

pub trait ShellTransport: Send + Sync {
    /// Label used in logs and errors.
    fn target(&self) -> String;

    fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Stream `input` to `remote_path`, replacing it atomically.
    fn write_file(&self, input: &mut dyn Read, remote_path: &str) -> Result<()>;
}

/// Shell snippet that writes stdin to `remote_path` via a sibling temp file.
pub fn atomic_write_command(remote_path: &str) -> Result<String> {
    let path = Path::new(remote_path);
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        Error::validation_invalid_argument(
            "destinationPath",
            "Destination must include a file name",
            Some(remote_path.to_string()),
            None,
        )
    })?;
    let dir = path
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .unwrap_or(".");

    let tmp_path = format!(
        "{}/.courier-upload-{}.tmp.{}",
        dir,
        file_name,
        uuid::Uuid::new_v4().simple()
    );
    let tmp = shell::quote_path(&tmp_path);

    Ok(format!(
        "mkdir -p {dir} && {{ cat > {tmp} && mv -f {tmp} {dest}; }} || {{ rm -f {tmp}; exit 1; }}",
        dir = shell::quote_path(dir),
        tmp = tmp,
        dest = shell::quote_path(remote_path),
    ))
}

fn write_failed(target: String, remote_path: &str, output: &CommandOutput) -> Error {
    let detail = if output.stderr.trim().is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        output.stderr.trim().to_string()
    };
    Error::transport_failure(target, format!("write {}: {}", remote_path, detail))
}

impl ShellTransport for SshClient {
    fn target(&self) -> String {
        SshClient::target(self)
    }

    fn execute(&self, command: &str) -> Result<CommandOutput> {
        SshClient::execute(self, command)
    }

    fn write_file(&self, input: &mut dyn Read, remote_path: &str) -> Result<()> {
        let command = atomic_write_command(remote_path)?;
        let output = self.execute_with_stdin(&command, input)?;
        if !output.success {
            return Err(write_failed(self.target(), remote_path, &output));
        }
        Ok(())
    }
}

/// Runs everything on this machine through `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct LocalShell;

impl ShellTransport for LocalShell {
    fn target(&self) -> String {
        "local".to_string()
    }

    fn execute(&self, command: &str) -> Result<CommandOutput> {
        capture(shell_command(command))
            .map_err(|e| Error::transport_failure(self.target(), format!("spawn: {}", e)))
    }

    fn write_file(&self, input: &mut dyn Read, remote_path: &str) -> Result<()> {
        let command = atomic_write_command(remote_path)?;
        let output = pipe(shell_command(&command), input)
            .map_err(|e| Error::transport_failure(self.target(), e.to_string()))?;
        if !output.success {
            return Err(write_failed(self.target(), remote_path, &output));
        }
        Ok(())
    }
}

/// Builds transports. Swapped out in tests.
pub trait TransportProvider: Send + Sync {
    fn remote(&self, ctx: &ExecutionContext) -> Result<Arc<dyn ShellTransport>>;

    fn local(&self, ctx: &ExecutionContext) -> Result<Arc<dyn ShellTransport>>;
}

/// `ssh` for remote targets, `sh` for local ones.
pub struct SystemTransports {
    execution: ExecutionConfig,
}

impl SystemTransports {
    pub fn new(execution: ExecutionConfig) -> Self {
        Self { execution }
    }
}

impl TransportProvider for SystemTransports {
    fn remote(&self, ctx: &ExecutionContext) -> Result<Arc<dyn ShellTransport>> {
        let credential = ctx.credential.as_ref().ok_or_else(|| {
            Error::validation_missing_argument(vec!["credential".to_string()])
        })?;
        Ok(Arc::new(SshClient::new(&ctx.host, credential, &self.execution)?))
    }

    fn local(&self, _ctx: &ExecutionContext) -> Result<Arc<dyn ShellTransport>> {
        Ok(Arc::new(LocalShell))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutorKind {
    RemoteShell,
    LocalProcess,
}

#[derive(Clone)]
pub struct CommandExecutor {
    kind: ExecutorKind,
    transport: Arc<dyn ShellTransport>,
}

impl CommandExecutor {
    pub fn new(kind: ExecutorKind, transport: Arc<dyn ShellTransport>) -> Self {
        Self { kind, transport }
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    pub fn target(&self) -> String {
        self.transport.target()
    }

    pub fn execute(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(target_host = %self.target(), "executing command");
        self.transport.execute(command)
    }

    pub fn write_file(&self, input: &mut dyn Read, remote_path: &str) -> Result<()> {
        self.transport.write_file(input, remote_path)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub destination: String,
    pub bytes: u64,
    pub cache_hit: bool,
}

/// Executor for Copy and Download units.
pub struct FileBasedExecutor {
    executor: CommandExecutor,
    registry: Arc<ArtifactRegistry>,
    cache: Arc<ArtifactCache>,
}

impl FileBasedExecutor {
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Resolve the context's artifact through the cache and stream it into
    /// `destination_dir`. Returns the transfer and the metadata learned on the way.
    pub fn copy_artifact(
        &self,
        ctx: &ExecutionContext,
        destination_dir: &str,
    ) -> Result<(TransferOutcome, ArtifactMetadata)> {
        self.cache.check_size(ctx)?;

        let mut learned = ArtifactMetadata::new();
        let resolved =
            ctx.metadata(ARTIFACT_NAME).is_some() && ctx.declared_artifact_size().is_some();

        let ctx = if resolved {
            ctx.clone()
        } else {
            let size = self.registry.size(ctx)?;
            learned.extend(size.metadata.clone());
            ctx.clone().with_artifact_metadata(size.metadata)
        };

        let mut cached = self.cache.obtain(&ctx)?;
        let destination = shell::join_remote_path(destination_dir, &cached.file_name);

        log_status!(
            "copy",
            "{} {} -> {}:{}",
            if cached.hit { "Cached" } else { "Downloaded" },
            cached.file_name,
            self.executor.target(),
            destination
        );
        self.executor.write_file(&mut cached.file, &destination)?;

        Ok((
            TransferOutcome {
                destination,
                bytes: cached.size,
                cache_hit: cached.hit,
            },
            learned,
        ))
    }

    /// Write each config file into `destination_dir`, stopping at the first failure.
    pub fn copy_config_files(
        &self,
        files: &[ConfigFile],
        destination_dir: &str,
    ) -> Result<Vec<TransferOutcome>> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let destination = shell::join_remote_path(destination_dir, &file.name);
            let mut content = file.content.as_bytes();
            self.executor.write_file(&mut content, &destination)?;
            outcomes.push(TransferOutcome {
                destination,
                bytes: file.content.len() as u64,
                cache_hit: false,
            });
        }
        Ok(outcomes)
    }
}

/// Chooses remote-shell or local-process execution from the context.
#[derive(Clone)]
pub struct ExecutorFactory {
    transports: Arc<dyn TransportProvider>,
    registry: Arc<ArtifactRegistry>,
    cache: Arc<ArtifactCache>,
}

impl ExecutorFactory {
    pub fn new(
        transports: Arc<dyn TransportProvider>,
        registry: Arc<ArtifactRegistry>,
        cache: Arc<ArtifactCache>,
    ) -> Self {
        Self {
            transports,
            registry,
            cache,
        }
    }

    pub fn get_executor(&self, ctx: &ExecutionContext) -> Result<CommandExecutor> {
        if ctx.execute_on_delegate {
            Ok(CommandExecutor::new(
                ExecutorKind::LocalProcess,
                self.transports.local(ctx)?,
            ))
        } else {
            Ok(CommandExecutor::new(
                ExecutorKind::RemoteShell,
                self.transports.remote(ctx)?,
            ))
        }
    }

    pub fn get_file_based_executor(&self, ctx: &ExecutionContext) -> Result<FileBasedExecutor> {
        Ok(FileBasedExecutor {
            executor: self.get_executor(ctx)?,
            registry: Arc::clone(&self.registry),
            cache: Arc::clone(&self.cache),
        })
    }
}
