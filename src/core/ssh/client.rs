use crate::context::SshCredential;
use crate::defaults::ExecutionConfig;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    pub connect_timeout_secs: u64,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl SshClient {
    pub fn new(host: &str, credential: &SshCredential, execution: &ExecutionConfig) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "host",
                "A remote target needs a host",
                None,
                None,
            ));
        }

        let identity_file = match &credential.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::validation_invalid_argument(
                        "credential.identityFile",
                        "Identity file not found",
                        Some(expanded),
                        None,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host);
        }

        Ok(Self {
            host: host.to_string(),
            user: credential.user.clone(),
            port: credential.port,
            identity_file,
            is_local,
            connect_timeout_secs: execution.ssh_connect_timeout_secs,
            retry_attempts: execution.ssh_retry_attempts.max(1),
        })
    }

    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Non-interactive: fail instead of prompting, and give up on stalled connections.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.target());
        args.push(command.to_string());

        args
    }

    fn command(&self, command: &str) -> Command {
        if self.is_local {
            return shell_command(command);
        }
        let mut cmd = Command::new("ssh");
        cmd.args(self.build_ssh_args(command));
        cmd
    }

    /// Run `command`, retrying transient connection errors. A command that ran and
    /// failed is `Ok` with `success == false`; only an unreachable target is `Err`.
    pub fn execute(&self, command: &str) -> Result<CommandOutput> {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        let mut attempt = 0;
        loop {
            let output = capture(self.command(command))
                .map_err(|e| Error::transport_failure(self.target(), format!("spawn: {}", e)))?;

            if output.success || self.is_local || !is_transient_ssh_error(&output) {
                return Ok(output);
            }

            attempt += 1;
            if attempt >= self.retry_attempts {
                return Err(Error::transport_failure(
                    self.target(),
                    output.stderr.trim().to_string(),
                ));
            }

            let delay = backoff_secs.get(attempt as usize).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection failed (attempt {}/{}), retrying in {}s...",
                attempt,
                self.retry_attempts,
                delay
            );
            tracing::warn!(target_host = %self.host, attempt, delay, "transient ssh failure, retrying");
            std::thread::sleep(std::time::Duration::from_secs(delay));
        }
    }

    /// Run `command` with `input` piped to its stdin. Not retried: the input is consumed.
    pub fn execute_with_stdin(&self, command: &str, input: &mut dyn Read) -> Result<CommandOutput> {
        let output = pipe(self.command(command), input)
            .map_err(|e| Error::transport_failure(self.target(), e.to_string()))?;
        if !output.success && !self.is_local && output.exit_code == 255 {
            return Err(Error::transport_failure(
                self.target(),
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output)
    }
}

pub(crate) fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    let cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd
}

fn to_output(out: std::process::Output) -> CommandOutput {
    CommandOutput {
        stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        success: out.status.success(),
        exit_code: out.status.code().unwrap_or(-1),
    }
}

pub(crate) fn capture(mut cmd: Command) -> io::Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.output().map(to_output)
}

pub(crate) fn pipe(mut cmd: Command, input: &mut dyn Read) -> io::Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let copied = io::copy(input, &mut stdin).and_then(|_| stdin.flush());
        drop(stdin);
        if let Err(e) = copied {
            // A command that exits early closes its stdin; report its own output instead.
            if e.kind() != io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    }

    child.wait_with_output().map(to_output)
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}
