#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use courier::artifact::{
    resolved_metadata, ArtifactConfig, ArtifactRegistry, ArtifactRepositoryType, ArtifactSource,
    ArtifactSourceSpec, ConnectorAuth, ConnectorConfig, FetchOutcome, SizeOutcome,
};
use courier::cache::ArtifactCache;
use courier::command::{CommandUnit, PipelineServices};
use courier::context::{ExecutionContext, TaskParameters};
use courier::defaults::{CacheConfig, ExecutionConfig};
use courier::executor::{ExecutorFactory, ShellTransport, TransportProvider};
use courier::log_sink::MemoryLogSink;
use courier::ssh::CommandOutput;
use courier::template::BuiltinTemplates;

pub const REPO_URL: &str = "https://repo.example.com/artifactory";

pub fn artifact_config(path: &str) -> ArtifactConfig {
    ArtifactConfig {
        identifier: "_id123".to_string(),
        connector: ConnectorConfig {
            url: REPO_URL.to_string(),
            auth: ConnectorAuth::Anonymous,
        },
        source: ArtifactSourceSpec::Artifactory {
            repository_name: "libs".to_string(),
            artifact_path: path.to_string(),
        },
    }
}

pub fn task(artifact: Option<ArtifactConfig>) -> TaskParameters {
    TaskParameters {
        account_id: "acct".to_string(),
        execution_id: "exec-1".to_string(),
        host: "app01.internal".to_string(),
        execute_on_delegate: false,
        credential: None,
        working_directory: "$HOME/work".to_string(),
        environment: BTreeMap::new(),
        artifact,
        file_delegate_config: None,
        command_units: Vec::new(),
    }
}

/// Artifact source serving one in-memory body under `name`.
pub struct FakeSource {
    name: String,
    body: Vec<u8>,
    declared_size: Option<u64>,
    delay: Duration,
    pub fetches: AtomicUsize,
    pub size_queries: AtomicUsize,
}

impl FakeSource {
    pub fn new(name: &str, body: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            body: body.to_vec(),
            declared_size: None,
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            size_queries: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn declaring_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn size_value(&self) -> u64 {
        self.declared_size.unwrap_or(self.body.len() as u64)
    }
}

impl ArtifactSource for FakeSource {
    fn repository_type(&self) -> ArtifactRepositoryType {
        ArtifactRepositoryType::Artifactory
    }

    fn size(&self, _ctx: &ExecutionContext) -> courier::Result<SizeOutcome> {
        self.size_queries.fetch_add(1, Ordering::SeqCst);
        let size = self.size_value();
        Ok(SizeOutcome {
            size,
            metadata: resolved_metadata(&self.name, REPO_URL, Some(size)),
        })
    }

    fn fetch(&self, _ctx: &ExecutionContext) -> courier::Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let stream: Box<dyn Read + Send> = Box::new(Cursor::new(self.body.clone()));
        Ok(FetchOutcome {
            stream: Some(stream),
            metadata: resolved_metadata(&self.name, REPO_URL, Some(self.size_value())),
        })
    }
}

/// Context carrying the metadata a size query would have produced.
pub fn resolved_context(params: &TaskParameters, source: &FakeSource) -> ExecutionContext {
    let size = source.size_value();
    ExecutionContext::from_task(params, "/tmp/courier")
        .for_unit("download", None)
        .with_artifact_metadata(resolved_metadata(&source.name, REPO_URL, Some(size)))
}

pub fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        success: exit_code == 0,
        exit_code,
    }
}

/// Shell that records every command and upload. Commands starting with a
/// registered prefix get the canned output; `printenv` reports a fixed
/// environment; everything else succeeds silently.
#[derive(Default)]
pub struct RecordingShell {
    pub commands: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<(String, Vec<u8>)>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, prefix: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn written(&self, path: &str) -> Option<String> {
        self.writes()
            .into_iter()
            .find(|(p, _)| p == path)
            .map(|(_, body)| String::from_utf8_lossy(&body).to_string())
    }
}

impl ShellTransport for RecordingShell {
    fn target(&self) -> String {
        "fake@app01.internal".to_string()
    }

    fn execute(&self, command: &str) -> courier::Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        let canned = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone());
        if let Some(out) = canned {
            return Ok(out);
        }
        if command == "printenv" {
            return Ok(output("HOME=/opt/app\nPATH=/usr/bin:/bin\n", "", 0));
        }
        Ok(output("", "", 0))
    }

    fn write_file(&self, input: &mut dyn Read, remote_path: &str) -> courier::Result<()> {
        let mut body = Vec::new();
        input.read_to_end(&mut body)?;
        self.writes
            .lock()
            .unwrap()
            .push((remote_path.to_string(), body));
        Ok(())
    }
}

/// Hands out the recording shell and remembers which kind of transport was asked for.
pub struct FakeTransports {
    pub shell: Arc<RecordingShell>,
    requested: Mutex<Vec<&'static str>>,
}

impl FakeTransports {
    pub fn new(shell: Arc<RecordingShell>) -> Self {
        Self {
            shell,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<&'static str> {
        self.requested.lock().unwrap().clone()
    }

    fn hand_out(&self, kind: &'static str) -> Arc<dyn ShellTransport> {
        self.requested.lock().unwrap().push(kind);
        self.shell.clone()
    }
}

impl TransportProvider for FakeTransports {
    fn remote(&self, _ctx: &ExecutionContext) -> courier::Result<Arc<dyn ShellTransport>> {
        Ok(self.hand_out("remote"))
    }

    fn local(&self, _ctx: &ExecutionContext) -> courier::Result<Arc<dyn ShellTransport>> {
        Ok(self.hand_out("local"))
    }
}

pub fn cache_with(root: &std::path::Path, source: Arc<FakeSource>, limit: u64) -> Arc<ArtifactCache> {
    let registry = Arc::new(ArtifactRegistry::new().register(source));
    let mut config = CacheConfig::rooted_at(root);
    config.artifact_file_size_limit = limit;
    Arc::new(ArtifactCache::new(&config, registry).unwrap())
}

pub struct Harness {
    pub services: PipelineServices,
    pub shell: Arc<RecordingShell>,
    pub transports: Arc<FakeTransports>,
    pub source: Arc<FakeSource>,
    pub log: Arc<MemoryLogSink>,
}

pub fn harness(
    root: &std::path::Path,
    shell: RecordingShell,
    source: FakeSource,
    limit: u64,
) -> Harness {
    let shell = Arc::new(shell);
    let source = Arc::new(source);
    let cache = cache_with(root, source.clone(), limit);
    let log = Arc::new(MemoryLogSink::new());
    let execution: ExecutionConfig = serde_json::from_str("{}").unwrap();
    let transports = Arc::new(FakeTransports::new(shell.clone()));

    let services = PipelineServices {
        factory: ExecutorFactory::new(transports.clone(), cache.registry().clone(), cache),
        templates: Arc::new(BuiltinTemplates),
        log: log.clone(),
        execution,
    };

    Harness {
        services,
        shell,
        transports,
        source,
        log,
    }
}

pub fn init() -> CommandUnit {
    CommandUnit::Init {
        name: "Initialize".to_string(),
    }
}

pub fn cleanup() -> CommandUnit {
    CommandUnit::Cleanup {
        name: "Cleanup".to_string(),
    }
}

pub fn script(name: &str, command: &str) -> CommandUnit {
    CommandUnit::Script {
        name: name.to_string(),
        command: command.to_string(),
        working_directory: None,
        tail_patterns: Vec::new(),
        output_variables: Vec::new(),
        secret_output_variables: Vec::new(),
    }
}

pub fn copy_artifact(name: &str, destination: &str) -> CommandUnit {
    CommandUnit::Copy {
        name: name.to_string(),
        source_type: courier::command::CopySourceType::Artifact,
        destination_path: destination.to_string(),
    }
}
