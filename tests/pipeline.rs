mod common;

use common::*;
use courier::command::{CommandExecutionStatus, CommandPipeline, CommandUnit, CopySourceType};
use courier::context::{ConfigFile, ExecutionContext, FileDelegateConfig};
use courier::executor::ExecutorKind;
use tempfile::TempDir;

const LIMIT: u64 = 1024 * 1024;

fn build_zip() -> FakeSource {
    FakeSource::new("libs/build.zip", b"zip-bytes")
}

#[test]
fn full_task_runs_in_order_and_substitutes_paths() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let mut params = task(Some(artifact_config("build.zip")));
    params
        .environment
        .insert("BIN".to_string(), "$HOME/bin".to_string());

    let units = vec![
        init(),
        script("Build", "make build"),
        copy_artifact("Ship", "$HOME/bin"),
        cleanup(),
    ];
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, units)
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    assert!(result
        .units
        .iter()
        .all(|u| u.status == CommandExecutionStatus::Success));

    let commands = h.shell.commands();
    assert_eq!(commands[0], "mkdir -p '/tmp/courier/exec-1'");
    assert_eq!(commands[1], "printenv");
    assert_eq!(commands[2], "sh '/tmp/courier/exec-1/01-build.sh'");
    assert_eq!(commands.last().unwrap(), "rm -rf '/tmp/courier/exec-1'");

    let bootstrap = h.shell.written("/tmp/courier/exec-1/01-build.sh").unwrap();
    assert!(bootstrap.contains("export BIN='/opt/app/bin'"));
    assert!(bootstrap.contains("cd '/opt/app/work' || exit 1\nmake build\n"));

    assert_eq!(
        h.shell.written("/opt/app/bin/build.zip").as_deref(),
        Some("zip-bytes")
    );
    let ship = result.unit("Ship").unwrap();
    assert_eq!(ship.transfers[0].destination, "/opt/app/bin/build.zip");
    assert!(!ship.transfers[0].cache_hit);
}

#[test]
fn cleanup_runs_after_script_failure() {
    let dir = TempDir::new().unwrap();
    let shell = RecordingShell::new().respond("sh ", output("", "boom", 3));
    let h = harness(dir.path(), shell, build_zip(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));

    let units = vec![
        init(),
        script("Build", "make build"),
        copy_artifact("Ship", "/opt/app/bin"),
        cleanup(),
    ];
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, units)
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Failure);
    let build = result.unit("Build").unwrap();
    assert_eq!(build.status, CommandExecutionStatus::Failure);
    assert_eq!(
        build.error.as_ref().unwrap().code,
        "script.execution_failed"
    );
    assert_eq!(build.error.as_ref().unwrap().details["exitCode"], 3);
    assert_eq!(
        result.unit("Ship").unwrap().status,
        CommandExecutionStatus::Skipped
    );
    assert_eq!(
        result.unit("Cleanup").unwrap().status,
        CommandExecutionStatus::Success
    );
    assert_eq!(
        h.shell.commands().last().unwrap(),
        "rm -rf '/tmp/courier/exec-1'"
    );
    assert_eq!(h.source.fetch_count(), 0);
}

#[test]
fn invalid_order_fails_before_any_command() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(None);

    let err = CommandPipeline::new(h.services.clone())
        .run(&params, vec![script("Build", "make"), init(), cleanup()])
        .unwrap_err();

    assert_eq!(err.code, courier::ErrorCode::ValidationInvalidArgument);
    assert!(h.shell.commands().is_empty());
    assert_eq!(
        h.log.messages_for("Initialize"),
        vec!["Init must be the first command unit".to_string()]
    );
}

#[test]
fn abort_skips_remaining_units_but_still_cleans_up() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(None);

    let pipeline = CommandPipeline::new(h.services.clone());
    pipeline.abort_signal().raise();
    let result = pipeline
        .run(&params, vec![init(), script("Build", "make"), cleanup()])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Aborted);
    assert_eq!(result.units[0].status, CommandExecutionStatus::Skipped);
    assert_eq!(result.units[1].status, CommandExecutionStatus::Skipped);
    assert_eq!(result.units[2].status, CommandExecutionStatus::Success);
    assert_eq!(h.shell.commands(), vec!["rm -rf '/tmp/courier/exec-1'"]);
}

#[test]
fn oversized_artifact_fails_before_transfer() {
    let dir = TempDir::new().unwrap();
    let source = build_zip().declaring_size(100);
    let h = harness(dir.path(), RecordingShell::new(), source, 10);
    let params = task(Some(artifact_config("build.zip")));

    let result = CommandPipeline::new(h.services.clone())
        .run(
            &params,
            vec![init(), copy_artifact("Ship", "/opt/app/bin"), cleanup()],
        )
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Failure);
    let ship = result.unit("Ship").unwrap();
    assert_eq!(ship.error.as_ref().unwrap().code, "artifact.size_exceeded");
    assert_eq!(h.source.fetch_count(), 0);
    assert!(h.shell.written("/opt/app/bin/build.zip").is_none());
    assert_eq!(
        result.unit("Cleanup").unwrap().status,
        CommandExecutionStatus::Success
    );
}

#[test]
fn script_outputs_are_captured_and_secrets_masked() {
    let dir = TempDir::new().unwrap();
    let stdout = "hello s3cr3t\n__COURIER_OUTPUT__ VERSION=1.2\n__COURIER_SECRET_OUTPUT__ TOKEN=s3cr3t\n__COURIER_OUTPUT__ UNDECLARED=x\n";
    let shell = RecordingShell::new().respond("sh ", output(stdout, "", 0));
    let h = harness(dir.path(), shell, build_zip(), LIMIT);
    let params = task(None);

    let release = CommandUnit::Script {
        name: "Release".to_string(),
        command: "./release.sh".to_string(),
        working_directory: Some("$HOME/releases".to_string()),
        tail_patterns: Vec::new(),
        output_variables: vec!["VERSION".to_string()],
        secret_output_variables: vec!["TOKEN".to_string()],
    };
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), release, cleanup()])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    let unit = result.unit("Release").unwrap();
    assert_eq!(unit.outputs.get("VERSION").map(String::as_str), Some("1.2"));
    assert!(!unit.outputs.contains_key("UNDECLARED"));
    assert_eq!(
        unit.secret_outputs.get("TOKEN").map(String::as_str),
        Some("s3cr3t")
    );
    assert_eq!(result.outputs.len(), 1);

    let bootstrap = h
        .shell
        .written("/tmp/courier/exec-1/01-release.sh")
        .unwrap();
    assert!(bootstrap.contains("cd '/opt/app/releases' || exit 1"));

    let messages = h.log.messages_for("Release");
    let masked = format!("hello {}", courier::utils::redact::MASK);
    assert!(messages.iter().any(|m| *m == masked));
    assert!(messages.iter().all(|m| !m.contains("s3cr3t")));
    assert!(messages.iter().all(|m| !m.contains("__COURIER_")));
}

#[test]
fn script_without_init_runs_inline() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(None);

    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![script("Probe", "uname -a")])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    let commands = h.shell.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("sh -c '#!/bin/sh"));
    assert!(commands[0].contains("uname -a"));
}

#[test]
fn tail_patterns_get_a_wrapper_script() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(None);

    let start = CommandUnit::Script {
        name: "Start".to_string(),
        command: "./start.sh".to_string(),
        working_directory: None,
        tail_patterns: vec![courier::command::TailPattern {
            file_path: "/var/log/app.log".to_string(),
            pattern: "Started".to_string(),
        }],
        output_variables: Vec::new(),
        secret_output_variables: Vec::new(),
    };
    CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), start, cleanup()])
        .unwrap();

    let wrapper = h
        .shell
        .written("/tmp/courier/exec-1/01-start-tail.sh")
        .unwrap();
    assert!(wrapper.contains("sh '/tmp/courier/exec-1/01-start.sh'"));
    assert!(wrapper.contains("grep -q -e 'Started'"));
    assert!(h
        .shell
        .commands()
        .contains(&"sh '/tmp/courier/exec-1/01-start-tail.sh'".to_string()));
}

#[test]
fn config_copy_requires_files() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(None);

    let copy = CommandUnit::Copy {
        name: "Configs".to_string(),
        source_type: CopySourceType::Config,
        destination_path: "/etc/app".to_string(),
    };
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), copy, cleanup()])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Failure);
    assert_eq!(
        result.unit("Configs").unwrap().error.as_ref().unwrap().code,
        "copy.no_config_file"
    );
}

#[test]
fn config_files_are_written_to_destination() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let mut params = task(None);
    params.file_delegate_config = Some(FileDelegateConfig {
        files: vec![ConfigFile {
            name: "app.properties".to_string(),
            content: "port=8080\n".to_string(),
        }],
    });

    let copy = CommandUnit::Copy {
        name: "Configs".to_string(),
        source_type: CopySourceType::Config,
        destination_path: "$HOME/conf".to_string(),
    };
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), copy, cleanup()])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    assert_eq!(
        h.shell.written("/opt/app/conf/app.properties").as_deref(),
        Some("port=8080\n")
    );
}

#[test]
fn missing_destination_fails_the_unit() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));

    let download = CommandUnit::DownloadArtifact {
        name: "Fetch".to_string(),
        destination_path: String::new(),
    };
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), download, cleanup()])
        .unwrap();

    assert_eq!(
        result.unit("Fetch").unwrap().error.as_ref().unwrap().code,
        "copy.no_destination"
    );
    assert_eq!(h.source.fetch_count(), 0);
}

#[test]
fn second_download_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let params = task(Some(artifact_config("build.zip")));

    let units = vec![
        init(),
        CommandUnit::DownloadArtifact {
            name: "Fetch".to_string(),
            destination_path: "/opt/a".to_string(),
        },
        CommandUnit::DownloadArtifact {
            name: "Fetch again".to_string(),
            destination_path: "/opt/b".to_string(),
        },
        cleanup(),
    ];
    let result = CommandPipeline::new(h.services.clone())
        .run(&params, units)
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    assert_eq!(h.source.fetch_count(), 1);
    // Metadata learned by the first download saves the second a size query.
    assert_eq!(
        h.source
            .size_queries
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert!(result.unit("Fetch again").unwrap().transfers[0].cache_hit);
    assert_eq!(h.shell.written("/opt/b/build.zip").as_deref(), Some("zip-bytes"));
}

#[test]
fn cleanup_failure_does_not_change_pipeline_status() {
    let dir = TempDir::new().unwrap();
    let shell = RecordingShell::new().respond("rm -rf", output("", "busy", 1));
    let h = harness(dir.path(), shell, build_zip(), LIMIT);
    let params = task(None);

    let result = CommandPipeline::new(h.services.clone())
        .run(&params, vec![init(), script("Build", "make"), cleanup()])
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    let cleanup = result.unit("Cleanup").unwrap();
    assert_eq!(cleanup.status, CommandExecutionStatus::Failure);
    assert_eq!(cleanup.error.as_ref().unwrap().code, "transport.failure");
}

#[test]
fn factory_picks_local_process_for_delegate_tasks() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let mut params = task(None);
    params.execute_on_delegate = true;
    let ctx = ExecutionContext::from_task(&params, "/tmp/courier");

    let executor = h.services.factory.get_executor(&ctx).unwrap();

    assert_eq!(executor.kind(), ExecutorKind::LocalProcess);
    assert_eq!(h.transports.requested(), vec!["local"]);
}

#[test]
fn factory_picks_remote_shell_by_default() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let ctx = ExecutionContext::from_task(&task(None), "/tmp/courier");

    let executor = h.services.factory.get_file_based_executor(&ctx).unwrap();

    assert_eq!(executor.executor().kind(), ExecutorKind::RemoteShell);
    assert_eq!(h.transports.requested(), vec!["remote"]);
}

#[test]
fn delegate_task_never_opens_a_remote_transport() {
    let dir = TempDir::new().unwrap();
    let h = harness(dir.path(), RecordingShell::new(), build_zip(), LIMIT);
    let mut params = task(Some(artifact_config("build.zip")));
    params.execute_on_delegate = true;

    let result = CommandPipeline::new(h.services.clone())
        .run(
            &params,
            vec![
                init(),
                script("Build", "make"),
                copy_artifact("Ship", "/opt/app"),
                cleanup(),
            ],
        )
        .unwrap();

    assert_eq!(result.status, CommandExecutionStatus::Success);
    let requested = h.transports.requested();
    assert!(!requested.is_empty());
    assert!(requested.iter().all(|kind| *kind == "local"));
}
