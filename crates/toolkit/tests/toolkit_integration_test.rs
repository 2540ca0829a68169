//! Toolkit integration tests.
//!
//! Mock-backed tests pin the exact traffic the toolkit generates (batch
//! sizes, injected commands, fail-fast limits). Virtual-backend tests run
//! the real pipeline end to end through the host shell: filtering on the
//! backend, invocation log replay, and working-directory injection.

use std::collections::BTreeMap;
use std::sync::Arc;

use cellbox_core::Error;
use cellbox_sandbox::{
    Backend, CommandResult, MockSandbox, Sandbox, VirtualSandbox,
};
use cellbox_toolkit::{DirUpload, IngestSources, InvocationLog, Toolkit, ToolkitOptions};

fn inline_files(count: usize) -> BTreeMap<String, String> {
    (0..count)
        .map(|i| (format!("file-{i:03}.txt"), format!("content {i}")))
        .collect()
}

// =============================================================================
// Ingestion traffic (mock backend)
// =============================================================================

#[tokio::test]
async fn test_upload_goes_out_in_batches_of_twenty() {
    let mock = Arc::new(MockSandbox::default());
    let backend = Backend::from(mock.clone() as Arc<dyn Sandbox>);

    Toolkit::new(
        backend,
        ToolkitOptions {
            sources: IngestSources {
                files: inline_files(45),
                upload: None,
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // 45 files with a batch size of 20: exactly 20, 20, 5, in that order.
    assert_eq!(mock.write_batch_sizes().await, vec![20, 20, 5]);
    assert_eq!(
        mock.file("/workspace/file-000.txt").await.unwrap(),
        b"content 0"
    );
}

#[tokio::test]
async fn test_file_limit_fails_before_any_write() {
    let mock = Arc::new(MockSandbox::default());
    let backend = Backend::from(mock.clone() as Arc<dyn Sandbox>);

    let err = Toolkit::new(
        backend,
        ToolkitOptions {
            sources: IngestSources {
                files: inline_files(11),
                upload: None,
            },
            max_files: 10,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::TooManyFiles { count: 11, limit: 10 }));
    // Fail-fast: nothing was written.
    assert!(mock.write_batch_sizes().await.is_empty());
}

#[tokio::test]
async fn test_file_limit_zero_disables_the_check() {
    let mock = Arc::new(MockSandbox::default());
    let backend = Backend::from(mock.clone() as Arc<dyn Sandbox>);

    Toolkit::new(
        backend,
        ToolkitOptions {
            sources: IngestSources {
                files: inline_files(120),
                upload: None,
            },
            max_files: 0,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(mock.write_batch_sizes().await.iter().sum::<usize>(), 120);
}

#[tokio::test]
async fn test_inline_content_wins_over_directory_content() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "from disk").unwrap();
    std::fs::write(dir.path().join("extra.txt"), "disk only").unwrap();

    let mock = Arc::new(MockSandbox::default());
    let backend = Backend::from(mock.clone() as Arc<dyn Sandbox>);

    Toolkit::new(
        backend,
        ToolkitOptions {
            sources: IngestSources {
                files: BTreeMap::from([("config.toml".to_string(), "from inline".to_string())]),
                upload: Some(DirUpload {
                    source: dir.path().to_path_buf(),
                    include: None,
                }),
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(
        mock.file("/workspace/config.toml").await.unwrap(),
        b"from inline"
    );
    assert_eq!(
        mock.file("/workspace/extra.txt").await.unwrap(),
        b"disk only"
    );
}

#[tokio::test]
async fn test_destination_must_be_absolute() {
    let mock: Arc<dyn Sandbox> = Arc::new(MockSandbox::default());
    let err = Toolkit::new(
        Backend::from(mock),
        ToolkitOptions {
            destination: Some("relative/dir".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
}

// =============================================================================
// Pipeline end to end (virtual backend, real shell)
// =============================================================================

#[tokio::test]
async fn test_pwd_observes_the_destination() {
    let sandbox = VirtualSandbox::new().unwrap();
    let mount = sandbox.mount_point().to_string_lossy().into_owned();
    let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await.unwrap();

    // No explicit cd in the command text, yet the destination is the cwd.
    let response = toolkit.run_command("pwd", None).await.unwrap();
    assert_eq!(response.exit_code, 0);
    assert_eq!(response.stdout.trim_end(), mount);
}

#[tokio::test]
async fn test_nested_destination_is_injected() {
    let sandbox = VirtualSandbox::new().unwrap();
    let mount = sandbox.mount_point().to_string_lossy().into_owned();
    let project = format!("{mount}/project");

    let toolkit = Toolkit::new(
        sandbox,
        ToolkitOptions {
            destination: Some(project.clone()),
            sources: IngestSources {
                files: BTreeMap::from([("main.py".to_string(), "print('hi')\n".to_string())]),
                upload: None,
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = toolkit.run_command("pwd && ls", None).await.unwrap();
    assert_eq!(response.exit_code, 0);
    assert!(response.stdout.starts_with(&project));
    assert!(response.stdout.contains("main.py"));
}

#[tokio::test]
async fn test_filter_runs_on_the_backend_and_log_replays() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(
        sandbox,
        ToolkitOptions {
            log_invocations: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = toolkit
        .run_command("printf '1\\n2\\n3\\n4\\n5'", Some("tail -2"))
        .await
        .unwrap();

    assert_eq!(response.exit_code, 0);
    assert_eq!(response.stdout.trim_end(), "4\n5");

    // The full unfiltered record is recoverable from the invocation log...
    let log_path = response.invocation_log_path.unwrap();
    let full = toolkit.read_file(&log_path, None).await.unwrap();
    assert_eq!(full.trim_end(), "1\n2\n3\n4\n5");

    // ...and re-filterable with a different filter, without re-running.
    let refiltered = toolkit.read_file(&log_path, Some("grep 4")).await.unwrap();
    assert_eq!(refiltered.trim_end(), "4");
}

#[tokio::test]
async fn test_failing_filter_keeps_original_stderr() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await.unwrap();

    let response = toolkit
        .run_command("printf 'out\\n'; printf 'oops\\n' >&2", Some("grep nomatch"))
        .await
        .unwrap();

    // The filter's failure is a normal result, not an error, and the
    // original command's stderr is still surfaced.
    assert_ne!(response.exit_code, 0);
    assert!(response.stderr.contains("oops"));
}

#[tokio::test]
async fn test_command_failure_survives_a_passing_filter() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await.unwrap();

    let response = toolkit
        .run_command("printf 'partial\\n'; exit 7", Some("cat"))
        .await
        .unwrap();

    assert_eq!(response.exit_code, 7);
    assert_eq!(response.stdout.trim_end(), "partial");
}

#[tokio::test]
async fn test_direct_run_also_persists_a_log() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(
        sandbox,
        ToolkitOptions {
            log_invocations: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = toolkit.run_command("printf 'hello\\n'", None).await.unwrap();
    let log_path = response.invocation_log_path.unwrap();

    let raw = toolkit.sandbox().read_file(&log_path).await.unwrap();
    let log = InvocationLog::decode(&String::from_utf8(raw).unwrap()).unwrap();
    assert_eq!(log.command, "printf 'hello\\n'");
    assert_eq!(log.exit_code, 0);
    assert_eq!(log.stdout, "hello\n");
    assert_eq!(log.output_filter, None);
}

// =============================================================================
// Accessors
// =============================================================================

#[tokio::test]
async fn test_write_then_read_accessors() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await.unwrap();

    toolkit.write_file("sub/data.txt", "alpha\nbeta\n").await.unwrap();
    assert_eq!(
        toolkit.read_file("sub/data.txt", None).await.unwrap(),
        "alpha\nbeta\n"
    );

    // Filtered reads stream through the backend.
    let first = toolkit.read_file("sub/data.txt", Some("head -1")).await.unwrap();
    assert_eq!(first.trim_end(), "alpha");
}

#[tokio::test]
async fn test_reading_a_missing_file_is_not_found() {
    let sandbox = VirtualSandbox::new().unwrap();
    let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await.unwrap();

    let err = toolkit.read_file("ghost.txt", None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_invocation_extension_falls_back_to_codec_decode() {
    // Script the extraction command to fail so the accessor takes the
    // fetch-and-decode fallback.
    let mock = Arc::new(MockSandbox::new(vec![CommandResult {
        stdout: String::new(),
        stderr: "sed: not found".into(),
        exit_code: 127,
    }]));
    let log = InvocationLog {
        timestamp: "2026-08-07T10:00:00.000Z".into(),
        command: "ls".into(),
        exit_code: 0,
        stdout: "one\ntwo\n".into(),
        stderr: String::new(),
        output_filter: None,
    };
    mock.insert_file(
        "/workspace/.invocations/x.invocation",
        log.encode().into_bytes(),
    )
    .await;

    let toolkit = Toolkit::new(
        Backend::from(mock.clone() as Arc<dyn Sandbox>),
        ToolkitOptions::default(),
    )
    .await
    .unwrap();

    let content = toolkit
        .read_file(".invocations/x.invocation", None)
        .await
        .unwrap();
    assert_eq!(content, "one\ntwo\n");
}

#[tokio::test]
async fn test_malformed_invocation_log_degrades_to_raw_content() {
    let mock = Arc::new(MockSandbox::new(vec![CommandResult {
        stdout: String::new(),
        stderr: "sed: not found".into(),
        exit_code: 127,
    }]));
    mock.insert_file(
        "/workspace/.invocations/broken.invocation",
        b"not a log at all".to_vec(),
    )
    .await;

    let toolkit = Toolkit::new(
        Backend::from(mock.clone() as Arc<dyn Sandbox>),
        ToolkitOptions::default(),
    )
    .await
    .unwrap();

    let content = toolkit
        .read_file(".invocations/broken.invocation", None)
        .await
        .unwrap();
    assert_eq!(content, "not a log at all");
}
