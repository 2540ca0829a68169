//! Backend conformance tests.
//!
//! Pins the classification priority of `Backend` and the invariants every
//! backend must agree on: exit code 0 means success, and a missing file is a
//! typed not-found failure, never empty content.

use std::sync::Arc;

use cellbox_sandbox::{
    Backend, BackendKind, CommandResult, FileEntry, MockSandbox, RemoteSandbox, Sandbox,
    VirtualSandbox,
};

#[test]
fn test_classification_priority() {
    // The remote signature is checked first: a backend that carries both a
    // machine identifier and a local shell must be constructed as Remote.
    let remote = Backend::from(RemoteSandbox::attach("cellbox-test").unwrap());
    assert_eq!(remote.kind(), BackendKind::Remote);

    let virt = Backend::from(VirtualSandbox::new().unwrap());
    assert_eq!(virt.kind(), BackendKind::Virtual);

    // Custom is the fallback and is never re-classified, even when it wraps
    // a native backend.
    let wrapped: Arc<dyn Sandbox> = Arc::new(VirtualSandbox::new().unwrap());
    let custom = Backend::from(wrapped);
    assert_eq!(custom.kind(), BackendKind::Custom);
}

#[test]
fn test_default_destinations() {
    let remote = Backend::from(RemoteSandbox::attach("cellbox-test").unwrap());
    assert_eq!(remote.default_destination(), "/workspace");

    let virt = VirtualSandbox::new().unwrap();
    let mount = virt.mount_point().to_string_lossy().into_owned();
    let backend = Backend::from(virt);
    // The virtual backend's default is its own mount point.
    assert_eq!(backend.default_destination(), mount);

    let custom: Arc<dyn Sandbox> = Arc::new(MockSandbox::default());
    assert_eq!(Backend::from(custom).default_destination(), "/workspace");
}

#[tokio::test]
async fn test_backend_delegates_to_custom_implementation() {
    let mock = Arc::new(MockSandbox::new(vec![CommandResult {
        stdout: "pong\n".into(),
        stderr: String::new(),
        exit_code: 0,
    }]));
    let backend = Backend::from(mock.clone() as Arc<dyn Sandbox>);

    let result = backend.execute_command("echo pong").await.unwrap();
    assert!(result.success());
    assert_eq!(result.stdout, "pong\n");
    assert_eq!(mock.commands().await, vec!["echo pong".to_string()]);

    backend
        .write_files(&[FileEntry::text("a.txt", "alpha")])
        .await
        .unwrap();
    assert_eq!(backend.read_file("a.txt").await.unwrap(), b"alpha");
}

#[tokio::test]
async fn test_exit_code_semantics_agree_across_backends() {
    let virt = VirtualSandbox::new().unwrap();
    assert_eq!(virt.execute_command("true").await.unwrap().exit_code, 0);
    assert_ne!(virt.execute_command("false").await.unwrap().exit_code, 0);

    let mock = MockSandbox::new(vec![CommandResult {
        stdout: String::new(),
        stderr: "bad".into(),
        exit_code: 1,
    }]);
    assert_eq!(mock.execute_command("false").await.unwrap().exit_code, 1);
}

#[tokio::test]
async fn test_missing_file_is_typed_not_found_everywhere() {
    let virt = VirtualSandbox::new().unwrap();
    assert!(virt.read_file("ghost.txt").await.unwrap_err().is_not_found());

    let mock = MockSandbox::default();
    assert!(mock.read_file("ghost.txt").await.unwrap_err().is_not_found());

    // An empty file is content, not a failure.
    mock.insert_file("empty.txt", Vec::new()).await;
    assert_eq!(mock.read_file("empty.txt").await.unwrap(), Vec::<u8>::new());
}
