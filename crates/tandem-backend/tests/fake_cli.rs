//! Backends driven end to end through real processes, using shell scripts
//! that stand in for the provider CLIs.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_backend::{
    Backend, BackendConfig, BackendError, BackendKind, BackendRegistry, CodexBackend,
    GeminiBackend, ProcessInvoker, ProgressEvent, ProgressSink,
};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const FAKE_GEMINI: &str = r#"
if [ "$1" = "--version" ]; then echo "0.9.0"; exit 0; fi
case "$*" in
  *gemini-2.5-flash*) echo "  answered by flash  " ;;
  *) echo "Quota exceeded for quota metric 'Gemini 2.5 Pro Requests'" >&2; exit 1 ;;
esac
"#;

const FAKE_CODEX: &str = r#"
if [ "$1" = "--version" ]; then echo "codex 0.40"; exit 0; fi
input=$(cat)
echo '{"type":"thread.started","thread_id":"thread-abc"}'
case "$input" in
  *INLINED_BODY*) echo '{"type":"item.agent_message","text":"saw the file"}' ;;
  *) echo '{"type":"item.agent_message","text":"no file"}' ;;
esac
echo '{"type":"turn.completed"}'
"#;

#[tokio::test]
async fn gemini_quota_falls_back_through_real_process() {
    let bin = tempfile::tempdir().unwrap();
    let script = write_script(bin.path(), "gemini", FAKE_GEMINI);

    let backend = GeminiBackend::new(Arc::new(ProcessInvoker::default()))
        .with_binary(script.to_string_lossy());
    let config = BackendConfig::new(BackendKind::Gemini, bin.path());
    let (sink, mut rx) = ProgressSink::channel();

    let result = backend.execute("hello", &config, Some(sink)).await.unwrap();
    assert_eq!(result.response, "answered by flash");
    assert_eq!(result.model, "gemini-2.5-flash");

    let mut saw_notice = false;
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::Notice(msg) = event {
            saw_notice |= msg.contains("gemini-2.5-flash");
        }
    }
    assert!(saw_notice);
}

#[tokio::test]
async fn codex_inlines_references_and_decodes_events() {
    let bin = tempfile::tempdir().unwrap();
    let script = write_script(bin.path(), "codex", FAKE_CODEX);

    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("notes.txt"), "INLINED_BODY").unwrap();

    let backend = CodexBackend::new(Arc::new(ProcessInvoker::default()))
        .with_binary(script.to_string_lossy());
    let config = BackendConfig::new(BackendKind::Codex, work.path());

    let result = backend
        .execute("read @notes.txt please", &config, None)
        .await
        .unwrap();
    assert_eq!(result.response, "saw the file");
    assert_eq!(result.thread_id.as_deref(), Some("thread-abc"));
}

#[tokio::test]
async fn registry_probes_installed_binaries() {
    let bin = tempfile::tempdir().unwrap();
    let script = write_script(bin.path(), "codex", FAKE_CODEX);
    let runner = Arc::new(ProcessInvoker::default());

    let mut registry = BackendRegistry::new(BackendKind::Codex);
    registry.register(Arc::new(
        CodexBackend::new(runner.clone()).with_binary(script.to_string_lossy()),
    ));
    registry.register(Arc::new(
        GeminiBackend::new(runner).with_binary(bin.path().join("missing").to_string_lossy()),
    ));

    let codex = registry.resolve(None).await.unwrap();
    assert_eq!(codex.kind(), BackendKind::Codex);

    let Err(err) = registry.resolve(Some("gemini")).await else {
        panic!("gemini binary is missing");
    };
    assert!(matches!(err, BackendError::NotAvailable(_)));
}
