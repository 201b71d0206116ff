//! Subprocess execution for backend CLIs.
//!
//! One OS process per call. Stdout is streamed into an optional
//! [`ProgressSink`] as it arrives and accumulated up to a hard ceiling;
//! stderr is drained concurrently and only its tail is kept for error
//! reporting. Children are spawned with `kill_on_drop` so a dropped future
//! never leaves an orphan behind.

use crate::env::child_env;
use crate::progress::ProgressSink;
use crate::{BackendError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default stdout ceiling (10 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How much trailing stderr is kept for error messages.
pub const STDERR_TAIL_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Everything needed to run one backend command.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub binary: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
    pub progress: Option<ProgressSink>,
    pub cancel: Option<CancellationToken>,
}

impl Invocation {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn cancel(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }
}

/// Runs an [`Invocation`] and returns its captured stdout.
///
/// This is the seam adapters are tested through.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<String>;
}

/// The real runner: spawns the binary with a filtered environment.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    max_output_bytes: usize,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl ProcessInvoker {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }
}

#[async_trait]
impl CommandRunner for ProcessInvoker {
    async fn run(&self, invocation: Invocation) -> Result<String> {
        let Invocation {
            binary,
            args,
            stdin,
            cwd,
            progress,
            cancel,
        } = invocation;

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .env_clear()
            .envs(child_env())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = cwd {
            cmd.current_dir(dir);
        }

        info!(
            binary = %binary,
            arg_count = args.len(),
            stdin_len = stdin.as_ref().map_or(0, |s| s.len()),
            cwd = ?cwd,
            "Spawning backend process"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::spawn(binary.clone(), e))?;

        // Feed stdin from its own task so a large prompt cannot deadlock
        // against a child that is already filling its stdout pipe.
        if let (Some(payload), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(payload.as_bytes()).await {
                    debug!(error = %e, "Failed to write backend stdin");
                }
                let _ = pipe.shutdown().await;
            });
        }

        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_tail(pipe, STDERR_TAIL_BYTES)));

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Io(std::io::Error::other("stdout not captured")))?;

        let mut captured: Vec<u8> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = tokio::select! {
                _ = cancelled(cancel.as_ref()) => {
                    warn!(binary = %binary, "Backend call cancelled, killing process");
                    let _ = child.kill().await;
                    return Err(BackendError::Cancelled);
                }
                read = stdout.read(&mut buf) => read?,
            };
            if n == 0 {
                break;
            }

            if captured.len() + n > self.max_output_bytes {
                warn!(
                    binary = %binary,
                    limit = self.max_output_bytes,
                    "Backend output exceeded limit, killing process"
                );
                let _ = child.kill().await;
                return Err(BackendError::OutputTooLarge {
                    limit: self.max_output_bytes,
                });
            }

            captured.extend_from_slice(&buf[..n]);
            if let Some(ref sink) = progress {
                pending.extend_from_slice(&buf[..n]);
                let text = drain_utf8(&mut pending, false);
                if !text.is_empty() {
                    sink.output(text);
                }
            }
        }

        if let Some(ref sink) = progress {
            let text = drain_utf8(&mut pending, true);
            if !text.is_empty() {
                sink.output(text);
            }
        }

        let status = tokio::select! {
            _ = cancelled(cancel.as_ref()) => {
                let _ = child.kill().await;
                return Err(BackendError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            warn!(binary = %binary, code = ?status.code(), "Backend process failed");
            return Err(BackendError::exit(binary, status.code(), stderr_tail.trim()));
        }

        debug!(
            binary = %binary,
            stdout_len = captured.len(),
            stderr_len = stderr_tail.len(),
            "Backend process completed"
        );
        Ok(String::from_utf8_lossy(&captured).into_owned())
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Read a stream to the end, keeping only the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Take the decodable prefix of `pending`, leaving an incomplete trailing
/// UTF-8 sequence for the next chunk. With `flush`, everything is decoded.
fn drain_utf8(pending: &mut Vec<u8>, flush: bool) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() && !flush => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_utf8_holds_back_partial_sequence() {
        // "é" is 0xC3 0xA9.
        let mut pending = vec![b'a', 0xC3];
        assert_eq!(drain_utf8(&mut pending, false), "a");
        assert_eq!(pending, vec![0xC3]);

        pending.push(0xA9);
        assert_eq!(drain_utf8(&mut pending, false), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn drain_utf8_flush_is_lossy() {
        let mut pending = vec![b'x', 0xC3];
        let text = drain_utf8(&mut pending, true);
        assert!(text.starts_with('x'));
        assert!(pending.is_empty());
    }

    #[test]
    fn invocation_builder() {
        let inv = Invocation::new("codex")
            .args(["exec", "--json"])
            .stdin("hello")
            .cwd("/tmp");
        assert_eq!(inv.binary, "codex");
        assert_eq!(inv.args, vec!["exec", "--json"]);
        assert_eq!(inv.stdin.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let invoker = ProcessInvoker::default();
        let err = invoker
            .run(Invocation::new("tandem-definitely-not-installed-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::progress::ProgressEvent;

        fn sh(script: &str) -> Invocation {
            Invocation::new("/bin/sh").args(["-c", script])
        }

        #[tokio::test]
        async fn captures_stdout() {
            let out = ProcessInvoker::default()
                .run(sh("printf 'hello\\nworld\\n'"))
                .await
                .unwrap();
            assert_eq!(out, "hello\nworld\n");
        }

        #[tokio::test]
        async fn passes_stdin_payload() {
            let out = ProcessInvoker::default()
                .run(sh("cat").stdin("from stdin"))
                .await
                .unwrap();
            assert_eq!(out, "from stdin");
        }

        #[tokio::test]
        async fn nonzero_exit_reports_stderr_tail() {
            let err = ProcessInvoker::default()
                .run(sh("echo nope >&2; exit 3"))
                .await
                .unwrap_err();
            match err {
                BackendError::Exit {
                    code, stderr_tail, ..
                } => {
                    assert_eq!(code, Some(3));
                    assert_eq!(stderr_tail, "nope");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn output_ceiling_kills_process() {
            let err = ProcessInvoker::new(1024)
                .run(sh("yes tandem"))
                .await
                .unwrap_err();
            assert!(matches!(err, BackendError::OutputTooLarge { limit: 1024 }));
        }

        #[tokio::test]
        async fn progress_receives_each_byte_once() {
            let (sink, mut rx) = ProgressSink::channel();
            let out = ProcessInvoker::default()
                .run(sh("printf one; sleep 0.05; printf two").progress(Some(sink)))
                .await
                .unwrap();

            let mut streamed = String::new();
            while let Ok(event) = rx.try_recv() {
                if let ProgressEvent::Output(chunk) = event {
                    streamed.push_str(&chunk);
                }
            }
            assert_eq!(out, "onetwo");
            assert_eq!(streamed, out);
        }

        #[tokio::test]
        async fn cancellation_kills_process() {
            let token = CancellationToken::new();
            let trigger = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                trigger.cancel();
            });

            let err = ProcessInvoker::default()
                .run(sh("sleep 10").cancel(Some(token)))
                .await
                .unwrap_err();
            assert!(matches!(err, BackendError::Cancelled));
        }

        #[tokio::test]
        async fn runs_in_requested_directory() {
            let dir = tempfile::tempdir().unwrap();
            let out = ProcessInvoker::default()
                .run(sh("pwd").cwd(dir.path()))
                .await
                .unwrap();
            let expected = dir.path().canonicalize().unwrap();
            assert_eq!(
                std::path::Path::new(out.trim()).canonicalize().unwrap(),
                expected
            );
        }
    }
}
