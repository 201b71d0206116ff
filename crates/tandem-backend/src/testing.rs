//! Scripted command runner for exercising adapters without real CLIs.

use crate::process::{CommandRunner, Invocation};
use crate::{BackendError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays queued results in order and records every invocation.
///
/// Successful outputs are also written to the invocation's progress sink
/// as a single chunk.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRunner {
    script: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue another result.
    pub fn push(&self, result: Result<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// Invocations seen so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> Result<String> {
        let progress = invocation.progress.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation);
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let result = next.unwrap_or_else(|| {
            Err(BackendError::Io(std::io::Error::other(
                "no scripted response left",
            )))
        });

        if let (Ok(output), Some(sink)) = (&result, progress) {
            sink.output(output.clone());
        }
        result
    }
}
