//! Progress reporting from running backends.
//!
//! The invoker writes each newly arrived stdout chunk into the sink exactly
//! once and in arrival order. Cadence is not guaranteed: a call may produce
//! zero, one or many events before it completes.

use tokio::sync::mpsc;

/// An update emitted while a backend call is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Newly arrived output bytes, decoded as UTF-8.
    Output(String),
    /// A status message from the adapter (e.g. a model fallback).
    Notice(String),
}

/// Sending half of a progress channel.
///
/// Sending never blocks and never fails the call; events sent after the
/// receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn output(&self, chunk: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Output(chunk.into()));
    }

    pub fn notice(&self, message: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Notice(message.into()));
    }
}
