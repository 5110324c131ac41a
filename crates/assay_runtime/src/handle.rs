//! Execution Handle
//!
//! Returned by `ExecutionBridge::submit`. Owns the receiving end of the run's
//! event channel, so events for one run are consumed by exactly one caller
//! in emission order.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::progress::{CancellationToken, ProgressSink};
use crate::run::{RunEvent, RunEventKind, RunId, RunRecord, RunState};

// ─────────────────────────────────────────────────────────────────────────────
// Run Control
// ─────────────────────────────────────────────────────────────────────────────

/// State shared by the handle, the bridge and the worker owning a run
pub(crate) struct RunControl {
    pub(crate) id: RunId,
    pub(crate) plugin_id: String,
    state: AtomicU8,
    pub(crate) cancel: CancellationToken,
    pub(crate) sink: ProgressSink,
}

impl RunControl {
    pub(crate) fn new(
        id: RunId,
        plugin_id: String,
        sink: ProgressSink,
    ) -> Self {
        Self {
            id,
            plugin_id,
            state: AtomicU8::new(RunState::Queued as u8),
            cancel: CancellationToken::new(),
            sink,
        }
    }

    pub(crate) fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to`; fails if another party got there first
    pub(crate) fn transition(&self, from: RunState, to: RunState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Store the terminal state and emit its event
    pub(crate) fn finish(&self, kind: RunEventKind) {
        if let Some(state) = kind.terminal_state() {
            self.state.store(state as u8, Ordering::SeqCst);
        }
        self.sink.finish(kind);
    }

    /// Signal the token. A run still waiting in the queue is finished here.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
        if self.transition(RunState::Queued, RunState::Cancelled) {
            tracing::debug!(run_id = %self.id, "Cancelled queued run");
            self.sink.finish(RunEventKind::Cancelled);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Controller-side view of one run
pub struct ExecutionHandle {
    control: Arc<RunControl>,
    events: mpsc::UnboundedReceiver<RunEvent>,
    record: RunRecord,
}

impl ExecutionHandle {
    pub(crate) fn new(control: Arc<RunControl>, events: mpsc::UnboundedReceiver<RunEvent>) -> Self {
        let record = RunRecord::new(control.id, control.plugin_id.clone());
        Self {
            control,
            events,
            record,
        }
    }

    pub fn id(&self) -> RunId {
        self.control.id
    }

    pub fn plugin_id(&self) -> &str {
        &self.control.plugin_id
    }

    /// State as last stored by the bridge; may be ahead of the events
    /// consumed so far.
    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Request cancellation of this run
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Token observed by the running entry point
    pub fn cancellation_token(&self) -> CancellationToken {
        self.control.cancel.clone()
    }

    /// Record built from the events consumed so far
    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Next event, or `None` once the terminal event has been consumed
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        let event = self.events.recv().await?;
        self.record.apply(&event);
        Some(event)
    }

    /// Blocking variant of [`next_event`](Self::next_event); must not be
    /// called from inside an async runtime.
    pub fn blocking_next_event(&mut self) -> Option<RunEvent> {
        let event = self.events.blocking_recv()?;
        self.record.apply(&event);
        Some(event)
    }

    /// Next event if one is already waiting
    pub fn try_next_event(&mut self) -> Option<RunEvent> {
        let event = self.events.try_recv().ok()?;
        self.record.apply(&event);
        Some(event)
    }

    /// Drain events until the run finishes and return its final record
    pub async fn wait(mut self) -> RunRecord {
        while self.next_event().await.is_some() {}
        self.record
    }

    /// Blocking variant of [`wait`](Self::wait)
    pub fn blocking_wait(mut self) -> RunRecord {
        while self.blocking_next_event().is_some() {}
        self.record
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.control.id)
            .field("plugin_id", &self.control.plugin_id)
            .field("state", &self.state())
            .finish()
    }
}
