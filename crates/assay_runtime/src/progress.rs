//! Progress Sink and Cancellation Token
//!
//! Both are handed to a running entry point. The sink is the only way a
//! plugin can emit events; the token is how the controller asks it to stop.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;

use crate::run::{RunEvent, RunEventKind, RunId};

// ─────────────────────────────────────────────────────────────────────────────
// Progress Sink
// ─────────────────────────────────────────────────────────────────────────────

struct SinkInner {
    run_id: RunId,
    /// `None` once the terminal event has been sent
    tx: Mutex<Option<mpsc::UnboundedSender<RunEvent>>>,
    last: AtomicU8,
}

/// Write-only, thread-safe progress reporter for one run.
///
/// Cloning is cheap; clones may be handed to threads the plugin spawns.
/// Values are clamped into `0..=100` and forwarded in call order, including
/// values lower than the previous one.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
}

impl ProgressSink {
    pub(crate) fn new(run_id: RunId, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                run_id,
                tx: Mutex::new(Some(tx)),
                last: AtomicU8::new(0),
            }),
        }
    }

    /// A sink connected to nothing, for invoking entry points outside a bridge
    pub fn detached(run_id: RunId) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                run_id,
                tx: Mutex::new(None),
                last: AtomicU8::new(0),
            }),
        }
    }

    /// Report progress. Returns `false` if the run already finished or its
    /// consumer went away.
    pub fn report(&self, value: i64) -> bool {
        let clamped = value.clamp(0, 100) as u8;
        if clamped as i64 != value {
            tracing::debug!(run_id = %self.inner.run_id, value, "Progress value clamped");
        }

        let guard = self.inner.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        self.inner.last.store(clamped, Ordering::SeqCst);
        tx.send(RunEvent::new(self.inner.run_id, RunEventKind::Progress(clamped)))
            .is_ok()
    }

    /// Last value reported through this sink
    pub fn last(&self) -> u8 {
        self.inner.last.load(Ordering::SeqCst)
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Send the terminal event and close the sink in one step, so no report
    /// from a lingering plugin thread can follow it.
    pub(crate) fn finish(&self, kind: RunEventKind) {
        let mut guard = self.inner.tx.lock();
        if let Some(tx) = guard.take() {
            let _ = tx.send(RunEvent::new(self.inner.run_id, kind));
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("run_id", &self.inner.run_id)
            .field("last", &self.last())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation Token
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative cancellation flag shared between a run and its controller
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any `sleep` in progress
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Block for `duration` or until cancelled.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            self.inner.wake.wait_for(&mut guard, deadline - now);
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_clamps_and_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::new(RunId::new(), tx);

        assert!(sink.report(30));
        assert!(sink.report(10));
        assert!(sink.report(250));
        assert!(sink.report(-4));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEventKind::Progress(v) = event.kind {
                seen.push(v);
            }
        }
        assert_eq!(seen, vec![30, 10, 100, 0]);
        assert_eq!(sink.last(), 0);
    }

    #[test]
    fn test_sink_closed_after_finish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::new(RunId::new(), tx);
        let clone = sink.clone();

        sink.finish(RunEventKind::Succeeded("done".into()));
        assert!(!clone.report(50));
        assert!(clone.is_closed());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, RunEventKind::Succeeded("done".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_detached_sink() {
        let sink = ProgressSink::detached(RunId::new());
        assert!(!sink.report(10));
    }

    #[test]
    fn test_token_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(5)));

        let remote = token.clone();
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
        waker.join().unwrap();
    }
}
