//! Execution Bridge
//!
//! Runs plugin entry points off the controller thread on a fixed pool of
//! worker threads. Submission validates synchronously and only enqueues;
//! everything after that is reported through the run's [`ExecutionHandle`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use assay_types::Arguments;

use crate::error::SubmitError;
use crate::handle::{ExecutionHandle, RunControl};
use crate::plugin::{Invocation, PluginDescriptor};
use crate::progress::ProgressSink;
use crate::registry::PluginRegistry;
use crate::run::{RunEventKind, RunId, RunState};

const FAULT_WITHOUT_DETAIL: &str = "plugin failed without detail";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Number of worker threads
    pub workers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

/// A request to run one plugin
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub plugin_id: String,
    pub data_root: PathBuf,
    pub arguments: Arguments,
}

impl ExecutionRequest {
    pub fn new(
        plugin_id: impl Into<String>,
        data_root: impl Into<PathBuf>,
        arguments: Arguments,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            data_root: data_root.into(),
            arguments,
        }
    }

    /// Request with every parameter at its default (or zero) value
    pub fn for_plugin(descriptor: &PluginDescriptor, data_root: impl Into<PathBuf>) -> Self {
        Self::new(
            descriptor.id.clone(),
            data_root,
            Arguments::from_schema(&descriptor.schema),
        )
    }
}

/// Snapshot of bridge load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub workers: usize,
    pub queued: usize,
    pub running: usize,
}

/// Summary of a run that has not finished yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub id: RunId,
    pub plugin_id: String,
    pub state: RunState,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

struct Job {
    control: Arc<RunControl>,
    descriptor: Arc<PluginDescriptor>,
    data_root: PathBuf,
    arguments: Arguments,
}

pub struct ExecutionBridge {
    registry: Arc<PluginRegistry>,
    jobs_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<DashMap<RunId, Arc<RunControl>>>,
}

impl ExecutionBridge {
    /// Start the worker pool
    pub fn new(config: BridgeConfig, registry: Arc<PluginRegistry>) -> std::io::Result<Self> {
        let count = config.workers.max(1);
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let active = Arc::new(DashMap::new());

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            workers.push(spawn_worker(id, jobs_rx.clone(), active.clone())?);
        }

        tracing::info!("Execution bridge started with {} workers", count);

        Ok(Self {
            registry,
            jobs_tx: Some(jobs_tx),
            workers,
            active,
        })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Validate a request and queue it.
    ///
    /// Never blocks and never invokes plugin code.
    pub fn submit(&self, request: ExecutionRequest) -> Result<ExecutionHandle, SubmitError> {
        let jobs_tx = self.jobs_tx.as_ref().ok_or(SubmitError::ShuttingDown)?;

        let descriptor = self
            .registry
            .get(&request.plugin_id)
            .ok_or_else(|| SubmitError::UnknownPlugin(request.plugin_id.clone()))?;

        let arguments = request
            .arguments
            .validate(&descriptor.schema)
            .map_err(|source| SubmitError::Validation {
                plugin: descriptor.id.clone(),
                source,
            })?;

        let run_id = RunId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let control = Arc::new(RunControl::new(
            run_id,
            descriptor.id.clone(),
            ProgressSink::new(run_id, events_tx),
        ));

        self.active.insert(run_id, control.clone());
        let job = Job {
            control: control.clone(),
            descriptor,
            data_root: request.data_root,
            arguments,
        };
        if jobs_tx.send(job).is_err() {
            self.active.remove(&run_id);
            return Err(SubmitError::ShuttingDown);
        }

        tracing::debug!(%run_id, plugin = %control.plugin_id, "Run queued");
        Ok(ExecutionHandle::new(control, events_rx))
    }

    /// Request cancellation of a run. Returns `false` if it is not active.
    pub fn cancel(&self, run_id: RunId) -> bool {
        match self.active.get(&run_id) {
            Some(control) => {
                control.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs that have not reached a terminal state
    pub fn active_runs(&self) -> Vec<ActiveRun> {
        self.active
            .iter()
            .map(|entry| ActiveRun {
                id: entry.id,
                plugin_id: entry.plugin_id.clone(),
                state: entry.state(),
            })
            .filter(|run| !run.state.is_terminal())
            .collect()
    }

    pub fn status(&self) -> BridgeStatus {
        let mut status = BridgeStatus {
            workers: self.workers.len(),
            queued: 0,
            running: 0,
        };
        for entry in self.active.iter() {
            match entry.state() {
                RunState::Queued => status.queued += 1,
                RunState::Running => status.running += 1,
                _ => {}
            }
        }
        status
    }

    /// Stop accepting runs, cancel everything in flight and join the workers.
    ///
    /// Blocks until every running entry point has returned.
    pub fn shutdown(mut self) {
        tracing::info!("Execution bridge shutting down");
        self.jobs_tx.take();
        for entry in self.active.iter() {
            entry.cancel();
        }
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ExecutionBridge {
    fn drop(&mut self) {
        // Workers exit once the queue drains; running plugins are not waited on
        self.jobs_tx.take();
    }
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("status", &self.status())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workers
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_worker(
    id: usize,
    jobs: Receiver<Job>,
    active: Arc<DashMap<RunId, Arc<RunControl>>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("assay-worker-{}", id))
        .spawn(move || {
            tracing::debug!("Worker {} started", id);
            while let Ok(job) = jobs.recv() {
                let run_id = job.control.id;
                execute(job);
                active.remove(&run_id);
            }
            tracing::debug!("Worker {} stopped", id);
        })
}

fn execute(job: Job) {
    let Job {
        control,
        descriptor,
        data_root,
        arguments,
    } = job;

    // Lost the race against a queued cancel; the terminal event is already out
    if !control.transition(RunState::Queued, RunState::Running) {
        return;
    }
    if control.cancel.is_cancelled() {
        control.finish(RunEventKind::Cancelled);
        return;
    }

    tracing::info!(run_id = %control.id, plugin = %descriptor.id, "Run started");

    let invocation = Invocation {
        run_id: control.id,
        data_root,
        arguments,
        progress: control.sink.clone(),
        cancel: control.cancel.clone(),
    };

    let entry_point = descriptor.entry_point.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || entry_point.invoke(invocation)));

    let kind = match outcome {
        Ok(Ok(value)) => RunEventKind::Succeeded(value.to_string()),
        Ok(Err(fault)) if fault.interrupted || control.cancel.is_cancelled() => {
            RunEventKind::Cancelled
        }
        Ok(Err(fault)) => {
            let detail = fault.message.trim();
            if detail.is_empty() {
                RunEventKind::Failed(FAULT_WITHOUT_DETAIL.to_string())
            } else {
                RunEventKind::Failed(detail.to_string())
            }
        }
        Err(payload) => RunEventKind::Failed(format!("plugin panicked: {}", panic_message(&*payload))),
    };

    match &kind {
        RunEventKind::Failed(detail) => {
            tracing::warn!(run_id = %control.id, plugin = %descriptor.id, "Run failed: {}", detail)
        }
        other => {
            tracing::info!(run_id = %control.id, plugin = %descriptor.id, "Run finished: {:?}", other.terminal_state())
        }
    }

    control.finish(kind);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assay_types::{DeclaredType, FormalParameter, Signature, Value, ValidationError};

    use crate::error::PluginFault;
    use crate::plugin::FnEntryPoint;
    use crate::run::RunEvent;

    fn native<F>(id: &str, signature: Signature, func: F) -> PluginDescriptor
    where
        F: Fn(Invocation) -> Result<Value, PluginFault> + Send + Sync + 'static,
    {
        PluginDescriptor::native(id, Arc::new(FnEntryPoint::new(signature, func))).unwrap()
    }

    fn progress_signature() -> Signature {
        Signature::new()
            .param(FormalParameter::new("data_path"))
            .param(FormalParameter::new("progress_callback"))
    }

    fn bridge(workers: usize) -> (tempfile::TempDir, ExecutionBridge) {
        let temp = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::new(temp.path().join("modules"))
            .with_native(native("steps", progress_signature(), |inv| {
                for pct in [10, 55, 100] {
                    inv.progress.report(pct);
                }
                Ok(Value::Text("done".into()))
            }))
            .with_native(native("fail", Signature::new(), |_| {
                Err(PluginFault::new("disk on fire"))
            }))
            .with_native(native("silent", Signature::new(), |_| Err(PluginFault::new(""))))
            .with_native(native("panics", Signature::new(), |_| {
                // nested thread panics propagate through the scope
                thread::scope(|s| {
                    s.spawn(|| -> usize { panic!("worker exploded") });
                });
                Ok(Value::Boolean(true))
            }))
            .with_native(native(
                "echo",
                Signature::new()
                    .param(FormalParameter::new("data_path"))
                    .param(FormalParameter::new("count").typed(DeclaredType::Integer).with_default(3)),
                |inv| {
                    let count = inv.arguments.get("count").and_then(Value::as_i64).unwrap_or(0);
                    Ok(Value::Text(format!("{}:{}", inv.data_root.display(), count)))
                },
            ))
            .with_native(native("slow", Signature::new(), |inv| {
                inv.progress.report(1);
                if inv.cancel.sleep(Duration::from_secs(30)) {
                    Ok(Value::Text("slept".into()))
                } else {
                    Err(PluginFault::interrupted())
                }
            }));
        registry.refresh().unwrap();

        let bridge = ExecutionBridge::new(BridgeConfig { workers }, Arc::new(registry)).unwrap();
        (temp, bridge)
    }

    fn request(bridge: &ExecutionBridge, id: &str) -> ExecutionRequest {
        let descriptor = bridge.registry().get(id).unwrap();
        ExecutionRequest::for_plugin(&descriptor, "/data")
    }

    async fn collect(handle: &mut ExecutionHandle) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(10), handle.next_event())
            .await
            .expect("run did not finish")
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_progress_then_success() {
        let (_temp, bridge) = bridge(2);
        let mut handle = bridge.submit(request(&bridge, "steps")).unwrap();

        let kinds: Vec<_> = collect(&mut handle).await.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RunEventKind::Progress(10),
                RunEventKind::Progress(55),
                RunEventKind::Progress(100),
                RunEventKind::Succeeded("done".into()),
            ]
        );

        let record = handle.record();
        assert_eq!(record.state, RunState::Succeeded);
        assert_eq!(record.last_progress, 100);
        assert_eq!(record.result_message.as_deref(), Some("done"));
        assert_eq!(handle.state(), RunState::Succeeded);
    }

    #[tokio::test]
    async fn test_fault_yields_single_failed_event() {
        let (_temp, bridge) = bridge(1);
        let mut handle = bridge.submit(request(&bridge, "fail")).unwrap();

        let events = collect(&mut handle).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RunEventKind::Failed("disk on fire".into()));

        let record = bridge.submit(request(&bridge, "silent")).unwrap().wait().await;
        assert_eq!(record.state, RunState::Failed);
        assert_eq!(record.error_detail.as_deref(), Some(FAULT_WITHOUT_DETAIL));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (_temp, bridge) = bridge(1);
        let record = bridge.submit(request(&bridge, "panics")).unwrap().wait().await;
        assert_eq!(record.state, RunState::Failed);
        assert!(record.error_detail.unwrap().contains("panicked"));

        // the worker survives
        let record = bridge.submit(request(&bridge, "steps")).unwrap().wait().await;
        assert_eq!(record.state, RunState::Succeeded);
    }

    #[tokio::test]
    async fn test_reserved_values_and_arguments_reach_plugin() {
        let (_temp, bridge) = bridge(1);
        let mut req = request(&bridge, "echo");
        req.arguments.insert("count", 7);

        let record = bridge.submit(req).unwrap().wait().await;
        assert_eq!(record.result_message.as_deref(), Some("/data:7"));
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_synchronously() {
        let (_temp, bridge) = bridge(1);

        let err = bridge
            .submit(ExecutionRequest::new("nope", "/data", Arguments::new()))
            .unwrap_err();
        assert!(matches!(err, SubmitError::UnknownPlugin(id) if id == "nope"));

        let err = bridge
            .submit(ExecutionRequest::new("echo", "/data", Arguments::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation { source: ValidationError::Missing(name), .. } if name == "count"
        ));

        let mut req = request(&bridge, "echo");
        req.arguments.insert("extra", 1);
        assert!(matches!(
            bridge.submit(req),
            Err(SubmitError::Validation { source: ValidationError::Unknown(_), .. })
        ));

        assert!(bridge.active_runs().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let (_temp, bridge) = bridge(2);
        let failing = bridge.submit(request(&bridge, "fail")).unwrap();
        let passing = bridge.submit(request(&bridge, "steps")).unwrap();
        assert_ne!(failing.id(), passing.id());

        let (failed, passed) = tokio::join!(failing.wait(), passing.wait());
        assert_eq!(failed.state, RunState::Failed);
        assert_eq!(passed.state, RunState::Succeeded);
        assert_eq!(passed.last_progress, 100);
    }

    #[tokio::test]
    async fn test_cancel_running_run() {
        let (_temp, bridge) = bridge(1);
        let mut handle = bridge.submit(request(&bridge, "slow")).unwrap();

        let first = handle.next_event().await.unwrap();
        assert_eq!(first.kind, RunEventKind::Progress(1));
        assert_eq!(bridge.status().running, 1);

        assert!(bridge.cancel(handle.id()));
        let events = collect(&mut handle).await;
        assert_eq!(events.last().map(|e| &e.kind), Some(&RunEventKind::Cancelled));
        assert_eq!(handle.record().state, RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_queued_run() {
        let (_temp, bridge) = bridge(1);
        let mut blocker = bridge.submit(request(&bridge, "slow")).unwrap();
        blocker.next_event().await.unwrap();

        let queued = bridge.submit(request(&bridge, "steps")).unwrap();
        assert_eq!(queued.state(), RunState::Queued);
        assert_eq!(bridge.status().queued, 1);

        queued.cancel();
        let record = queued.wait().await;
        assert_eq!(record.state, RunState::Cancelled);
        assert_eq!(record.last_progress, 0);

        blocker.cancel();
        assert_eq!(blocker.wait().await.state, RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_cancels() {
        let (_temp, bridge) = bridge(1);
        let handle = bridge.submit(request(&bridge, "slow")).unwrap();
        let queued = bridge.submit(request(&bridge, "steps")).unwrap();

        tokio::task::spawn_blocking(move || bridge.shutdown())
            .await
            .unwrap();

        assert_eq!(handle.wait().await.state, RunState::Cancelled);
        assert_eq!(queued.wait().await.state, RunState::Cancelled);
    }
}
