//! Run Records and Events
//!
//! A run moves through `Queued -> Running -> {Succeeded | Failed | Cancelled}`
//! (or straight from `Queued` to `Cancelled`). Everything a controller learns
//! about a run arrives as a [`RunEvent`] on that run's channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Run Id
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier of one submitted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run State
// ─────────────────────────────────────────────────────────────────────────────

/// Current state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunState {
    /// Waiting for a free worker
    Queued = 0,
    /// Entry point is executing
    Running = 1,
    /// Entry point returned normally
    Succeeded = 2,
    /// Entry point raised a fault
    Failed = 3,
    /// Run was cancelled before or during execution
    Cancelled = 4,
}

impl RunState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Check if the run can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Queued => write!(f, "queued"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Event
// ─────────────────────────────────────────────────────────────────────────────

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEventKind {
    /// Latest completion percentage, 0..=100
    Progress(u8),
    /// Result message of a successful run
    Succeeded(String),
    /// Fault detail of a failed run
    Failed(String),
    Cancelled,
}

impl RunEventKind {
    /// Terminal state this event leads to, if any
    pub fn terminal_state(&self) -> Option<RunState> {
        match self {
            RunEventKind::Progress(_) => None,
            RunEventKind::Succeeded(_) => Some(RunState::Succeeded),
            RunEventKind::Failed(_) => Some(RunState::Failed),
            RunEventKind::Cancelled => Some(RunState::Cancelled),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_state().is_some()
    }
}

/// An event emitted for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub kind: RunEventKind,
    pub at: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run_id: RunId, kind: RunEventKind) -> Self {
        Self {
            run_id,
            kind,
            at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Record
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of a run as seen by its consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub plugin_id: String,
    pub state: RunState,
    pub last_progress: u8,
    pub result_message: Option<String>,
    pub error_detail: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(id: RunId, plugin_id: impl Into<String>) -> Self {
        Self {
            id,
            plugin_id: plugin_id.into(),
            state: RunState::Queued,
            last_progress: 0,
            result_message: None,
            error_detail: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Fold an event into the record. Events after a terminal one are ignored.
    pub fn apply(&mut self, event: &RunEvent) {
        if self.state.is_terminal() {
            return;
        }
        match &event.kind {
            RunEventKind::Progress(value) => {
                self.state = RunState::Running;
                self.last_progress = *value;
            }
            RunEventKind::Succeeded(message) => {
                self.result_message = Some(message.clone());
            }
            RunEventKind::Failed(detail) => {
                self.error_detail = Some(detail.clone());
            }
            RunEventKind::Cancelled => {}
        }
        if let Some(state) = event.kind.terminal_state() {
            self.state = state;
            self.finished_at = Some(event.at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_through_u8() {
        for state in [
            RunState::Queued,
            RunState::Running,
            RunState::Succeeded,
            RunState::Failed,
            RunState::Cancelled,
        ] {
            assert_eq!(RunState::from_u8(state as u8), state);
        }
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[test]
    fn test_record_apply() {
        let id = RunId::new();
        let mut record = RunRecord::new(id, "demo");

        record.apply(&RunEvent::new(id, RunEventKind::Progress(40)));
        assert_eq!(record.state, RunState::Running);
        assert_eq!(record.last_progress, 40);

        record.apply(&RunEvent::new(id, RunEventKind::Failed("boom".into())));
        assert_eq!(record.state, RunState::Failed);
        assert_eq!(record.error_detail.as_deref(), Some("boom"));
        assert!(record.finished_at.is_some());

        // terminal records are frozen
        record.apply(&RunEvent::new(id, RunEventKind::Progress(90)));
        record.apply(&RunEvent::new(id, RunEventKind::Succeeded("late".into())));
        assert_eq!(record.state, RunState::Failed);
        assert_eq!(record.last_progress, 40);
        assert!(record.result_message.is_none());
    }

    #[test]
    fn test_event_serde_shape() {
        let event = RunEvent::new(RunId::new(), RunEventKind::Progress(55));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], serde_json::json!({"type": "progress", "data": 55}));

        let cancelled = serde_json::to_value(RunEventKind::Cancelled).unwrap();
        assert_eq!(cancelled, serde_json::json!({"type": "cancelled"}));
    }
}
