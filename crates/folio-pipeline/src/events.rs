//! Progress events for observers of a running stage.
//!
//! Emits [`ProgressEvent`]s via a [`tokio::sync::broadcast`] channel so that a
//! CLI progress line, a log sink, or a test can follow a run without coupling
//! to the runner internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use folio_types::Stage;

/// Events emitted while a stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    StageEntered {
        project: String,
        stage: Stage,
    },
    StageCompleted {
        project: String,
        stage: Stage,
    },
    RunStarted {
        run_id: Uuid,
        start_index: usize,
        total: usize,
    },
    UnitStarted {
        index: usize,
        number: String,
        title: String,
    },
    UnitCompleted {
        index: usize,
        number: String,
        word_count: usize,
    },
    UnitFailed {
        index: usize,
        number: String,
        error: String,
    },
    UnitSkipped {
        index: usize,
        number: String,
    },
    ProgressSaved {
        completed: usize,
        total: usize,
    },
    RunCancelled {
        run_id: Uuid,
        next_index: usize,
    },
    RunFinished {
        run_id: Uuid,
        generated: usize,
        failed: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<ProgressEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
