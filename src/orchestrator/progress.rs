//! Progress events
//!
//! Task state changes are published on a bounded broadcast channel. Sending
//! never waits: with no subscribers the event is dropped, and a subscriber
//! that falls more than the buffer size behind loses the oldest events and
//! sees `RecvError::Lagged` on its next receive.

use crate::adapters::{AdapterKind, FetchError};
use crate::state::TaskState;
use std::time::Duration;
use tokio::sync::broadcast;

/// One task state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Queued {
        task_id: u64,
    },
    Running {
        task_id: u64,
        attempt: u32,
        adapter: AdapterKind,
    },
    Retrying {
        task_id: u64,
        attempt: u32,
        delay: Duration,
        error: FetchError,
    },
    Terminal {
        task_id: u64,
        status: TaskState,
    },
}

impl ProgressEvent {
    pub fn task_id(&self) -> u64 {
        match self {
            Self::Queued { task_id }
            | Self::Running { task_id, .. }
            | Self::Retrying { task_id, .. }
            | Self::Terminal { task_id, .. } => *task_id,
        }
    }

    /// The task state this event moves the task into
    pub fn state(&self) -> TaskState {
        match self {
            Self::Queued { .. } => TaskState::Queued,
            Self::Running { .. } => TaskState::Running,
            Self::Retrying { .. } => TaskState::Retrying,
            Self::Terminal { status, .. } => *status,
        }
    }
}

/// Publishing side of the progress channel
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Creates a channel buffering at most `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event without waiting for consumers
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn queued(&self, task_id: u64) {
        self.emit(ProgressEvent::Queued { task_id });
    }

    pub fn running(&self, task_id: u64, attempt: u32, adapter: AdapterKind) {
        self.emit(ProgressEvent::Running {
            task_id,
            attempt,
            adapter,
        });
    }

    pub fn retrying(&self, task_id: u64, attempt: u32, delay: Duration, error: &FetchError) {
        self.emit(ProgressEvent::Retrying {
            task_id,
            attempt,
            delay,
            error: error.clone(),
        });
    }

    pub fn terminal(&self, task_id: u64, status: TaskState) {
        self.emit(ProgressEvent::Terminal { task_id, status });
    }
}
