//! Priority-ordered task queue shared by the workers
//!
//! Tasks that cannot run yet (waiting on a domain's token bucket or backing
//! off before a retry) go back into the queue with a ready time instead of
//! holding a worker. The queue also counts the tasks that have not reached a
//! terminal result, so idle workers know whether more work can still appear.

use crate::orchestrator::ClaimGuard;
use crate::plan::Task;
use crate::state::TaskAttempt;
use crate::url::DedupKey;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

/// A validated task ready for dispatch
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub task: Task,

    /// The task's URL as planned; this is what gets fetched
    pub url: Url,

    /// Dedup identity, built from the normalized URL
    pub key: DedupKey,

    /// Rate-limit domain key (host[:port]) of `url`
    pub domain: String,
}

/// A task in the queue together with what it has done so far
pub struct QueuedTask {
    pub prepared: Arc<PreparedTask>,
    pub attempts: Vec<TaskAttempt>,
    pub escalated: bool,

    /// Not dispatched before this instant
    pub ready_at: Option<Instant>,

    /// When the pending attempt first found its domain's bucket empty
    pub token_wait_since: Option<Instant>,

    /// Dedup claim kept while the task waits in the queue
    pub claim: Option<ClaimGuard>,
}

impl QueuedTask {
    pub fn new(prepared: PreparedTask) -> Self {
        Self {
            prepared: Arc::new(prepared),
            attempts: Vec::new(),
            escalated: false,
            ready_at: None,
            token_wait_since: None,
            claim: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.prepared.task
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower task id
        self.task()
            .priority
            .cmp(&other.task().priority)
            .then_with(|| other.task().id.cmp(&self.task().id))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task().priority == other.task().priority && self.task().id == other.task().id
    }
}

impl Eq for QueuedTask {}

/// What a worker should do next
pub enum Next {
    /// Run this task
    Task(QueuedTask),
    /// Every queued task is deferred; the earliest is ready at this instant
    WaitUntil(Instant),
    /// Nothing is queued but tasks are still in flight
    Idle,
    /// Every task has a terminal result
    Finished,
}

struct Inner {
    ready: BinaryHeap<QueuedTask>,
    deferred: Vec<QueuedTask>,
    /// Tasks without a terminal result yet
    outstanding: usize,
}

/// Queue of tasks waiting for a worker
pub struct TaskQueue {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl TaskQueue {
    pub fn new(tasks: Vec<QueuedTask>) -> Self {
        let outstanding = tasks.len();
        Self {
            inner: Mutex::new(Inner {
                ready: BinaryHeap::from(tasks),
                deferred: Vec::new(),
                outstanding,
            }),
            changed: Notify::new(),
        }
    }

    /// Puts a task back, honouring its ready time
    pub fn push(&self, task: QueuedTask) {
        {
            let mut inner = self.lock();
            match task.ready_at {
                Some(at) if at > Instant::now() => inner.deferred.push(task),
                _ => inner.ready.push(task),
            }
        }
        self.changed.notify_waiters();
    }

    /// Puts a task back to be dispatched no earlier than `until`
    pub fn defer(&self, mut task: QueuedTask, until: Instant) {
        task.ready_at = Some(until);
        self.push(task);
    }

    /// Takes the highest-priority task that is ready at `now`
    pub fn next(&self, now: Instant) -> Next {
        let mut inner = self.lock();

        let mut i = 0;
        while i < inner.deferred.len() {
            if inner.deferred[i].ready_at.map_or(true, |at| at <= now) {
                let task = inner.deferred.swap_remove(i);
                inner.ready.push(task);
            } else {
                i += 1;
            }
        }

        if let Some(task) = inner.ready.pop() {
            return Next::Task(task);
        }
        if let Some(at) = inner.deferred.iter().filter_map(|t| t.ready_at).min() {
            return Next::WaitUntil(at);
        }
        if inner.outstanding > 0 {
            Next::Idle
        } else {
            Next::Finished
        }
    }

    /// Resolves after the next push or completion
    ///
    /// Create the future before calling [`next`](Self::next) so no change
    /// between the two is missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    /// Records that one task reached a terminal result
    pub fn task_done(&self) {
        {
            let mut inner = self.lock();
            inner.outstanding = inner.outstanding.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Removes every remaining task, deferred ones included, highest
    /// priority first
    pub fn drain(&self) -> Vec<QueuedTask> {
        let mut inner = self.lock();
        let deferred = std::mem::take(&mut inner.deferred);
        inner.ready.extend(deferred);

        let mut drained = Vec::with_capacity(inner.ready.len());
        while let Some(task) = inner.ready.pop() {
            drained.push(task);
        }
        drained
    }

    /// Number of queued tasks, ready or deferred
    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.ready.len() + inner.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
