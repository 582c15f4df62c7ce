//! Request deduplication
//!
//! At most one fetch runs per [`DedupKey`]. The first task to claim a key
//! proceeds; tasks claiming it while the fetch is in flight wait for its
//! result; tasks claiming it afterwards get the stored result straight away.
//!
//! Redirects observed by a fetch are recorded as aliases, so a later task
//! naming the redirect target reuses the original fetch.

use crate::output::FetchResult;
use crate::url::DedupKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type Slot = Option<Arc<FetchResult>>;

enum Entry {
    InFlight(watch::Receiver<Slot>),
    Done(Arc<FetchResult>),
}

#[derive(Default)]
struct Table {
    entries: HashMap<DedupKey, Entry>,
    /// Redirect target → key whose fetch produced it
    aliases: HashMap<DedupKey, DedupKey>,
}

impl Table {
    fn resolve<'a>(&'a self, key: &'a DedupKey) -> &'a DedupKey {
        match self.aliases.get(key) {
            Some(target) if !self.entries.contains_key(key) => target,
            _ => key,
        }
    }
}

/// The result of claiming a key
pub enum Claim {
    /// No fetch exists for the key; the caller must perform it
    Proceed(ClaimGuard),
    /// Another task is fetching the key
    Wait(Waiter),
    /// The key was already fetched
    Cached(Arc<FetchResult>),
}

/// Shared map of in-flight and completed fetches
#[derive(Clone, Default)]
pub struct Deduplicator {
    table: Arc<Mutex<Table>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, atomically deciding between proceeding, waiting and
    /// reusing a stored result
    pub fn claim(&self, key: &DedupKey) -> Claim {
        let mut table = self.lock();
        let resolved = table.resolve(key).clone();

        match table.entries.get(&resolved) {
            Some(Entry::Done(result)) => return Claim::Cached(Arc::clone(result)),
            Some(Entry::InFlight(rx)) => return Claim::Wait(Waiter { rx: rx.clone() }),
            None => {}
        }

        let (tx, rx) = watch::channel(None);
        table.entries.insert(resolved.clone(), Entry::InFlight(rx));
        Claim::Proceed(ClaimGuard {
            key: resolved,
            table: Arc::clone(&self.table),
            tx,
            completed: false,
        })
    }

    /// Records that fetching `from` ended up at `to`
    ///
    /// Later claims for `to` resolve to `from`'s entry unless `to` has an
    /// entry of its own.
    pub fn record_redirect(&self, from: &DedupKey, to: &DedupKey) {
        if from == to {
            return;
        }
        let mut table = self.lock();
        if !table.entries.contains_key(to) {
            tracing::debug!("Recording redirect alias {} -> {}", to, from);
            table.aliases.insert(to.clone(), from.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to fetch a key
///
/// Dropping the guard without calling [`complete`](Self::complete) releases
/// the key and wakes waiters so one of them can claim it again.
pub struct ClaimGuard {
    key: DedupKey,
    table: Arc<Mutex<Table>>,
    tx: watch::Sender<Slot>,
    completed: bool,
}

impl ClaimGuard {
    pub fn key(&self) -> &DedupKey {
        &self.key
    }

    /// Stores the fetch result and hands it to every waiter
    pub fn complete(mut self, result: FetchResult) -> Arc<FetchResult> {
        let result = Arc::new(result);
        {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .entries
                .insert(self.key.clone(), Entry::Done(Arc::clone(&result)));
        }
        self.tx.send_replace(Some(Arc::clone(&result)));
        self.completed = true;
        result
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(table.entries.get(&self.key), Some(Entry::InFlight(_))) {
            table.entries.remove(&self.key);
        }
    }
}

/// Handle for awaiting another task's fetch
pub struct Waiter {
    rx: watch::Receiver<Slot>,
}

impl Waiter {
    /// Waits for the fetch to finish
    ///
    /// # Returns
    ///
    /// * `Some(result)` - The winning fetch's result
    /// * `None` - The fetching task gave up its claim; claim the key again
    pub async fn wait(mut self) -> Option<Arc<FetchResult>> {
        loop {
            if let Some(result) = self.rx.borrow_and_update().clone() {
                return Some(result);
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}
