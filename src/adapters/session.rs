//! Browser session pool
//!
//! Rendering is expensive, so browser sessions are opened lazily, reused
//! across fetches and capped at a fixed number. A session is checked out
//! through a [`SessionGuard`] that returns it to the pool on drop, whatever
//! path the fetch took. Sessions whose fetch did not complete cleanly are
//! discarded instead of returned, since their page state is unknown.

use crate::adapters::{FetchError, FetchErrorKind};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// The DOM of a page after scripts ran
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub title: Option<String>,
    pub final_url: String,
}

/// One live browser session (a tab, in practice)
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates to `url`, waits for the DOM to be ready plus `settle`, and
    /// returns the rendered document
    async fn render(&mut self, url: &Url, settle: Duration) -> Result<RenderedPage, FetchError>;
}

/// Opens browser sessions on demand
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, FetchError>;
}

struct PoolInner {
    backend: Arc<dyn BrowserBackend>,
    idle: Mutex<Vec<Box<dyn BrowserSession>>>,
    permits: Arc<Semaphore>,
}

/// A bounded pool of reusable browser sessions
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Creates a pool that holds at most `max_sessions` sessions at once
    pub fn new(backend: Arc<dyn BrowserBackend>, max_sessions: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                backend,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(max_sessions.max(1))),
            }),
        }
    }

    /// Checks out a session, waiting for one to free up if the pool is at
    /// capacity
    pub async fn checkout(&self) -> Result<SessionGuard, FetchError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::new(FetchErrorKind::Navigation, "session pool closed"))?;

        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let session = match reused {
            Some(session) => session,
            None => {
                tracing::debug!("Opening new browser session");
                self.inner.backend.open_session().await?
            }
        };

        Ok(SessionGuard {
            session: Some(session),
            pool: Arc::clone(&self.inner),
            healthy: false,
            _permit: permit,
        })
    }

    /// Number of sessions that could be checked out right now without waiting
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Number of open sessions sitting idle in the pool
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Scoped checkout of a browser session
///
/// Returns the session to the pool on drop if [`SessionGuard::mark_healthy`]
/// was called; otherwise the session is closed. The pool slot is released in
/// both cases.
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
    pool: Arc<PoolInner>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
}

impl SessionGuard {
    /// Renders a page with the checked-out session
    pub async fn render(&mut self, url: &Url, settle: Duration) -> Result<RenderedPage, FetchError> {
        match self.session.as_mut() {
            Some(session) => session.render(url, settle).await,
            None => Err(FetchError::new(
                FetchErrorKind::Navigation,
                "browser session already released",
            )),
        }
    }

    /// Marks the session as safe to reuse
    pub fn mark_healthy(&mut self) {
        self.healthy = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if self.healthy {
                self.pool
                    .idle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(session);
            } else {
                tracing::debug!("Discarding browser session after unclean fetch");
            }
        }
    }
}
