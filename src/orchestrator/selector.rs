//! Strategy selection
//!
//! Picks the adapter for a task's next attempt. The decision depends only on
//! the task and its attempt history, so an identical plan reproduces the same
//! adapter sequence.

use crate::adapters::AdapterKind;
use crate::config::AdaptersConfig;
use crate::plan::Task;
use crate::state::TaskAttempt;
use crate::url::matches_any;
use url::Url;

/// Maps a task and its attempt history to one adapter
#[derive(Debug, Clone)]
pub struct StrategySelector {
    spa_patterns: Vec<String>,
}

impl StrategySelector {
    /// Creates a selector that routes hosts matching `spa_patterns` to the
    /// rendered adapter
    pub fn new(spa_patterns: Vec<String>) -> Self {
        Self { spa_patterns }
    }

    pub fn from_config(config: &AdaptersConfig) -> Self {
        Self::new(config.spa_patterns.clone())
    }

    /// Selects the adapter for the next attempt
    ///
    /// # Decision order
    ///
    /// 1. Explicit strategy hint
    /// 2. Image, video and audio tasks → media
    /// 3. Host matches a single-page-app pattern → rendered
    /// 4. Static attempts exhausted on thin content or timeouts → rendered
    ///    (see [`should_escalate`](Self::should_escalate))
    /// 5. Static
    pub fn select(&self, task: &Task, history: &[TaskAttempt]) -> AdapterKind {
        if let Some(hint) = task.strategy {
            return hint;
        }

        if task.kind.is_media() {
            return AdapterKind::Media;
        }

        if self.is_spa_host(&task.url) {
            return AdapterKind::Rendered;
        }

        if self.should_escalate(task, history) {
            return AdapterKind::Rendered;
        }

        AdapterKind::Static
    }

    /// Returns true when the next attempt is the one escalation attempt
    ///
    /// That is the case when every previous attempt used the static adapter,
    /// the next attempt is the last one the task allows, and the latest
    /// failure suggests the page needs a browser. The first attempt never
    /// escalates.
    pub fn should_escalate(&self, task: &Task, history: &[TaskAttempt]) -> bool {
        if task.strategy.is_some() || history.is_empty() {
            return false;
        }
        if history.len() as u32 != task.max_retries {
            return false;
        }
        if !history.iter().all(|a| a.adapter == AdapterKind::Static) {
            return false;
        }

        history
            .last()
            .and_then(TaskAttempt::error)
            .is_some_and(|e| e.kind.suggests_rendering())
    }

    fn is_spa_host(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|host| matches_any(&self.spa_patterns, &host))
    }
}
