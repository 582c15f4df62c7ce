//! URL handling module for Sumi-Gather
//!
//! This module provides URL normalization, domain-key extraction, host pattern
//! matching, and the deduplication key used to collapse equivalent requests.

mod domain;
mod matcher;
mod normalize;

use crate::plan::DataKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export main functions
pub use domain::domain_key;
pub use matcher::{host_matches, matches_any};
pub use normalize::normalize_url;

/// Identity of a fetchable resource for deduplication purposes
///
/// Two tasks with the same normalized URL and the same declared data kind
/// resolve to one underlying fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    /// The normalized URL string
    pub url: String,

    /// The declared data kind
    pub kind: DataKind,
}

impl DedupKey {
    /// Builds a dedup key from a raw URL and data kind
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_gather::url::DedupKey;
    /// use sumi_gather::DataKind;
    ///
    /// let a = DedupKey::new("https://Example.com/a", DataKind::Text).unwrap();
    /// let b = DedupKey::new("https://example.com/a?utm=1", DataKind::Text).unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn new(url: &str, kind: DataKind) -> crate::UrlResult<Self> {
        let normalized = normalize_url(url)?;
        Ok(Self {
            url: normalized.to_string(),
            kind,
        })
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.kind)
    }
}
