//! Caller allow/block policy.
//!
//! Patterns are matched against the caller string (name or number) and may
//! contain a single `*` wildcard. Block rules are evaluated first and win.
//! An empty allow list means "answer everything not blocked"; a non-empty
//! one declines any caller it does not match.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WatcherConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    Answer,
    Decline,
}

#[derive(Debug, Clone, Default)]
pub struct CallPolicy {
    allow: Vec<String>,
    block: Vec<String>,
}

impl CallPolicy {
    pub fn new(allow: Vec<String>, block: Vec<String>) -> Self {
        Self { allow, block }
    }

    pub fn from_config(watcher: &WatcherConfig) -> Self {
        Self::new(watcher.allow.clone(), watcher.block.clone())
    }

    pub fn evaluate(&self, caller: &str) -> PolicyDecision {
        if let Some(pattern) = self.first_match(&self.block, caller) {
            debug!("Caller {:?} matches block pattern {:?}", caller, pattern);
            return PolicyDecision::Decline;
        }

        if self.allow.is_empty() {
            return PolicyDecision::Answer;
        }

        match self.first_match(&self.allow, caller) {
            Some(pattern) => {
                debug!("Caller {:?} matches allow pattern {:?}", caller, pattern);
                PolicyDecision::Answer
            }
            None => PolicyDecision::Decline,
        }
    }

    fn first_match<'a>(&self, patterns: &'a [String], caller: &str) -> Option<&'a str> {
        patterns
            .iter()
            .find(|pattern| wildcard_match(pattern, caller))
            .map(|s| s.as_str())
    }
}

/// Match a pattern with at most one `*` wildcard, case-insensitively.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let value = value.trim().to_lowercase();

    match pattern.split_once('*') {
        None => pattern == value,
        Some((prefix, suffix)) => {
            value.len() >= prefix.len() + suffix.len()
                && value.starts_with(prefix)
                && value.ends_with(suffix)
        }
    }
}
