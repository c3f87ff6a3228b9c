//! Detection of other scroll-smoothing utilities
//!
//! Two smoothers fighting over the same wheel events produce garbage, so the
//! engine stays off when one is found. The match is a plain substring test
//! on executable names and can give false positives; it is advisory only.

use std::path::Path;

use tracing::{debug, warn};

use crate::platform::Platform;

pub struct ConflictGuard {
    tokens: Vec<String>,
}

impl ConflictGuard {
    pub fn new(tokens: &[String]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Name of the first conflicting process, if any. Never fails.
    pub fn find_conflict(&self, platform: &dyn Platform) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }

        let processes = match platform.running_processes() {
            Ok(processes) => processes,
            Err(e) => {
                debug!("Process enumeration failed, assuming no conflict: {}", e);
                return None;
            }
        };

        let found = processes.into_iter().find(|process| self.matches(process));
        if let Some(ref process) = found {
            warn!("Conflicting scroll utility running: {}", process);
        }
        found
    }

    pub fn has_conflict(&self, platform: &dyn Platform) -> bool {
        self.find_conflict(platform).is_some()
    }

    fn matches(&self, process: &str) -> bool {
        let name = Path::new(process)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(process)
            .to_lowercase();
        self.tokens.iter().any(|token| name.contains(token.as_str()))
    }
}
