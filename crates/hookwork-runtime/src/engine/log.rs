use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::context::TriggerContext;
use crate::error::ExecutionError;

/// Default number of results kept in the execution log
pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Skipped,
    Timeout,
}

/// Outcome of one hook attempt; also the execution log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: String,
    pub hook_id: String,
    pub hook_name: String,
    pub execution_id: String,
    pub chain_depth: u32,
    /// Unix epoch milliseconds
    pub triggered_at: i64,
    pub completed_at: i64,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_snapshot: Option<TriggerContext>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Bounded FIFO of recent results. Observational only.
pub struct ExecutionLog {
    entries: Mutex<VecDeque<ExecutionResult>>,
    capacity: usize,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn append(&self, result: ExecutionResult) {
        let mut entries = self.lock();
        entries.push_back(result);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<ExecutionResult> {
        self.lock().iter().cloned().collect()
    }

    pub fn entries_for_hook(&self, hook_id: &str) -> Vec<ExecutionResult> {
        self.lock()
            .iter()
            .filter(|e| e.hook_id == hook_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ExecutionResult>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: i64) -> ExecutionResult {
        ExecutionResult {
            id: format!("r{}", n),
            hook_id: if n % 2 == 0 { "even".into() } else { "odd".into() },
            hook_name: "h".into(),
            execution_id: "e".into(),
            chain_depth: 1,
            triggered_at: n,
            completed_at: n,
            duration_ms: 0,
            status: ExecutionStatus::Success,
            error: None,
            output: None,
            truncated: false,
            context_snapshot: None,
        }
    }

    #[test]
    fn test_log_keeps_most_recent_entries() {
        let log = ExecutionLog::default();
        for n in 1..=101 {
            log.append(entry(n));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].triggered_at, 2);
        assert_eq!(entries[99].triggered_at, 101);
    }

    #[test]
    fn test_entries_for_hook_and_clear() {
        let log = ExecutionLog::new(10);
        for n in 1..=4 {
            log.append(entry(n));
        }
        assert_eq!(log.entries_for_hook("even").len(), 2);
        log.clear();
        assert!(log.is_empty());
    }
}
