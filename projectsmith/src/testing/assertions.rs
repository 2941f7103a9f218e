//! Test assertions for run logs and generation results.

use crate::core::{GenerationResult, ValidationStatus};
use crate::events::RunLog;

/// Asserts that the log holds at least one record named `event`.
pub fn assert_logged(log: &RunLog, event: &str) {
    let records = log.records();
    assert!(
        records.iter().any(|r| r.event == event),
        "Expected run log to contain '{}'. Events: {:?}",
        event,
        records.iter().map(|r| r.event.as_str()).collect::<Vec<_>>()
    );
}

/// Asserts that the log holds exactly `count` records named `event`.
pub fn assert_logged_times(log: &RunLog, event: &str, count: usize) {
    let found = log.records().iter().filter(|r| r.event == event).count();
    assert_eq!(
        found, count,
        "Expected '{event}' to be logged {count} time(s), found {found}"
    );
}

/// Asserts a generation's status and attempt count.
pub fn assert_generation(result: &GenerationResult, status: ValidationStatus, attempts: usize) {
    assert_eq!(
        (result.status, result.attempts),
        (status, attempts),
        "Unexpected generation for task {}: diagnostics {:?}",
        result.subtask_id,
        result.diagnostics
    );
}
