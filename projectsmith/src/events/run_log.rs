//! Append-only run log shared by every stage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// Default cap for input/output summaries.
pub const DEFAULT_SUMMARY_CHARS: usize = 600;

/// The pipeline stage a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStage {
    /// State machine transitions and run-level events.
    Driver,
    /// Web-search augmentation.
    Search,
    /// Objective decomposition.
    Decompose,
    /// Sub-task execution.
    Execute,
    /// Refinement / merge.
    Refine,
    /// Writing files.
    Materialize,
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Search => write!(f, "search"),
            Self::Decompose => write!(f, "decompose"),
            Self::Execute => write!(f, "execute"),
            Self::Refine => write!(f, "refine"),
            Self::Materialize => write!(f, "materialize"),
        }
    }
}

/// One entry of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Monotonic sequence number, assigned on append.
    pub seq: u64,
    /// The stage that produced the record.
    pub stage: LogStage,
    /// Dotted event name (e.g. "execute.attempt").
    pub event: String,
    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
    /// The sub-task involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<usize>,
    /// Truncated summary of the stage input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_summary: Option<String>,
    /// Truncated summary of the stage output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    /// Error description, if the event reports a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured extras.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StageRecord {
    /// Starts a record; `seq` and `timestamp` are assigned by [`RunLog::append`].
    #[must_use]
    pub fn new(stage: LogStage, event: impl Into<String>) -> Self {
        Self {
            seq: 0,
            stage,
            event: event.into(),
            timestamp: Utc::now(),
            task_id: None,
            input_summary: None,
            output_summary: None,
            error: None,
            data: None,
        }
    }

    /// Sets the sub-task id.
    #[must_use]
    pub fn task(mut self, task_id: usize) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Sets the input summary, truncated.
    #[must_use]
    pub fn input(mut self, summary: impl AsRef<str>) -> Self {
        self.input_summary = Some(summarize(summary.as_ref(), DEFAULT_SUMMARY_CHARS));
        self
    }

    /// Sets the output summary, truncated.
    #[must_use]
    pub fn output(mut self, summary: impl AsRef<str>) -> Self {
        self.output_summary = Some(summarize(summary.as_ref(), DEFAULT_SUMMARY_CHARS));
        self
    }

    /// Sets the error description.
    #[must_use]
    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Attaches structured data.
    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Truncates `text` to at most `max_chars` characters, marking the cut.
#[must_use]
pub fn summarize(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let omitted = text[cut..].chars().count();
            format!("{}… [{omitted} more chars]", &text[..cut])
        }
    }
}

/// Append-only, ordered record of everything a run did.
///
/// Safe to append from concurrent sub-task executions; order is defined by the
/// sequence number, not wall-clock time.
#[derive(Debug)]
pub struct RunLog {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    records: Mutex<Vec<StageRecord>>,
}

impl RunLog {
    /// Creates an empty log for a run.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// The run this log belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the log was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Appends a record and returns its sequence number.
    pub fn append(&self, mut record: StageRecord) -> u64 {
        let seq = {
            let mut records = self.records.lock();
            let seq = records.len() as u64;
            record.seq = seq;
            record.timestamp = Utc::now();
            records.push(record.clone());
            seq
        };
        Self::mirror(&record);
        seq
    }

    fn mirror(record: &StageRecord) {
        if let Some(ref error) = record.error {
            warn!(
                seq = record.seq,
                stage = %record.stage,
                event = %record.event,
                task_id = ?record.task_id,
                error = %error,
                "Run log: {}", record.event
            );
        } else {
            info!(
                seq = record.seq,
                stage = %record.stage,
                event = %record.event,
                task_id = ?record.task_id,
                "Run log: {}", record.event
            );
        }
    }

    /// Returns a copy of every record, in sequence order.
    #[must_use]
    pub fn records(&self) -> Vec<StageRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshots the log as the document written next to the generated files.
    #[must_use]
    pub fn to_document(
        &self,
        objective: impl Into<String>,
        project_name: impl Into<String>,
    ) -> RunLogDocument {
        RunLogDocument {
            run_id: self.run_id,
            objective: objective.into(),
            project_name: project_name.into(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            records: self.records(),
        }
    }

    /// Returns records whose event name starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<StageRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// The persisted form of a [`RunLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogDocument {
    /// The run.
    pub run_id: Uuid,
    /// The objective text.
    pub objective: String,
    /// The project name used for the run directory.
    pub project_name: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the document was written.
    pub finished_at: DateTime<Utc>,
    /// Every record, in sequence order.
    pub records: Vec<StageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_assigns_sequence() {
        let log = RunLog::new(Uuid::new_v4());
        assert!(log.is_empty());

        let first = log.append(StageRecord::new(LogStage::Driver, "run.started"));
        let second = log.append(StageRecord::new(LogStage::Decompose, "decompose.completed"));

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].event, "decompose.completed");
    }

    #[test]
    fn test_builder_fields() {
        let record = StageRecord::new(LogStage::Execute, "execute.attempt")
            .task(3)
            .input("prompt")
            .output("answer")
            .error("boom")
            .data(serde_json::json!({"attempt": 1}));

        assert_eq!(record.task_id, Some(3));
        assert_eq!(record.input_summary.as_deref(), Some("prompt"));
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_summarize_truncates_on_char_boundary() {
        assert_eq!(summarize("short", 10), "short");
        let long = "é".repeat(20);
        let summary = summarize(&long, 5);
        assert!(summary.starts_with("ééééé…"));
        assert!(summary.ends_with("[15 more chars]"));
    }

    #[test]
    fn test_events_of_type() {
        let log = RunLog::new(Uuid::new_v4());
        log.append(StageRecord::new(LogStage::Execute, "execute.attempt"));
        log.append(StageRecord::new(LogStage::Execute, "execute.completed"));
        log.append(StageRecord::new(LogStage::Refine, "refine.completed"));

        assert_eq!(log.events_of_type("execute.").len(), 2);
        assert_eq!(log.events_of_type("refine.").len(), 1);
    }

    #[test]
    fn test_document_roundtrips_records() {
        let log = RunLog::new(Uuid::new_v4());
        log.append(StageRecord::new(LogStage::Driver, "run.started").input("build a calculator"));
        let doc = log.to_document("build a calculator", "calc");

        let json = serde_json::to_string(&doc).unwrap();
        let back: RunLogDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, log.run_id());
        assert_eq!(back.records, log.records());
        assert!(back.finished_at >= back.started_at);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_dense_sequence() {
        let log = Arc::new(RunLog::new(Uuid::new_v4()));
        let mut handles = Vec::new();
        for task in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    log.append(StageRecord::new(LogStage::Execute, "execute.attempt").task(task));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = log.records();
        assert_eq!(records.len(), 200);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.seq, i as u64);
        }
    }
}
