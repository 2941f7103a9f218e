//! Run log and event recording.
//!
//! Every stage appends [`StageRecord`]s to a shared [`RunLog`]. Appends are
//! mirrored to `tracing` so a live run can be followed in the console, and the
//! materializer serializes the whole log next to the generated files.

mod run_log;

pub use run_log::{
    summarize, LogStage, RunLog, RunLogDocument, StageRecord, DEFAULT_SUMMARY_CHARS,
};
