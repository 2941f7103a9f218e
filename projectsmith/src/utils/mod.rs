//! Utility functions for run identifiers and timestamps.

mod ids;
pub mod timestamps;

pub use ids::{generate_run_id, short_id};
pub use timestamps::{run_stamp, Timestamp};
