//! Run identifiers.

use uuid::Uuid;

/// Generates a new run id.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// First eight hex digits of a run id, used in directory and file names.
#[must_use]
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}
