//! Parsing model output.
//!
//! This module provides:
//! - The labeled-block grammar shared by the executor and the refiner
//! - JSON extraction for the decomposer
//! - Path sanitization and language inference

mod blocks;
mod json;
mod paths;

pub use blocks::{
    into_entries, parse_blocks, Block, BlockSource, EntryNaming, ParsedBlocks, FALLBACK_LANGUAGE,
};
pub use json::{extract_json, json_values};
pub use paths::{
    extension_for_language, language_for_path, normalize_language, sanitize_name, sanitize_path,
    sanitize_segment, MAX_PROJECT_NAME_CHARS, OBJECTIVE_SLUG_CHARS,
};
