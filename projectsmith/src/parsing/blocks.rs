//! The labeled-block output grammar.
//!
//! Model output is scanned line by line for file blocks:
//!
//! ````text
//! Filename: src/main.py
//! ```python
//! print("hi")
//! ```
//! ````
//!
//! A marker line starts with `Filename:` (case insensitive, optionally behind
//! markdown decoration such as `###` or `**`). It must be followed, blank lines
//! allowed, by an opening fence of three or more backticks. The block ends at a
//! fence at least as long as the opening one; an unterminated block runs to the
//! end of the text. A marker without a fence is ignored.
//!
//! Without any markers, every fenced block becomes an untitled block; without
//! fences either, the whole text is one untitled block.

use serde::{Deserialize, Serialize};

use super::paths::{extension_for_language, language_for_path, normalize_language, sanitize_path};
use crate::core::FileEntry;

/// Language used when nothing else identifies an entry.
pub const FALLBACK_LANGUAGE: &str = "text";

/// How the blocks were recovered from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    /// `Filename:` markers were found.
    Labeled,
    /// No markers; unlabeled fences were used.
    Fenced,
    /// No markers and no fences; the text itself is the block.
    Plain,
}

/// One block recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Raw path from the marker, if any.
    pub path: Option<String>,
    /// Fence language tag, if any.
    pub language: Option<String>,
    /// Block body, ending with a newline unless empty.
    pub content: String,
}

/// Result of scanning a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlocks {
    /// Blocks in document order.
    pub blocks: Vec<Block>,
    /// Which grammar rule produced them.
    pub source: BlockSource,
    /// Text before the first marker (the whole text if there is none).
    pub preamble: String,
}

impl ParsedBlocks {
    /// Returns true if no block was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn marker_path(line: &str) -> Option<&str> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '-' | '>') || c.is_whitespace());
    let head = stripped.get(..9)?;
    if !head.eq_ignore_ascii_case("filename:") {
        return None;
    }
    Some(
        stripped[9..]
            .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\'') || c.is_whitespace()),
    )
}

/// Returns the fence length and language tag of an opening fence line.
fn fence_open(line: &str) -> Option<(usize, Option<String>)> {
    let trimmed = line.trim_start();
    let len = trimmed.chars().take_while(|&c| c == '`').count();
    if len < 3 {
        return None;
    }
    let rest = trimmed[len..].trim();
    if rest.contains('`') {
        return None;
    }
    let tag = rest
        .split_whitespace()
        .next()
        .map(normalize_language)
        .filter(|t| !t.is_empty());
    Some((len, tag))
}

fn fence_close(line: &str, open_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= open_len && trimmed.chars().all(|c| c == '`')
}

fn join_body(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// Reads a fenced body starting at `open` (the fence line). Returns the block
/// body, the tag, and the index of the first line after the block.
fn read_fenced(lines: &[&str], open: usize) -> Option<(String, Option<String>, usize)> {
    let (len, tag) = fence_open(lines[open])?;
    let body_start = open + 1;
    let close = lines[body_start..]
        .iter()
        .position(|l| fence_close(l, len))
        .map(|p| body_start + p);
    match close {
        Some(close) => Some((join_body(&lines[body_start..close]), tag, close + 1)),
        None => Some((join_body(&lines[body_start..]), tag, lines.len())),
    }
}

/// Scans `text` for file blocks.
#[must_use]
pub fn parse_blocks(text: &str) -> ParsedBlocks {
    let lines: Vec<&str> = text.lines().collect();
    let mut labeled = Vec::new();
    let mut fenced = Vec::new();
    let mut first_marker: Option<usize> = None;
    let mut i = 0;

    while i < lines.len() {
        if let Some(path) = marker_path(lines[i]) {
            first_marker.get_or_insert(i);
            let mut j = i + 1;
            while j < lines.len() && lines[j].trim().is_empty() {
                j += 1;
            }
            if j < lines.len() {
                if let Some((content, language, next)) = read_fenced(&lines, j) {
                    labeled.push(Block {
                        path: Some(path.to_string()).filter(|p| !p.is_empty()),
                        language,
                        content,
                    });
                    i = next;
                    continue;
                }
            }
            i += 1;
        } else if let Some((content, language, next)) = read_fenced(&lines, i) {
            fenced.push(Block {
                path: None,
                language,
                content,
            });
            i = next;
        } else {
            i += 1;
        }
    }

    let preamble = match first_marker {
        Some(idx) => lines[..idx].join("\n").trim().to_string(),
        None => text.trim().to_string(),
    };

    if first_marker.is_some() {
        return ParsedBlocks {
            blocks: labeled,
            source: BlockSource::Labeled,
            preamble,
        };
    }
    if !fenced.is_empty() {
        return ParsedBlocks {
            blocks: fenced,
            source: BlockSource::Fenced,
            preamble,
        };
    }
    let body = text.trim();
    let blocks = if body.is_empty() {
        Vec::new()
    } else {
        vec![Block {
            path: None,
            language: None,
            content: format!("{body}\n"),
        }]
    };
    ParsedBlocks {
        blocks,
        source: BlockSource::Plain,
        preamble,
    }
}

/// Naming context for untitled blocks.
#[derive(Debug, Clone, Copy)]
pub struct EntryNaming<'a> {
    /// Sub-task id, used in generated names.
    pub task_id: usize,
    /// Path proposed for the task; given to the first untitled block.
    pub target_path: Option<&'a str>,
    /// Language proposed for the task.
    pub language_hint: Option<&'a str>,
}

/// Turns parsed blocks into file entries with sanitized paths and resolved languages.
///
/// Language resolution: fence tag, then path extension, then the task hint,
/// then `text`. The first untitled block takes the task's target path; the
/// rest are named `task-<id>-<n>.<ext>`.
#[must_use]
pub fn into_entries(parsed: &ParsedBlocks, naming: EntryNaming<'_>) -> Vec<FileEntry> {
    let target = naming.target_path.and_then(sanitize_path);
    let hint = naming
        .language_hint
        .map(normalize_language)
        .filter(|h| !h.is_empty());
    let mut target_used = false;
    let mut untitled = 0;

    parsed
        .blocks
        .iter()
        .map(|block| {
            let explicit = block.path.as_deref().and_then(sanitize_path);
            let path = match explicit {
                Some(path) => Some(path),
                None if !target_used && target.is_some() => {
                    target_used = true;
                    target.clone()
                }
                None => None,
            };

            let language = block
                .language
                .clone()
                .or_else(|| path.as_deref().and_then(language_for_path).map(str::to_string))
                .or_else(|| hint.clone())
                .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string());

            let path = path.unwrap_or_else(|| {
                untitled += 1;
                format!(
                    "task-{}-{}.{}",
                    naming.task_id,
                    untitled,
                    extension_for_language(&language)
                )
            });
            FileEntry::new(path, language, block.content.clone())
        })
        .collect()
}
