//! The refined deliverable.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::FileEntry;

/// How a refined output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// The refiner model synthesized the deliverable.
    Synthesized,
    /// The refiner failed and generations were merged mechanically.
    Mechanical,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthesized => write!(f, "synthesized"),
            Self::Mechanical => write!(f, "mechanical"),
        }
    }
}

/// The single source of truth for what gets written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedOutput {
    /// Sanitized project name, used in the run directory name.
    pub project_name: String,
    /// Consolidated description of the finished project.
    pub narrative: String,
    /// Final files; paths are unique and non-empty.
    pub files: Vec<FileEntry>,
    /// Extra directories to create, including empty ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<String>,
    /// How the output was produced.
    pub mode: MergeMode,
}

/// Paths changed by [`RefinedOutput::resolve_path_conflicts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathConflicts {
    /// Files moved aside because another entry needs their path as a directory.
    pub renamed: Vec<(String, String)>,
    /// Directories dropped because a file occupies them or one of their parents.
    pub dropped_directories: Vec<String>,
}

impl PathConflicts {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty() && self.dropped_directories.is_empty()
    }
}

/// Every proper parent of a `/`-separated path.
fn parents(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

impl RefinedOutput {
    /// Returns the first path that breaks the unique, non-empty invariant, or
    /// that another file needs as a directory.
    #[must_use]
    pub fn first_invalid_path(&self) -> Option<(&str, &'static str)> {
        let mut seen = HashSet::new();
        for file in &self.files {
            if file.path.trim().is_empty() {
                return Some((file.path.as_str(), "path is empty"));
            }
            if !seen.insert(file.path.as_str()) {
                return Some((file.path.as_str(), "duplicate path"));
            }
        }
        let directories: HashSet<&str> = self
            .files
            .iter()
            .flat_map(|f| parents(&f.path))
            .chain(self.directories.iter().map(String::as_str))
            .collect();
        self.files
            .iter()
            .find(|f| directories.contains(f.path.as_str()))
            .map(|f| (f.path.as_str(), "path is also a directory"))
    }

    /// Makes file and directory paths compatible with each other.
    ///
    /// A file whose path is a parent of another file is renamed with a `.txt`
    /// suffix (then `-N.txt` if that is taken). Directories that land on or
    /// under a file are dropped.
    pub fn resolve_path_conflicts(&mut self) -> PathConflicts {
        let mut conflicts = PathConflicts::default();
        let needed: HashSet<String> = self
            .files
            .iter()
            .flat_map(|f| parents(&f.path))
            .map(str::to_string)
            .collect();
        let mut taken: HashSet<String> = self
            .files
            .iter()
            .map(|f| f.path.clone())
            .chain(needed.iter().cloned())
            .collect();

        for file in &mut self.files {
            if !needed.contains(&file.path) {
                continue;
            }
            let mut renamed = format!("{}.txt", file.path);
            let mut n = 1;
            while taken.contains(&renamed) {
                renamed = format!("{}-{n}.txt", file.path);
                n += 1;
            }
            taken.insert(renamed.clone());
            let original = std::mem::replace(&mut file.path, renamed.clone());
            conflicts.renamed.push((original, renamed));
        }

        let files: HashSet<&str> = self.files.iter().map(|f| f.path.as_str()).collect();
        let (kept, dropped): (Vec<String>, Vec<String>) = std::mem::take(&mut self.directories)
            .into_iter()
            .partition(|d| !files.contains(d.as_str()) && !parents(d).any(|p| files.contains(p)));
        self.directories = kept;
        conflicts.dropped_directories = dropped;
        conflicts
    }

    /// Returns true if the output was merged mechanically.
    #[must_use]
    pub fn is_mechanical(&self) -> bool {
        self.mode == MergeMode::Mechanical
    }
}
