//! Writing the refined deliverable to disk.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::RefinedOutput;
use crate::errors::{MaterializeError, PathError};
use crate::events::{LogStage, RunLog, StageRecord};
use crate::parsing::{sanitize_name, OBJECTIVE_SLUG_CHARS};
use crate::utils::{run_stamp, short_id};

/// A run directory and traversal-safe lookups inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Wraps an existing run directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a relative path (as served to a client) to a path inside the run directory.
    ///
    /// Absolute paths, drive prefixes and `..` components are rejected rather
    /// than stripped. Existing paths are also checked after symlink resolution.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        let normalized = relative.trim().replace('\\', "/");
        let traversal = || PathError::Traversal(relative.to_string());

        if normalized.starts_with('/')
            || matches!(normalized.as_bytes(), [letter, b':', ..] if letter.is_ascii_alphabetic())
        {
            return Err(traversal());
        }

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(&normalized).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(traversal());
                }
            }
        }
        if depth == 0 {
            return Err(PathError::Empty);
        }

        if let (Ok(real), Ok(root)) = (resolved.canonicalize(), self.root.canonicalize()) {
            if !real.starts_with(&root) {
                return Err(traversal());
            }
        }
        Ok(resolved)
    }
}

/// What a successful materialization produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// The fresh run directory.
    pub run_dir: PathBuf,
    /// Every written file, in refined order.
    pub created_files: Vec<PathBuf>,
    /// The serialized run log.
    pub log_file: PathBuf,
}

/// Writes a [`RefinedOutput`] and the run log into a fresh run directory.
#[derive(Debug, Clone)]
pub struct Materializer {
    output_dir: PathBuf,
    run_log: Arc<RunLog>,
}

impl Materializer {
    /// Creates a materializer writing below `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, run_log: Arc<RunLog>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_log,
        }
    }

    /// Writes every file, then the run log.
    ///
    /// The run directory is created with `create_dir`, so an existing directory
    /// is never reused. On any failure the partially written directory is removed.
    pub async fn materialize(
        &self,
        refined: &RefinedOutput,
        objective: &str,
    ) -> Result<Materialized, MaterializeError> {
        if let Some((path, reason)) = refined.first_invalid_path() {
            return Err(MaterializeError::invalid_entry(path, reason));
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| MaterializeError::io("create output directory", &self.output_dir, e))?;
        let output_dir = tokio::fs::canonicalize(&self.output_dir)
            .await
            .map_err(|e| MaterializeError::io("resolve output directory", &self.output_dir, e))?;

        let stamp = run_stamp(&self.run_log.started_at());
        let short = short_id(&self.run_log.run_id());
        let run_dir = output_dir.join(format!("{}-{stamp}-{short}", refined.project_name));
        tokio::fs::create_dir(&run_dir)
            .await
            .map_err(|e| MaterializeError::io("create run directory", &run_dir, e))?;

        match self.write_all(&run_dir, refined, objective, &stamp, &short).await {
            Ok(materialized) => {
                info!(
                    run_dir = %materialized.run_dir.display(),
                    files = materialized.created_files.len(),
                    "Deliverable written"
                );
                Ok(materialized)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&run_dir).await {
                    warn!(run_dir = %run_dir.display(), error = %cleanup, "Failed to remove partial run directory");
                }
                Err(e)
            }
        }
    }

    async fn write_all(
        &self,
        run_dir: &Path,
        refined: &RefinedOutput,
        objective: &str,
        stamp: &str,
        short: &str,
    ) -> Result<Materialized, MaterializeError> {
        let directory = RunDirectory::new(run_dir);
        let mut created_files = Vec::with_capacity(refined.files.len());

        for relative in &refined.directories {
            let dest = directory
                .resolve(relative)
                .map_err(|e| MaterializeError::invalid_entry(relative, e.to_string()))?;
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(|e| MaterializeError::io("create directory", &dest, e))?;
            self.run_log.append(
                StageRecord::new(LogStage::Materialize, "materialize.dir_created")
                    .data(json!({ "path": relative })),
            );
        }

        for file in &refined.files {
            let dest = directory
                .resolve(&file.path)
                .map_err(|e| MaterializeError::invalid_entry(&file.path, e.to_string()))?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MaterializeError::io("create directory", parent, e))?;
            }
            tokio::fs::write(&dest, file.content.as_bytes())
                .await
                .map_err(|e| MaterializeError::io("write file", &dest, e))?;

            self.run_log.append(
                StageRecord::new(LogStage::Materialize, "materialize.file_written").data(json!({
                    "path": file.path,
                    "language": file.language,
                    "bytes": file.content.len(),
                    "sha256": hex::encode(Sha256::digest(file.content.as_bytes())),
                })),
            );
            created_files.push(dest);
        }

        let slug = sanitize_name(objective, OBJECTIVE_SLUG_CHARS);
        let mut log_name = format!("{stamp}_{slug}.log.json");
        if refined.files.iter().any(|f| f.path == log_name) {
            log_name = format!("{stamp}_{slug}_{short}.log.json");
        }
        let log_file = run_dir.join(log_name);

        self.run_log.append(
            StageRecord::new(LogStage::Materialize, "materialize.completed").data(json!({
                "run_dir": run_dir.display().to_string(),
                "files": created_files.len(),
                "directories": refined.directories.len(),
                "mode": refined.mode,
            })),
        );
        self.write_log(&log_file, objective, &refined.project_name).await?;

        Ok(Materialized {
            run_dir: run_dir.to_path_buf(),
            created_files,
            log_file,
        })
    }

    /// Rewrites the log file so it includes records appended after materialization.
    pub async fn rewrite_log(
        &self,
        materialized: &Materialized,
        objective: &str,
        project_name: &str,
    ) -> Result<(), MaterializeError> {
        self.write_log(&materialized.log_file, objective, project_name).await
    }

    async fn write_log(
        &self,
        log_file: &Path,
        objective: &str,
        project_name: &str,
    ) -> Result<(), MaterializeError> {
        let document = self.run_log.to_document(objective, project_name);
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| MaterializeError::Serialization(e.to_string()))?;
        tokio::fs::write(log_file, bytes)
            .await
            .map_err(|e| MaterializeError::io("write run log", log_file, e))
    }
}
