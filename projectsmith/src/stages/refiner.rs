//! Cross-task refinement and the mechanical fallback merge.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::calls::complete_parsed;
use super::ports::StagePorts;
use super::prompts::{refiner_prompt, REFINER_SYSTEM};
use crate::core::{FileEntry, GenerationResult, MergeMode, Objective, RefinedOutput, SubTask};
use crate::errors::{RefinementError, StageCallError};
use crate::events::{LogStage, StageRecord};
use crate::llm::CompletionRequest;
use crate::parsing::{
    language_for_path, parse_blocks, sanitize_name, sanitize_path, BlockSource, FALLBACK_LANGUAGE,
    MAX_PROJECT_NAME_CHARS, OBJECTIVE_SLUG_CHARS,
};

static PROJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s#*]*project\s+name\s*:\**\s*(.+?)\s*$").expect("valid project name regex")
});

static NARRATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<narrative>(.*?)</narrative>").expect("valid narrative regex")
});

static FOLDER_STRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<folder_structure>(.*?)</folder_structure>").expect("valid folder structure regex")
});

/// A file chosen by collision resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// The chosen file.
    pub entry: FileEntry,
    /// Whether the chosen version passed (or had no) validation.
    pub passed: bool,
    /// The task that produced it.
    pub subtask_id: usize,
}

/// Collapses entries that share a path across results, walking results in task order.
///
/// A later version replaces an earlier one unless the later one failed
/// validation and the earlier one did not. The file keeps the position of its
/// first occurrence.
#[must_use]
pub fn resolve_collisions(results: &[GenerationResult]) -> Vec<ResolvedEntry> {
    let mut resolved: Vec<ResolvedEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        for (i, entry) in result.entries.iter().enumerate() {
            let status = result.checks.get(i).map_or(result.status, |c| c.status);
            let candidate = ResolvedEntry {
                entry: entry.clone(),
                passed: status.is_acceptable(),
                subtask_id: result.subtask_id,
            };
            match index.get(&entry.path) {
                Some(&at) => {
                    let current = &mut resolved[at];
                    if candidate.passed || !current.passed {
                        *current = candidate;
                    } else {
                        debug!(
                            path = %entry.path,
                            kept_from = current.subtask_id,
                            rejected_from = result.subtask_id,
                            "Keeping earlier passing version"
                        );
                    }
                }
                None => {
                    index.insert(entry.path.clone(), resolved.len());
                    resolved.push(candidate);
                }
            }
        }
    }
    resolved
}

/// Collects directory paths from a `<folder_structure>` tree.
///
/// Objects are folders and anything else is a file; only folders are returned,
/// parents before children.
fn folder_directories(tree: &Value, prefix: &str, out: &mut Vec<String>) {
    let Value::Object(children) = tree else {
        return;
    };
    for (name, child) in children {
        if !child.is_object() {
            continue;
        }
        let Some(path) = sanitize_path(&format!("{prefix}{name}")) else {
            continue;
        };
        if !out.contains(&path) {
            out.push(path.clone());
        }
        folder_directories(child, &format!("{path}/"), out);
    }
}

/// Parses the optional `<folder_structure>` block; invalid JSON yields no directories.
fn parse_folder_structure(text: &str) -> Vec<String> {
    let Some(body) = FOLDER_STRUCTURE_RE.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(body.as_str().trim()) {
        Ok(tree) => {
            let mut directories = Vec::new();
            folder_directories(&tree, "", &mut directories);
            directories
        }
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable folder structure");
            Vec::new()
        }
    }
}

fn log_conflicts(refined: &mut RefinedOutput) {
    let conflicts = refined.resolve_path_conflicts();
    for (from, to) in &conflicts.renamed {
        warn!(from = %from, to = %to, "Renamed file whose path is needed as a directory");
    }
    for dir in &conflicts.dropped_directories {
        debug!(directory = %dir, "Dropping directory that collides with a file");
    }
}

/// Parses the refiner's answer.
///
/// `objective` supplies the project name when the answer has none.
pub fn parse_refined(text: &str, objective: &str) -> Result<RefinedOutput, StageCallError> {
    let parsed = parse_blocks(text);
    if parsed.source != BlockSource::Labeled {
        return Err(StageCallError::Malformed("no labeled file blocks".into()));
    }

    let named = PROJECT_NAME_RE
        .captures(&parsed.preamble)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c| matches!(c, '*' | '`' | '"' | '\'')))
        .filter(|name| !name.trim().is_empty());
    let project_name = match named {
        Some(name) => sanitize_name(name, MAX_PROJECT_NAME_CHARS),
        None => sanitize_name(objective, OBJECTIVE_SLUG_CHARS),
    };

    let narrative = match NARRATIVE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim().to_string(),
        None => {
            let preamble = FOLDER_STRUCTURE_RE.replace_all(&parsed.preamble, "");
            PROJECT_NAME_RE.replace_all(&preamble, "").trim().to_string()
        }
    };
    if narrative.is_empty() {
        return Err(StageCallError::Malformed("no narrative".into()));
    }

    let mut files: Vec<FileEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for block in parsed.blocks {
        let Some(path) = block.path.as_deref().and_then(sanitize_path) else {
            debug!(raw = ?block.path, "Dropping refined block with unusable path");
            continue;
        };
        let language = block
            .language
            .or_else(|| language_for_path(&path).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string());
        let entry = FileEntry::new(path, language, block.content);
        match index.get(&entry.path) {
            Some(&at) => files[at] = entry,
            None => {
                index.insert(entry.path.clone(), files.len());
                files.push(entry);
            }
        }
    }
    if files.is_empty() {
        return Err(StageCallError::Malformed("no file block with a usable path".into()));
    }

    let mut refined = RefinedOutput {
        project_name,
        narrative,
        files,
        directories: parse_folder_structure(text),
        mode: MergeMode::Synthesized,
    };
    log_conflicts(&mut refined);
    Ok(refined)
}

/// Builds a deliverable without a model: every passing result, later tasks
/// winning collisions.
///
/// When no result passed, failed content is used instead so the deliverable is
/// never empty, and the narrative says so.
#[must_use]
pub fn mechanical_merge(
    objective: &Objective,
    tasks: &[SubTask],
    results: &[GenerationResult],
    reason: &str,
) -> RefinedOutput {
    let passing: Vec<GenerationResult> = results
        .iter()
        .filter(|r| r.is_acceptable())
        .cloned()
        .collect();
    let fell_back = passing.is_empty();
    let source = if fell_back { results } else { passing.as_slice() };

    let files: Vec<FileEntry> = resolve_collisions(source)
        .into_iter()
        .map(|r| r.entry)
        .collect();

    let mut narrative = format!(
        "{}\n\nThese files were merged mechanically because refinement failed: {reason}\n",
        objective.text.trim()
    );
    if fell_back {
        narrative.push_str(
            "\nNo sub-task passed validation; the files below include content that failed validation.\n",
        );
    }
    narrative.push_str("\nSub-tasks:\n");
    for task in tasks {
        let status = results
            .iter()
            .find(|r| r.subtask_id == task.id)
            .map_or_else(|| "missing".to_string(), |r| r.status.to_string());
        let _ = writeln!(narrative, "- {}. {}: {status}", task.id + 1, task.title);
    }

    let mut merged = RefinedOutput {
        project_name: sanitize_name(&objective.text, OBJECTIVE_SLUG_CHARS),
        narrative,
        files,
        directories: Vec::new(),
        mode: MergeMode::Mechanical,
    };
    log_conflicts(&mut merged);
    merged
}

/// Merges sub-task results into one deliverable with a model call.
#[derive(Debug, Clone)]
pub struct Refiner {
    ports: StagePorts,
}

impl Refiner {
    /// Creates a refiner.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self { ports }
    }

    /// Refines `results`; the caller falls back to [`mechanical_merge`] on error.
    pub async fn refine(
        &self,
        objective: &Objective,
        tasks: &[SubTask],
        results: &[GenerationResult],
    ) -> Result<RefinedOutput, RefinementError> {
        let config = &self.ports.config;
        let files: Vec<(FileEntry, bool)> = resolve_collisions(results)
            .into_iter()
            .map(|r| (r.entry, r.passed))
            .collect();
        let failing = files.iter().filter(|(_, passed)| !passed).count();

        self.ports.run_log.append(
            StageRecord::new(LogStage::Refine, "refine.started").data(json!({
                "files": files.len(),
                "failing_files": failing,
            })),
        );

        let request = CompletionRequest::new(
            config.models.refiner.clone(),
            REFINER_SYSTEM,
            refiner_prompt(objective, tasks, &files, results),
        )
        .with_max_tokens(config.models.max_tokens)
        .with_temperature(config.models.temperature);

        let parse = |text: &str| parse_refined(text, &objective.text);
        match complete_parsed(&self.ports, LogStage::Refine, &request, parse).await {
            Ok(retried) => {
                let refined = retried.value;
                info!(
                    project = %refined.project_name,
                    files = refined.files.len(),
                    attempts = retried.attempts,
                    "Refinement completed"
                );
                self.ports.run_log.append(
                    StageRecord::new(LogStage::Refine, "refine.completed")
                        .output(&refined.narrative)
                        .data(json!({
                            "project_name": refined.project_name,
                            "files": refined.files.iter().map(|f| &f.path).collect::<Vec<_>>(),
                            "attempts": retried.attempts,
                        })),
                );
                Ok(refined)
            }
            Err(failure) => {
                warn!(attempts = failure.attempts, error = %failure.error, "Refinement failed");
                self.ports.run_log.append(
                    StageRecord::new(LogStage::Refine, "refine.failed")
                        .error(&failure.error)
                        .data(json!({ "attempts": failure.attempts })),
                );
                Err(RefinementError::new(failure.error, failure.attempts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntryCheck, ValidationStatus};
    use crate::testing::{reply, test_config, ScriptedLlmClient, StageFixture};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn result(id: usize, files: &[(&str, &str, ValidationStatus)]) -> GenerationResult {
        let entries: Vec<FileEntry> = files
            .iter()
            .map(|(path, content, _)| FileEntry::new(*path, "python", *content))
            .collect();
        let checks: Vec<EntryCheck> = files
            .iter()
            .map(|(path, _, status)| EntryCheck {
                path: (*path).to_string(),
                language: "python".into(),
                status: *status,
                diagnostic: None,
            })
            .collect();
        GenerationResult {
            subtask_id: id,
            raw_output: String::new(),
            entries,
            status: ValidationStatus::combine(checks.iter().map(|c| c.status)),
            checks,
            attempts: 1,
            diagnostics: Vec::new(),
            failure: None,
        }
    }

    use ValidationStatus::{Failed, Passed};

    #[test]
    fn test_later_passing_version_wins() {
        let results = vec![
            result(0, &[("a.py", "v0", Passed), ("b.py", "b", Passed)]),
            result(1, &[("a.py", "v1", Passed)]),
        ];
        let resolved = resolve_collisions(&results);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].entry.content, "v1");
        assert_eq!(resolved[0].subtask_id, 1);
        assert_eq!(resolved[1].entry.path, "b.py");
    }

    #[test]
    fn test_failed_later_version_does_not_replace_passing() {
        let results = vec![
            result(0, &[("a.py", "good", Passed)]),
            result(1, &[("a.py", "bad", Failed)]),
        ];
        let resolved = resolve_collisions(&results);
        assert_eq!(resolved[0].entry.content, "good");
        assert!(resolved[0].passed);
    }

    #[test]
    fn test_both_failed_later_wins() {
        let results = vec![
            result(0, &[("a.py", "bad0", Failed)]),
            result(1, &[("a.py", "bad1", Failed)]),
        ];
        let resolved = resolve_collisions(&results);
        assert_eq!(resolved[0].entry.content, "bad1");
        assert!(!resolved[0].passed);
    }

    #[test]
    fn test_parse_refined_full_answer() {
        let text = "Project Name: Simple Calc!\n<narrative>\nA calculator.\n</narrative>\n\nFilename: calc.py\n```python\nx = 1\n```\nFilename: ../../etc/passwd\n```\nroot\n```\nFilename: calc.py\n```python\nx = 2\n```\nFilename: README.md\n```\n# Calc\n```\n";
        let refined = parse_refined(text, "build a calculator").unwrap();

        assert_eq!(refined.project_name, "Simple_Calc");
        assert_eq!(refined.narrative, "A calculator.");
        let paths: Vec<&str> = refined.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["calc.py", "etc/passwd", "README.md"]);
        assert_eq!(refined.files[0].content, "x = 2\n");
        assert_eq!(refined.files[2].language, "markdown");
        assert_eq!(refined.mode, MergeMode::Synthesized);
        assert_eq!(refined.first_invalid_path(), None);
    }

    #[test]
    fn test_parse_refined_preamble_narrative_and_fallback_name() {
        let text = "This is the finished tool.\n\nFilename: main.py\n```python\nprint(1)\n```\n";
        let refined = parse_refined(text, "make a tool").unwrap();
        assert_eq!(refined.narrative, "This is the finished tool.");
        assert_eq!(refined.project_name, "make_a_tool");
    }

    #[test]
    fn test_parse_refined_rejects_missing_parts() {
        assert!(parse_refined("Just prose, no files.", "x").is_err());
        assert!(parse_refined("Filename: a.py\n```python\nx = 1\n```\n", "x").is_err());
        assert!(parse_refined("Intro\nFilename: ..\n```\nx\n```\n", "x").is_err());
    }

    #[test]
    fn test_mechanical_merge_uses_passing_results() {
        let tasks = vec![SubTask::new(0, "Core", "c"), SubTask::new(1, "Tests", "t")];
        let results = vec![
            result(0, &[("calc.py", "good", Passed)]),
            result(1, &[("calc.py", "bad", Failed), ("test_calc.py", "t", Failed)]),
        ];
        let merged = mechanical_merge(&Objective::new("Build a calculator"), &tasks, &results, "timeout");

        assert_eq!(merged.mode, MergeMode::Mechanical);
        assert_eq!(merged.files.len(), 1);
        assert_eq!(merged.files[0].content, "good");
        assert!(merged.narrative.contains("refinement failed: timeout"));
        assert!(merged.narrative.contains("- 2. Tests: failed"));
        assert_eq!(merged.project_name, "Build_a_calculator");
    }

    #[test]
    fn test_parse_refined_reads_folder_structure() {
        let text = "Project Name: site
<narrative>A site.</narrative>
<folder_structure>
{\"src\": {\"app.js\": null, \"components\": {}}, \"public\": {}, \"../escape\": {}, \"README.md\": null}
</folder_structure>
Filename: src/app.js
```javascript
let a = 1;
```
";
        let refined = parse_refined(text, "site").unwrap();

        assert_eq!(
            refined.directories,
            vec!["escape", "public", "src", "src/components"]
        );
        assert_eq!(refined.narrative, "A site.");
        assert_eq!(refined.files.len(), 1);
    }

    #[test]
    fn test_parse_refined_tolerates_bad_folder_structure() {
        let text = "The tool.
<folder_structure>
{not json
</folder_structure>
Filename: main.py
```python
print(1)
```
";
        let refined = parse_refined(text, "tool").unwrap();
        assert!(refined.directories.is_empty());
        assert_eq!(refined.narrative, "The tool.");
    }

    #[test]
    fn test_parse_refined_renames_file_used_as_directory() {
        let text = "Project Name: app
<narrative>An app.</narrative>
Filename: src
```
notes
```
Filename: src/main.py
```python
print(1)
```
";
        let refined = parse_refined(text, "app").unwrap();

        let paths: Vec<&str> = refined.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src.txt", "src/main.py"]);
        assert_eq!(refined.first_invalid_path(), None);
    }

    #[test]
    fn test_mechanical_merge_renames_file_used_as_directory() {
        let tasks = vec![SubTask::new(0, "Docs", "d"), SubTask::new(1, "Docs pages", "p")];
        let results = vec![
            result(0, &[("docs", "index", Passed)]),
            result(1, &[("docs/intro.md", "intro", Passed)]),
        ];
        let merged = mechanical_merge(&Objective::new("docs"), &tasks, &results, "timeout");

        let paths: Vec<&str> = merged.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["docs.txt", "docs/intro.md"]);
        assert_eq!(merged.first_invalid_path(), None);
    }

    #[test]
    fn test_mechanical_merge_falls_back_to_failed_content() {
        let tasks = vec![SubTask::new(0, "Core", "c")];
        let results = vec![result(0, &[("calc.py", "bad", Failed)])];
        let merged = mechanical_merge(&Objective::new("calc"), &tasks, &results, "malformed");

        assert_eq!(merged.files.len(), 1);
        assert!(merged.narrative.contains("No sub-task passed validation"));
    }

    #[tokio::test]
    async fn test_refine_reports_failing_files_and_parses_answer() {
        let answer = "Project Name: calc\n<narrative>Done.</narrative>\nFilename: calc.py\n```python\nx = 1\n```\n";
        let fx = StageFixture::new(
            ScriptedLlmClient::new().on("project finalizer", [reply("garbage"), reply(answer)]),
            test_config(Path::new("unused")),
        );
        let tasks = vec![SubTask::new(0, "Core", "c")];
        let results = vec![result(0, &[("calc.py", "x = (\n", Failed)])];

        let refined = Refiner::new(fx.ports.clone())
            .refine(&Objective::new("calc"), &tasks, &results)
            .await
            .unwrap();

        assert_eq!(refined.project_name, "calc");
        assert_eq!(fx.llm.call_count(), 2);
        assert!(fx.llm.requests()[0].user_text().contains("FAILED validation"));
        assert!(fx.events().contains(&"refine.completed".to_string()));
    }

    #[tokio::test]
    async fn test_refine_error_after_budget() {
        let fx = StageFixture::new(
            ScriptedLlmClient::new().always("project finalizer", reply("no files here")),
            test_config(Path::new("unused")),
        );
        let err = Refiner::new(fx.ports.clone())
            .refine(&Objective::new("calc"), &[], &[])
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert!(matches!(err.source, StageCallError::Malformed(_)));
        assert!(fx.events().contains(&"refine.failed".to_string()));
    }
}
