//! Prompt text for the model-call stages.
//!
//! The wording is part of the wire contract: the decomposer asks for JSON, the
//! executor and refiner ask for the labeled-block grammar parsed by
//! [`crate::parsing::parse_blocks`].

use std::fmt::Write as _;

use crate::core::{FileEntry, GenerationResult, Objective, SubTask};

/// System prompt for the decomposer.
pub const DECOMPOSER_SYSTEM: &str = "You are an expert project planner. You break a software \
project objective into a short, ordered list of focused sub-tasks. Each sub-task produces one \
or a few files of the final project.";

/// System prompt for the executor.
pub const EXECUTOR_SYSTEM: &str = "You are a specialized engineer executing one sub-task of a \
larger project. Produce complete, working file contents. Do not leave placeholders.";

/// System prompt for the refiner.
pub const REFINER_SYSTEM: &str = "You are an expert project finalizer and technical writer. You \
review the files produced for every sub-task, fix inconsistencies between them, and deliver \
one cohesive project with a short description.";

/// Follow-up sent when a completion stopped at the token cap.
pub const CONTINUATION: &str = "Your previous answer was cut off. Continue exactly where it \
stopped, keeping the same format. Do not repeat anything you already wrote.";

/// The file-block grammar every file-producing prompt ends with.
pub const OUTPUT_FORMAT: &str = "Write every file as a labeled block:\n\n\
Filename: relative/path/to/file.ext\n\
```language\n\
file content\n\
```\n\n\
Use one block per file and relative paths only.";

/// Builds the decomposer's user prompt.
#[must_use]
pub fn decomposer_prompt(objective: &Objective, max_tasks: usize, search: Option<&str>) -> String {
    let mut prompt = format!("Objective:\n{}\n\n", objective.text.trim());

    if let Some(ref attachment) = objective.attachment {
        let _ = write!(prompt, "Attached file content:\n{}\n\n", attachment.trim_end());
    }
    if let Some(search) = search {
        let _ = write!(prompt, "{search}\n\n");
    }

    let _ = write!(
        prompt,
        "Break the objective into at most {max_tasks} sub-tasks. Answer with a single JSON \
object and no other text:\n\
{{\"tasks\": [{{\"title\": \"...\", \"description\": \"...\", \"path\": \"suggested/file.ext\", \
\"language\": \"python\", \"search_query\": \"optional web query\"}}]}}\n\
\"path\", \"language\" and \"search_query\" are optional."
    );
    prompt
}

/// Everything the executor prompt is assembled from.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorPrompt<'a> {
    /// The run's objective.
    pub objective: &'a Objective,
    /// The task being executed.
    pub task: &'a SubTask,
    /// Every decomposed task, for orientation.
    pub all_tasks: &'a [SubTask],
    /// Formatted search results, if any.
    pub search: Option<&'a str>,
    /// Whether the attachment goes into this prompt.
    pub include_attachment: bool,
    /// Diagnostics from earlier attempts.
    pub diagnostics: &'a [String],
}

impl ExecutorPrompt<'_> {
    /// Renders the user prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let task = self.task;
        let mut prompt = format!("Project objective:\n{}\n\n", self.objective.text.trim());

        prompt.push_str("Project plan:\n");
        for t in self.all_tasks {
            let marker = if t.id == task.id { " (this task)" } else { "" };
            let _ = writeln!(prompt, "{}. {}{marker}", t.id + 1, t.title);
        }

        let _ = write!(prompt, "\nCurrent task: {}\n{}\n", task.title, task.description.trim());
        if let Some(ref path) = task.target_path {
            let _ = writeln!(prompt, "Suggested file path: {path}");
        }
        if let Some(ref language) = task.language {
            let _ = writeln!(prompt, "Language: {language}");
        }

        if self.include_attachment {
            if let Some(ref attachment) = self.objective.attachment {
                let _ = write!(prompt, "\nAttached file content:\n{}\n", attachment.trim_end());
            }
        }
        if let Some(search) = self.search {
            let _ = write!(prompt, "\n{search}\n");
        }

        if !self.diagnostics.is_empty() {
            prompt.push_str("\nYour previous answer failed validation:\n");
            for diagnostic in self.diagnostics {
                let _ = writeln!(prompt, "- {diagnostic}");
            }
            prompt.push_str("Fix these problems and answer again in full.\n");
        }

        let _ = write!(prompt, "\n{OUTPUT_FORMAT}");
        prompt
    }
}

/// Builds the refiner's user prompt from collision-resolved results.
#[must_use]
pub fn refiner_prompt(
    objective: &Objective,
    tasks: &[SubTask],
    files: &[(FileEntry, bool)],
    results: &[GenerationResult],
) -> String {
    let mut prompt = format!("Objective:\n{}\n\nSub-tasks:\n", objective.text.trim());
    for task in tasks {
        let status = results
            .iter()
            .find(|r| r.subtask_id == task.id)
            .map_or_else(|| "missing".to_string(), |r| r.status.to_string());
        let _ = writeln!(prompt, "{}. {} [{status}]", task.id + 1, task.title);
    }

    prompt.push_str("\nFiles produced so far:\n\n");
    for (entry, passed) in files {
        if !passed {
            let _ = writeln!(prompt, "(this file FAILED validation; repair it)");
        }
        let fence = fence_for(&entry.content);
        let _ = write!(
            prompt,
            "Filename: {}\n{fence}{}\n{}{fence}\n\n",
            entry.path, entry.language, entry.content
        );
    }

    prompt.push_str(
        "Review these files as one project. Fix inconsistencies between them, repair any \
file that failed validation, and add missing glue (entry points, README) if needed.\n\n\
Answer in this order:\n\
Project Name: short_name_for_the_project\n\
<narrative>\nA concise description of the finished project and how to use it.\n</narrative>\n\
<folder_structure>\n{\"src\": {\"main.py\": null}, \"docs\": {}}\n</folder_structure>\n\
The folder structure is a JSON object: folders map to objects, files map to null.\n\
Then every final file.\n\n",
    );
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}

/// A backtick fence longer than any fence line inside `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .lines()
        .map(|line| line.trim_start().chars().take_while(|&c| c == '`').count())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
