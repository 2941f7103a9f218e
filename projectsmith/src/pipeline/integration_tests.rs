//! End-to-end runs against a scripted model.

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

use super::{Pipeline, RunFailure};
use crate::core::{Degradation, Objective, RunResult, RunState};
use crate::events::RunLogDocument;
use crate::testing::{reply, test_config, FailingSearchClient, ScriptedLlmClient};
use crate::config::PipelineConfig;
use crate::websearch::SearchClient;

const PLAN: &str = r#"{"tasks": [{"title": "Core", "description": "Add and subtract", "path": "calc.py", "language": "python"}]}"#;
const GOOD: &str = "Filename: calc.py\n```python\ndef add(a, b):\n    return a + b\n```\n";
const BAD: &str = "Filename: calc.py\n```python\ndef add(a, b:\n    return a + b\n```\n";
const REFINED: &str = "Project Name: calc\n<narrative>\nA tiny calculator module.\n</narrative>\n\nFilename: calc.py\n```python\ndef add(a, b):\n    return a + b\n```\n";

async fn run(
    llm: ScriptedLlmClient,
    config: PipelineConfig,
    search: Option<Arc<dyn SearchClient>>,
    objective: Objective,
) -> (Arc<ScriptedLlmClient>, Result<RunResult, RunFailure>) {
    let llm = Arc::new(llm);
    let pipeline = Pipeline::builder(llm.clone())
        .with_search(search)
        .with_config(config)
        .build()
        .unwrap();
    let outcome = pipeline.run(objective).await;
    (llm, outcome)
}

fn read_log(path: &Path) -> RunLogDocument {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn events(doc: &RunLogDocument) -> Vec<&str> {
    doc.records.iter().map(|r| r.event.as_str()).collect()
}

#[tokio::test]
async fn test_calculator_run_writes_one_file_and_log() {
    let tmp = tempfile::tempdir().unwrap();
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(PLAN)])
        .on("Current task: Core", [reply(GOOD)])
        .on("project finalizer", [reply(REFINED)]);

    let (llm, outcome) = run(llm, test_config(tmp.path()), None, Objective::new("Build a calculator")).await;
    let result = outcome.unwrap();

    assert_eq!(result.state, RunState::Done);
    assert!(!result.is_degraded());
    assert_eq!(result.refined_output, "A tiny calculator module.");
    assert_eq!(result.project_name, "calc");
    assert_eq!(result.created_files.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&result.created_files[0]).unwrap(),
        "def add(a, b):\n    return a + b\n"
    );
    assert!(result.run_dir.starts_with(tmp.path().canonicalize().unwrap()));
    assert_eq!(llm.call_count(), 3);

    let doc = read_log(&result.log_file);
    let names = events(&doc);
    assert_eq!(names.iter().filter(|e| **e == "driver.transition").count(), 4);
    assert!(names.contains(&"driver.completed"));
    assert_eq!(doc.project_name, "calc");
    for pair in doc.records.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }

    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("refined_output").is_some());
    assert!(json.get("created_files").is_some());
    assert!(json.get("log_file").is_some());
}

#[tokio::test]
async fn test_failed_validation_and_refinement_still_reach_done() {
    let tmp = tempfile::tempdir().unwrap();
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(PLAN)])
        .always("Current task: Core", reply(BAD))
        .always("project finalizer", reply("I could not do it."));

    let (llm, outcome) = run(llm, test_config(tmp.path()), None, Objective::new("Build a calculator")).await;
    let result = outcome.unwrap();

    assert_eq!(result.state, RunState::Done);
    assert!(result.degraded);
    assert_eq!(llm.requests_matching("Current task: Core").len(), 3);
    assert_eq!(llm.requests_matching("project finalizer").len(), 3);
    assert!(matches!(
        result.degradations[0],
        Degradation::ValidationFailed { subtask_id: 0, .. }
    ));
    assert!(matches!(result.degradations[1], Degradation::MechanicalMerge { .. }));

    assert_eq!(result.created_files.len(), 1);
    assert!(std::fs::read_to_string(&result.created_files[0])
        .unwrap()
        .contains("def add(a, b:"));
    assert!(result.refined_output.contains("merged mechanically"));
    assert!(result.refined_output.contains("No sub-task passed validation"));
}

#[tokio::test]
async fn test_decomposition_failure_is_fatal_and_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let llm = ScriptedLlmClient::new().always("project planner", reply("I have no plan."));

    let (llm, outcome) = run(llm, test_config(&out), None, Objective::new("Build a calculator")).await;
    let failure = outcome.unwrap_err();

    assert_eq!(failure.state, RunState::Decomposing);
    assert_eq!(failure.error.code(), "DECOMPOSITION_FAILED");
    assert_eq!(llm.call_count(), 3);
    let names: Vec<&str> = failure.records.iter().map(|r| r.event.as_str()).collect();
    assert!(names.contains(&"driver.failed"));
    assert_eq!(
        failure.records.last().unwrap().data.as_ref().unwrap()["to"],
        "failed"
    );
    assert!(!out.exists());
}

#[tokio::test]
async fn test_search_failure_degrades_silently() {
    let tmp = tempfile::tempdir().unwrap();
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(PLAN)])
        .on("Current task: Core", [reply(GOOD)])
        .on("project finalizer", [reply(REFINED)]);
    let search: Arc<dyn SearchClient> = Arc::new(FailingSearchClient);

    let (llm, outcome) = run(
        llm,
        test_config(tmp.path()),
        Some(search),
        Objective::new("Build a calculator").with_search(true),
    )
    .await;
    let result = outcome.unwrap();

    assert_eq!(result.state, RunState::Done);
    assert!(!result.is_degraded());
    assert!(!llm.requests()[0].user_text().contains("Search results"));
    let doc = read_log(&result.log_file);
    assert!(events(&doc).contains(&"search.failed"));
}

#[tokio::test]
async fn test_unwritable_output_dir_fails_in_materializing() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(PLAN)])
        .on("Current task: Core", [reply(GOOD)])
        .on("project finalizer", [reply(REFINED)]);

    let (_, outcome) = run(llm, test_config(&blocker), None, Objective::new("calc")).await;
    let failure = outcome.unwrap_err();

    assert_eq!(failure.state, RunState::Materializing);
    assert_eq!(failure.error.code(), "MATERIALIZE_FAILED");
}

#[tokio::test]
async fn test_concurrent_tasks_keep_plan_order() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = r#"{"tasks": [
        {"title": "Alpha", "description": "a", "path": "alpha.json"},
        {"title": "Beta", "description": "b", "path": "beta.json"},
        {"title": "Gamma", "description": "c", "path": "gamma.json"}
    ]}"#;
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(plan)])
        .always("Current task: Alpha", reply("```json\n{\"a\": 1}\n```"))
        .always("Current task: Beta", reply("```json\n{\"b\": 2}\n```"))
        .always("Current task: Gamma", reply("```json\n{\"c\": 3}\n```"))
        .always("project finalizer", reply("nothing usable"));

    let config = test_config(tmp.path()).with_max_concurrent_tasks(2);
    let (_, outcome) = run(llm, config, None, Objective::new("three configs")).await;
    let result = outcome.unwrap();

    let names: Vec<String> = result
        .created_files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["alpha.json", "beta.json", "gamma.json"]);
    assert_eq!(result.degradations.len(), 1);
}

#[tokio::test]
async fn test_refiner_failure_merges_passing_and_unvalidated_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let plan = r#"{"tasks": [
        {"title": "Core", "description": "calculator core", "path": "calc.py", "language": "python"},
        {"title": "Stats", "description": "summary script", "path": "stats.R", "language": "r"}
    ]}"#;
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(plan)])
        .on("Current task: Core", [reply(GOOD)])
        .on("Current task: Stats", [reply("```r\nsummary(c(1, 2, 3))\n```")])
        .always("project finalizer", reply("Sorry, no files this time."));

    let (llm, outcome) = run(llm, test_config(tmp.path()), None, Objective::new("calc with stats")).await;
    let result = outcome.unwrap();

    assert_eq!(result.state, RunState::Done);
    assert_eq!(llm.requests_matching("Current task: Stats").len(), 1);
    assert_eq!(result.degradations.len(), 1);
    assert!(matches!(result.degradations[0], Degradation::MechanicalMerge { .. }));

    assert_eq!(result.created_files.len(), 2);
    assert_eq!(
        std::fs::read_to_string(&result.created_files[0]).unwrap(),
        "def add(a, b):\n    return a + b\n"
    );
    assert_eq!(
        std::fs::read_to_string(&result.created_files[1]).unwrap(),
        "summary(c(1, 2, 3))\n"
    );
}

#[test]
fn test_build_rejects_invalid_config() {
    let tmp = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new());
    let outcome = Pipeline::builder(llm)
        .with_config(test_config(tmp.path()).with_max_tasks(0))
        .build();
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_file_and_directory_sharing_a_path_still_reach_done() {
    let tmp = tempfile::tempdir().unwrap();
    let refined = "Project Name: calc\n<narrative>Calc.</narrative>\n<folder_structure>\n{\"calc\": {}, \"docs\": {}}\n</folder_structure>\nFilename: calc\n```\nnotes\n```\nFilename: calc/core.py\n```python\nx = 1\n```\n";
    let llm = ScriptedLlmClient::new()
        .on("project planner", [reply(PLAN)])
        .on("Current task: Core", [reply(GOOD)])
        .on("project finalizer", [reply(refined)]);

    let (_, outcome) = run(llm, test_config(tmp.path()), None, Objective::new("calc")).await;
    let result = outcome.unwrap();

    assert_eq!(result.state, RunState::Done);
    assert_eq!(
        std::fs::read_to_string(result.run_dir.join("calc.txt")).unwrap(),
        "notes\n"
    );
    assert!(result.run_dir.join("calc/core.py").is_file());
    assert!(result.run_dir.join("docs").is_dir());
    let doc = read_log(&result.log_file);
    assert_eq!(
        events(&doc).iter().filter(|e| **e == "materialize.dir_created").count(),
        2
    );
}
