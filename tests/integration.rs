//! Integration tests for superglue-eval CLI and library.
//!
//! These tests verify end-to-end functionality including:
//! - CLI commands work correctly
//! - Raw records flow from archive and hub sources into datasets
//! - The evaluation loop aggregates scores and writes reports

// Allow less strict lints for test code
#![allow(clippy::needless_raw_string_hashes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::float_cmp)]
#![allow(clippy::unwrap_used)]

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::process::Command;
use superglue_eval::download::read_jsonl_member;
use superglue_eval::{
    ArchiveCache, DatasetError, DownloadError, EvalConfig, Fetch, Generator, GeneratorError,
    HubClient, RecordSource, ReportBuilder, RougeScorer, SuperGlueTask, TaskDataset, TaskRunner,
    TemplateCatalog,
};

const BIN: &str = env!("CARGO_BIN_EXE_superglue-eval");

// ============================================================================
// Test doubles
// ============================================================================

/// Records for BoolQ and CoPA, nothing for other tasks
struct InMemoryRecords {
    loads: Cell<usize>,
}

impl InMemoryRecords {
    fn new() -> Self {
        Self { loads: Cell::new(0) }
    }
}

impl RecordSource for InMemoryRecords {
    fn load_records(&self, task: SuperGlueTask, firstn: Option<usize>) -> Result<Vec<Value>, DatasetError> {
        self.loads.set(self.loads.get() + 1);
        let records: Vec<Value> = match task {
            SuperGlueTask::BoolQ => (0..8)
                .map(|i| {
                    json!({
                        "passage": format!("Passage {i} about rivers."),
                        "question": format!("is river {i} long"),
                        "label": 1,
                        "idx": i
                    })
                })
                .collect(),
            SuperGlueTask::Copa => (0..10)
                .map(|i| {
                    json!({
                        "premise": format!("Event {i} happened."),
                        "choice1": format!("Outcome one {i}."),
                        "choice2": format!("Outcome two {i}."),
                        "question": if i % 2 == 0 { "effect" } else { "cause" },
                        "label": 0,
                        "idx": i
                    })
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(records.into_iter().take(firstn.unwrap_or(usize::MAX)).collect())
    }
}

/// Answers "Yes" and remembers every prompt
struct YesModel {
    prompts: RefCell<Vec<String>>,
}

impl Generator for YesModel {
    fn model_id(&self) -> &str {
        "yes-model"
    }

    fn generate(&mut self, prompt: &str) -> Result<String, GeneratorError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok("Yes".to_string())
    }
}

/// Serves fixed bytes per URL suffix and counts requests
struct FakeRemote {
    routes: Vec<(&'static str, Vec<u8>)>,
    requests: Cell<usize>,
}

impl Fetch for FakeRemote {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.requests.set(self.requests.get() + 1);
        self.routes
            .iter()
            .find(|(needle, _)| url.contains(needle))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| DownloadError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn axb_zip() -> Vec<u8> {
    let lines = [
        json!({"idx": 0, "sentence1": "The cat sat.", "sentence2": "A cat sat.", "label": "entailment", "logic": "Lexical entailment"}),
        json!({"idx": 1, "sentence1": "The dog ran.", "sentence2": "No dog ran.", "label": "not_entailment", "logic": "Negation"}),
        json!({"idx": 2, "sentence1": "It rained.", "sentence2": "It was wet.", "label": "entailment"}),
    ];
    let content: String = lines.iter().map(|l| format!("{l}\n")).collect();

    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        writer
            .start_file("AX-b/AX-b.jsonl", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

fn test_config(tasks: &str) -> EvalConfig {
    EvalConfig {
        tasks: superglue_eval::parse_task_list(tasks),
        progress: false,
        bootstrap_n: 200,
        ..EvalConfig::default()
    }
}

// ============================================================================
// CLI Integration Tests
// ============================================================================

#[test]
fn test_cli_help_command() {
    let output = Command::new(BIN).arg("--help").output().expect("Failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("evaluate"), "Help should list evaluate command");
    assert!(stdout.contains("tasks"), "Help should list tasks command");
    assert!(stdout.contains("inspect"), "Help should list inspect command");
}

#[test]
fn test_cli_evaluate_requires_model() {
    let output = Command::new(BIN).arg("evaluate").output().expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--model"), "Missing --model should be reported: {}", stderr);
}

#[test]
fn test_cli_tasks_lists_suite() {
    let output = Command::new(BIN).arg("tasks").output().expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for task in SuperGlueTask::ALL {
        assert!(stdout.contains(task.promptsource_id()), "{} missing", task);
    }
    assert!(stdout.contains("AX-b.zip"));
    assert!(stdout.contains("aps/super_glue/axg[test]"));
}

#[test]
fn test_cli_tasks_with_custom_catalog() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let catalog = temp_dir.path().join("catalog.yaml");
    std::fs::write(
        &catalog,
        "super_glue/rte:\n  - name: terse\n    template: \"{{premise}} ||| x\"\n",
    )
    .unwrap();

    let output = Command::new(BIN)
        .args(["tasks", "--templates", catalog.to_str().unwrap()])
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("templates (1): terse"));
    assert!(stdout.contains("templates (0)"));
}

#[test]
fn test_cli_evaluate_unknown_task_fails() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = Command::new(BIN)
        .args([
            "evaluate",
            "--model",
            "m",
            "--tasks",
            "squad",
            "--no-progress",
            "--cache-dir",
            temp_dir.path().to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No task matches"), "stderr: {}", stderr);
}

#[test]
fn test_cli_evaluate_bad_config_fails() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = temp_dir.path().join("run.yaml");
    std::fs::write(&config, "confidence: 2.0\n").unwrap();

    let output = Command::new(BIN)
        .args(["evaluate", "--model", "m", "--config", config.to_str().unwrap()])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
}

// ============================================================================
// Data source Integration Tests
// ============================================================================

#[test]
fn test_archive_to_dataset_pipeline() {
    let temp_dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote {
        routes: vec![("AX-b.zip", axb_zip())],
        requests: Cell::new(0),
    };
    let cache = ArchiveCache::new(temp_dir.path(), &remote);

    let superglue_eval::DataSource::Archive { url, member } = SuperGlueTask::Broadcoverage.source() else {
        panic!("AX-b is an archive task");
    };
    let archive = cache.maybe_download(url).unwrap();
    let again = cache.maybe_download(url).unwrap();
    assert_eq!(archive, again);
    assert_eq!(remote.requests.get(), 1);

    let records = read_jsonl_member(&archive, member, Some(2)).unwrap();
    assert_eq!(records.len(), 2);

    let catalog = TemplateCatalog::builtin().unwrap();
    let template = catalog.get("super_glue/axb", "GPT-3 style").unwrap();
    let dataset = TaskDataset::build(SuperGlueTask::Broadcoverage, template, &records, Some(2)).unwrap();

    let labels: Vec<_> = dataset.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["True", "False"]);
    let categories: Vec<_> = dataset.iter().map(|e| e.category.as_str()).collect();
    assert_eq!(categories, vec!["Lexical entailment", "Negation"]);
}

#[test]
fn test_hub_to_dataset_pipeline() {
    let rows: Vec<Value> = (0..3)
        .map(|i| {
            json!({
                "row_idx": i,
                "row": {"text": format!("Mark told Pete {i} lies."), "span1_text": "Pete", "span2_text": "he was", "label": 0, "idx": i}
            })
        })
        .collect();
    let page = serde_json::to_vec(&json!({"rows": rows, "num_rows_total": 3})).unwrap();
    let remote = FakeRemote {
        routes: vec![("config=wsc&split=train", page)],
        requests: Cell::new(0),
    };

    let superglue_eval::DataSource::Hub { dataset, config, split } = SuperGlueTask::WinogradSchema.source() else {
        panic!("WSC is a hub task");
    };
    let client = HubClient::new(&remote);
    let records = client.fetch_rows(dataset, config, split, Some(1000)).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(remote.requests.get(), 1);

    let catalog = TemplateCatalog::builtin().unwrap();
    let template = catalog.get("super_glue/wsc.fixed", "GPT-3 Style").unwrap();
    let built = TaskDataset::build(SuperGlueTask::WinogradSchema, template, &records, None).unwrap();

    assert_eq!(built.len(), 3);
    assert!(built.iter().all(|e| e.label == "No" && e.category == "he"));
}

// ============================================================================
// Evaluation Integration Tests
// ============================================================================

#[test]
fn test_full_evaluation_with_builtin_catalog() {
    let runner = TaskRunner::new(test_config("boolq,copa"), TemplateCatalog::builtin().unwrap());
    let source = InMemoryRecords::new();
    let mut model = YesModel {
        prompts: RefCell::new(Vec::new()),
    };

    let report = runner.run(&source, &mut model, &RougeScorer::default()).unwrap();

    // records are loaded once per task, not once per template
    assert_eq!(source.loads.get(), 2);
    assert_eq!(report.model_id, "yes-model");
    assert_eq!(report.tasks.len(), 2);

    let boolq = &report.tasks[0];
    assert_eq!(boolq.task_id, "super_glue/boolq");
    assert_eq!(boolq.templates.len(), 10);
    for template in &boolq.templates {
        // True/False templates never match a "Yes" answer
        let expected = match template.template.as_str() {
            "after_reading" | "exercise" | "valid_binary" => 0.0,
            _ => 1.0,
        };
        assert_eq!(template.mean(), expected, "{}", template.template);
    }
    assert_eq!(boolq.best().unwrap().template, "GPT-3 Style");

    let copa = &report.tasks[1];
    assert_eq!(copa.templates.len(), 13);
    let by_name = |name: &str| copa.templates.iter().find(|t| t.template == name).unwrap();
    let effect_only = by_name("…As a result, C1 or C2?");
    assert_eq!(effect_only.metrics.sample_count, 5);
    assert_eq!(effect_only.dropped, 5);
    assert_eq!(by_name("…why? C1 or C2").metrics.sample_count, 5);
    assert_eq!(by_name("best_option").metrics.sample_count, 10);
    assert_eq!(copa.best().unwrap().mean(), 0.0);

    assert_eq!(report.overall, 0.5);

    let prompts = model.prompts.borrow();
    // four cause/effect-conditional COPA templates see half of the records
    assert_eq!(prompts.len(), 8 * 10 + 4 * 5 + 9 * 10);
    for prompt in prompts.iter() {
        assert_eq!(prompt.matches("Input: ").count(), 4);
        assert!(prompt.ends_with(" Prediction:"));
    }
}

#[test]
fn test_evaluation_is_reproducible() {
    let run = || {
        let runner = TaskRunner::new(test_config("copa"), TemplateCatalog::builtin().unwrap());
        let mut model = YesModel {
            prompts: RefCell::new(Vec::new()),
        };
        runner
            .run(&InMemoryRecords::new(), &mut model, &RougeScorer::default())
            .unwrap();
        model.prompts.into_inner()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_report_json_written() {
    let config = test_config("boolq");
    let runner = TaskRunner::new(config.clone(), TemplateCatalog::builtin().unwrap());
    let mut model = YesModel {
        prompts: RefCell::new(Vec::new()),
    };
    let evaluation = runner
        .run(&InMemoryRecords::new(), &mut model, &RougeScorer::default())
        .unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("report.json");
    ReportBuilder::from_evaluation_report(&evaluation)
        .with_config(&config)
        .build()
        .save_json(&path)
        .unwrap();

    let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["metadata"]["model_id"], "yes-model");
    assert_eq!(json["summary"]["overall"], 1.0);
    assert_eq!(json["tasks"][0]["templates"].as_array().unwrap().len(), 10);
}
