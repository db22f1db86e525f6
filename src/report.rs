//! Report generation module for evaluation results.
//!
//! Generates:
//! - the per-template, per-task and overall console lines
//! - a full report with confidence intervals, serialisable to JSON
//! - a markdown rendering with a summary table

use crate::config::EvalConfig;
use crate::metrics::StatConfig;
use crate::runner::{EvaluationReport, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tabled::{Table, Tabled};

/// `Task <id> template '<name>' ROUGE-L: <score>`
#[must_use]
pub fn template_line(task_id: &str, template: &str, score: f64) -> String {
    format!("Task {task_id} template '{template}' ROUGE-L: {score}")
}

/// `Task <id> highest ROUGE-L: <score>`
#[must_use]
pub fn task_line(task_id: &str, score: f64) -> String {
    format!("Task {task_id} highest ROUGE-L: {score}")
}

/// `Model <id> overall score: <score>`
#[must_use]
pub fn overall_line(model_id: &str, score: f64) -> String {
    format!("Model {model_id} overall score: {score}")
}

/// Full evaluation report with all analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: ReportSummary,
    /// Per-task detailed results
    pub tasks: Vec<TaskReport>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report title
    pub title: String,
    /// Evaluated model
    pub model_id: String,
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Framework version
    pub framework_version: String,
    /// Run settings
    pub run: RunSettings,
    /// Statistical configuration used
    pub stat_config: StatConfigSummary,
}

/// Settings that shaped the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub tasks: Vec<String>,
    pub firstn: Option<usize>,
    pub num_demonstrations: usize,
    pub seed: u64,
    pub use_stemmer: bool,
}

impl From<&EvalConfig> for RunSettings {
    fn from(config: &EvalConfig) -> Self {
        Self {
            tasks: config.tasks.clone(),
            firstn: config.firstn,
            num_demonstrations: config.num_demonstrations,
            seed: config.seed,
            use_stemmer: config.use_stemmer,
        }
    }
}

/// Statistical configuration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatConfigSummary {
    /// Bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level
    pub confidence: f64,
}

impl From<&StatConfig> for StatConfigSummary {
    fn from(config: &StatConfig) -> Self {
        Self {
            bootstrap_n: config.bootstrap_n,
            confidence: config.confidence,
        }
    }
}

/// High-level summary of evaluation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Mean of per-task best scores
    pub overall: f64,
    /// Tasks with a score
    pub scored_tasks: usize,
    /// Tasks no template applied to
    pub skipped_tasks: Vec<String>,
    /// Examples scored across every template
    pub total_examples: usize,
}

/// Detailed per-task report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Promptsource id
    pub task_id: String,
    /// Best template and its score
    pub best_template: Option<String>,
    pub best_score: Option<f64>,
    /// Every evaluated template
    pub templates: Vec<TemplateReport>,
}

/// Detailed per-template report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateReport {
    pub template: String,
    /// Scored examples
    pub examples: usize,
    /// Records the template did not apply to
    pub dropped: usize,
    /// Mean ROUGE-L recall with confidence interval
    pub rouge_l: MetricWithCI,
    /// Sample standard deviation of the per-example scores
    pub rouge_l_std: f64,
    /// Total generation time in milliseconds
    pub generation_ms: u64,
    /// Median per-example generation time in milliseconds
    pub latency_p50_ms: u64,
    /// 95th percentile per-example generation time in milliseconds
    pub latency_p95_ms: u64,
}

/// Metric value with confidence interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricWithCI {
    /// Point estimate
    pub value: f64,
    /// Lower bound of CI
    pub ci_lower: f64,
    /// Upper bound of CI
    pub ci_upper: f64,
}

/// Report builder for constructing full reports
pub struct ReportBuilder<'a> {
    report: &'a EvaluationReport,
    run: Option<RunSettings>,
    stat_config: StatConfig,
}

impl<'a> ReportBuilder<'a> {
    /// Build from an evaluation report
    #[must_use]
    pub fn from_evaluation_report(report: &'a EvaluationReport) -> Self {
        Self {
            report,
            run: None,
            stat_config: StatConfig::default(),
        }
    }

    /// Record the run configuration
    #[must_use]
    pub fn with_config(mut self, config: &EvalConfig) -> Self {
        self.run = Some(RunSettings::from(config));
        self.stat_config = config.stat_config();
        self
    }

    /// Build the full report
    #[must_use]
    pub fn build(self) -> FullReport {
        let tasks: Vec<TaskReport> = self.report.tasks.iter().map(task_report).collect();

        let summary = ReportSummary {
            overall: self.report.overall,
            scored_tasks: self.report.scored_tasks().count(),
            skipped_tasks: self
                .report
                .skipped_tasks()
                .map(|t| t.task_id.clone())
                .collect(),
            total_examples: tasks
                .iter()
                .flat_map(|t| &t.templates)
                .map(|t| t.examples)
                .sum(),
        };

        let run = self
            .run
            .unwrap_or_else(|| RunSettings::from(&EvalConfig::default()));

        FullReport {
            metadata: ReportMetadata {
                title: format!("SuperGLUE Evaluation: {}", self.report.model_id),
                model_id: self.report.model_id.clone(),
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                run,
                stat_config: StatConfigSummary::from(&self.stat_config),
            },
            summary,
            tasks,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn task_report(result: &TaskResult) -> TaskReport {
    let best = result.best();
    TaskReport {
        task_id: result.task_id.clone(),
        best_template: best.map(|b| b.template.clone()),
        best_score: best.map(|b| b.mean()),
        templates: result
            .templates
            .iter()
            .map(|t| TemplateReport {
                template: t.template.clone(),
                examples: t.metrics.sample_count,
                dropped: t.dropped,
                rouge_l: MetricWithCI {
                    value: t.metrics.mean,
                    ci_lower: t.metrics.ci.0,
                    ci_upper: t.metrics.ci.1,
                },
                rouge_l_std: t.metrics.std,
                generation_ms: t.metrics.latency_total.as_millis() as u64,
                latency_p50_ms: t.metrics.latency_p50.as_millis() as u64,
                latency_p95_ms: t.metrics.latency_p95.as_millis() as u64,
            })
            .collect(),
    }
}

/// Table row for text/markdown output
#[derive(Tabled)]
struct ResultTableRow {
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Template")]
    template: String,
    #[tabled(rename = "N")]
    examples: usize,
    #[tabled(rename = "ROUGE-L")]
    rouge_l: String,
    #[tabled(rename = "Std")]
    std: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "p50/p95")]
    latency: String,
    #[tabled(rename = "Best")]
    best: String,
}

impl FullReport {
    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Render report as markdown
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        // Title
        writeln!(output, "# {}", self.metadata.title).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(
            output,
            "**Framework Version:** {}",
            self.metadata.framework_version
        )
        .ok();
        writeln!(output).ok();

        // Summary
        writeln!(output, "## Summary").ok();
        writeln!(output).ok();
        writeln!(output, "| Metric | Value |").ok();
        writeln!(output, "|--------|-------|").ok();
        writeln!(output, "| Overall ROUGE-L | {:.4} |", self.summary.overall).ok();
        writeln!(output, "| Scored Tasks | {} |", self.summary.scored_tasks).ok();
        writeln!(output, "| Examples | {} |", self.summary.total_examples).ok();
        if !self.summary.skipped_tasks.is_empty() {
            writeln!(
                output,
                "| Skipped Tasks | {} |",
                self.summary.skipped_tasks.join(", ")
            )
            .ok();
        }
        writeln!(output).ok();

        // Results table
        writeln!(output, "## Template Results").ok();
        writeln!(output).ok();

        let rows: Vec<ResultTableRow> = self
            .tasks
            .iter()
            .flat_map(|task| {
                task.templates.iter().map(move |t| ResultTableRow {
                    task: task.task_id.clone(),
                    template: t.template.clone(),
                    examples: t.examples,
                    rouge_l: format!(
                        "{:.4} [{:.4}-{:.4}]",
                        t.rouge_l.value, t.rouge_l.ci_lower, t.rouge_l.ci_upper
                    ),
                    std: format!("{:.4}", t.rouge_l_std),
                    time: format!("{:.1}s", t.generation_ms as f64 / 1000.0),
                    latency: format!("{}ms/{}ms", t.latency_p50_ms, t.latency_p95_ms),
                    best: if task.best_template.as_deref() == Some(t.template.as_str()) {
                        "✓"
                    } else {
                        ""
                    }
                    .to_string(),
                })
            })
            .collect();

        let table = Table::new(rows).to_string();
        writeln!(output, "{table}").ok();
        writeln!(output).ok();

        // Configuration
        let run = &self.metadata.run;
        writeln!(output, "## Configuration").ok();
        writeln!(output).ok();
        writeln!(output, "- Tasks: {}", run.tasks.join(", ")).ok();
        writeln!(
            output,
            "- Records per task: {}",
            run.firstn.map_or_else(|| "all".to_string(), |n| n.to_string())
        )
        .ok();
        writeln!(output, "- Demonstrations: {}", run.num_demonstrations).ok();
        writeln!(output, "- Seed: {}", run.seed).ok();
        writeln!(output, "- Stemming: {}", if run.use_stemmer { "on" } else { "off" }).ok();
        writeln!(
            output,
            "- Bootstrap resamples: {}",
            self.metadata.stat_config.bootstrap_n
        )
        .ok();
        writeln!(
            output,
            "- Confidence level: {}%",
            self.metadata.stat_config.confidence * 100.0
        )
        .ok();

        output
    }
}
