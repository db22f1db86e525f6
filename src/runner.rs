//! Evaluation loop.
//!
//! For every selected task the raw records are loaded once; each template of
//! the task then yields a dataset whose examples are prompted with sampled
//! demonstrations, generated by the model and scored against their label.

use crate::config::EvalConfig;
use crate::dataset::{DatasetError, RecordSource, TaskDataset};
use crate::generator::{Generator, GeneratorError};
use crate::metrics::{best_score, overall_score, AggregatedMetrics, MetricsCollector, StatConfig};
use crate::prompt::compose_prompt;
use crate::report::{overall_line, task_line, template_line};
use crate::rouge::Scorer;
use crate::sampler::{DemonstrationSampler, SamplerError};
use crate::tasks::SuperGlueTask;
use crate::template::TemplateCatalog;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during evaluation
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("No task matches any of: {0}")]
    UnknownTask(String),

    #[error("No task produced a score")]
    NoScores,

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("Generation failed: {0}")]
    Generator(#[from] GeneratorError),
}

/// Result of one template pass
#[derive(Debug, Clone)]
pub struct TemplateResult {
    /// Template name
    pub template: String,
    /// Records dropped because the template did not apply
    pub dropped: usize,
    /// Score statistics
    pub metrics: AggregatedMetrics,
}

impl TemplateResult {
    /// Mean ROUGE-L recall
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.metrics.mean
    }
}

/// Results of every applicable template of one task
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Promptsource id
    pub task_id: String,
    /// Evaluated templates, in catalog order
    pub templates: Vec<TemplateResult>,
}

impl TaskResult {
    /// Best-scoring template
    #[must_use]
    pub fn best(&self) -> Option<&TemplateResult> {
        let means: Vec<f64> = self.templates.iter().map(TemplateResult::mean).collect();
        best_score(&means).map(|(idx, _)| &self.templates[idx])
    }

    /// Whether no template applied
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Evaluated model
    pub model_id: String,
    /// Per-task results, including skipped tasks
    pub tasks: Vec<TaskResult>,
    /// Mean of per-task best scores over scored tasks
    pub overall: f64,
}

impl EvaluationReport {
    /// Tasks with at least one scored template
    pub fn scored_tasks(&self) -> impl Iterator<Item = &TaskResult> {
        self.tasks.iter().filter(|t| !t.is_skipped())
    }

    /// Tasks no template applied to
    pub fn skipped_tasks(&self) -> impl Iterator<Item = &TaskResult> {
        self.tasks.iter().filter(|t| t.is_skipped())
    }
}

/// Task runner for executing evaluations
#[derive(Debug)]
pub struct TaskRunner {
    config: EvalConfig,
    catalog: TemplateCatalog,
}

impl TaskRunner {
    #[must_use]
    pub const fn new(config: EvalConfig, catalog: TemplateCatalog) -> Self {
        Self { config, catalog }
    }

    /// Get current configuration
    #[must_use]
    pub const fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate `generator` on every configured task
    ///
    /// Progress lines are printed to stdout as results arrive.
    ///
    /// # Errors
    ///
    /// Returns an error if no task is selected, loading or sampling fails,
    /// the generator fails, or no task produces a score.
    pub fn run<S, G, C>(&self, source: &S, generator: &mut G, scorer: &C) -> Result<EvaluationReport, RunnerError>
    where
        S: RecordSource + ?Sized,
        G: Generator + ?Sized,
        C: Scorer + ?Sized,
    {
        let tasks = SuperGlueTask::select(self.config.tasks.as_slice());
        if tasks.is_empty() {
            return Err(RunnerError::UnknownTask(self.config.tasks.join(",")));
        }

        let stats = self.config.stat_config();
        let mut sampler = DemonstrationSampler::seeded(self.config.seed, self.config.num_demonstrations);
        let model_id = generator.model_id().to_string();
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            let result = self.run_task(task, source, generator, scorer, &mut sampler, &stats)?;
            match result.best() {
                Some(best) => println!("{}", task_line(&result.task_id, best.mean())),
                None => tracing::warn!(task = %task, "No applicable template, task skipped"),
            }
            results.push(result);
        }

        let best_scores: Vec<f64> = results
            .iter()
            .filter_map(|r| r.best().map(TemplateResult::mean))
            .collect();
        let overall = overall_score(&best_scores).ok_or(RunnerError::NoScores)?;
        println!("{}", overall_line(&model_id, overall));

        Ok(EvaluationReport {
            model_id,
            tasks: results,
            overall,
        })
    }

    fn run_task<S, G, C, R>(
        &self,
        task: SuperGlueTask,
        source: &S,
        generator: &mut G,
        scorer: &C,
        sampler: &mut DemonstrationSampler<R>,
        stats: &StatConfig,
    ) -> Result<TaskResult, RunnerError>
    where
        S: RecordSource + ?Sized,
        G: Generator + ?Sized,
        C: Scorer + ?Sized,
        R: Rng,
    {
        let task_id = task.promptsource_id().to_string();
        let templates = self.catalog.templates(&task_id);
        if templates.is_empty() {
            return Ok(TaskResult {
                task_id,
                templates: Vec::new(),
            });
        }

        let records = source.load_records(task, self.config.firstn)?;
        let mut results = Vec::with_capacity(templates.len());

        for (template_idx, template) in templates.iter().enumerate() {
            let dataset = TaskDataset::build(task, template, &records, self.config.firstn)?;
            if dataset.is_empty() {
                tracing::info!(task = %task, template = %template.name, "Template not applicable, skipping");
                continue;
            }

            let progress = self.progress_bar(
                dataset.len(),
                format!("{} {}/{}", task.short_id(), template_idx + 1, templates.len()),
            );
            let collector = evaluate_dataset(&dataset, generator, scorer, sampler, &progress)?;
            progress.finish_and_clear();

            let result = TemplateResult {
                template: template.name.clone(),
                dropped: dataset.dropped(),
                metrics: collector.compute(stats),
            };
            println!("{}", template_line(&task_id, &result.template, result.mean()));
            results.push(result);
        }

        Ok(TaskResult {
            task_id,
            templates: results,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn progress_bar(&self, len: usize, message: String) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("#>-")),
        );
        bar.set_message(message);
        bar
    }
}

/// Prompt, generate and score every example of a dataset
///
/// # Errors
///
/// Returns an error if sampling or generation fails.
pub fn evaluate_dataset<G, C, R>(
    dataset: &TaskDataset,
    generator: &mut G,
    scorer: &C,
    sampler: &mut DemonstrationSampler<R>,
    progress: &ProgressBar,
) -> Result<MetricsCollector, RunnerError>
where
    G: Generator + ?Sized,
    C: Scorer + ?Sized,
    R: Rng,
{
    let mut collector = MetricsCollector::new();
    let pool = dataset.examples();

    for example in pool {
        let demonstrations = sampler.sample(example, pool)?;
        let prompt = compose_prompt(example, &demonstrations);

        let start = Instant::now();
        let prediction = generator.generate(&prompt)?;
        let latency: Duration = start.elapsed();

        let score = scorer.score(&example.label, &prediction);
        tracing::debug!(label = %example.label, prediction = %prediction, score, "Scored example");

        collector.record_score(score);
        collector.record_latency(latency);
        progress.inc(1);
    }

    Ok(collector)
}
