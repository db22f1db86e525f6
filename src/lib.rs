//! # SuperGLUE Eval
//!
//! Few-shot evaluation of sequence-to-sequence language models on the
//! SuperGLUE task suite.
//!
//! ## Method
//!
//! Every task record is verbalised by each of the task's prompt templates into
//! an `(input, label)` pair. For every pair a few-shot prompt is composed from
//! demonstrations sampled out of the same dataset, the model continues it, and
//! the continuation is scored against the label with ROUGE-L recall.
//!
//! - a template scores the mean over its examples
//! - a task scores its best template
//! - a model scores the mean over its tasks
//!
//! ## Architecture
//!
//! ```text
//! Raw records (SuperGLUE archives | datasets-server rows API)
//!        ↓
//! Prompt templates (Handlebars, `input ||| target`)
//!        ↓
//! TaskDataset (input, label, category)
//!        ↓
//! Demonstration sampling (seeded ChaCha8)
//!        ↓
//! Few-shot prompt → Generator (CLI subprocess)
//!        ↓
//! ROUGE-L recall
//!        ↓
//! Report (per template, per task, overall; 95% CI)
//! ```

pub mod config;
pub mod dataset;
pub mod download;
pub mod generator;
pub mod hub;
pub mod metrics;
pub mod prompt;
pub mod report;
pub mod rouge;
pub mod runner;
pub mod sampler;
pub mod tasks;
pub mod template;

pub use config::{parse_task_list, ConfigError, EvalConfig, GeneratorConfig, DEFAULT_TASKS};
pub use dataset::{DatasetError, DatasetStats, Example, RecordSource, RemoteRecordSource, TaskDataset};
pub use download::{ArchiveCache, DownloadConfig, DownloadError, Fetch, HttpFetcher};
pub use generator::{CommandGenerator, Generator, GeneratorError};
pub use hub::{HubClient, HubError};
pub use metrics::{bootstrap_ci, AggregatedMetrics, MetricsCollector, StatConfig};
pub use prompt::compose_prompt;
pub use report::{FullReport, ReportBuilder, ReportMetadata, ReportSummary, TaskReport};
pub use rouge::{RougeScore, RougeScorer, Scorer};
pub use runner::{EvaluationReport, RunnerError, TaskResult, TaskRunner, TemplateResult};
pub use sampler::{DemonstrationSampler, SamplerError};
pub use tasks::{DataSource, SuperGlueTask};
pub use template::{PromptTemplate, TemplateApplier, TemplateCatalog, TemplateError, Verbalized};
