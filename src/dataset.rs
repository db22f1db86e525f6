//! Task datasets
//!
//! A `TaskDataset` is the list of `(input, label, category)` examples one
//! prompt template produces for one task. Raw records are loaded once per
//! task through a [`RecordSource`] and then rendered by each template in turn.

use crate::download::{read_jsonl_member, ArchiveCache, DownloadConfig, DownloadError, HttpFetcher};
use crate::hub::{HubClient, HubError};
use crate::tasks::{DataSource, SuperGlueTask};
use crate::template::{PromptTemplate, TemplateApplier, TemplateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while building a dataset
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// One verbalised example
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Example {
    /// Prompt text
    pub input: String,
    /// Reference answer
    pub label: String,
    /// Grouping key, reported only
    pub category: String,
}

impl Example {
    #[must_use]
    pub fn new(input: impl Into<String>, label: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            label: label.into(),
            category: category.into(),
        }
    }
}

/// Provider of raw task records
pub trait RecordSource {
    /// First `firstn` raw records of a task, in source order
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be fetched or decoded.
    fn load_records(&self, task: SuperGlueTask, firstn: Option<usize>) -> Result<Vec<Value>, DatasetError>;
}

/// Records from the official archives and the dataset hub
#[derive(Debug)]
pub struct RemoteRecordSource {
    archives: ArchiveCache<HttpFetcher>,
    hub: HubClient<HttpFetcher>,
}

impl RemoteRecordSource {
    /// Build the HTTP-backed source
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &DownloadConfig) -> Result<Self, DatasetError> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self {
            archives: ArchiveCache::new(&config.cache_dir, fetcher.clone()),
            hub: HubClient::new(fetcher),
        })
    }
}

impl RecordSource for RemoteRecordSource {
    fn load_records(&self, task: SuperGlueTask, firstn: Option<usize>) -> Result<Vec<Value>, DatasetError> {
        let records = match task.source() {
            DataSource::Archive { url, member } => {
                let archive = self.archives.maybe_download(url)?;
                read_jsonl_member(&archive, member, firstn)?
            }
            DataSource::Hub {
                dataset,
                config,
                split,
            } => self.hub.fetch_rows(dataset, config, split, firstn)?,
        };
        tracing::info!(task = %task, records = records.len(), "Loaded raw records");
        Ok(records)
    }
}

/// Examples of one task rendered by one template
#[derive(Debug, Clone)]
pub struct TaskDataset {
    task: SuperGlueTask,
    template: String,
    firstn: Option<usize>,
    examples: Vec<Example>,
    dropped: usize,
}

impl TaskDataset {
    /// Render raw records into examples
    ///
    /// Records the template does not apply to are dropped. At most `firstn`
    /// records are considered.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to compile or render.
    pub fn build(
        task: SuperGlueTask,
        template: &PromptTemplate,
        records: &[Value],
        firstn: Option<usize>,
    ) -> Result<Self, DatasetError> {
        let applier = TemplateApplier::new(template)?;
        let considered = firstn.map_or(records, |n| &records[..n.min(records.len())]);

        let mut examples = Vec::with_capacity(considered.len());
        let mut dropped = 0;
        for raw in considered {
            let record = task.prepare_record(raw.clone());
            match applier.apply(&record)? {
                Some(pair) => examples.push(Example {
                    input: task.postprocess_input(pair.input),
                    label: pair.target,
                    category: task.category(&record),
                }),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            if task.expects_incomplete_renders() {
                tracing::trace!(task = %task, template = %template.name, dropped, "Template does not apply to some records");
            } else {
                tracing::warn!(task = %task, template = %template.name, dropped, "Dropped records with incomplete renders");
            }
        }

        Ok(Self {
            task,
            template: template.name.clone(),
            firstn,
            examples,
            dropped,
        })
    }

    /// Load records from `source` and render them
    ///
    /// # Errors
    ///
    /// Returns an error if loading or rendering fails.
    pub fn load(
        task: SuperGlueTask,
        template: &PromptTemplate,
        source: &impl RecordSource,
        firstn: Option<usize>,
    ) -> Result<Self, DatasetError> {
        let records = source.load_records(task, firstn)?;
        Self::build(task, template, &records, firstn)
    }

    #[must_use]
    pub const fn task(&self) -> SuperGlueTask {
        self.task
    }

    /// Name of the template that produced the examples
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub const fn firstn(&self) -> Option<usize> {
        self.firstn
    }

    #[must_use]
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Records skipped because the template did not apply
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    /// Per-category example counts
    #[must_use]
    pub fn stats(&self) -> DatasetStats {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for example in &self.examples {
            *counts.entry(example.category.as_str()).or_default() += 1;
        }

        let mut categories: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(category, count)| (category.to_string(), count))
            .collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        DatasetStats {
            total_examples: self.examples.len(),
            dropped: self.dropped,
            categories,
        }
    }
}

/// Statistics about a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    /// Examples kept
    pub total_examples: usize,
    /// Records dropped as incomplete renders
    pub dropped: usize,
    /// `(category, count)`, most frequent first
    pub categories: Vec<(String, usize)>,
}
