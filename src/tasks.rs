//! The SuperGLUE task suite
//!
//! Each task knows where its raw records live, which prompt template it uses
//! by default, how raw records are normalised before templating, and how an
//! example is assigned a coarse category.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Base URL of the official SuperGLUE archives
pub const ARCHIVE_BASE_URL: &str = "https://dl.fbaipublicfiles.com/glue/superglue/data/v2";

/// Hub dataset holding the structured splits
pub const HUB_DATASET: &str = "aps/super_glue";

/// Category used by tasks without a meaningful grouping
pub const NO_CATEGORY: &str = "None";

const COPA_BUCKETS: f64 = 10.0;

/// Where a task's raw records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Zipped JSONL archive
    Archive {
        url: &'static str,
        member: &'static str,
    },
    /// Structured dataset split on the hub
    Hub {
        dataset: &'static str,
        config: &'static str,
        split: &'static str,
    },
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive { url, member } => write!(f, "{url}#{member}"),
            Self::Hub {
                dataset,
                config,
                split,
            } => write!(f, "{dataset}/{config}[{split}]"),
        }
    }
}

/// SuperGLUE task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperGlueTask {
    /// AX-b diagnostic
    Broadcoverage,
    BoolQ,
    CommitmentBank,
    WinogradSchema,
    Copa,
    MultiRc,
    Rte,
    Wic,
    Record,
    /// AX-g diagnostic
    Winogender,
}

impl SuperGlueTask {
    /// All tasks in canonical order
    pub const ALL: [Self; 10] = [
        Self::Broadcoverage,
        Self::BoolQ,
        Self::CommitmentBank,
        Self::WinogradSchema,
        Self::Copa,
        Self::MultiRc,
        Self::Rte,
        Self::Wic,
        Self::Record,
        Self::Winogender,
    ];

    /// Identifier used to look up prompt templates
    #[must_use]
    pub const fn promptsource_id(self) -> &'static str {
        match self {
            Self::Broadcoverage => "super_glue/axb",
            Self::BoolQ => "super_glue/boolq",
            Self::CommitmentBank => "super_glue/cb",
            Self::WinogradSchema => "super_glue/wsc.fixed",
            Self::Copa => "super_glue/copa",
            Self::MultiRc => "super_glue/multirc",
            Self::Rte => "super_glue/rte",
            Self::Wic => "super_glue/wic",
            Self::Record => "super_glue/record",
            Self::Winogender => "super_glue/axg",
        }
    }

    /// Short id, e.g. `boolq`
    #[must_use]
    pub fn short_id(self) -> &'static str {
        let id = self.promptsource_id();
        id.strip_prefix("super_glue/").unwrap_or(id)
    }

    /// Human-readable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Broadcoverage => "Broadcoverage",
            Self::BoolQ => "BoolQ",
            Self::CommitmentBank => "CommitmentBank",
            Self::WinogradSchema => "WinogradSchema",
            Self::Copa => "CoPA",
            Self::MultiRc => "MultiRC",
            Self::Rte => "RTE",
            Self::Wic => "WiC",
            Self::Record => "ReCoRD",
            Self::Winogender => "Winogender",
        }
    }

    /// Raw record source
    #[must_use]
    pub const fn source(self) -> DataSource {
        let config = match self {
            Self::Broadcoverage => {
                return DataSource::Archive {
                    url: "https://dl.fbaipublicfiles.com/glue/superglue/data/v2/AX-b.zip",
                    member: "AX-b/AX-b.jsonl",
                }
            }
            Self::BoolQ => "boolq",
            Self::CommitmentBank => "cb",
            Self::WinogradSchema => "wsc",
            Self::Copa => "copa",
            Self::MultiRc => "multirc",
            Self::Rte => "rte",
            Self::Wic => "wic",
            Self::Record => "record",
            Self::Winogender => "axg",
        };
        let split = match self {
            Self::Winogender => "test",
            _ => "train",
        };
        DataSource::Hub {
            dataset: HUB_DATASET,
            config,
            split,
        }
    }

    /// Template evaluated by `inspect` when none is named
    #[must_use]
    pub const fn default_template(self) -> &'static str {
        match self {
            Self::Broadcoverage | Self::CommitmentBank | Self::Rte | Self::Winogender => {
                "GPT-3 style"
            }
            Self::BoolQ | Self::WinogradSchema => "GPT-3 Style",
            Self::Copa => "…As a result, C1 or C2?",
            Self::MultiRc => "is… a correct answer?",
            Self::Wic => "GPT-3-prompt",
            Self::Record => "pick_one_option",
        }
    }

    /// Whether incomplete template renders are routine for this task
    ///
    /// COPA templates are conditional on the cause/effect question, so about
    /// half of the records never apply.
    #[must_use]
    pub const fn expects_incomplete_renders(self) -> bool {
        matches!(self, Self::Copa)
    }

    /// Normalise a raw record to the schema the templates expect
    ///
    /// AX-b archive records carry a string label; it becomes the integer
    /// class of the hub schema. `entailment` maps to 0, so it verbalizes as
    /// the first answer choice ("True", "Yes"). This deliberately inverts the
    /// `entailment -> 1` mapping of older SuperGLUE evaluation scripts.
    #[must_use]
    pub fn prepare_record(self, mut record: Value) -> Value {
        if self == Self::Broadcoverage {
            if let Some(label) = record.get("label").and_then(Value::as_str) {
                let class = u64::from(label.contains("not"));
                record["label"] = Value::from(class);
            }
        }
        record
    }

    /// Coarse grouping key of a record
    #[must_use]
    pub fn category(self, record: &Value) -> String {
        match self {
            Self::Broadcoverage => string_field(record, "logic").to_string(),
            Self::BoolQ => first_token(string_field(record, "question")).to_string(),
            Self::WinogradSchema => first_token(string_field(record, "span2_text")).to_string(),
            Self::Copa => copa_category(record),
            Self::MultiRc => first_token(string_field(record, "question")).to_lowercase(),
            Self::CommitmentBank | Self::Rte | Self::Wic | Self::Record | Self::Winogender => {
                NO_CATEGORY.to_string()
            }
        }
    }

    /// Task-specific rewrite of a rendered input
    #[must_use]
    pub fn postprocess_input(self, input: String) -> String {
        match self {
            Self::BoolQ => format!("Context: {input}")
                .replace("\nAnswer", "? Yes, or No? \nAnswer")
                .replace('\n', " "),
            _ => input,
        }
    }

    /// Tasks whose promptsource id contains any of `ids`, in canonical order
    ///
    /// Ids matching no task are logged and ignored.
    #[must_use]
    pub fn select<S: AsRef<str>>(ids: &[S]) -> Vec<Self> {
        for id in ids {
            let id = id.as_ref();
            if !Self::ALL.iter().any(|task| task.promptsource_id().contains(id)) {
                tracing::warn!(task = id, "No task matches id");
            }
        }
        Self::ALL
            .into_iter()
            .filter(|task| ids.iter().any(|id| task.promptsource_id().contains(id.as_ref())))
            .collect()
    }
}

impl fmt::Display for SuperGlueTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.promptsource_id())
    }
}

impl FromStr for SuperGlueTask {
    type Err = String;

    /// Exact short id or promptsource id; `wsc` also names `wsc.fixed`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|task| {
                task.promptsource_id() == needle
                    || task.short_id() == needle
                    || task.source_config() == Some(needle.as_str())
            })
            .ok_or_else(|| format!("Unknown task: {s}"))
    }
}

impl SuperGlueTask {
    const fn source_config(self) -> Option<&'static str> {
        match self.source() {
            DataSource::Hub { config, .. } => Some(config),
            DataSource::Archive { .. } => None,
        }
    }
}

fn string_field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// Largest share of premise tokens found in a choice, floored to a tenth
fn copa_category(record: &Value) -> String {
    let tokens = |key| -> BTreeSet<String> {
        string_field(record, key)
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    };
    let premise = tokens("premise");
    if premise.is_empty() {
        return format!("{:.1}", 0.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let overlap = ["choice1", "choice2"]
        .into_iter()
        .map(|key| tokens(key).intersection(&premise).count() as f64 / premise.len() as f64)
        .fold(0.0_f64, f64::max);

    format!("{:.1}", (overlap * COPA_BUCKETS).floor() / COPA_BUCKETS)
}
