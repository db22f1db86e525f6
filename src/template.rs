//! Prompt templates
//!
//! A template is a Handlebars string rendered against one raw task record.
//! The rendered text is split on the first `|||` into the model input and the
//! reference target. Catalogs are YAML maps from promptsource id to the
//! templates of that task; a built-in catalog covering every task ships with
//! the crate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use superglue_eval::template::{TemplateApplier, TemplateCatalog};
//!
//! let catalog = TemplateCatalog::builtin()?;
//! let template = catalog.get("super_glue/rte", "GPT-3 style")?;
//! let applier = TemplateApplier::new(template)?;
//! let pair = applier.apply(&record)?; // None when the template does not apply
//! ```

use handlebars::{handlebars_helper, Handlebars};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../templates/super_glue.yaml");
const TEMPLATE_NAME: &str = "prompt";

/// Separator between input and target in a rendered template
pub const TARGET_SEPARATOR: &str = "|||";

handlebars_helper!(replace: |text: Json, from: str, to: Json| {
    text.as_str().unwrap_or_default().replace(from, to.as_str().unwrap_or_default())
});
handlebars_helper!(lower: |text: Json| text.as_str().unwrap_or_default().to_lowercase());
// ReCoRD passages mark highlight sentences with `@highlight` lines
handlebars_helper!(highlights: |text: Json| {
    text.as_str().unwrap_or_default().replace("@highlight\n", "- ")
});

/// Template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template catalog: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse template catalog: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Template '{name}' does not compile: {source}")]
    Compile {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("Template '{name}' failed to render: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("No template '{name}' for {task}")]
    UnknownTemplate { task: String, name: String },
}

/// One prompt template of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name, unique within its task
    pub name: String,
    /// Handlebars source
    pub template: String,
    /// Verbalised label set, exposed to the template as `answer_choices`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_choices: Option<Vec<String>>,
}

/// Templates grouped by promptsource id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateCatalog {
    tasks: BTreeMap<String, Vec<PromptTemplate>>,
}

impl TemplateCatalog {
    /// Catalog shipped with the crate
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded YAML is malformed.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Load a catalog file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from YAML
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a catalog.
    pub fn from_yaml(yaml: &str) -> Result<Self, TemplateError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load and merge every catalog file matching a glob pattern
    ///
    /// Files are merged in path order; a later template replaces an earlier
    /// one of the same task and name.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or any file fails to load.
    pub fn load_glob(pattern: &str) -> Result<Self, TemplateError> {
        let mut paths = Vec::new();
        for entry in glob::glob(pattern)? {
            paths.push(entry.map_err(glob::GlobError::into_error)?);
        }
        paths.sort();

        let mut catalog = Self::default();
        for path in paths {
            tracing::debug!(path = %path.display(), "Loading template catalog");
            catalog.merge(Self::load(&path)?);
        }
        Ok(catalog)
    }

    /// Merge another catalog into this one
    pub fn merge(&mut self, other: Self) {
        for (task, templates) in other.tasks {
            let entry = self.tasks.entry(task).or_default();
            for template in templates {
                match entry.iter_mut().find(|t| t.name == template.name) {
                    Some(existing) => *existing = template,
                    None => entry.push(template),
                }
            }
        }
    }

    /// Templates of a task, in catalog order
    #[must_use]
    pub fn templates(&self, task_id: &str) -> &[PromptTemplate] {
        self.tasks.get(task_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Template by task and name
    ///
    /// # Errors
    ///
    /// Returns `UnknownTemplate` if the task has no such template.
    pub fn get(&self, task_id: &str, name: &str) -> Result<&PromptTemplate, TemplateError> {
        self.templates(task_id)
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                task: task_id.to_string(),
                name: name.to_string(),
            })
    }
}

/// A rendered `(input, target)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verbalized {
    pub input: String,
    pub target: String,
}

/// Compiled template, ready to render records
#[derive(Debug)]
pub struct TemplateApplier {
    name: String,
    answer_choices: Option<Vec<String>>,
    registry: Handlebars<'static>,
}

impl TemplateApplier {
    /// Compile a template
    ///
    /// # Errors
    ///
    /// Returns `Compile` if the Handlebars source is invalid.
    pub fn new(template: &PromptTemplate) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(false);
        registry.register_helper("replace", Box::new(replace));
        registry.register_helper("lower", Box::new(lower));
        registry.register_helper("highlights", Box::new(highlights));
        registry
            .register_template_string(TEMPLATE_NAME, &template.template)
            .map_err(|e| TemplateError::Compile {
                name: template.name.clone(),
                source: Box::new(e),
            })?;

        Ok(Self {
            name: template.name.clone(),
            answer_choices: template.answer_choices.clone(),
            registry,
        })
    }

    /// Render a record into an `(input, target)` pair
    ///
    /// Returns `None` when the rendered text has no separator or an empty
    /// target, i.e. the template does not apply to this record.
    ///
    /// # Errors
    ///
    /// Returns `Render` if a helper fails on the record.
    pub fn apply(&self, record: &Value) -> Result<Option<Verbalized>, TemplateError> {
        let mut context = match record {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        if let Some(choices) = &self.answer_choices {
            context.insert("answer_choices".to_string(), Value::from(choices.clone()));
        }

        let rendered = self
            .registry
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| TemplateError::Render {
                name: self.name.clone(),
                source: Box::new(e),
            })?;

        Ok(split_rendered(&rendered))
    }
}

fn split_rendered(rendered: &str) -> Option<Verbalized> {
    let (input, target) = rendered.split_once(TARGET_SEPARATOR)?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some(Verbalized {
        input: input.trim().to_string(),
        target: target.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tasks::SuperGlueTask;
    use serde_json::json;
    use tempfile::TempDir;

    fn applier(task: &str, name: &str) -> TemplateApplier {
        let catalog = TemplateCatalog::builtin().unwrap();
        TemplateApplier::new(catalog.get(task, name).unwrap()).unwrap()
    }

    #[test]
    fn test_builtin_catalog_covers_every_task() {
        let catalog = TemplateCatalog::builtin().unwrap();
        for task in SuperGlueTask::ALL {
            let templates = catalog.templates(task.promptsource_id());
            let minimum = match task {
                SuperGlueTask::CommitmentBank => 15,
                SuperGlueTask::Copa | SuperGlueTask::Record => 13,
                _ => 10,
            };
            assert!(templates.len() >= minimum, "{task} has {} templates", templates.len());
            assert!(
                catalog.get(task.promptsource_id(), task.default_template()).is_ok(),
                "default template missing for {task}"
            );
            for template in templates {
                assert!(TemplateApplier::new(template).is_ok(), "{} fails to compile", template.name);
            }
        }
    }

    #[test]
    fn test_apply_rte_gpt3_style() {
        let record = json!({
            "premise": "Dana Reeve died.",
            "hypothesis": "Christopher Reeve had an accident.",
            "label": 1,
            "idx": 0
        });
        let pair = applier("super_glue/rte", "GPT-3 style").apply(&record).unwrap().unwrap();
        assert_eq!(
            pair.input,
            "Dana Reeve died.\nQuestion: Christopher Reeve had an accident. True or False?"
        );
        assert_eq!(pair.target, "False");
    }

    #[test]
    fn test_apply_does_not_escape_html() {
        let record = json!({"premise": "a < b & \"c\"", "hypothesis": "x", "label": 0});
        let pair = applier("super_glue/rte", "GPT-3 style").apply(&record).unwrap().unwrap();
        assert!(pair.input.starts_with("a < b & \"c\""));
    }

    #[test]
    fn test_apply_copa_conditional() {
        let effect = json!({
            "premise": "My body cast a shadow over the grass.",
            "choice1": "The sun was rising.",
            "choice2": "The grass was cut.",
            "question": "cause",
            "label": 0
        });
        let result = applier("super_glue/copa", "…As a result, C1 or C2?").apply(&effect).unwrap();
        assert!(result.is_none());

        let why = applier("super_glue/copa", "…why? C1 or C2").apply(&effect).unwrap().unwrap();
        assert_eq!(why.target, "The sun was rising.");
        assert!(why.input.ends_with("\"The grass was cut.\"?"));
    }

    #[test]
    fn test_apply_record_entities_and_answer() {
        let record = json!({
            "passage": "P",
            "query": "Q @placeholder",
            "entities": ["Alice", "Bob"],
            "answers": ["Bob"],
        });
        let pair = applier("super_glue/record", "pick_one_option").apply(&record).unwrap().unwrap();
        assert!(pair.input.ends_with("Alice, Bob?"));
        assert_eq!(pair.target, "Bob");
    }

    #[test]
    fn test_apply_copa_unlabelled_has_no_target() {
        let record = json!({
            "premise": "P.",
            "choice1": "A.",
            "choice2": "B.",
            "question": "effect",
            "label": -1
        });
        for name in ["best_option", "choose", "…As a result, C1 or C2?"] {
            let result = applier("super_glue/copa", name).apply(&record).unwrap();
            assert!(result.is_none(), "{name} applied to an unlabelled record");
        }
    }

    #[test]
    fn test_apply_wsc_plural_pronoun() {
        let record = json!({
            "text": "The city councilmen refused the demonstrators a permit because they feared violence.",
            "span1_text": "The city councilmen",
            "span2_text": "They",
            "label": 1
        });
        let pair = applier("super_glue/wsc.fixed", "p is/are r").apply(&record).unwrap().unwrap();
        assert!(pair.input.contains("\"They\" are The city councilmen."));
        assert_eq!(pair.target, "True");

        let who = applier("super_glue/wsc.fixed", "Who or what is/are").apply(&record).unwrap().unwrap();
        assert!(who.input.ends_with("Who or what are \"they\"?"));
        assert_eq!(who.target, "The city councilmen");

        let negative = json!({"text": "t", "span1_text": "a", "span2_text": "it", "label": 0});
        let result = applier("super_glue/wsc.fixed", "Who or what is/are").apply(&negative).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_apply_record_highlights_and_continuation() {
        let record = json!({
            "passage": "Storm hits coast.\n@highlight\nHomes flooded",
            "query": "@placeholder declared an emergency.",
            "entities": ["Florida", "Texas"],
            "answers": ["Florida"],
        });
        let pair = applier("super_glue/record", "GPT-3 style (continuation)")
            .apply(&record)
            .unwrap()
            .unwrap();
        assert_eq!(pair.input, "Storm hits coast.\n- Homes flooded \n\n-");
        assert_eq!(pair.target, "Florida declared an emergency.");

        let choices = applier("super_glue/record", "trying_to_decide").apply(&record).unwrap().unwrap();
        assert!(choices.input.ends_with("between:\n- Florida\n- Texas"));

        let unanswered = json!({"passage": "p", "query": "@placeholder q", "entities": ["A"], "answers": []});
        let result = applier("super_glue/record", "GPT-3 style (continuation)").apply(&unanswered).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_apply_unlabelled_record_does_not_apply() {
        let record = json!({"premise": "p", "hypothesis": "h", "label": -1});
        let result = applier("super_glue/axg", "GPT-3 style").apply(&record).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_split_rendered() {
        assert_eq!(
            split_rendered(" in ||| out "),
            Some(Verbalized {
                input: "in".to_string(),
                target: "out".to_string()
            })
        );
        assert_eq!(split_rendered("no separator"), None);
        assert_eq!(split_rendered("in |||   "), None);
        assert_eq!(split_rendered("a ||| b ||| c").unwrap().target, "b ||| c");
    }

    #[test]
    fn test_compile_error() {
        let template = PromptTemplate {
            name: "broken".to_string(),
            template: "{{#if x}} ||| y".to_string(),
            answer_choices: None,
        };
        assert!(matches!(
            TemplateApplier::new(&template),
            Err(TemplateError::Compile { .. })
        ));
    }

    #[test]
    fn test_unknown_template() {
        let catalog = TemplateCatalog::builtin().unwrap();
        assert!(matches!(
            catalog.get("super_glue/rte", "nope"),
            Err(TemplateError::UnknownTemplate { .. })
        ));
        assert!(catalog.templates("glue/sst2").is_empty());
    }

    #[test]
    fn test_load_glob_merges_in_path_order() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("a.yaml"),
            "t/x:\n  - name: one\n    template: \"1 ||| a\"\n  - name: two\n    template: \"2 ||| a\"\n",
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("b.yaml"),
            "t/x:\n  - name: two\n    template: \"2 ||| b\"\nt/y:\n  - name: three\n    template: \"3 ||| c\"\n",
        )
        .unwrap();

        let pattern = format!("{}/*.yaml", temp_dir.path().display());
        let catalog = TemplateCatalog::load_glob(&pattern).unwrap();

        let x = catalog.templates("t/x");
        assert_eq!(x.len(), 2);
        assert_eq!(x[1].template, "2 ||| b");
        assert_eq!(catalog.templates("t/y").len(), 1);
    }
}
