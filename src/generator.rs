//! Model generation through external CLI tools.
//!
//! The evaluated model is reached by shelling out to an installed command
//! (`ollama run <model>` by default). The prompt is passed on stdin unless
//! the argument template places it with `{prompt}`; the trimmed stdout is the
//! generation.

use crate::config::GeneratorConfig;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Errors that can occur during generation
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("CLI tool not found: {0}")]
    ToolNotFound(String),

    #[error("CLI execution failed ({status}): {stderr}")]
    ExecutionFailed { status: String, stderr: String },

    #[error("Invalid argument template: {0}")]
    InvalidArgs(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Text generator under evaluation
pub trait Generator {
    /// Identifier reported in results
    fn model_id(&self) -> &str;

    /// Continuation of `prompt`
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be reached.
    fn generate(&mut self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Generator backed by a subprocess per prompt
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    model_id: String,
    config: GeneratorConfig,
    checked: bool,
}

impl CommandGenerator {
    #[must_use]
    pub fn new(model_id: &str, config: GeneratorConfig) -> Self {
        Self {
            model_id: model_id.to_string(),
            config,
            checked: false,
        }
    }

    /// Ollama generator for `model_id`
    #[must_use]
    pub fn ollama(model_id: &str) -> Self {
        Self::new(model_id, GeneratorConfig::ollama())
    }

    /// Check if the CLI tool is available
    #[must_use]
    pub fn is_available(&self) -> bool {
        which::which(&self.config.command).is_ok()
    }

    /// Arguments for one invocation, and whether the prompt goes to stdin
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgs` if the template has unbalanced quotes.
    #[allow(clippy::literal_string_with_formatting_args)]
    pub fn build_args(&self, prompt: &str) -> Result<(Vec<String>, bool), GeneratorError> {
        let words = shell_words::split(&self.config.args_template)
            .map_err(|e| GeneratorError::InvalidArgs(format!("{}: {e}", self.config.args_template)))?;

        let prompt_in_args = words.iter().any(|w| w.contains("{prompt}"));
        let args = words
            .into_iter()
            .map(|w| w.replace("{model}", &self.model_id).replace("{prompt}", prompt))
            .collect();

        Ok((args, !prompt_in_args))
    }
}

impl Generator for CommandGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn generate(&mut self, prompt: &str) -> Result<String, GeneratorError> {
        if !self.checked {
            if !self.is_available() {
                return Err(GeneratorError::ToolNotFound(self.config.command.clone()));
            }
            self.checked = true;
        }

        let (args, via_stdin) = self.build_args(prompt)?;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&args)
            .stdin(if via_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        // Stdin is written from its own thread while stdout is drained
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            std::thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit without reading its input
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(GeneratorError::IoError(std::io::Error::other(
                        "stdin writer panicked",
                    )))
                }
            }
        }

        if !output.status.success() {
            return Err(GeneratorError::ExecutionFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::trace!(model = %self.model_id, chars = response.len(), "Generation received");
        Ok(response)
    }
}
