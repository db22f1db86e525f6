//! Few-shot prompt composition

use crate::dataset::Example;

/// Render demonstrations followed by the target
///
/// Each demonstration becomes `Input: {input} Prediction: {label}`; the
/// target ends the prompt as `Input: {input} Prediction:` so the model
/// continues with its prediction. Lines are joined by `\n`.
#[must_use]
pub fn compose_prompt(target: &Example, demonstrations: &[&Example]) -> String {
    let mut prompt = String::new();
    for demo in demonstrations {
        prompt.push_str("Input: ");
        prompt.push_str(&demo.input);
        prompt.push_str(" Prediction: ");
        prompt.push_str(&demo.label);
        prompt.push('\n');
    }
    prompt.push_str("Input: ");
    prompt.push_str(&target.input);
    prompt.push_str(" Prediction:");
    prompt
}
