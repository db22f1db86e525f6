//! Metrics collection and aggregation.
//!
//! Per-example ROUGE-L scores are averaged per template, with a bootstrap
//! confidence interval of the mean. A task scores the maximum over its
//! template means, and a run scores the mean over its tasks.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Metrics collector for one evaluation pass
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Per-example scores
    scores: Vec<f64>,
    /// Per-example generation latencies
    latency: Vec<Duration>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a score measurement
    pub fn record_score(&mut self, value: f64) {
        self.scores.push(value);
    }

    /// Record a latency measurement
    pub fn record_latency(&mut self, duration: Duration) {
        self.latency.push(duration);
    }

    /// Compute aggregated metrics
    #[must_use]
    pub fn compute(&self, config: &StatConfig) -> AggregatedMetrics {
        AggregatedMetrics {
            mean: compute_mean(&self.scores),
            std: compute_std(&self.scores),
            ci: bootstrap_ci(&self.scores, config),
            latency_p50: compute_percentile_duration(&self.latency, 0.50),
            latency_p95: compute_percentile_duration(&self.latency, 0.95),
            latency_total: self.latency.iter().sum(),
            sample_count: self.scores.len(),
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn compute_percentile_duration(samples: &[Duration], percentile: f64) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }

    let mut sorted = samples.to_vec();
    sorted.sort();

    let idx = ((samples.len() as f64 * percentile).ceil() as usize).saturating_sub(1);
    sorted
        .get(idx.min(sorted.len() - 1))
        .copied()
        .unwrap_or(Duration::ZERO)
}

/// Compute mean of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Compute standard deviation of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_std(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = compute_mean(samples);
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Statistical configuration for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct StatConfig {
    /// Number of bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level (e.g., 0.95)
    pub confidence: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            bootstrap_n: 1000,
            confidence: 0.95,
            seed: 42,
        }
    }
}

/// Bootstrap confidence interval (proper resampling)
///
/// Uses the percentile method with `n` resamples.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn bootstrap_ci(samples: &[f64], config: &StatConfig) -> (f64, f64) {
    if samples.len() < 2 || config.bootstrap_n == 0 {
        let mean = compute_mean(samples);
        return (mean, mean);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut bootstrap_means = Vec::with_capacity(config.bootstrap_n);

    for _ in 0..config.bootstrap_n {
        let resample_sum: f64 = (0..samples.len())
            .map(|_| {
                let idx = rng.next_u64() as usize % samples.len();
                samples[idx]
            })
            .sum();
        bootstrap_means.push(resample_sum / samples.len() as f64);
    }

    bootstrap_means.sort_by(f64::total_cmp);

    let alpha = 1.0 - config.confidence;
    let lower_idx = (config.bootstrap_n as f64 * (alpha / 2.0)).floor() as usize;
    let upper_idx = (config.bootstrap_n as f64 * (1.0 - alpha / 2.0)).ceil() as usize;

    let lower = bootstrap_means.get(lower_idx).copied().unwrap_or(0.0);
    let upper = bootstrap_means
        .get(upper_idx.min(bootstrap_means.len() - 1))
        .copied()
        .unwrap_or(0.0);

    (lower, upper)
}

/// Highest template mean, with its index
#[must_use]
pub fn best_score(template_means: &[f64]) -> Option<(usize, f64)> {
    template_means
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
}

/// Mean of per-task best scores; `None` when no task was scored
#[must_use]
pub fn overall_score(task_scores: &[f64]) -> Option<f64> {
    (!task_scores.is_empty()).then(|| compute_mean(task_scores))
}

/// Aggregated metrics from evaluation
#[derive(Debug, Clone)]
pub struct AggregatedMetrics {
    /// Mean score
    pub mean: f64,
    /// Sample standard deviation of the scores
    pub std: f64,
    /// Confidence interval for the mean (lower, upper)
    pub ci: (f64, f64),
    /// p50 latency
    pub latency_p50: Duration,
    /// p95 latency
    pub latency_p95: Duration,
    /// Total generation time
    pub latency_total: Duration,
    /// Number of samples
    pub sample_count: usize,
}
