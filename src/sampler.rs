//! Few-shot demonstration sampling
//!
//! Demonstrations are drawn from the same dataset as the target example.
//! Each draw walks a fresh random permutation of the pool and takes the first
//! example that is neither the target (by input) nor already chosen. Since a
//! draw inspects the whole pool, a draw that finds nothing proves the pool is
//! exhausted and sampling stops with an error instead of spinning.

use crate::dataset::Example;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Sampling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("Need {required} demonstrations but only {found} eligible examples exist")]
    InsufficientCandidates { required: usize, found: usize },
}

/// Seeded demonstration sampler
#[derive(Debug, Clone)]
pub struct DemonstrationSampler<R = ChaCha8Rng> {
    rng: R,
    num_demonstrations: usize,
}

impl DemonstrationSampler<ChaCha8Rng> {
    /// Sampler driven by a `ChaCha8Rng` seeded with `seed`
    #[must_use]
    pub fn seeded(seed: u64, num_demonstrations: usize) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed), num_demonstrations)
    }
}

impl<R: Rng> DemonstrationSampler<R> {
    pub const fn new(rng: R, num_demonstrations: usize) -> Self {
        Self {
            rng,
            num_demonstrations,
        }
    }

    /// Draw demonstrations for `target` from `pool`, in selection order
    ///
    /// # Errors
    ///
    /// Returns `InsufficientCandidates` when the pool runs out of examples
    /// distinct from the target and from each other.
    pub fn sample<'a>(&mut self, target: &Example, pool: &'a [Example]) -> Result<Vec<&'a Example>, SamplerError> {
        sample_demonstrations(target, pool, self.num_demonstrations, &mut self.rng)
    }
}

/// Draw `n` demonstrations for `target` from `pool` using `rng`
///
/// # Errors
///
/// Returns `InsufficientCandidates` when fewer than `n` eligible examples
/// exist.
pub fn sample_demonstrations<'a, R: Rng + ?Sized>(
    target: &Example,
    pool: &'a [Example],
    n: usize,
    rng: &mut R,
) -> Result<Vec<&'a Example>, SamplerError> {
    let mut chosen: Vec<&'a Example> = Vec::with_capacity(n);
    let mut order: Vec<usize> = (0..pool.len()).collect();

    while chosen.len() < n {
        order.shuffle(rng);
        let next = order
            .iter()
            .map(|&i| &pool[i])
            .find(|candidate| candidate.input != target.input && !chosen.contains(candidate));

        match next {
            Some(example) => chosen.push(example),
            None => {
                return Err(SamplerError::InsufficientCandidates {
                    required: n,
                    found: chosen.len(),
                })
            }
        }
    }

    Ok(chosen)
}
