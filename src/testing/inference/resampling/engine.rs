//! Shared bootstrap machinery: statistics, index resampling and the parallel draw loop.
//!
//! Draws are generated in fixed blocks of [`BLOCK_SIZE`]. Block `k` owns a random
//! stream seeded from the configured seed and `k` alone, and blocks are collected in
//! block order, so the empirical distribution (and with it the p-value and the
//! interval) does not depend on how many rayon workers run the blocks. The reduction
//! only counts and sorts draws, leaving no floating-point summation order to vary.

use crate::error::{Error, Result};
use crate::testing::TestType;
use crate::testing::utils::{self, group_by_label, quantile_sorted, sorted};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RESAMPLES: usize = 10_000;
const BLOCK_SIZE: usize = 256;

/// Summary statistic applied to each resampled arm.
#[derive(Clone)]
pub struct Statistic {
    name: &'static str,
    func: Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>,
}

impl Statistic {
    pub fn mean() -> Self {
        Statistic::custom("mean", |x| utils::mean(x))
    }

    pub fn median() -> Self {
        Statistic::custom("median", utils::median)
    }

    /// The `q`-quantile of each arm; bootstrapping it gives a quantile treatment effect.
    pub fn quantile(q: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::Validation(format!(
                "Quantile must lie in [0, 1], got {}",
                q
            )));
        }
        Ok(Statistic::custom("quantile", move |x| utils::quantile(x, q)))
    }

    pub fn custom<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Statistic {
            name,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn compute(&self, values: &[f64]) -> f64 {
        (self.func)(values)
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Statistic::mean()
    }
}

impl fmt::Debug for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statistic").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplingConfig {
    n_resamples: usize,
    seed: u64,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        ResamplingConfig {
            n_resamples: DEFAULT_RESAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

impl ResamplingConfig {
    pub fn new(n_resamples: usize, seed: u64) -> Result<Self> {
        if n_resamples == 0 {
            return Err(Error::Validation(
                "Number of resamples must be positive".to_string(),
            ));
        }
        Ok(ResamplingConfig { n_resamples, seed })
    }

    pub fn n_resamples(&self) -> usize {
        self.n_resamples
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fail when `B` cannot resolve p-values below `alpha`, warn when the resolution is coarse.
    ///
    /// The smallest non-zero two-sided p-value is `2 / B`; below `B = 2 / alpha` the test
    /// can never reject, below `B = 20 / alpha` the p-value near `alpha` is only resolved
    /// in steps larger than a tenth of `alpha`.
    pub fn check_resolution(&self, alpha: f64) -> Result<()> {
        let b = self.n_resamples as f64;
        if b < 2.0 / alpha {
            return Err(Error::Validation(format!(
                "{} resamples cannot resolve p-values at alpha = {}; need at least {}",
                self.n_resamples,
                alpha,
                (2.0 / alpha).ceil()
            )));
        }
        if b < 20.0 / alpha {
            warn!(
                n_resamples = self.n_resamples,
                alpha,
                recommended = (20.0 / alpha).ceil(),
                "coarse bootstrap p-value resolution"
            );
        }
        Ok(())
    }
}

/// Index resampling for one arm, within strata when labels are given.
#[derive(Debug, Clone)]
pub(crate) struct Resampler {
    groups: Vec<Vec<usize>>,
    len: usize,
}

impl Resampler {
    pub fn new(len: usize, strata: Option<&[String]>) -> Self {
        let groups = match strata {
            Some(labels) => group_by_label(labels),
            None => vec![(0..len).collect()],
        };
        Resampler { groups, len }
    }

    /// Fill `out` with one bootstrap draw of indices. Each stratum contributes as many
    /// draws as it has observations, so stratum proportions are preserved.
    pub fn draw(&self, rng: &mut StdRng, out: &mut Vec<usize>) {
        out.clear();
        out.reserve(self.len);
        for group in &self.groups {
            for _ in 0..group.len() {
                out.push(group[rng.random_range(0..group.len())]);
            }
        }
    }
}

/// SplitMix64 finalizer, used to derive well separated per-block seeds.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn block_seed(seed: u64, block: usize) -> u64 {
    mix(seed.wrapping_add((block as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
}

/// Run `config.n_resamples()` draws of `draw`, returned in a deterministic order.
pub(crate) fn bootstrap_distribution<F>(config: &ResamplingConfig, draw: F) -> Vec<f64>
where
    F: Fn(&mut StdRng) -> f64 + Sync,
{
    let total = config.n_resamples;
    let n_blocks = total.div_ceil(BLOCK_SIZE);
    let blocks: Vec<Vec<f64>> = (0..n_blocks)
        .into_par_iter()
        .map(|k| {
            let mut rng = StdRng::seed_from_u64(block_seed(config.seed, k));
            let len = BLOCK_SIZE.min(total - k * BLOCK_SIZE);
            (0..len).map(|_| draw(&mut rng)).collect()
        })
        .collect();
    blocks.into_iter().flatten().collect()
}

/// Effect of a treatment statistic against a control statistic.
pub(crate) fn effect_of(control: f64, treatment: f64, test_type: TestType) -> f64 {
    match test_type {
        TestType::Absolute => treatment - control,
        TestType::Relative => treatment / control - 1.0,
    }
}

/// Two-sided p-value, percentile interval and spread of the bootstrap distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BootstrapSummary {
    pub pvalue: f64,
    pub bounds: (f64, f64),
    pub standard_error: f64,
}

pub(crate) fn summarize(draws: &[f64], alpha: f64) -> Result<BootstrapSummary> {
    if let Some(bad) = draws.iter().find(|d| !d.is_finite()) {
        return Err(Error::Numerical(format!(
            "Bootstrap produced a non-finite effect ({}); a resampled control statistic is zero",
            bad
        )));
    }
    let b = draws.len() as f64;
    let below = draws.iter().filter(|&&d| d <= 0.0).count() as f64;
    let above = draws.iter().filter(|&&d| d >= 0.0).count() as f64;
    let pvalue = (2.0 * below.min(above) / b).min(1.0);

    let ordered = sorted(draws);
    let bounds = (
        quantile_sorted(&ordered, alpha / 2.0),
        quantile_sorted(&ordered, 1.0 - alpha / 2.0),
    );
    Ok(BootstrapSummary {
        pvalue,
        bounds,
        standard_error: utils::variance(draws).max(0.0).sqrt(),
    })
}
