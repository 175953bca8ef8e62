//! Resampling-based tests.
//!
//! All three tests build an empirical distribution of the effect from `B` bootstrap
//! draws (see [`engine`]) and read the p-value off the share of draws on either side of
//! zero and the interval off the `alpha / 2` and `1 - alpha / 2` percentiles. Running
//! time is `O(B * n)` per compared pair.

pub mod bootstrap;
pub mod engine;
pub mod paired;
pub mod post_normed;

pub use bootstrap::BootstrapTest;
pub use engine::{DEFAULT_RESAMPLES, DEFAULT_SEED, ResamplingConfig, Statistic};
pub use paired::PairedBootstrapTest;
pub use post_normed::PostNormedBootstrapTest;
