//! # single-experiments
//!
//! A Rust library for the statistical analysis of online experiments (A/B tests), part of the
//! single-rust ecosystem.
//!
//! This crate compares experiment arms on continuous and binary metrics and reports every
//! comparison in one result shape: effect, p-value, rejection decision and confidence
//! interval, on a relative or absolute scale. Tests range from the classic t- and z-tests to
//! variance-reduced estimators (CUPED, ANCOVA) and seeded, parallel bootstrap procedures.
//!
//! ## Core Features
//!
//! - **Parametric Tests**: Welch/Student t-test, paired t-test, CUPED t-test, z-test for
//!   proportions, ANCOVA with robust covariance
//! - **Resampling Tests**: Bootstrap, paired bootstrap and post-normed bootstrap with
//!   deterministic parallel draws
//! - **Multiple Testing Correction**: Bonferroni, Holm, Benjamini-Hochberg, Šidák and Hommel
//! - **Quantile Analysis**: Rerun any test on the lower or upper part of the distribution,
//!   or bootstrap quantile treatment effects on the full arms
//! - **Planning**: Sample size and minimum detectable effect formulas
//!
//! ## Quick Start
//!
//! ```
//! use single_experiments::data::SampleData;
//! use single_experiments::testing::inference::Comparison;
//! use single_experiments::testing::inference::parametric::TTest;
//!
//! let control = SampleData::new(vec![100.0, 110.0, 95.0]).unwrap();
//! let treatment = SampleData::new(vec![105.0, 115.0, 100.0]).unwrap();
//!
//! let results = TTest::default().compare(&[control, treatment]).unwrap();
//! assert_eq!(results.len(), 1);
//! assert!(results[0].effect > 0.0);
//! ```
//!
//! ## Module Organization
//!
//! - **[`data`]**: Sample and proportion containers
//! - **[`testing`]**: Result types, statistical tests, correction and quantile analysis
//! - **[`planning`]**: Sample size and MDE calculations
//! - **[`error`]**: Error kinds returned by every fallible call

pub mod data;
pub mod error;
pub mod planning;
pub mod testing;

pub use data::{ProportionData, SampleData};
pub use error::{Error, Result};
pub use testing::{QuantileTestResult, TestConfig, TestResult, TestType};
