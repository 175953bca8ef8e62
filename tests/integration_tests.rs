// End-to-end checks across modules: batch comparison, correction, quantile slicing and
// resampling on realistic experiment data.

#[cfg(test)]
mod integration_tests {
    use single_experiments::data::SampleData;
    use single_experiments::error::Error;
    use single_experiments::planning::{MetricSummary, PowerConfig, sample_size_means};
    use single_experiments::testing::correction::{CorrectionMethod, adjust_pvalues};
    use single_experiments::testing::inference::Comparison;
    use single_experiments::testing::inference::parametric::{AncovaTest, CupedTTest, TTest};
    use single_experiments::testing::inference::resampling::{
        BootstrapTest, ResamplingConfig, Statistic,
    };
    use single_experiments::testing::quantile::{QuantileAnalyzer, QuantileOutcome};
    use single_experiments::testing::{TestConfig, TestType};

    fn named(values: &[f64], name: &str) -> SampleData {
        SampleData::new(values.to_vec()).unwrap().with_name(name)
    }

    /// Deterministic pseudo-noise in [-0.5, 0.5).
    fn noise(i: usize) -> f64 {
        ((i * 7919 + 13) % 1000) as f64 / 1000.0 - 0.5
    }

    fn revenue_arms() -> Vec<SampleData> {
        let arm = |lift: f64, offset: usize, name: &str| {
            let pre: Vec<f64> = (0..60).map(|i| 50.0 + 20.0 * noise(i + offset)).collect();
            let post: Vec<f64> = pre
                .iter()
                .enumerate()
                .map(|(i, x)| 0.9 * x + 5.0 + lift + 2.0 * noise(i * 3 + offset + 1))
                .collect();
            SampleData::new(post)
                .unwrap()
                .with_covariate(pre)
                .unwrap()
                .with_name(name)
        };
        vec![arm(0.0, 0, "control"), arm(0.0, 101, "same"), arm(3.0, 257, "better")]
    }

    #[test]
    fn test_ttest_end_to_end() {
        let results = TTest::default()
            .compare(&[
                named(&[100.0, 110.0, 95.0], "control"),
                named(&[105.0, 115.0, 100.0], "treatment"),
            ])
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!((r.effect - 0.04918).abs() < 1e-4);
        assert!(r.pvalue > 0.3 && r.pvalue < 0.7);
        assert!(!r.reject);
        assert!(r.left_bound < 0.0 && r.right_bound > 0.0);
        assert_eq!(r.left.name.as_deref(), Some("control"));
        assert_eq!(r.right.name.as_deref(), Some("treatment"));
        assert_eq!(r.method, "t-test");
    }

    #[test]
    fn test_three_arms_pair_order_and_overrides() {
        let arms = revenue_arms();
        let results = TTest::default()
            .compare_with(&arms, Some(TestType::Absolute), Some(0.1))
            .unwrap();
        let pairs: Vec<(usize, usize)> = results.iter().map(|r| (r.left.index, r.right.index)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
        assert!(results.iter().all(|r| r.alpha == 0.1 && r.test_type == TestType::Absolute));
    }

    #[test]
    fn test_variance_reduction_narrows_intervals() {
        let arms = revenue_arms();
        let cfg = TestConfig::new(0.05, TestType::Absolute).unwrap();
        let plain = TTest::new(cfg).compare(&arms).unwrap();
        let cuped = CupedTTest::new(cfg).compare(&arms).unwrap();
        let ancova = AncovaTest::new(cfg).compare(&arms).unwrap();

        for ((p, c), a) in plain.iter().zip(&cuped).zip(&ancova) {
            assert!(c.ci_length < p.ci_length / 3.0);
            assert!(a.ci_length < p.ci_length / 3.0);
        }
        // control vs better
        assert!(cuped[1].reject && ancova[1].reject);
        assert!((cuped[1].effect - 3.0).abs() < 1.0);
    }

    #[test]
    fn test_correction_over_batch() {
        let arms = revenue_arms();
        let cfg = TestConfig::new(0.05, TestType::Absolute).unwrap();
        let results = CupedTTest::new(cfg).compare(&arms).unwrap();

        let bonferroni = adjust_pvalues(&results, CorrectionMethod::Bonferroni).unwrap();
        let holm = adjust_pvalues(&results, "holm".parse().unwrap()).unwrap();
        for ((b, h), r) in bonferroni.iter().zip(&holm).zip(&results) {
            assert!((b.pvalue - (r.pvalue * 3.0).min(1.0)).abs() < 1e-12);
            assert!(h.pvalue <= b.pvalue + 1e-15);
            assert!(h.pvalue >= r.pvalue);
            assert_eq!(b.effect, r.effect);
            assert_eq!(b.reject, b.pvalue <= 0.05);
        }

        let single = adjust_pvalues(&results[..1], CorrectionMethod::Bonferroni).unwrap();
        assert_eq!(single[0].pvalue, results[0].pvalue);
    }

    #[test]
    fn test_mixed_batch_abort_and_isolate() {
        let samples = [
            named(&[-1.0, 1.0, 0.0], "zero-mean"),
            named(&[1.0, 2.0, 3.0], "b"),
            named(&[2.0, 3.0, 4.5], "c"),
        ];
        let test = TTest::default();

        assert!(matches!(test.compare(&samples), Err(Error::Numerical(_))));

        let each = test.compare_each(&samples).unwrap();
        assert_eq!(each.len(), 3);
        assert!(matches!(each[0], Err(Error::Numerical(_))));
        assert!(matches!(each[1], Err(Error::Numerical(_))));
        let ok = each[2].as_ref().unwrap();
        assert_eq!((ok.left.index, ok.right.index), (1, 2));

        // configuration problems are never isolated
        assert!(matches!(test.compare_each(&samples[..1]), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_quantile_analyzer_end_to_end() {
        let arms = revenue_arms();
        let cfg = TestConfig::new(0.05, TestType::Absolute).unwrap();
        let outcomes = QuantileAnalyzer::new(TTest::new(cfg), vec![0.25, 0.5, 0.75])
            .unwrap()
            .compare(&arms[..2])
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        let sizes: Vec<usize> = outcomes
            .iter()
            .map(|o| match o {
                QuantileOutcome::Computed(r) => r.sample_size,
                other => panic!("unexpected outcome {:?}", other),
            })
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(outcomes[1].quantile(), 0.5);
    }

    #[test]
    fn test_bootstrap_reproducible_and_consistent_with_ttest() {
        let arms = revenue_arms();
        let cfg = TestConfig::new(0.05, TestType::Absolute).unwrap();
        let resampling = ResamplingConfig::new(4000, 77).unwrap();
        let boot = BootstrapTest::new(cfg, resampling);

        let first = boot.compare(&arms).unwrap();
        let second = boot.compare(&arms).unwrap();
        assert_eq!(first, second);

        let t = TTest::new(cfg).compare(&arms).unwrap();
        for (b, t) in first.iter().zip(&t) {
            assert!((b.effect - t.effect).abs() < 1e-9);
            assert!(b.ci_length > 0.5 * t.ci_length && b.ci_length < 1.5 * t.ci_length);
        }

        let median = boot.clone().with_statistic(Statistic::median());
        assert!(median.compare(&arms).is_ok());
    }

    #[test]
    fn test_planning_matches_observed_noise() {
        let arms = revenue_arms();
        let summary = MetricSummary::from_sample(&arms[0]).unwrap();
        let n = sample_size_means(&summary, 0.1, TestType::Relative, &PowerConfig::default()).unwrap();
        assert!(n > 2);
    }
}
