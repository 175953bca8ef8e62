use single_experiments::data::{ProportionData, SampleData};
use single_experiments::testing::inference::Comparison;
use single_experiments::testing::inference::parametric::{PairedTTest, TTest, ZTest};
use single_experiments::testing::{TTestType, TestConfig, TestResult, TestType};

#[cfg(test)]
mod quick_test {
    use super::*;

    fn sample(values: &[f64]) -> SampleData {
        SampleData::new(values.to_vec()).unwrap()
    }

    fn absolute() -> TestConfig {
        TestConfig::new(0.05, TestType::Absolute).unwrap()
    }

    fn check_shape(r: &TestResult) {
        assert!((0.0..=1.0).contains(&r.pvalue));
        assert!(r.left_bound <= r.right_bound);
        assert!((r.ci_length - (r.right_bound - r.left_bound)).abs() < 1e-12);
        assert_eq!(r.reject, r.pvalue < r.alpha);
    }

    #[test]
    fn check_if_ttest_works() {
        // Two clearly different groups
        // Group 1: [1, 2, 3] -> mean=2
        // Group 2: [7, 8, 9] -> mean=8
        let result = TTest::new(absolute())
            .with_ttest_type(TTestType::Student)
            .compare_samples(&sample(&[1.0, 2.0, 3.0]), &sample(&[7.0, 8.0, 9.0]))
            .unwrap();

        check_shape(&result);
        assert!(result.pvalue < 0.05, "p-value {}", result.pvalue);
        assert!(result.statistic.unwrap() > 2.0);
        assert!((result.effect - 6.0).abs() < 1e-12);
        assert!(result.reject);
    }

    #[test]
    fn check_identical_groups() {
        // Identical groups should give effect 0, t-stat 0 and p-value 1
        let a = sample(&[5.0, 6.0, 7.0]);
        let result = TTest::new(absolute()).compare_samples(&a, &a).unwrap();

        check_shape(&result);
        assert!(result.statistic.unwrap().abs() < 1e-12);
        assert!(result.pvalue > 0.999);
        assert!(!result.reject);
    }

    #[test]
    fn check_constant_identical_groups() {
        // Zero variance and zero effect: the interval collapses onto 0 and p = 1
        let a = sample(&[5.0, 5.0, 5.0]);
        let result = TTest::new(absolute()).compare_samples(&a, &a).unwrap();

        assert_eq!(result.pvalue, 1.0);
        assert_eq!(result.ci_length, 0.0);
        assert!(!result.reject);
    }

    #[test]
    fn test_welch_vs_student_unequal_variance() {
        let low_var = sample(&[10.0, 10.2, 9.9, 10.1, 9.8, 10.0]);
        let high_var = sample(&[4.0, 18.0, 7.0, 16.0, 12.0]);

        let welch = TTest::new(absolute()).compare_samples(&low_var, &high_var).unwrap();
        let student = TTest::new(absolute())
            .with_ttest_type(TTestType::Student)
            .compare_samples(&low_var, &high_var)
            .unwrap();

        check_shape(&welch);
        check_shape(&student);
        assert!((welch.effect - student.effect).abs() < 1e-12);
        // Satterthwaite df sits close to the noisy arm's n - 1
        assert!(welch.metadata("df").unwrap() < student.metadata("df").unwrap());
    }

    #[test]
    fn test_relative_scale() {
        // 5 units on a control mean of 101.67 is a lift of about 4.9%
        let control = sample(&[100.0, 110.0, 95.0]);
        let treatment = sample(&[105.0, 115.0, 100.0]);
        let result = TTest::default().compare_samples(&control, &treatment).unwrap();

        check_shape(&result);
        assert!((result.effect - 5.0 / (305.0 / 3.0)).abs() < 1e-12);
        assert_eq!(result.test_type, TestType::Relative);
        assert!(result.contains(result.effect));
    }

    #[test]
    fn test_paired_beats_independent_on_matched_units() {
        let ids = ["u1", "u2", "u3", "u4", "u5"];
        let before = sample(&[20.0, 35.0, 12.0, 50.0, 28.0]).with_paired_ids(ids).unwrap();
        let after = sample(&[21.0, 36.5, 12.8, 51.2, 29.1]).with_paired_ids(ids).unwrap();

        let paired = PairedTTest::new(absolute()).compare_samples(&before, &after).unwrap();
        let independent = TTest::new(absolute()).compare_samples(&before, &after).unwrap();

        check_shape(&paired);
        assert!(paired.reject);
        assert!(!independent.reject);
        assert_eq!(paired.metadata("n_pairs"), Some(5.0));
    }

    #[test]
    fn test_proportions_ztest() {
        let control = ProportionData::new(100, 1000).unwrap();
        let treatment = ProportionData::new(150, 1000).unwrap();
        let result = ZTest::new(absolute()).compare_samples(&control, &treatment).unwrap();

        check_shape(&result);
        assert!((result.effect - 0.05).abs() < 1e-12);
        assert!(result.reject);
        assert!(result.left_bound > 0.0);
    }

    #[test]
    fn test_minimal_sample_size() {
        let result = TTest::new(absolute()).compare_samples(&sample(&[1.0, 2.0]), &sample(&[3.0, 4.0]));
        assert!(result.is_ok());

        let too_small = TTest::new(absolute()).compare_samples(&sample(&[1.0]), &sample(&[3.0, 4.0]));
        assert!(too_small.is_err());
    }
}
