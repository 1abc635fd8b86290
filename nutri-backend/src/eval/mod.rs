//! Offline evaluations of the Nutri-AI team, run through the `nutri-eval`
//! binary. Nothing here is reachable from the HTTP server.

pub mod accuracy;
pub mod performance;

pub use accuracy::{AccuracyEval, AccuracyResult, AccuracyVerdict};
pub use performance::{PerformanceEval, PerformanceResult};

/// Mean of `values`; 0.0 when empty
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0.0 with fewer than two values
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

pub(crate) fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

pub(crate) fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert!((std_dev(&values) - 2.138).abs() < 0.001);
        assert_eq!(min(&values), 2.0);
        assert_eq!(max(&values), 9.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }
}
