//! Wall-clock timing of a synchronous function, e.g. team construction.

use serde::Serialize;
use std::time::Instant;

pub struct PerformanceEval {
    pub name: String,
    pub num_iterations: usize,
    pub warmup_runs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceResult {
    pub name: String,
    pub run_times_ms: Vec<f64>,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub p95_ms: f64,
}

impl PerformanceResult {
    pub fn from_run_times(name: impl Into<String>, run_times_ms: Vec<f64>) -> Self {
        let mut sorted = run_times_ms.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        PerformanceResult {
            name: name.into(),
            avg_ms: super::mean(&run_times_ms),
            min_ms: sorted.first().copied().unwrap_or(0.0),
            max_ms: sorted.last().copied().unwrap_or(0.0),
            median_ms: median(&sorted),
            std_dev_ms: super::std_dev(&run_times_ms),
            p95_ms: percentile(&sorted, 95.0),
            run_times_ms,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} over {} run(s): avg {:.3}ms, min {:.3}ms, max {:.3}ms, median {:.3}ms, std dev {:.3}ms, p95 {:.3}ms",
            self.name,
            self.run_times_ms.len(),
            self.avg_ms,
            self.min_ms,
            self.max_ms,
            self.median_ms,
            self.std_dev_ms,
            self.p95_ms
        )
    }
}

impl PerformanceEval {
    pub fn new(name: impl Into<String>) -> Self {
        PerformanceEval {
            name: name.into(),
            num_iterations: 1,
            warmup_runs: 0,
        }
    }

    pub fn with_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations.max(1);
        self
    }

    pub fn with_warmup_runs(mut self, warmup_runs: usize) -> Self {
        self.warmup_runs = warmup_runs;
        self
    }

    /// Time `func` over `num_iterations` runs after `warmup_runs` untimed
    /// ones. The first error aborts the evaluation.
    pub fn run<T, E, F>(&self, mut func: F) -> Result<PerformanceResult, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        for _ in 0..self.warmup_runs {
            func()?;
        }

        let mut run_times_ms = Vec::with_capacity(self.num_iterations);
        for i in 1..=self.num_iterations {
            let start = Instant::now();
            let value = func()?;
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            drop(value);
            log::debug!("[EVAL] {} run {} took {:.3}ms", self.name, i, elapsed);
            run_times_ms.push(elapsed);
        }

        Ok(PerformanceResult::from_run_times(self.name.clone(), run_times_ms))
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_run_times() {
        let times: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let result = PerformanceResult::from_run_times("t", times);
        assert_eq!(result.avg_ms, 10.5);
        assert_eq!(result.min_ms, 1.0);
        assert_eq!(result.max_ms, 20.0);
        assert_eq!(result.median_ms, 10.5);
        assert_eq!(result.p95_ms, 19.0);

        let single = PerformanceResult::from_run_times("t", vec![4.0]);
        assert_eq!(single.median_ms, 4.0);
        assert_eq!(single.p95_ms, 4.0);
        assert_eq!(single.std_dev_ms, 0.0);
    }

    #[test]
    fn test_run_counts_warmups_separately() {
        let mut calls = 0;
        let result = PerformanceEval::new("count")
            .with_iterations(3)
            .with_warmup_runs(2)
            .run(|| {
                calls += 1;
                Ok::<_, String>(calls)
            })
            .unwrap();
        assert_eq!(calls, 5);
        assert_eq!(result.run_times_ms.len(), 3);
        assert!(result.summary().starts_with("count over 3 run(s)"));
    }

    #[test]
    fn test_error_aborts() {
        let result = PerformanceEval::new("fail").run(|| Err::<(), _>("boom".to_string()));
        assert_eq!(result.unwrap_err(), "boom");
    }
}
