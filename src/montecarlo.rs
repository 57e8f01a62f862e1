//! Monte Carlo evaluation of the top-event probability
//!
//! Instead of scalar means, the sampler draws every basic-event expression
//! once per iteration (one sample epoch each) and evaluates the
//! alternating-series polynomials collected by the probability kernel. The
//! driver is deliberately simple and sequential: iterations are independent,
//! and the reproducible single-threaded default is keyed by the explicit
//! seed in the configuration.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::expression::{ExprId, ExpressionPool};
use crate::probability::McTerms;
use crate::{AnalysisConfig, AnalysisResult, CancelToken};

/// Summary statistics of the sampled top-event probability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleStats {
    pub n_simulations: usize,
    pub mean: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    /// 5th percentile
    pub q05: f64,
    pub median: f64,
    /// 95th percentile
    pub q95: f64,
}

impl SampleStats {
    /// Compute the statistics from raw simulation results
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                n_simulations: 0,
                mean: 0.0,
                std_dev: 0.0,
                q05: 0.0,
                median: 0.0,
                q95: 0.0,
            };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            n_simulations: n,
            mean,
            std_dev: variance.sqrt(),
            q05: percentile(&sorted, 0.05),
            median: percentile(&sorted, 0.50),
            q95: percentile(&sorted, 0.95),
        }
    }
}

fn percentile(sorted: &[f64], level: f64) -> f64 {
    let pos = (level * (sorted.len() - 1) as f64).round() as usize;
    sorted[pos.min(sorted.len() - 1)]
}

/// Run `n_simulations` iterations over the series terms.
///
/// `exprs` holds the expression handle of every indexed basic event in dense
/// order, so term index `i` evaluates through `exprs[i - 1]`. Draws outside
/// the unit interval are clamped with a warning, never an abort mid-run.
pub(crate) fn simulate(
    pool: &mut ExpressionPool,
    exprs: &[ExprId],
    terms: &McTerms,
    config: &AnalysisConfig,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> AnalysisResult<SampleStats> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut samples = Vec::with_capacity(config.n_simulations);
    let mut probs = vec![f64::NAN; exprs.len() + 1];
    let mut clamped = false;

    for _ in 0..config.n_simulations {
        cancel.check()?;
        pool.advance_epoch();
        for (pos, expr) in exprs.iter().enumerate() {
            let raw = pool.sample(*expr, &mut rng);
            let p = raw.clamp(0.0, 1.0);
            if p != raw {
                clamped = true;
            }
            probs[pos + 1] = p;
        }
        let positive: f64 = terms
            .pos
            .iter()
            .map(|term| term.iter().map(|&i| probs[i as usize]).product::<f64>())
            .sum();
        let negative: f64 = terms
            .neg
            .iter()
            .map(|term| term.iter().map(|&i| probs[i as usize]).product::<f64>())
            .sum();
        samples.push(positive - negative);
    }

    if clamped {
        warnings.push(
            "Sampled probabilities outside [0, 1] were clamped to the unit interval.".to_string(),
        );
    }
    warnings.extend(pool.take_sample_warnings());

    let stats = SampleStats::from_samples(&samples);
    debug!(
        n = stats.n_simulations,
        mean = stats.mean,
        std_dev = stats.std_dev,
        "Monte Carlo pass finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExprKind;
    use std::collections::BTreeSet;

    fn set(indices: &[u32]) -> BTreeSet<u32> {
        indices.iter().copied().collect()
    }

    #[test]
    fn test_from_samples_statistics() {
        let samples: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0).collect();
        let stats = SampleStats::from_samples(&samples);
        assert_eq!(stats.n_simulations, 100);
        assert!((stats.mean - 0.505).abs() < 1e-12);
        assert!(stats.std_dev > 0.0);
        assert!(stats.q05 < stats.median && stats.median < stats.q95);
    }

    #[test]
    fn test_from_samples_empty_and_single() {
        let empty = SampleStats::from_samples(&[]);
        assert_eq!(empty.n_simulations, 0);
        assert_eq!(empty.mean, 0.0);

        let single = SampleStats::from_samples(&[0.25]);
        assert_eq!(single.mean, 0.25);
        assert_eq!(single.std_dev, 0.0);
        assert_eq!(single.median, 0.25);
    }

    #[test]
    fn test_constant_expressions_reproduce_point_estimate() {
        let mut pool = ExpressionPool::new();
        let a = pool.constant(0.1);
        let b = pool.constant(0.2);
        let terms = McTerms {
            pos: vec![set(&[1]), set(&[2])],
            neg: vec![set(&[1, 2])],
        };
        let config = AnalysisConfig::default().with_simulations(100);
        let mut warnings = Vec::new();
        let stats = simulate(
            &mut pool,
            &[a, b],
            &terms,
            &config,
            &CancelToken::new(),
            &mut warnings,
        )
        .unwrap();
        assert!((stats.mean - 0.28).abs() < 1e-12);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_same_seed_reproduces_statistics() {
        let build = || {
            let mut pool = ExpressionPool::new();
            let lower = pool.constant(0.0);
            let upper = pool.constant(0.4);
            let deviate = pool.anon(ExprKind::UniformDeviate { lower, upper }).unwrap();
            (pool, deviate)
        };
        let terms = McTerms {
            pos: vec![set(&[1])],
            neg: vec![],
        };
        let config = AnalysisConfig::default().with_simulations(500).with_seed(42);
        let run = |pool: &mut ExpressionPool, expr: ExprId| {
            let mut warnings = Vec::new();
            simulate(pool, &[expr], &terms, &config, &CancelToken::new(), &mut warnings).unwrap()
        };
        let (mut pool_a, expr_a) = build();
        let (mut pool_b, expr_b) = build();
        let first = run(&mut pool_a, expr_a);
        let second = run(&mut pool_b, expr_b);
        assert_eq!(first.mean.to_bits(), second.mean.to_bits());
        assert_eq!(first.std_dev.to_bits(), second.std_dev.to_bits());
        assert_eq!(first.q95.to_bits(), second.q95.to_bits());
    }

    #[test]
    fn test_cancellation_between_iterations() {
        let mut pool = ExpressionPool::new();
        let _a = pool.constant(0.1);
        let terms = McTerms {
            pos: vec![set(&[1])],
            neg: vec![],
        };
        let config = AnalysisConfig::default().with_simulations(10);
        let token = CancelToken::new();
        token.cancel();
        let mut warnings = Vec::new();
        let exprs = [crate::expression::ExprId(0)];
        let result = simulate(&mut pool, &exprs, &terms, &config, &token, &mut warnings);
        assert!(matches!(result, Err(crate::AnalysisError::Cancelled)));
    }
}
