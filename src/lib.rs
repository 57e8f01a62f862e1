//! # faultree
//!
//! Fault-tree analysis engine. Given a Boolean fault-tree model whose leaves
//! are primary events with probabilities (or sampling distributions) and whose
//! internal nodes are logical gates, the engine computes the minimal cut sets
//! (MCS) that cause the top event and estimates the top-event probability.
//!
//! Key features:
//! - Fault-tree model with structural validation (cycles, dangling gates,
//!   undefined leaves, gate arity)
//! - Top-down expansion into minimal cut sets with order cutoff
//! - Exact inclusion-exclusion series and rare-event approximation
//! - Fussell-Vesely importance measures
//! - Monte Carlo sampling of basic-event probability distributions
//!
//! The typical flow: build a [`FaultTree`] and an [`ExpressionPool`] through
//! the builder API, [`FaultTree::seal`] the tree, then run [`analyze`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cutset;
pub mod event;
pub mod expression;
pub mod montecarlo;
pub mod probability;
pub mod report;
pub mod tree;
pub mod validate;

pub use cutset::McsOutput;
pub use event::{BasicEvent, Gate, GateKind, HouseEvent};
pub use expression::{ExprId, ExprKind, ExpressionPool, PeriodicTest};
pub use montecarlo::SampleStats;
pub use probability::{analyze, Analysis, CutSet, Importance};
pub use report::format_analysis_report;
pub use tree::{Diagnostics, FaultTree};

/// Errors surfaced by model construction, validation, and analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Structural problems: cycles, dangling gates, duplicate definitions,
    /// undefined leaves, arity violations
    #[error("validation error: {0}")]
    Validation(String),
    /// Expression parameter out of its mathematical domain
    #[error("domain error: {0}")]
    Domain(String),
    /// Internal invariant broken; indicates a bug in the caller or the engine
    #[error("logic error: {0}")]
    Logic(String),
    /// Cooperative cancellation or deadline expiry took effect
    #[error("analysis cancelled")]
    Cancelled,
}

/// Result type for fault-tree operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Configuration for a fault-tree analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum cut-set size; larger candidates are pruned during expansion
    pub limit_order: usize,
    /// Discard cut sets with computed probability below this threshold
    pub cut_off: f64,
    /// Truncation of the inclusion-exclusion series (1 = rare-event sum)
    pub n_sums: usize,
    /// Use the first-order rare-event approximation for the top probability
    pub rare_event: bool,
    /// Number of Monte Carlo simulations; zero disables MC
    pub n_simulations: usize,
    /// Master seed for the Monte Carlo sampler
    pub seed: u64,
    /// Compute per-basic-event Fussell-Vesely importance
    pub compute_importance: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            limit_order: 20,
            cut_off: 0.0,
            n_sums: 1_000_000,
            rare_event: false,
            n_simulations: 0,
            seed: 0,
            compute_importance: true,
        }
    }
}

impl AnalysisConfig {
    /// Check the configuration ranges before a run
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.limit_order < 1 {
            return Err(AnalysisError::Validation(
                "limit_order must be at least 1".into(),
            ));
        }
        if self.n_sums < 1 {
            return Err(AnalysisError::Validation("n_sums must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.cut_off) {
            return Err(AnalysisError::Validation(format!(
                "cut_off must be within [0, 1], got {}",
                self.cut_off
            )));
        }
        Ok(())
    }

    /// Set the Monte Carlo seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of Monte Carlo simulations
    pub fn with_simulations(mut self, n: usize) -> Self {
        self.n_simulations = n;
        self
    }
}

/// Cooperative cancellation handle for an analysis run.
///
/// The engine checks the token between supersets during cut-set expansion and
/// between Monte Carlo iterations; a triggered token or an expired deadline
/// surfaces as [`AnalysisError::Cancelled`] with partial results discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Create a token that never fires on its own
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that fires once the given wall-clock time has elapsed
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Request cancellation from another handle of the same token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Checkpoint: returns `Cancelled` once the flag is set or the deadline passed
    pub fn check(&self) -> AnalysisResult<()> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(AnalysisError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AnalysisError::Cancelled);
            }
        }
        Ok(())
    }
}
