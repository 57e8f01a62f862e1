//! Probability kernel over minimal cut sets
//!
//! Every cut set is a conjunction of independent basic events, so its
//! probability is the product of the member probabilities. The top-event
//! probability is the probability of the union of all cut sets, computed by
//! the series expansion `P(el + rest) = P(el) + P(rest) - P(el * rest)`
//! where the correction term combines `el` with every remaining set. The
//! `n_sums` setting truncates the recursion depth, bounding both memory and
//! error; the expansion also stops on its own when a combination level
//! produces no new terms. The first-order truncation is the rare-event
//! approximation, an upper bound that loosens once cut-set probabilities
//! leave the rare regime.
//!
//! [`analyze`] drives the full pipeline: cut-set generation, point
//! probabilities, importance measures, and the optional Monte Carlo pass.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cutset;
use crate::expression::{ExprId, ExpressionPool};
use crate::montecarlo::{self, SampleStats};
use crate::tree::FaultTree;
use crate::{AnalysisConfig, AnalysisError, AnalysisResult, CancelToken};

/// A minimal cut set with its point probability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutSet {
    /// Member basic events, original spellings, in identifier order
    pub events: Vec<String>,
    /// Product of the member probabilities
    pub probability: f64,
}

/// Fussell-Vesely importance of one basic event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Importance {
    pub event: String,
    /// Fraction of the top-event probability flowing through cut sets
    /// containing this event
    pub fussell_vesely: f64,
}

/// Structured result of a fault-tree analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Minimal cut sets ordered by size, then lexicographically
    pub cut_sets: Vec<CutSet>,
    /// Point estimate of the top-event probability
    pub top_probability: f64,
    /// Largest cut-set order
    pub max_order: usize,
    /// Per-basic-event importance, descending; empty when not requested
    pub importance: Vec<Importance>,
    /// Monte Carlo statistics when simulations were requested
    pub sample_stats: Option<SampleStats>,
    pub warnings: Vec<String>,
    /// Wall-clock time spent generating cut sets
    pub mcs_duration: Duration,
    /// Wall-clock time spent on probability calculations
    pub prob_duration: Duration,
}

impl Analysis {
    /// Cut sets reordered by descending probability, for reporting
    pub fn cut_sets_by_probability(&self) -> Vec<&CutSet> {
        let mut sorted: Vec<&CutSet> = self.cut_sets.iter().collect();
        sorted.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.events.cmp(&b.events))
        });
        sorted
    }
}

/// Alternating-series terms collected for Monte Carlo evaluation
#[derive(Debug, Clone, Default)]
pub(crate) struct McTerms {
    pub pos: Vec<BTreeSet<u32>>,
    pub neg: Vec<BTreeSet<u32>>,
}

/// Probability of a conjunction of independent basic events.
/// The empty conjunction is certain.
fn prob_and(set: &BTreeSet<u32>, probs: &[f64]) -> f64 {
    set.iter().map(|&i| probs[i as usize]).product()
}

/// `A(and)(B(or)C)` over sets: union `el` into every member, letting the
/// set container drop duplicates.
fn combine_el_and_set(
    el: &BTreeSet<u32>,
    sets: &BTreeSet<BTreeSet<u32>>,
) -> BTreeSet<BTreeSet<u32>> {
    sets.iter()
        .map(|s| el.union(s).copied().collect())
        .collect()
}

/// Union probability by series expansion, truncated at `n_sums` levels.
fn prob_or(sets: &mut BTreeSet<BTreeSet<u32>>, n_sums: usize, probs: &[f64]) -> f64 {
    if n_sums == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    while let Some(el) = sets.iter().next().cloned() {
        sets.remove(&el);
        total += prob_and(&el, probs);
        let mut combined = combine_el_and_set(&el, sets);
        total -= prob_or(&mut combined, n_sums - 1, probs);
    }
    total
}

/// Series mirror of [`prob_or`]: record the terms instead of evaluating
/// them, alternating between the positive and negative polynomials.
fn mc_prob_or(
    sets: &mut BTreeSet<BTreeSet<u32>>,
    positive: bool,
    n_sums: usize,
    out: &mut McTerms,
) {
    if n_sums == 0 {
        return;
    }
    while let Some(el) = sets.iter().next().cloned() {
        sets.remove(&el);
        if positive {
            out.pos.push(el.clone());
        } else {
            out.neg.push(el.clone());
        }
        let mut combined = combine_el_and_set(&el, sets);
        mc_prob_or(&mut combined, !positive, n_sums - 1, out);
    }
}

/// Run the analysis pipeline on a sealed fault tree.
///
/// The pool is mutable because the Monte Carlo pass advances its sample
/// epoch; deterministic analysis leaves it untouched.
pub fn analyze(
    tree: &FaultTree,
    pool: &mut ExpressionPool,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> AnalysisResult<Analysis> {
    config.validate()?;
    if !tree.is_sealed() {
        return Err(AnalysisError::Logic(
            "analysis requires a sealed fault tree".into(),
        ));
    }

    let mcs_start = Instant::now();
    let mcs = cutset::generate(tree, config, cancel)?;
    let mcs_duration = mcs_start.elapsed();
    let mut warnings = mcs.warnings.clone();

    // Probabilities in dense-index order; slot 0 stays unused.
    let prob_start = Instant::now();
    let mut probs = vec![f64::NAN; mcs.index.len() + 1];
    let mut exprs: Vec<ExprId> = Vec::with_capacity(mcs.index.len());
    for i in 1..=mcs.index.len() as u32 {
        let id = mcs.index.id_of(i);
        let event = tree.basic_event(id).ok_or_else(|| {
            AnalysisError::Logic(format!("indexed basic event '{}' vanished from the tree", id))
        })?;
        let expr = event.expression().ok_or_else(|| {
            AnalysisError::Validation(format!(
                "Basic event '{}' does not have an expression for probability analysis.",
                tree.orig_of(id)
            ))
        })?;
        pool.validate(expr)?;
        let mean = pool.mean(expr);
        if !(0.0..=1.0).contains(&mean) {
            return Err(AnalysisError::Domain(format!(
                "basic event '{}': probability mean {} is outside [0, 1]",
                tree.orig_of(id),
                mean
            )));
        }
        probs[i as usize] = mean;
        exprs.push(expr);
    }

    // Per-cut-set probability and cut-off filtering.
    let mut kept: Vec<(BTreeSet<u32>, f64)> = Vec::with_capacity(mcs.cut_sets.len());
    let mut dropped = 0usize;
    for cut_set in &mcs.cut_sets {
        let p = prob_and(cut_set, &probs);
        if p < config.cut_off {
            dropped += 1;
        } else {
            kept.push((cut_set.clone(), p));
        }
    }
    if dropped > 0 {
        warnings.push(format!(
            "{} cut sets with probability below the cut-off {} were discarded.",
            dropped, config.cut_off
        ));
    }

    let top_probability = if config.rare_event || config.n_sums == 1 {
        for (cut_set, p) in &kept {
            if *p > 0.1 {
                let names: Vec<&str> = cut_set
                    .iter()
                    .map(|&i| tree.orig_of(mcs.index.id_of(i)))
                    .collect();
                warnings.push(format!(
                    "Cut set {{{}}} has probability {}; the rare-event approximation \
                     loosens above 0.1.",
                    names.join(", "),
                    p
                ));
            }
        }
        kept.iter().map(|(_, p)| p).sum::<f64>().min(1.0)
    } else {
        let mut sets: BTreeSet<BTreeSet<u32>> =
            kept.iter().map(|(cs, _)| cs.clone()).collect();
        prob_or(&mut sets, config.n_sums, &probs).clamp(0.0, 1.0)
    };

    let importance = if config.compute_importance {
        compute_importance(tree, &mcs.index, &kept, top_probability)
    } else {
        Vec::new()
    };
    let prob_duration = prob_start.elapsed();

    let sample_stats = if config.n_simulations > 0 {
        if config.rare_event {
            warnings.push(
                "Rare-event approximation is ignored during Monte Carlo sampling.".to_string(),
            );
        }
        let mut sets: BTreeSet<BTreeSet<u32>> =
            kept.iter().map(|(cs, _)| cs.clone()).collect();
        let mut terms = McTerms::default();
        mc_prob_or(&mut sets, true, config.n_sums, &mut terms);
        Some(montecarlo::simulate(
            pool,
            &exprs,
            &terms,
            config,
            cancel,
            &mut warnings,
        )?)
    } else {
        None
    };

    let cut_sets = kept
        .iter()
        .map(|(cut_set, p)| CutSet {
            events: cut_set
                .iter()
                .map(|&i| tree.orig_of(mcs.index.id_of(i)).to_string())
                .collect(),
            probability: *p,
        })
        .collect();
    let max_order = kept.iter().map(|(cs, _)| cs.len()).max().unwrap_or(0);

    debug!(
        top_probability,
        cut_sets = kept.len(),
        max_order,
        "analysis finished"
    );

    Ok(Analysis {
        cut_sets,
        top_probability,
        max_order,
        importance,
        sample_stats,
        warnings,
        mcs_duration,
        prob_duration,
    })
}

/// Fussell-Vesely contribution of every indexed basic event, descending.
fn compute_importance(
    tree: &FaultTree,
    index: &cutset::BasicIndex,
    kept: &[(BTreeSet<u32>, f64)],
    top_probability: f64,
) -> Vec<Importance> {
    let mut measures: Vec<Importance> = (1..=index.len() as u32)
        .map(|i| {
            let contribution: f64 = kept
                .iter()
                .filter(|(cs, _)| cs.contains(&i))
                .map(|(_, p)| p)
                .sum();
            let fussell_vesely = if top_probability > 0.0 {
                contribution / top_probability
            } else {
                0.0
            };
            Importance {
                event: tree.orig_of(index.id_of(i)).to_string(),
                fussell_vesely,
            }
        })
        .collect();
    measures.sort_by(|a, b| {
        b.fussell_vesely
            .partial_cmp(&a.fussell_vesely)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.event.cmp(&b.event))
    });
    measures
}
