//! Minimal-cut-set generation by top-down expansion
//!
//! After validation every reachable basic event gets a dense 1-based index;
//! a cut set is a sorted set of indices. Expansion works over a worklist of
//! supersets: a superset carries the positive and complemented literals
//! accumulated so far plus the gates still pending expansion. Gate rules
//! fan supersets out (OR, voting combinations) or merge children in (AND);
//! complements flow through NOT/XOR by polarity flipping. Candidates whose
//! positive part exceeds the order limit are pruned, which is safe because
//! AND only grows a set. The surviving candidates are minimized by subset
//! removal and returned in (size, lexicographic) order.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::GateKind;
use crate::tree::FaultTree;
use crate::{AnalysisConfig, AnalysisError, AnalysisResult, CancelToken};

/// Dense 1-based indexing of the basic events reachable from the top event.
///
/// Index order follows the sorted canonical identifiers, so the integer
/// order and the lexicographic identifier order coincide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicIndex {
    to_id: Vec<String>,
    from_id: IndexMap<String, u32>,
}

impl BasicIndex {
    fn build(tree: &FaultTree) -> Self {
        let mut ids: Vec<String> = tree.reachable_basics().iter().cloned().collect();
        ids.sort_unstable();
        let mut from_id = IndexMap::new();
        for (pos, id) in ids.iter().enumerate() {
            from_id.insert(id.clone(), pos as u32 + 1);
        }
        Self { to_id: ids, from_id }
    }

    pub fn id_of(&self, index: u32) -> &str {
        &self.to_id[(index - 1) as usize]
    }

    pub fn index_of(&self, id: &str) -> Option<u32> {
        self.from_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_id.is_empty()
    }
}

/// Result of cut-set generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McsOutput {
    /// Minimal cut sets ordered by size, then lexicographically by content
    pub cut_sets: Vec<BTreeSet<u32>>,
    /// Basic-event index used by the cut sets
    pub index: BasicIndex,
    /// Largest cut-set order in the result
    pub max_order: usize,
    pub warnings: Vec<String>,
}

/// Intermediate set under expansion: accumulated literals plus the gates
/// that still need their expansion rule applied.
#[derive(Debug, Clone, Default)]
struct Superset {
    positives: BTreeSet<u32>,
    negatives: BTreeSet<u32>,
    gates: Vec<(String, bool)>,
}

enum Absorb {
    /// Literal or pending gate taken in; the superset lives on
    Kept,
    /// The superset became logically impossible
    Dead,
}

/// Expand the sealed tree into its minimal cut sets
pub fn generate(
    tree: &FaultTree,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> AnalysisResult<McsOutput> {
    if !tree.is_sealed() {
        return Err(AnalysisError::Logic(
            "cut-set generation requires a sealed fault tree".into(),
        ));
    }
    let top = tree
        .top_event()
        .ok_or_else(|| AnalysisError::Logic("sealed tree without a top event".into()))?;

    let index = BasicIndex::build(tree);
    let mut worklist = vec![Superset {
        gates: vec![(top.to_string(), false)],
        ..Superset::default()
    }];
    let mut candidates: BTreeSet<BTreeSet<u32>> = BTreeSet::new();
    let mut pruned = 0usize;
    let mut complements_dropped = false;

    while let Some(mut superset) = worklist.pop() {
        cancel.check()?;
        let Some((gate_id, negated)) = superset.gates.pop() else {
            // No pending gates left: the superset is a candidate cut set.
            if !superset.negatives.is_empty() {
                complements_dropped = true;
            }
            candidates.insert(superset.positives);
            continue;
        };
        for next in expand_gate(tree, &index, &superset, &gate_id, negated)? {
            if next.positives.len() > config.limit_order {
                pruned += 1;
                continue;
            }
            worklist.push(next);
        }
    }

    let cut_sets = minimize(candidates);
    let max_order = cut_sets.iter().map(BTreeSet::len).max().unwrap_or(0);

    let mut warnings = Vec::new();
    if pruned > 0 {
        warnings.push(format!(
            "{} cut-set candidates exceeded the order limit {} and were discarded.",
            pruned, config.limit_order
        ));
    }
    if complements_dropped {
        warnings.push(
            "Complement literals from NOT/XOR logic were dropped from the final cut sets; \
             the tree is non-coherent and the results are approximate."
                .to_string(),
        );
    }
    debug!(
        cut_sets = cut_sets.len(),
        max_order, pruned, "cut-set generation finished"
    );

    Ok(McsOutput {
        cut_sets,
        index,
        max_order,
        warnings,
    })
}

/// Apply one gate's expansion rule, yielding the successor supersets.
fn expand_gate(
    tree: &FaultTree,
    index: &BasicIndex,
    superset: &Superset,
    gate_id: &str,
    negated: bool,
) -> AnalysisResult<Vec<Superset>> {
    let gate = tree
        .gate(gate_id)
        .ok_or_else(|| AnalysisError::Logic(format!("expansion reached unknown gate '{}'", gate_id)))?;
    let children = gate.sorted_children();
    let n = children.len();

    // NAND and NOR are complemented AND and OR.
    let (kind, negated) = match gate.kind() {
        GateKind::Nand => (GateKind::And, !negated),
        GateKind::Nor => (GateKind::Or, !negated),
        kind => (kind, negated),
    };

    let mut out = Vec::new();
    match (kind, negated) {
        // Conjunction: all children join the same superset.
        (GateKind::And, false) | (GateKind::Or, true) => {
            let polarity = negated;
            let mut next = superset.clone();
            let mut alive = true;
            for child in &children {
                match absorb(tree, index, &mut next, child, polarity)? {
                    Absorb::Kept => {}
                    Absorb::Dead => {
                        alive = false;
                        break;
                    }
                }
            }
            if alive {
                out.push(next);
            }
        }
        // Disjunction: one successor per child.
        (GateKind::Or, false) | (GateKind::And, true) => {
            let polarity = negated;
            for child in &children {
                let mut next = superset.clone();
                if let Absorb::Kept = absorb(tree, index, &mut next, child, polarity)? {
                    out.push(next);
                }
            }
        }
        (GateKind::Not, neg) => {
            let mut next = superset.clone();
            if let Absorb::Kept = absorb(tree, index, &mut next, children[0], !neg)? {
                out.push(next);
            }
        }
        (GateKind::Null, neg) => {
            let mut next = superset.clone();
            if let Absorb::Kept = absorb(tree, index, &mut next, children[0], neg)? {
                out.push(next);
            }
        }
        // XOR(a, b) = (a AND NOT b) OR (NOT a AND b); its complement pairs
        // the children with matching polarities.
        (GateKind::Xor, flip) => {
            let splits: [(bool, bool); 2] = if flip {
                [(false, false), (true, true)]
            } else {
                [(false, true), (true, false)]
            };
            for (neg_a, neg_b) in splits {
                let mut next = superset.clone();
                let a = absorb(tree, index, &mut next, children[0], neg_a)?;
                if matches!(a, Absorb::Dead) {
                    continue;
                }
                if let Absorb::Kept = absorb(tree, index, &mut next, children[1], neg_b)? {
                    out.push(next);
                }
            }
        }
        // Voting: each N-choose-K combination becomes an AND superset;
        // the complement votes on N-K+1 complemented children.
        (GateKind::AtLeast { k }, flip) => {
            let choose = if flip {
                n - k as usize + 1
            } else {
                k as usize
            };
            for combo in combinations(n, choose) {
                let mut next = superset.clone();
                let mut alive = true;
                for pos in combo {
                    match absorb(tree, index, &mut next, children[pos], flip)? {
                        Absorb::Kept => {}
                        Absorb::Dead => {
                            alive = false;
                            break;
                        }
                    }
                }
                if alive {
                    out.push(next);
                }
            }
        }
        (GateKind::Nand, _) | (GateKind::Nor, _) => unreachable!("reduced above"),
    }
    Ok(out)
}

/// Take one child into the superset with the given polarity.
fn absorb(
    tree: &FaultTree,
    index: &BasicIndex,
    superset: &mut Superset,
    child: &str,
    negated: bool,
) -> AnalysisResult<Absorb> {
    if tree.gate(child).is_some() {
        superset.gates.push((child.to_string(), negated));
        return Ok(Absorb::Kept);
    }
    if let Some(idx) = index.index_of(child) {
        // A literal and its complement in one conjunction is a contradiction.
        if negated {
            if superset.positives.contains(&idx) {
                return Ok(Absorb::Dead);
            }
            superset.negatives.insert(idx);
        } else {
            if superset.negatives.contains(&idx) {
                return Ok(Absorb::Dead);
            }
            superset.positives.insert(idx);
        }
        return Ok(Absorb::Kept);
    }
    if let Some(house) = tree.house_event(child) {
        // Resolved in place: a true term vanishes from the conjunction,
        // a false term kills it.
        return if house.state() != negated {
            Ok(Absorb::Kept)
        } else {
            Ok(Absorb::Dead)
        };
    }
    Err(AnalysisError::Logic(format!(
        "expansion reached undefined event '{}'",
        child
    )))
}

/// Remove every candidate that is a strict superset of another. Candidates
/// are processed in ascending size, so each kept set only needs testing
/// against the smaller-or-equal sets already kept.
fn minimize(candidates: BTreeSet<BTreeSet<u32>>) -> Vec<BTreeSet<u32>> {
    let mut sorted: Vec<BTreeSet<u32>> = candidates.into_iter().collect();
    sorted.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let mut minimal: Vec<BTreeSet<u32>> = Vec::new();
    for candidate in sorted {
        if !minimal.iter().any(|kept| kept.is_subset(&candidate)) {
            minimal.push(candidate);
        }
    }
    minimal
}

/// N-choose-K index combinations in lexicographic order
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let mut i = k as isize - 1;
        while i >= 0 && idx[i as usize] == i as usize + n - k {
            i -= 1;
        }
        if i < 0 {
            break;
        }
        let i = i as usize;
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
    out
}
