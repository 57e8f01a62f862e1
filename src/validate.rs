//! Structural validation of a fault tree
//!
//! The checks run in a fixed order: cycle detection by DFS from the top gate
//! (with implicit-gate discovery as a side effect), leaf completeness, gate
//! arity, and basic-event probability assignments. Gate problems are
//! collected and reported as one multi-line diagnostic rather than
//! one-at-a-time; traversal iterates children in sorted key order so the
//! diagnostics are deterministic across runs.

use indexmap::IndexSet;

use crate::expression::ExpressionPool;
use crate::tree::FaultTree;
use crate::{AnalysisError, AnalysisResult};

pub(crate) struct SealOutcome {
    pub inter_events: IndexSet<String>,
    pub implicit_gates: IndexSet<String>,
    pub reachable_basics: IndexSet<String>,
    pub reachable_houses: IndexSet<String>,
    pub warnings: Vec<String>,
}

pub(crate) fn run(
    tree: &FaultTree,
    pool: &ExpressionPool,
    prob_requested: bool,
) -> AnalysisResult<SealOutcome> {
    let top = tree.top_event().ok_or_else(|| {
        AnalysisError::Validation(format!("Fault tree '{}' has no top event.", tree.name()))
    })?;

    let mut dfs = Dfs {
        tree,
        inter_events: IndexSet::new(),
        implicit_gates: IndexSet::new(),
        reachable_basics: IndexSet::new(),
        reachable_houses: IndexSet::new(),
        undefined: IndexSet::new(),
        done: IndexSet::new(),
    };
    let mut path = Vec::new();
    dfs.visit(top, &mut path)?;

    // The parent index is maintained by the builder; a reachable non-top
    // gate without one means the model was corrupted after construction.
    for gate_id in &dfs.inter_events {
        let has_parent = tree.parents(gate_id).is_some_and(|p| !p.is_empty());
        if !has_parent {
            return Err(AnalysisError::Logic(format!(
                "gate '{}' is reachable from the top event but has no parent index",
                tree.orig_of(gate_id)
            )));
        }
    }

    if !dfs.undefined.is_empty() {
        let mut names: Vec<&String> = dfs.undefined.iter().collect();
        names.sort_unstable();
        let lines: Vec<String> = names
            .iter()
            .map(|id| {
                format!(
                    "Node with id '{}' was not defined in '{}' tree.",
                    tree.orig_of(id),
                    tree.name()
                )
            })
            .collect();
        return Err(AnalysisError::Validation(lines.join("\n")));
    }

    check_gates(tree, &dfs.inter_events)?;

    let mut warnings = Vec::new();
    unreachable_primaries(tree, &dfs, &mut warnings);
    check_probabilities(tree, pool, &dfs.reachable_basics, prob_requested, &mut warnings)?;

    Ok(SealOutcome {
        inter_events: dfs.inter_events,
        implicit_gates: dfs.implicit_gates,
        reachable_basics: dfs.reachable_basics,
        reachable_houses: dfs.reachable_houses,
        warnings,
    })
}

struct Dfs<'a> {
    tree: &'a FaultTree,
    inter_events: IndexSet<String>,
    implicit_gates: IndexSet<String>,
    reachable_basics: IndexSet<String>,
    reachable_houses: IndexSet<String>,
    undefined: IndexSet<String>,
    done: IndexSet<String>,
}

impl Dfs<'_> {
    fn visit(&mut self, gate_id: &str, path: &mut Vec<String>) -> AnalysisResult<()> {
        if let Some(pos) = path.iter().position(|p| p == gate_id) {
            let mut chain: Vec<&str> = path[pos..]
                .iter()
                .map(|id| self.tree.orig_of(id))
                .collect();
            chain.push(self.tree.orig_of(gate_id));
            return Err(AnalysisError::Validation(format!(
                "Detected a cyclicity in '{}' fault tree:\n{}",
                self.tree.name(),
                chain.join("->")
            )));
        }
        if self.done.contains(gate_id) {
            return Ok(());
        }
        path.push(gate_id.to_string());
        let gate = match self.tree.gate(gate_id) {
            Some(g) => g,
            None => {
                return Err(AnalysisError::Logic(format!(
                    "traversal reached unknown gate '{}'",
                    gate_id
                )))
            }
        };
        for child in gate.sorted_children() {
            if self.tree.gate(child).is_some() {
                if Some(child) != self.tree.top_event() && !self.inter_events.contains(child) {
                    self.inter_events.insert(child.to_string());
                    if !self.tree.pre_declared().contains(child) {
                        self.implicit_gates.insert(child.to_string());
                    }
                }
                self.visit(child, path)?;
            } else if self.tree.basic_event(child).is_some() {
                self.reachable_basics.insert(child.to_string());
            } else if self.tree.house_event(child).is_some() {
                self.reachable_houses.insert(child.to_string());
            } else {
                self.undefined.insert(child.to_string());
            }
        }
        path.pop();
        self.done.insert(gate_id.to_string());
        Ok(())
    }
}

// Arity violations and dangling declared gates, reported together.
fn check_gates(tree: &FaultTree, inter_events: &IndexSet<String>) -> AnalysisResult<()> {
    let mut problems = Vec::new();

    let mut reachable: Vec<&str> = Vec::with_capacity(inter_events.len() + 1);
    if let Some(top) = tree.top_event() {
        reachable.push(top);
    }
    reachable.extend(inter_events.iter().map(String::as_str));
    reachable.sort_unstable();
    for gate_id in reachable {
        if let Some(gate) = tree.gate(gate_id) {
            if let Err(msg) = gate.kind().check_arity(gate.children().len()) {
                problems.push(format!("gate '{}': {}", gate.orig_id(), msg));
            }
        }
    }

    let mut declared: Vec<&String> = tree.gates().keys().collect();
    declared.sort_unstable();
    for gate_id in declared {
        let reachable =
            Some(gate_id.as_str()) == tree.top_event() || inter_events.contains(gate_id);
        if !reachable {
            problems.push(format!(
                "gate '{}' is a dangling gate, not reachable from the top event",
                tree.orig_of(gate_id)
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Validation(format!(
            "Fault tree '{}' has malformed gates:\n{}",
            tree.name(),
            problems.join("\n")
        )))
    }
}

fn unreachable_primaries(tree: &FaultTree, dfs: &Dfs, warnings: &mut Vec<String>) {
    let mut unreachable: Vec<&str> = tree
        .basic_events()
        .keys()
        .filter(|id| !dfs.reachable_basics.contains(*id))
        .chain(
            tree.house_events()
                .keys()
                .filter(|id| !dfs.reachable_houses.contains(*id)),
        )
        .map(String::as_str)
        .collect();
    unreachable.sort_unstable();
    for id in unreachable {
        warnings.push(format!(
            "Primary event '{}' is not reachable from the top event.",
            tree.orig_of(id)
        ));
    }
}

fn check_probabilities(
    tree: &FaultTree,
    pool: &ExpressionPool,
    reachable_basics: &IndexSet<String>,
    prob_requested: bool,
    warnings: &mut Vec<String>,
) -> AnalysisResult<()> {
    let mut sorted: Vec<&str> = reachable_basics.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let missing: Vec<&str> = sorted
        .iter()
        .copied()
        .filter(|id| {
            tree.basic_event(id)
                .is_some_and(|event| event.expression().is_none())
        })
        .collect();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|id| tree.orig_of(id)).collect();
        if prob_requested {
            return Err(AnalysisError::Validation(format!(
                "Basic events do not have expressions for probability analysis in '{}' tree:\n{}",
                tree.name(),
                names.join(", ")
            )));
        }
        for name in names {
            warnings.push(format!(
                "Basic event '{}' does not have a probability expression.",
                name
            ));
        }
    }

    if !prob_requested {
        return Ok(());
    }

    let mut domain_problems = Vec::new();
    for id in sorted {
        let Some(expr) = tree.basic_event(id).and_then(|event| event.expression()) else {
            continue;
        };
        if let Err(AnalysisError::Domain(msg)) = pool.validate(expr) {
            domain_problems.push(format!("basic event '{}': {}", tree.orig_of(id), msg));
            continue;
        }
        let mean = pool.mean(expr);
        if !(0.0..=1.0).contains(&mean) {
            domain_problems.push(format!(
                "basic event '{}': probability mean {} is outside [0, 1]",
                tree.orig_of(id),
                mean
            ));
        }
    }
    if domain_problems.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Domain(domain_problems.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GateKind;
    use crate::expression::ExprKind;

    #[test]
    fn test_cycle_reported_with_path() {
        let mut tree = FaultTree::new("cyclic");
        tree.add_gate("Top", GateKind::Or, &["G1", "A"]).unwrap();
        tree.add_gate("G1", GateKind::Or, &["G2", "A"]).unwrap();
        tree.add_gate("G2", GateKind::Or, &["G1", "A"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        let pool = ExpressionPool::new();
        let err = tree.seal(&pool, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cyclicity in 'cyclic' fault tree"));
        assert!(msg.contains("G1->G2->G1"));
    }

    #[test]
    fn test_undefined_leaf_reported() {
        let mut tree = FaultTree::new("incomplete");
        tree.add_gate("Top", GateKind::Or, &["A", "X"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        let pool = ExpressionPool::new();
        let err = tree.seal(&pool, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'X'"));
        assert!(msg.contains("'incomplete' tree"));
    }

    #[test]
    fn test_arity_violations_collected() {
        let mut tree = FaultTree::new("malformed");
        tree.add_gate("Top", GateKind::And, &["G1", "G2"]).unwrap();
        tree.add_gate("G1", GateKind::Or, &["A"]).unwrap();
        tree.add_gate("G2", GateKind::Xor, &["A", "B", "C"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        tree.add_basic_event("B", None).unwrap();
        tree.add_basic_event("C", None).unwrap();
        let pool = ExpressionPool::new();
        let err = tree.seal(&pool, false).unwrap_err();
        let msg = err.to_string();
        // Both problems arrive in one diagnostic.
        assert!(msg.contains("G1"));
        assert!(msg.contains("G2"));
        assert!(msg.contains("malformed gates"));
    }

    #[test]
    fn test_dangling_gate_reported() {
        let mut tree = FaultTree::new("dangling");
        tree.add_gate("Top", GateKind::Or, &["A", "B"]).unwrap();
        tree.add_gate("Orphan", GateKind::And, &["A", "B"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        tree.add_basic_event("B", None).unwrap();
        let pool = ExpressionPool::new();
        let err = tree.seal(&pool, false).unwrap_err();
        assert!(err.to_string().contains("dangling gate"));
    }

    #[test]
    fn test_top_down_gate_is_not_implicit() {
        let mut tree = FaultTree::new("inline");
        tree.add_gate("Top", GateKind::Or, &["Sub", "C"]).unwrap();
        tree.add_gate("Sub", GateKind::And, &["A", "B"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        tree.add_basic_event("B", None).unwrap();
        tree.add_basic_event("C", None).unwrap();
        let pool = ExpressionPool::new();
        tree.seal(&pool, false).unwrap();
        // Sub was referenced by Top before its declaration.
        assert!(tree.inter_events().contains("sub"));
        assert!(tree.implicit_gates().is_empty());
    }

    #[test]
    fn test_inline_gate_discovered_as_implicit() {
        let mut tree = FaultTree::new("inline2");
        tree.add_gate("Top", GateKind::Or, &["Mid", "C"]).unwrap();
        // Sub is declared before anything references it; the later Mid
        // declaration wires it in bottom-up.
        tree.add_gate("Sub", GateKind::And, &["A", "B"]).unwrap();
        tree.add_gate("Mid", GateKind::Null, &["Sub"]).unwrap();
        tree.add_basic_event("A", None).unwrap();
        tree.add_basic_event("B", None).unwrap();
        tree.add_basic_event("C", None).unwrap();
        let pool = ExpressionPool::new();
        tree.seal(&pool, false).unwrap();
        assert!(tree.inter_events().contains("sub"));
        assert!(tree.inter_events().contains("mid"));
        assert!(tree.implicit_gates().contains("sub"));
        assert!(!tree.implicit_gates().contains("mid"));
    }

    #[test]
    fn test_missing_probability_warning_and_error() {
        let mut pool = ExpressionPool::new();
        let p = pool.constant(0.1);
        let mut tree = FaultTree::new("probs");
        tree.add_gate("Top", GateKind::Or, &["A", "B"]).unwrap();
        tree.add_basic_event("A", Some(p)).unwrap();
        tree.add_basic_event("B", None).unwrap();

        let diag = tree.seal(&pool, false).unwrap();
        assert!(diag.warnings.iter().any(|w| w.contains("'B'")));

        let err = tree.seal(&pool, true).unwrap_err();
        assert!(err.to_string().contains("do not have expressions"));
    }

    #[test]
    fn test_probability_mean_out_of_range() {
        let mut pool = ExpressionPool::new();
        let p = pool.constant(1.5);
        let q = pool.constant(0.1);
        let mut tree = FaultTree::new("range");
        tree.add_gate("Top", GateKind::Or, &["A", "B"]).unwrap();
        tree.add_basic_event("A", Some(p)).unwrap();
        tree.add_basic_event("B", Some(q)).unwrap();
        let err = tree.seal(&pool, true).unwrap_err();
        assert!(matches!(err, AnalysisError::Domain(_)));
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn test_expression_domain_error_reported_at_seal() {
        let mut pool = ExpressionPool::new();
        let lambda = pool.constant(-1.0);
        let time = pool.constant(10.0);
        let expr = pool
            .anon(ExprKind::Exponential { lambda, time })
            .unwrap();
        let mut tree = FaultTree::new("domain");
        tree.add_gate("Top", GateKind::Null, &["A"]).unwrap();
        tree.add_basic_event("A", Some(expr)).unwrap();
        let err = tree.seal(&pool, true).unwrap_err();
        assert!(matches!(err, AnalysisError::Domain(_)));
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_unreachable_primary_warns() {
        let mut pool = ExpressionPool::new();
        let p = pool.constant(0.1);
        let mut tree = FaultTree::new("orphan");
        tree.add_gate("Top", GateKind::Or, &["A", "B"]).unwrap();
        tree.add_basic_event("A", Some(p)).unwrap();
        tree.add_basic_event("B", Some(p)).unwrap();
        tree.add_basic_event("Spare", Some(p)).unwrap();
        let diag = tree.seal(&pool, false).unwrap();
        assert!(diag
            .warnings
            .iter()
            .any(|w| w.contains("'Spare'") && w.contains("not reachable")));
    }
}
