//! Gates, basic events, and house events
//!
//! Events are shared nodes of a DAG owned by the fault tree; gates refer to
//! their children by identifier and the tree keeps the parent back-links.
//! Identifiers are normalized to lowercase on insertion; the original
//! spelling is retained for diagnostics only.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::expression::ExprId;
use crate::{AnalysisError, AnalysisResult};

/// Normalize a user-supplied identifier to its canonical form
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Logical gate kinds.
///
/// `AtLeast { k }` is the K-out-of-N voting gate with N given by the child
/// count; the remaining kinds reduce to AND/OR/AtLeast during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateKind {
    /// All children must occur
    And,
    /// Any child occurring suffices
    Or,
    /// Complement of the single child
    Not,
    /// Exactly one of the two children occurs
    Xor,
    /// Complemented AND
    Nand,
    /// Complemented OR
    Nor,
    /// Pass-through of the single child
    Null,
    /// At least `k` of the children occur
    AtLeast { k: u32 },
}

impl GateKind {
    /// Kind-specific arity constraint; `Err` carries the violation text
    pub fn check_arity(&self, n_children: usize) -> Result<(), String> {
        match self {
            GateKind::And | GateKind::Or | GateKind::Nand | GateKind::Nor => {
                if n_children < 2 {
                    return Err(format!(
                        "{} gate requires at least 2 children, got {}",
                        self.symbol(),
                        n_children
                    ));
                }
            }
            GateKind::Not | GateKind::Null => {
                if n_children != 1 {
                    return Err(format!(
                        "{} gate requires exactly 1 child, got {}",
                        self.symbol(),
                        n_children
                    ));
                }
            }
            GateKind::Xor => {
                if n_children != 2 {
                    return Err(format!(
                        "XOR gate requires exactly 2 children, got {}",
                        n_children
                    ));
                }
            }
            GateKind::AtLeast { k } => {
                if n_children < 2 {
                    return Err(format!(
                        "ATLEAST gate requires at least 2 children, got {}",
                        n_children
                    ));
                }
                if *k < 1 || *k as usize > n_children {
                    return Err(format!(
                        "ATLEAST gate requires 1 <= k <= {}, got k = {}",
                        n_children, k
                    ));
                }
            }
        }
        Ok(())
    }

    /// Display name used in diagnostics and reports
    pub fn symbol(&self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Not => "NOT",
            GateKind::Xor => "XOR",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Null => "NULL",
            GateKind::AtLeast { .. } => "ATLEAST",
        }
    }
}

/// Internal node of the fault tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    id: String,
    orig_id: String,
    kind: GateKind,
    children: IndexSet<String>,
}

impl Gate {
    pub fn new(orig_id: &str, kind: GateKind) -> Self {
        Self {
            id: normalize_id(orig_id),
            orig_id: orig_id.trim().to_string(),
            kind,
            children: IndexSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Original spelling, for diagnostics
    pub fn orig_id(&self) -> &str {
        &self.orig_id
    }

    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// Attach a child by identifier; duplicates within one gate are rejected
    pub fn add_child(&mut self, child_id: &str) -> AnalysisResult<()> {
        let key = normalize_id(child_id);
        if !self.children.insert(key) {
            return Err(AnalysisError::Validation(format!(
                "Detected a duplicate child '{}' in gate '{}'.",
                child_id.trim(),
                self.orig_id
            )));
        }
        Ok(())
    }

    pub fn children(&self) -> &IndexSet<String> {
        &self.children
    }

    /// Child identifiers in sorted order, for deterministic traversal
    pub fn sorted_children(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.children.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Leaf carrying a probability expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicEvent {
    id: String,
    orig_id: String,
    expression: Option<ExprId>,
}

impl BasicEvent {
    pub fn new(orig_id: &str, expression: Option<ExprId>) -> Self {
        Self {
            id: normalize_id(orig_id),
            orig_id: orig_id.trim().to_string(),
            expression,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn orig_id(&self) -> &str {
        &self.orig_id
    }

    pub fn expression(&self) -> Option<ExprId> {
        self.expression
    }

    pub fn set_expression(&mut self, expression: ExprId) {
        self.expression = Some(expression);
    }
}

/// Leaf with a fixed Boolean state; true is probability 1, false is 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseEvent {
    id: String,
    orig_id: String,
    state: bool,
}

impl HouseEvent {
    pub fn new(orig_id: &str, state: bool) -> Self {
        Self {
            id: normalize_id(orig_id),
            orig_id: orig_id.trim().to_string(),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn orig_id(&self) -> &str {
        &self.orig_id
    }

    pub fn state(&self) -> bool {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_keeps_original() {
        let gate = Gate::new("  PumpTrain-A ", GateKind::And);
        assert_eq!(gate.id(), "pumptrain-a");
        assert_eq!(gate.orig_id(), "PumpTrain-A");
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut gate = Gate::new("G1", GateKind::Or);
        gate.add_child("A").unwrap();
        let err = gate.add_child("a").unwrap_err();
        assert!(err.to_string().contains("duplicate child"));
        assert_eq!(gate.children().len(), 1);
    }

    #[test]
    fn test_sorted_children_order() {
        let mut gate = Gate::new("G1", GateKind::Or);
        gate.add_child("Zeta").unwrap();
        gate.add_child("Alpha").unwrap();
        gate.add_child("Mid").unwrap();
        assert_eq!(gate.sorted_children(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_arity_rules() {
        assert!(GateKind::And.check_arity(1).is_err());
        assert!(GateKind::And.check_arity(2).is_ok());
        assert!(GateKind::Not.check_arity(2).is_err());
        assert!(GateKind::Not.check_arity(1).is_ok());
        assert!(GateKind::Xor.check_arity(3).is_err());
        assert!(GateKind::AtLeast { k: 3 }.check_arity(2).is_err());
        assert!(GateKind::AtLeast { k: 2 }.check_arity(3).is_ok());
        assert!(GateKind::AtLeast { k: 0 }.check_arity(3).is_err());
        assert!(GateKind::Null.check_arity(1).is_ok());
    }
}
