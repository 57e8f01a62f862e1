//! Fault-tree container and builder API
//!
//! A [`FaultTree`] is populated through the builder methods (`add_gate`,
//! `add_basic_event`, `add_house_event`), sealed by [`FaultTree::seal`] which
//! runs the structural validation, and read-only during analysis.
//!
//! The first gate added becomes the top event. Later gates may be declared
//! top-down (a parent already references them) or inline/bottom-up; the
//! latter are discovered during validation and recorded as implicit gates.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{normalize_id, BasicEvent, Gate, GateKind, HouseEvent};
use crate::expression::{ExprId, ExpressionPool};
use crate::validate;
use crate::{AnalysisError, AnalysisResult};

/// Non-fatal findings collected while sealing a tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
}

/// A fault-tree model: one top gate, the gates and primary events reachable
/// from it, and the parent index for traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultTree {
    name: String,
    top_event: Option<String>,
    gates: IndexMap<String, Gate>,
    basic_events: IndexMap<String, BasicEvent>,
    house_events: IndexMap<String, HouseEvent>,
    /// Child id -> ids of gates referencing it
    parents: IndexMap<String, IndexSet<String>>,
    /// Original spellings for diagnostics
    orig_ids: IndexMap<String, String>,
    /// Gates that were referenced by a parent before their own declaration
    pre_declared: IndexSet<String>,
    /// Non-top gates reachable from the top event (sealed)
    inter_events: IndexSet<String>,
    /// Reachable gates that were declared inline, without top-down
    /// registration (sealed)
    implicit_gates: IndexSet<String>,
    /// Discovered primary events, partitioned (sealed)
    reachable_basics: IndexSet<String>,
    reachable_houses: IndexSet<String>,
    sealed: bool,
}

impl FaultTree {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            top_event: None,
            gates: IndexMap::new(),
            basic_events: IndexMap::new(),
            house_events: IndexMap::new(),
            parents: IndexMap::new(),
            orig_ids: IndexMap::new(),
            pre_declared: IndexSet::new(),
            inter_events: IndexSet::new(),
            implicit_gates: IndexSet::new(),
            reachable_basics: IndexSet::new(),
            reachable_houses: IndexSet::new(),
            sealed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the top gate; `None` until the first gate is added
    pub fn top_event(&self) -> Option<&str> {
        self.top_event.as_deref()
    }

    /// Add a gate with its children. The first gate becomes the top event.
    pub fn add_gate(&mut self, id: &str, kind: GateKind, children: &[&str]) -> AnalysisResult<()> {
        let key = normalize_id(id);
        self.check_unique(id, &key)?;
        let mut gate = Gate::new(id, kind);
        for child in children {
            gate.add_child(child)?;
            // Keep the referenced spelling for diagnostics until (unless)
            // the child is declared with its own.
            self.orig_ids
                .entry(normalize_id(child))
                .or_insert_with(|| child.trim().to_string());
        }
        // A gate already referenced by some parent was declared top-down.
        if self.top_event.is_some() && self.parents.contains_key(&key) {
            self.pre_declared.insert(key.clone());
        }
        for child in gate.children() {
            self.parents
                .entry(child.clone())
                .or_default()
                .insert(key.clone());
        }
        self.orig_ids.insert(key.clone(), id.trim().to_string());
        if self.top_event.is_none() {
            self.top_event = Some(key.clone());
        }
        self.gates.insert(key, gate);
        self.sealed = false;
        Ok(())
    }

    /// Add a basic event; the expression may be attached later
    pub fn add_basic_event(&mut self, id: &str, expression: Option<ExprId>) -> AnalysisResult<()> {
        let key = normalize_id(id);
        self.check_unique(id, &key)?;
        self.orig_ids.insert(key.clone(), id.trim().to_string());
        self.basic_events.insert(key, BasicEvent::new(id, expression));
        self.sealed = false;
        Ok(())
    }

    /// Add a house event with its fixed state
    pub fn add_house_event(&mut self, id: &str, state: bool) -> AnalysisResult<()> {
        let key = normalize_id(id);
        self.check_unique(id, &key)?;
        self.orig_ids.insert(key.clone(), id.trim().to_string());
        self.house_events.insert(key, HouseEvent::new(id, state));
        self.sealed = false;
        Ok(())
    }

    /// Attach a probability expression to an existing basic event
    pub fn set_expression(&mut self, id: &str, expression: ExprId) -> AnalysisResult<()> {
        let key = normalize_id(id);
        match self.basic_events.get_mut(&key) {
            Some(event) => {
                event.set_expression(expression);
                self.sealed = false;
                Ok(())
            }
            None => Err(AnalysisError::Validation(format!(
                "Basic event '{}' is not defined in '{}' tree.",
                id.trim(),
                self.name
            ))),
        }
    }

    fn check_unique(&self, orig: &str, key: &str) -> AnalysisResult<()> {
        if self.gates.contains_key(key)
            || self.basic_events.contains_key(key)
            || self.house_events.contains_key(key)
        {
            return Err(AnalysisError::Validation(format!(
                "Trying to doubly define an event '{}'.",
                orig.trim()
            )));
        }
        Ok(())
    }

    /// Run the structural validation and freeze the tree for analysis.
    ///
    /// Sealing an already sealed tree re-runs validation and yields identical
    /// diagnostics. With `prob_requested`, basic events without expressions
    /// and expression domain violations become errors instead of warnings.
    pub fn seal(
        &mut self,
        pool: &ExpressionPool,
        prob_requested: bool,
    ) -> AnalysisResult<Diagnostics> {
        let outcome = validate::run(self, pool, prob_requested)?;
        self.inter_events = outcome.inter_events;
        self.implicit_gates = outcome.implicit_gates;
        self.reachable_basics = outcome.reachable_basics;
        self.reachable_houses = outcome.reachable_houses;
        self.sealed = true;
        debug!(
            tree = %self.name,
            gates = self.inter_events.len() + 1,
            basic_events = self.reachable_basics.len(),
            "fault tree sealed"
        );
        Ok(Diagnostics {
            warnings: outcome.warnings,
        })
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.get(id)
    }

    pub fn basic_event(&self, id: &str) -> Option<&BasicEvent> {
        self.basic_events.get(id)
    }

    pub fn house_event(&self, id: &str) -> Option<&HouseEvent> {
        self.house_events.get(id)
    }

    pub fn gates(&self) -> &IndexMap<String, Gate> {
        &self.gates
    }

    pub fn basic_events(&self) -> &IndexMap<String, BasicEvent> {
        &self.basic_events
    }

    pub fn house_events(&self) -> &IndexMap<String, HouseEvent> {
        &self.house_events
    }

    /// Parent gates of an event, if any reference it
    pub fn parents(&self, id: &str) -> Option<&IndexSet<String>> {
        self.parents.get(&normalize_id(id))
    }

    /// Gates that were referenced by a parent before their declaration
    pub(crate) fn pre_declared(&self) -> &IndexSet<String> {
        &self.pre_declared
    }

    /// Non-top gates reachable from the top event; populated by `seal`
    pub fn inter_events(&self) -> &IndexSet<String> {
        &self.inter_events
    }

    /// Reachable gates that were declared inline; populated by `seal`
    pub fn implicit_gates(&self) -> &IndexSet<String> {
        &self.implicit_gates
    }

    /// Basic events reachable from the top event; populated by `seal`
    pub fn reachable_basics(&self) -> &IndexSet<String> {
        &self.reachable_basics
    }

    /// House events reachable from the top event; populated by `seal`
    pub fn reachable_houses(&self) -> &IndexSet<String> {
        &self.reachable_houses
    }

    /// Original spelling of an identifier, falling back to the canonical form
    pub fn orig_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.orig_ids.get(id).map(String::as_str).unwrap_or(id)
    }
}
