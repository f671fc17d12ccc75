use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::solver::{AtomId, Lit, Model};
use crate::types::Symbol;

pub const ASSERT: &str = "assert";

/// Packs the arguments of `@all`/`@any` into one value (a tuple when there are several)
/// and returns it with its `assert(...)` atom.
pub fn create_assert(args: &[Symbol]) -> Result<(Symbol, Symbol), String> {
    let value = match args {
        [] => return Err("assertion needs at least one argument".to_string()),
        [single] => single.clone(),
        many => Symbol::tuple(many.to_vec()),
    };
    let assertion = Symbol::function(ASSERT, vec![value.clone()]);
    Ok((value, assertion))
}

/// For-all assertions of one test unit together with the provenance needed to spot
/// assertions derived by more than one rule body.
#[derive(Debug, Default)]
pub struct AssertionIndex {
    asserts: BTreeSet<Symbol>,
    bodies: HashMap<AtomId, BTreeSet<Vec<Lit>>>,
    outputs: BTreeMap<AtomId, Symbol>,
}

impl AssertionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, assertion: Symbol) -> bool {
        self.asserts.insert(assertion)
    }

    pub fn contains(&self, assertion: &Symbol) -> bool {
        self.asserts.contains(assertion)
    }

    pub fn len(&self) -> usize {
        self.asserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asserts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.asserts.iter()
    }

    /// Facts (empty bodies) carry no provenance. The same body seen twice counts once,
    /// regardless of literal order.
    pub fn record_rule(&mut self, head: &[AtomId], body: &[Lit]) {
        if body.is_empty() {
            return;
        }
        let mut signature = body.to_vec();
        signature.sort_unstable();
        signature.dedup();
        for atom in head {
            self.bodies
                .entry(*atom)
                .or_default()
                .insert(signature.clone());
        }
    }

    pub fn record_output(&mut self, symbol: &Symbol, atom: AtomId) {
        self.outputs.insert(atom, symbol.clone());
    }

    pub fn distinct_bodies(&self, atom: AtomId) -> usize {
        self.bodies.get(&atom).map_or(0, BTreeSet::len)
    }

    /// First assertion whose atom was derived by more than one distinct body.
    pub fn ambiguous(&self) -> Option<&Symbol> {
        self.outputs
            .iter()
            .find(|(atom, symbol)| {
                self.asserts.contains(*symbol) && self.distinct_bodies(**atom) > 1
            })
            .map(|(_, symbol)| symbol)
    }

    pub fn missing_from(&self, model: &dyn Model) -> Vec<Symbol> {
        self.asserts
            .iter()
            .filter(|a| !model.contains(a))
            .cloned()
            .collect()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.asserts.iter().map(Symbol::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_argument_is_used_as_is() {
        let (value, assertion) = create_assert(&[Symbol::Number(3)]).expect("assert");
        assert_eq!(value, Symbol::Number(3));
        assert_eq!(assertion.to_string(), "assert(3)");
    }

    #[test]
    fn several_arguments_become_a_tuple() {
        let (value, assertion) =
            create_assert(&[Symbol::Number(4), Symbol::Number(2)]).expect("assert");
        assert_eq!(value.to_string(), "(4,2)");
        assert_eq!(assertion.to_string(), "assert((4,2))");
    }

    #[test]
    fn repeated_body_is_not_ambiguous() {
        let mut index = AssertionIndex::new();
        let a = Symbol::function(ASSERT, vec![Symbol::string("A")]);
        index.insert(a.clone());
        index.record_output(&a, 3);
        index.record_rule(&[3], &[1, 2]);
        index.record_rule(&[3], &[2, 1]);
        index.record_rule(&[3], &[]);
        assert_eq!(index.distinct_bodies(3), 1);
        assert_eq!(index.ambiguous(), None);

        index.record_rule(&[3], &[5]);
        assert_eq!(index.ambiguous(), Some(&a));
    }

    #[test]
    fn ambiguity_only_matters_for_assertions() {
        let mut index = AssertionIndex::new();
        let other = Symbol::constant("helper");
        index.record_output(&other, 7);
        index.record_rule(&[7], &[1]);
        index.record_rule(&[7], &[2]);
        assert_eq!(index.ambiguous(), None);
    }
}
