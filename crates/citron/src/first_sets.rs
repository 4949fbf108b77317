//! Nullable and FIRST set computation.

use crate::grammar::{Grammar, SymbolId, TermSet};

/// The nullable set and per-symbol FIRST sets of a grammar, plus
/// FIRST-of-sequence. All fixed-point, all bitsets over dense ids.
#[derive(Debug)]
pub struct FirstSets {
    nullable: bit_set::BitSet,
    first: Vec<TermSet>,
}

impl FirstSets {
    pub fn new(g: &Grammar) -> Self {
        let nullable = nullable_set(g);
        let first = first_sets(g, &nullable);
        Self { nullable, first }
    }

    /// Terminals are never nullable.
    pub fn is_nullable(&self, id: SymbolId) -> bool {
        self.nullable.contains(id.index())
    }

    pub fn nullable_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.nullable
            .iter()
            .map(|raw| SymbolId::from_raw(raw.try_into().expect("symbol id overflow")))
    }

    pub fn first(&self, id: SymbolId) -> &TermSet {
        &self.first[id.index()]
    }

    /// `FIRST` of a symbol sequence: union `FIRST(Xi)` left to right,
    /// stopping after the first non-nullable symbol. Empty sequences yield
    /// the empty set.
    pub fn first_of<I>(&self, seq: I) -> TermSet
    where
        I: IntoIterator<Item = SymbolId>,
    {
        let mut out = TermSet::default();
        for x in seq {
            out.union_with(&self.first[x.index()]);
            if !self.is_nullable(x) {
                break;
            }
        }
        out
    }

    pub fn all_nullable<I>(&self, seq: I) -> bool
    where
        I: IntoIterator<Item = SymbolId>,
    {
        seq.into_iter().all(|x| self.is_nullable(x))
    }
}

fn nullable_set(g: &Grammar) -> bit_set::BitSet {
    let mut nullable = bit_set::BitSet::with_capacity(g.symbol_count());

    // Empty-RHS rules seed the set on the first pass; each later pass adds
    // nonterminals whose whole RHS has become nullable.
    let mut passes = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        passes += 1;
        for (_, rule) in g.rules() {
            if nullable.contains(rule.lhs.index()) {
                continue;
            }
            if rule.rhs_ids().all(|s| nullable.contains(s.index())) {
                nullable.insert(rule.lhs.index());
                changed = true;
            }
        }
    }
    tracing::trace!(passes, nullable = nullable.len(), "nullable set computed");

    nullable
}

fn first_sets(g: &Grammar, nullable: &bit_set::BitSet) -> Vec<TermSet> {
    let mut first = vec![TermSet::default(); g.symbol_count()];
    for (id, _) in g.terminals() {
        first[id.index()].insert(id);
    }

    let mut passes = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        passes += 1;
        for (_, rule) in g.rules() {
            for x in rule.rhs_ids() {
                if x != rule.lhs {
                    let add = first[x.index()].clone();
                    changed |= first[rule.lhs.index()].union_with(&add);
                }
                if !nullable.contains(x.index()) {
                    break;
                }
            }
        }
    }
    tracing::trace!(passes, "FIRST sets computed");

    first
}
