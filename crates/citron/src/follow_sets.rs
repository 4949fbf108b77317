//! FOLLOW set computation.

use crate::{
    first_sets::FirstSets,
    grammar::{Grammar, SymbolId, TermSet},
};

/// Per-nonterminal FOLLOW sets. Seeded with `$` on the start symbol, then
/// iterated to fixed point over the rules.
#[derive(Debug)]
pub struct FollowSets {
    follow: Vec<TermSet>,
}

impl FollowSets {
    pub fn new(g: &Grammar, first: &FirstSets) -> Self {
        let mut follow = vec![TermSet::default(); g.symbol_count()];
        follow[g.start_symbol().index()].insert(SymbolId::EOI);

        let mut passes = 0usize;
        let mut changed = true;
        while changed {
            changed = false;
            passes += 1;
            for (_, rule) in g.rules() {
                let rhs: Vec<SymbolId> = rule.rhs_ids().collect();
                for (i, &b) in rhs.iter().enumerate() {
                    if g.symbol(b).is_terminal() {
                        continue;
                    }
                    let tail = &rhs[i + 1..];

                    // A -> α B β: FIRST(β) flows into FOLLOW(B); when β can
                    // vanish, FOLLOW(A) flows in as well.
                    let add = first.first_of(tail.iter().copied());
                    changed |= follow[b.index()].union_with(&add);
                    if first.all_nullable(tail.iter().copied()) {
                        let from_lhs = follow[rule.lhs.index()].clone();
                        changed |= follow[b.index()].union_with(&from_lhs);
                    }
                }
            }
        }
        tracing::trace!(passes, "FOLLOW sets computed");

        Self { follow }
    }

    pub fn follow(&self, id: SymbolId) -> &TermSet {
        &self.follow[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Alt, Directive, DirectiveKind, GrammarBuilder, SymRef};

    fn names(g: &Grammar, set: &TermSet) -> Vec<String> {
        set.iter().map(|id| g.name(id).to_owned()).collect()
    }

    // S ::= A B c ; A ::= a | ε ; B ::= b | ε
    #[test]
    fn nullable_chain_follow() {
        let mut b = GrammarBuilder::new();
        b.use_caps_heuristic = false;
        b.directive(
            Directive::new(DirectiveKind::Token)
                .list([SymRef::new("a"), SymRef::new("b"), SymRef::new("c")]),
        );
        b.begin_rule(SymRef::new("S"));
        b.alternative(Alt::new([SymRef::new("A"), SymRef::new("B"), SymRef::new("c")]));
        b.end_rule(None);
        b.begin_rule(SymRef::new("A"));
        b.alternative(Alt::new([SymRef::new("a")]));
        b.alternative(Alt::new([]));
        b.end_rule(None);
        b.begin_rule(SymRef::new("B"));
        b.alternative(Alt::new([SymRef::new("b")]));
        b.alternative(Alt::new([]));
        b.end_rule(None);
        let (g, diags) = b.finalize();
        assert!(!g.has_errors(), "unexpected diagnostics: {:?}", diags);

        let first = FirstSets::new(&g);
        let follow = FollowSets::new(&g, &first);

        let (s, a, bb) = (
            g.lookup("S").unwrap(),
            g.lookup("A").unwrap(),
            g.lookup("B").unwrap(),
        );
        assert_eq!(names(&g, follow.follow(s)), ["$"]);
        assert_eq!(names(&g, follow.follow(a)), ["b", "c"]);
        assert_eq!(names(&g, follow.follow(bb)), ["c"]);
    }
}
