//! LALR(1) lookahead computation.
//!
//! Promotes the LR(0) states by annotating every reduce item with a
//! state-specific lookahead set. Two modes sit behind one operation: the
//! full LALR(1) algorithm (spontaneous lookaheads discovered by probing
//! kernel items with a sentinel, then propagated to fixed point), and an
//! SLR(1) fallback that simply uses FOLLOW sets and may therefore report
//! spurious conflicts on grammars that are LALR but not SLR.

use crate::{
    first_sets::FirstSets,
    follow_sets::FollowSets,
    grammar::{Grammar, SymbolId, TermSet},
    lr0::{Automaton, Item, StateId},
    types::Map,
};
use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Mode {
    /// FOLLOW-set lookaheads. Over-approximates.
    Slr,
    /// Full LALR(1) lookaheads.
    #[default]
    Lalr,
}

/// A reduce item together with the terminals on which its reduction is
/// permitted in a particular state.
#[derive(Debug, Clone)]
pub struct LAItem {
    pub item: Item,
    pub lookahead: TermSet,
}

/// Per-state reduce items in canonical item order, each with its lookahead
/// set.
#[derive(Debug)]
pub struct Lookaheads {
    states: Vec<Vec<LAItem>>,
}

impl Lookaheads {
    pub fn reduce_items(&self, state: StateId) -> &[LAItem] {
        &self.states[state.index()]
    }
}

#[tracing::instrument(skip(automaton, first, follow))]
pub fn compute_lookaheads(
    automaton: &Automaton<'_>,
    first: &FirstSets,
    follow: &FollowSets,
    mode: Mode,
) -> Lookaheads {
    match mode {
        Mode::Slr => slr(automaton, follow),
        Mode::Lalr => lalr(automaton, first),
    }
}

fn slr(automaton: &Automaton<'_>, follow: &FollowSets) -> Lookaheads {
    let g = automaton.grammar();
    let accept = g.accept_rule();

    let mut states = Vec::with_capacity(automaton.state_count());
    for state in automaton.states() {
        let mut las = Vec::new();
        for item in state.items.iter().filter(|item| item.is_reduce(g)) {
            let lookahead = if Some(item.rule) == accept {
                std::iter::once(SymbolId::EOI).collect()
            } else {
                follow.follow(g.rule(item.rule).lhs).clone()
            };
            las.push(LAItem { item, lookahead });
        }
        states.push(las);
    }
    Lookaheads { states }
}

fn lalr(automaton: &Automaton<'_>, first: &FirstSets) -> Lookaheads {
    let g = automaton.grammar();
    let accept = g.accept_rule().expect("automaton requires a finalized grammar");

    // Sentinel terminal outside the grammar. It only ever lives inside
    // probe lookahead sets; its presence after closure marks propagation.
    let sharp = SymbolId::from_raw(g.symbol_count() as u32);

    // Lookahead table for kernel items, keyed per state.
    let mut kernel_la: Vec<Map<Item, TermSet>> = automaton
        .states()
        .iter()
        .map(|s| s.kernel_items(g).map(|item| (item, TermSet::default())).collect())
        .collect();

    // Step 1: probe every kernel item to discover spontaneous lookaheads
    // and propagation links.
    let mut links: Vec<((StateId, Item), (StateId, Item))> = Vec::new();
    for state in automaton.states() {
        for kernel in state.kernel_items(g) {
            let probe: TermSet = std::iter::once(sharp).collect();
            let closed = lr1_closure(g, first, &[(kernel, probe)]);

            for (item, la) in &closed {
                let Some(x) = item.next_symbol(g) else {
                    continue;
                };
                let to = automaton
                    .target(state.id, x)
                    .expect("closure item without transition");
                let image = item.advanced();
                for t in la.iter() {
                    if t == sharp {
                        links.push(((state.id, kernel), (to, image)));
                    } else {
                        kernel_la[to.index()]
                            .get_mut(&image)
                            .expect("image item must be a kernel of the target state")
                            .insert(t);
                    }
                }
            }
        }
    }

    // Step 2: the accept kernel item of state 0 starts with {$}.
    let accept_item = Item::new(accept, 0);
    kernel_la[0]
        .get_mut(&accept_item)
        .expect("state 0 must hold the accept item")
        .insert(SymbolId::EOI);

    // Step 3: propagate along the links until a full pass adds nothing.
    let mut passes = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        passes += 1;
        for &((from_state, from_item), (to_state, to_item)) in &links {
            let src = kernel_la[from_state.index()][&from_item].clone();
            let dst = kernel_la[to_state.index()]
                .get_mut(&to_item)
                .expect("link target must be a kernel item");
            changed |= dst.union_with(&src);
        }
    }
    tracing::debug!(links = links.len(), passes, "lookahead propagation converged");

    // Step 4: reduce items (kernel or closure-only) inherit from the final
    // kernel lookaheads through one more LR(1) closure per state.
    let mut states = Vec::with_capacity(automaton.state_count());
    for state in automaton.states() {
        let seed: Vec<(Item, TermSet)> = state
            .kernel_items(g)
            .map(|item| (item, kernel_la[state.id.index()][&item].clone()))
            .collect();
        let closed = lr1_closure(g, first, &seed);

        let mut las: Vec<LAItem> = closed
            .into_iter()
            .filter(|(item, _)| item.is_reduce(g))
            .map(|(item, lookahead)| LAItem { item, lookahead })
            .collect();
        las.sort_by_key(|la| la.item);
        states.push(las);
    }

    Lookaheads { states }
}

/// LR(1) closure over `(item, lookahead-set)` pairs: for every
/// `B -> γ . C δ` with set `la`, each `C -> . ω` receives
/// `FIRST(δ)`, plus `la` itself when δ is all-nullable.
fn lr1_closure(g: &Grammar, first: &FirstSets, seed: &[(Item, TermSet)]) -> Vec<(Item, TermSet)> {
    let mut la: Map<Item, TermSet> = Map::default();
    let mut queue: VecDeque<Item> = VecDeque::new();
    for (item, set) in seed {
        la.entry(*item).or_default().union_with(set);
        queue.push_back(*item);
    }

    while let Some(item) = queue.pop_front() {
        let Some(b) = item.next_symbol(g) else {
            continue;
        };
        if g.symbol(b).is_terminal() {
            continue;
        }

        let delta: Vec<SymbolId> = g
            .rule(item.rule)
            .rhs_ids()
            .skip(item.dot as usize + 1)
            .collect();
        let mut add = first.first_of(delta.iter().copied());
        if first.all_nullable(delta.iter().copied()) {
            let own = la[&item].clone();
            add.union_with(&own);
        }

        for (rid, rule) in g.rules() {
            if rule.lhs != b {
                continue;
            }
            let target = Item::new(rid, 0);
            let is_new = !la.contains_key(&target);
            let grew = la.entry(target).or_default().union_with(&add);
            if is_new || grew {
                queue.push_back(target);
            }
        }
    }

    la.into_iter().collect()
}
