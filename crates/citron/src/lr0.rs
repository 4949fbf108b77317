//! LR(0) automaton construction: items, closure, GOTO, and the canonical
//! state collection.

use crate::{
    grammar::{Grammar, RuleId, SymbolId},
    types::{Map, Set},
    util::display_fn,
};
use std::{collections::VecDeque, fmt};

/// An LR(0) item `(rule, dot)`. `dot == rhs_len` marks a reduce item.
///
/// The derived ordering (rule first, then dot) is the canonical item order;
/// state identity and reproducibility hang off it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item {
    pub rule: RuleId,
    pub dot: u16,
}

impl Item {
    pub fn new(rule: RuleId, dot: u16) -> Self {
        Self { rule, dot }
    }

    /// The symbol immediately right of the dot, if any.
    pub fn next_symbol(&self, g: &Grammar) -> Option<SymbolId> {
        g.rule(self.rule).symbol_at(self.dot as usize)
    }

    pub fn is_reduce(&self, g: &Grammar) -> bool {
        self.dot as usize == g.rule(self.rule).rhs_len()
    }

    pub fn advanced(self) -> Self {
        Self {
            dot: self.dot + 1,
            ..self
        }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let rule = g.rule(self.rule);
            write!(f, "{} ::=", g.name(rule.lhs))?;
            for (i, sym) in rule.rhs_ids().enumerate() {
                if i == self.dot as usize {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.name(sym))?;
            }
            if self.dot as usize == rule.rhs_len() {
                f.write_str(" .")?;
            }
            Ok(())
        })
    }
}

/// A deduplicated item collection in canonical ascending `(rule, dot)`
/// order. Two sets are equal iff they hold the same items, so this doubles
/// as the state-deduplication key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItemSet {
    items: Vec<Item>,
}

impl ItemSet {
    pub fn from_items(mut items: Vec<Item>) -> Self {
        items.sort_unstable();
        items.dedup();
        Self { items }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = Item> + '_ {
        self.items.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: Item) -> bool {
        self.items.binary_search(&item).is_ok()
    }
}

/// Closure of an item set: whenever a nonterminal `B` sits right of a dot,
/// every `B ::= . γ` joins the set, to fixed point.
pub fn closure(g: &Grammar, seed: &[Item]) -> ItemSet {
    let mut rules_of: Map<SymbolId, Vec<RuleId>> = Map::default();
    for (id, rule) in g.rules() {
        rules_of.entry(rule.lhs).or_default().push(id);
    }

    let mut set: Set<Item> = seed.iter().copied().collect();
    let mut queue: VecDeque<Item> = seed.iter().copied().collect();
    while let Some(item) = queue.pop_front() {
        let Some(sym) = item.next_symbol(g) else {
            continue;
        };
        if g.symbol(sym).is_terminal() {
            continue;
        }
        if let Some(rules) = rules_of.get(&sym) {
            for &r in rules {
                let added = Item::new(r, 0);
                if set.insert(added) {
                    queue.push_back(added);
                }
            }
        }
    }

    ItemSet::from_items(set.into_iter().collect())
}

/// `GOTO(I, X)`: advance every item with `X` after its dot, then close.
/// Empty when no item consumes `X`.
pub fn goto(g: &Grammar, items: &ItemSet, x: SymbolId) -> ItemSet {
    let kernel: Vec<Item> = items
        .iter()
        .filter(|item| item.next_symbol(g) == Some(x))
        .map(Item::advanced)
        .collect();
    if kernel.is_empty() {
        return ItemSet::default();
    }
    closure(g, &kernel)
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateId(u32);

impl StateId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s#{:03}", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
pub struct State {
    pub id: StateId,
    pub items: ItemSet,
}

impl State {
    /// Kernel items: the initial accept item plus every item with its dot
    /// past the start.
    pub fn kernel_items<'g>(&'g self, g: &'g Grammar) -> impl Iterator<Item = Item> + 'g {
        let accept = g.accept_rule();
        self.items
            .iter()
            .filter(move |item| item.dot > 0 || Some(item.rule) == accept && self.id.raw() == 0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub symbol: SymbolId,
    pub to: StateId,
}

/// The canonical LR(0) state collection: states numbered 0..K-1 in BFS
/// discovery order from the accept closure, plus the transitions in
/// emission order.
#[derive(Debug)]
pub struct Automaton<'g> {
    grammar: &'g Grammar,
    states: Vec<State>,
    transitions: Vec<Transition>,
    targets: Map<(StateId, SymbolId), StateId>,
}

impl<'g> Automaton<'g> {
    #[tracing::instrument(skip_all)]
    pub fn build(grammar: &'g Grammar) -> Self {
        let accept = grammar
            .accept_rule()
            .expect("automaton requires a finalized grammar");

        let mut states = Vec::new();
        let mut transitions = Vec::new();
        let mut targets = Map::default();
        let mut ids: Map<ItemSet, StateId> = Map::default();
        let mut queue = VecDeque::new();

        let start_set = closure(grammar, &[Item::new(accept, 0)]);
        let s0 = StateId::from_raw(0);
        ids.insert(start_set.clone(), s0);
        states.push(State {
            id: s0,
            items: start_set,
        });
        queue.push_back(s0);

        while let Some(id) = queue.pop_front() {
            // Successor symbols in ascending id order; this fixes both the
            // state numbering and the transition order across runs.
            let mut syms: Vec<SymbolId> = states[id.index()]
                .items
                .iter()
                .filter_map(|item| item.next_symbol(grammar))
                .collect();
            syms.sort_unstable();
            syms.dedup();

            for x in syms {
                let next = goto(grammar, &states[id.index()].items, x);
                debug_assert!(!next.is_empty());

                let to = match ids.get(&next) {
                    Some(&to) => to,
                    None => {
                        let to = StateId::from_raw(states.len() as u32);
                        ids.insert(next.clone(), to);
                        states.push(State { id: to, items: next });
                        queue.push_back(to);
                        to
                    }
                };
                transitions.push(Transition { from: id, symbol: x, to });
                targets.insert((id, x), to);
            }
        }

        tracing::debug!(
            states = states.len(),
            transitions = transitions.len(),
            "LR(0) automaton built"
        );

        Self {
            grammar,
            states,
            transitions,
            targets,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// The unique successor of `from` on `symbol`, if any.
    pub fn target(&self, from: StateId, symbol: SymbolId) -> Option<StateId> {
        self.targets.get(&(from, symbol)).copied()
    }
}

impl fmt::Display for Automaton<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        for state in &self.states {
            writeln!(f, "- state {:02}", state.id)?;
            writeln!(f, "  items:")?;
            for item in state.items.iter() {
                writeln!(f, "  - {}", item.display(g))?;
            }
            let edges: Vec<_> = self
                .transitions
                .iter()
                .filter(|t| t.from == state.id)
                .collect();
            if !edges.is_empty() {
                writeln!(f, "  edges:")?;
                for t in edges {
                    writeln!(f, "  - {} -> {:02}", g.name(t.symbol), t.to)?;
                }
            }
        }
        Ok(())
    }
}
