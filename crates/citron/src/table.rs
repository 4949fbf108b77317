//! Conflict resolution and parse table emission.
//!
//! For every `(state, terminal)` cell the candidates are gathered (shifts
//! from items with the terminal after their dot, reductions from lookahead
//! sets), conflicts are arbitrated by precedence and associativity, and the
//! outcome lands in dense ACTION/GOTO matrices. Nothing here aborts: every
//! conflict is recorded in the [`ConflictReport`], a single action is
//! always chosen, and callers decide what to do with the report.

use crate::{
    diag::Diagnostic,
    grammar::{Assoc, Grammar, RuleId, SymbolId},
    lalr::Lookaheads,
    lr0::{Automaton, Item, State, StateId},
    types::Map,
    util::display_fn,
};
use std::fmt;

/// One cell of the ACTION matrix.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    Error,
    Shift(StateId),
    Reduce(RuleId),
    Accept,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce,
    ReduceReduce,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShiftReduce => f.write_str("shift/reduce"),
            Self::ReduceReduce => f.write_str("reduce/reduce"),
        }
    }
}

/// A recorded conflict, resolved or not. When `resolved` is false the
/// chosen action came from the default policy (shift beats reduce, the
/// lowest rule index beats later rules) and a warning is due.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub state: StateId,
    pub terminal: SymbolId,
    pub shift: Option<StateId>,
    pub reduces: Vec<RuleId>,
    /// The state's items competing for the cell.
    pub items: Vec<Item>,
    pub chosen: Action,
    pub resolution: String,
    pub resolved: bool,
}

impl Conflict {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            write!(
                f,
                "{} conflict in state {} on {}: {}",
                self.kind,
                self.state,
                g.name(self.terminal),
                self.resolution
            )
        })
    }
}

#[derive(Debug, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.resolved).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }

    /// Warnings for the conflicts a user should look at: everything that
    /// fell back to a default policy.
    pub fn to_diagnostics(&self, g: &Grammar) -> Vec<Diagnostic> {
        self.conflicts
            .iter()
            .filter(|c| !c.resolved)
            .map(|c| Diagnostic::warning(c.display(g).to_string(), None))
            .collect()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for c in &self.conflicts {
                writeln!(f, "- {}", c.display(g))?;
                for item in &c.items {
                    writeln!(f, "    {}", item.display(g))?;
                }
            }
            Ok(())
        })
    }
}

/// One row of the rule table shipped with the ACTION/GOTO matrices, enough
/// for a table-driven runtime to perform reductions.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub lhs: u32,
    pub rhs_len: u32,
    pub action: Option<String>,
}

/// The dense parse tables. `action` is `state_count x terminal_count`
/// (initialised to `Error`), `goto` is `state_count x nonterminal_count`
/// (`None` standing for the external contract's `-1`).
#[derive(Debug)]
pub struct ParseTable {
    state_count: usize,
    terminal_count: usize,
    nonterminal_count: usize,
    action: Vec<Action>,
    goto_: Vec<Option<StateId>>,
    rules: Vec<RuleEntry>,
    terminals: Vec<SymbolId>,
    nonterminals: Vec<SymbolId>,
}

impl ParseTable {
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nonterminal_count
    }

    pub fn action(&self, state: StateId, terminal_index: usize) -> Action {
        self.action[state.index() * self.terminal_count + terminal_index]
    }

    pub fn goto(&self, state: StateId, nonterminal_index: usize) -> Option<StateId> {
        self.goto_[state.index() * self.nonterminal_count + nonterminal_index]
    }

    pub fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    /// Terminal symbol for each ACTION column, in column order.
    pub fn terminal_symbols(&self) -> &[SymbolId] {
        &self.terminals
    }

    /// Nonterminal symbol for each GOTO column, in column order.
    pub fn nonterminal_symbols(&self) -> &[SymbolId] {
        &self.nonterminals
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for s in 0..self.state_count {
                let state = StateId::from_raw(s as u32);
                writeln!(f, "state {:02}:", state)?;
                for (ti, &term) in self.terminals.iter().enumerate() {
                    match self.action(state, ti) {
                        Action::Error => {}
                        Action::Shift(to) => writeln!(f, "  {} => shift({})", g.name(term), to)?,
                        Action::Reduce(rule) => {
                            writeln!(f, "  {} => reduce({})", g.name(term), g.rule(rule).display(g))?
                        }
                        Action::Accept => writeln!(f, "  {} => accept", g.name(term))?,
                    }
                }
                for (ni, &nt) in self.nonterminals.iter().enumerate() {
                    if let Some(to) = self.goto(state, ni) {
                        writeln!(f, "  {} => goto({})", g.name(nt), to)?;
                    }
                }
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct Candidates {
    shift: Option<StateId>,
    reduces: Vec<RuleId>,
    accept: bool,
}

/// Build the ACTION/GOTO matrices and the conflict report.
#[tracing::instrument(skip_all)]
pub fn build_tables(automaton: &Automaton<'_>, lookaheads: &Lookaheads) -> (ParseTable, ConflictReport) {
    let g = automaton.grammar();
    let accept_rule = g.accept_rule().expect("tables require a finalized grammar");

    let state_count = automaton.state_count();
    let terminal_count = g.terminal_count();
    let nonterminal_count = g.nonterminal_count();

    let mut action = vec![Action::Error; state_count * terminal_count];
    let mut goto_ = vec![None; state_count * nonterminal_count];
    let mut report = ConflictReport::default();

    for t in automaton.transitions() {
        if let Some(ni) = g.symbol(t.symbol).nonterminal_index() {
            goto_[t.from.index() * nonterminal_count + ni] = Some(t.to);
        }
    }

    for state in automaton.states() {
        let mut cands: Map<SymbolId, Candidates> = Map::default();

        for item in state.items.iter() {
            if let Some(x) = item.next_symbol(g) {
                if g.symbol(x).is_terminal() {
                    let to = automaton
                        .target(state.id, x)
                        .expect("shift item without transition");
                    cands.entry(x).or_default().shift = Some(to);
                }
            }
        }

        // Reduce items arrive in canonical order, so each candidate list is
        // already sorted by rule index.
        for la in lookaheads.reduce_items(state.id) {
            if la.item.rule == accept_rule {
                cands.entry(SymbolId::EOI).or_default().accept = true;
                continue;
            }
            for t in la.lookahead.iter() {
                cands.entry(t).or_default().reduces.push(la.item.rule);
            }
        }

        let mut terminals: Vec<SymbolId> = cands.keys().copied().collect();
        terminals.sort_unstable();
        for t in terminals {
            let cand = &cands[&t];
            let chosen = resolve_cell(g, state, t, cand, &mut report);
            let ti = g
                .symbol(t)
                .terminal_index()
                .expect("lookahead must be a terminal");
            action[state.id.index() * terminal_count + ti] = chosen;
        }
    }

    let rules = g
        .rules()
        .map(|(_, rule)| RuleEntry {
            lhs: g
                .symbol(rule.lhs)
                .nonterminal_index()
                .expect("rule LHS must be a nonterminal") as u32,
            rhs_len: rule.rhs_len() as u32,
            action: rule.action.clone(),
        })
        .collect();

    tracing::debug!(
        states = state_count,
        conflicts = report.len(),
        unresolved = report.unresolved_count(),
        "parse tables built"
    );

    let table = ParseTable {
        state_count,
        terminal_count,
        nonterminal_count,
        action,
        goto_,
        rules,
        terminals: (0..terminal_count).map(|i| g.terminal_by_index(i)).collect(),
        nonterminals: (0..nonterminal_count).map(|i| g.nonterminal_by_index(i)).collect(),
    };
    (table, report)
}

fn competing_items(g: &Grammar, state: &State, terminal: SymbolId, cand: &Candidates) -> Vec<Item> {
    state
        .items
        .iter()
        .filter(|item| {
            item.next_symbol(g) == Some(terminal)
                || (item.is_reduce(g) && cand.reduces.contains(&item.rule))
                || (cand.accept && item.is_reduce(g) && Some(item.rule) == g.accept_rule())
        })
        .collect()
}

fn resolve_cell(
    g: &Grammar,
    state: &State,
    terminal: SymbolId,
    cand: &Candidates,
    report: &mut ConflictReport,
) -> Action {
    // The accept cell: the fully-advanced accept item on `$`. Anything
    // competing with it is suspect, but acceptance must survive.
    if cand.accept {
        if cand.shift.is_some() || !cand.reduces.is_empty() {
            report.conflicts.push(Conflict {
                kind: if cand.shift.is_some() {
                    ConflictKind::ShiftReduce
                } else {
                    ConflictKind::ReduceReduce
                },
                state: state.id,
                terminal,
                shift: cand.shift,
                reduces: cand.reduces.clone(),
                items: competing_items(g, state, terminal, cand),
                chosen: Action::Accept,
                resolution: "accept (end of input wins)".to_owned(),
                resolved: false,
            });
        }
        return Action::Accept;
    }

    match (cand.shift, &cand.reduces[..]) {
        (Some(next), []) => Action::Shift(next),
        (None, [rule]) => Action::Reduce(*rule),
        (None, []) => unreachable!("candidate cell without candidates"),

        // Reduce/reduce: the lowest rule index wins, and that is a default
        // policy, not a resolution.
        (None, reduces) => {
            let winner = reduces[0];
            report.conflicts.push(Conflict {
                kind: ConflictKind::ReduceReduce,
                state: state.id,
                terminal,
                shift: None,
                reduces: reduces.to_vec(),
                items: competing_items(g, state, terminal, cand),
                chosen: Action::Reduce(winner),
                resolution: format!("keeping rule {} (lowest rule index)", winner),
                resolved: false,
            });
            Action::Reduce(winner)
        }

        (Some(next), reduces) => {
            // With several reductions in play, first record the
            // reduce/reduce choice, then arbitrate shift against the
            // surviving rule.
            let rule = reduces[0];
            if reduces.len() > 1 {
                report.conflicts.push(Conflict {
                    kind: ConflictKind::ReduceReduce,
                    state: state.id,
                    terminal,
                    shift: Some(next),
                    reduces: reduces.to_vec(),
                    items: competing_items(g, state, terminal, cand),
                    chosen: Action::Reduce(rule),
                    resolution: format!("keeping rule {} (lowest rule index)", rule),
                    resolved: false,
                });
            }

            let (chosen, resolved, resolution) = resolve_shift_reduce(g, terminal, next, rule);
            report.conflicts.push(Conflict {
                kind: ConflictKind::ShiftReduce,
                state: state.id,
                terminal,
                shift: Some(next),
                reduces: vec![rule],
                items: competing_items(g, state, terminal, cand),
                chosen,
                resolution,
                resolved,
            });
            chosen
        }
    }
}

/// Precedence arbitration for a single shift/reduce pair. The rule's level
/// comes from its explicit override or its rightmost terminal; a missing
/// level on either side leaves the conflict unresolved and shift wins.
fn resolve_shift_reduce(
    g: &Grammar,
    terminal: SymbolId,
    next: StateId,
    rule: RuleId,
) -> (Action, bool, String) {
    let term_prec = g.symbol(terminal).precedence;
    let rule_prec = g.rule(rule).precedence_level(g);

    if term_prec == 0 || rule_prec == 0 {
        return (
            Action::Shift(next),
            false,
            "defaulting to shift (no precedence)".to_owned(),
        );
    }

    if rule_prec > term_prec {
        return (
            Action::Reduce(rule),
            true,
            format!("reducing rule {} (higher precedence)", rule),
        );
    }
    if term_prec > rule_prec {
        return (
            Action::Shift(next),
            true,
            "shifting (higher precedence)".to_owned(),
        );
    }

    match g.symbol(terminal).assoc {
        Assoc::Left => (
            Action::Reduce(rule),
            true,
            format!("reducing rule {} (left associative)", rule),
        ),
        Assoc::Right => (Action::Shift(next), true, "shifting (right associative)".to_owned()),
        Assoc::NonAssoc => (
            Action::Error,
            true,
            "rejecting the input (nonassociative)".to_owned(),
        ),
        Assoc::None => (
            Action::Shift(next),
            false,
            "defaulting to shift (no associativity)".to_owned(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Alt, Directive, DirectiveKind, GrammarBuilder, SymRef};

    fn prec_grammar() -> Grammar {
        let mut b = GrammarBuilder::new();
        b.directive(Directive::new(DirectiveKind::Left).list([SymRef::new("PLUS")]));
        b.directive(Directive::new(DirectiveKind::Right).list([SymRef::new("CARET")]));
        b.directive(Directive::new(DirectiveKind::Nonassoc).list([SymRef::new("EQ")]));
        b.begin_rule(SymRef::new("e"));
        b.alternative(Alt::new([SymRef::new("e"), SymRef::new("PLUS"), SymRef::new("e")]));
        b.alternative(Alt::new([SymRef::new("e"), SymRef::new("CARET"), SymRef::new("e")]));
        b.alternative(Alt::new([SymRef::new("e"), SymRef::new("EQ"), SymRef::new("e")]));
        b.alternative(Alt::new([SymRef::new("NUM")]));
        b.end_rule(None);
        let (g, diags) = b.finalize();
        assert!(!g.has_errors(), "unexpected diagnostics: {:?}", diags);
        g
    }

    fn rule_at(g: &Grammar, index: usize) -> RuleId {
        g.rules().nth(index).unwrap().0
    }

    #[test]
    fn equal_precedence_follows_associativity() {
        let g = prec_grammar();
        let next = StateId::from_raw(1);
        let (plus, caret, eq) = (
            g.lookup("PLUS").unwrap(),
            g.lookup("CARET").unwrap(),
            g.lookup("EQ").unwrap(),
        );

        let (chosen, resolved, _) = resolve_shift_reduce(&g, plus, next, rule_at(&g, 0));
        assert_eq!(chosen, Action::Reduce(rule_at(&g, 0)));
        assert!(resolved);

        let (chosen, resolved, _) = resolve_shift_reduce(&g, caret, next, rule_at(&g, 1));
        assert_eq!(chosen, Action::Shift(next));
        assert!(resolved);

        let (chosen, resolved, _) = resolve_shift_reduce(&g, eq, next, rule_at(&g, 2));
        assert_eq!(chosen, Action::Error);
        assert!(resolved);
    }

    #[test]
    fn levels_beat_associativity() {
        let g = prec_grammar();
        let next = StateId::from_raw(1);
        let plus = g.lookup("PLUS").unwrap();
        let caret = g.lookup("CARET").unwrap();

        // The CARET rule binds tighter than PLUS and vice versa.
        let (chosen, _, _) = resolve_shift_reduce(&g, plus, next, rule_at(&g, 1));
        assert_eq!(chosen, Action::Reduce(rule_at(&g, 1)));
        let (chosen, _, _) = resolve_shift_reduce(&g, caret, next, rule_at(&g, 0));
        assert_eq!(chosen, Action::Shift(next));
    }

    #[test]
    fn missing_precedence_defaults_to_shift_unresolved() {
        let g = prec_grammar();
        let next = StateId::from_raw(1);
        let plus = g.lookup("PLUS").unwrap();

        // e ::= NUM has no terminal with a level.
        let (chosen, resolved, why) = resolve_shift_reduce(&g, plus, next, rule_at(&g, 3));
        assert_eq!(chosen, Action::Shift(next));
        assert!(!resolved);
        assert!(why.contains("no precedence"));
    }
}
