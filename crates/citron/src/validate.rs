//! Semantic validation of a fully-built, pre-augmentation grammar.
//!
//! Runs once from [`GrammarBuilder::finalize`]. Emits diagnostics in a
//! fixed order; never aborts, so one pass surfaces as many problems as
//! possible.

use crate::{
    builder::{GrammarBuilder, SENTINEL},
    diag::Diagnostic,
    grammar::{SymbolId, SymbolKind},
    types::{Map, Set},
};

pub(crate) fn run(b: &mut GrammarBuilder) {
    if b.rules.is_empty() {
        b.error("grammar has no rules", None);
        return;
    }

    let nsym = b.symbols.len();
    let mut pending: Vec<Diagnostic> = Vec::new();

    match b.start {
        None => pending.push(Diagnostic::error(
            "start symbol is not set and could not be inferred",
            None,
        )),
        Some(s) if b.symbols[s.index()].kind != SymbolKind::Nonterminal => {
            let sym = &b.symbols[s.index()];
            pending.push(Diagnostic::error(
                format!("start symbol {:?} must be a nonterminal", sym.name),
                sym.declared_at.clone(),
            ));
        }
        Some(_) => {}
    }

    // One walk collects everything the remaining checks need: usage counts,
    // defining rules, and the nonterminal reference graph.
    let mut used = vec![0usize; nsym];
    let mut lhs_has_rule = vec![false; nsym];
    let mut edges: Map<SymbolId, Set<SymbolId>> = Map::default();

    for rule in &b.rules {
        let lhs = &b.symbols[rule.lhs.index()];
        if lhs.kind != SymbolKind::Nonterminal {
            pending.push(Diagnostic::error(
                format!("rule LHS {:?} must be a nonterminal", lhs.name),
                rule.span.clone(),
            ));
        }
        lhs_has_rule[rule.lhs.index()] = true;

        let targets = edges.entry(rule.lhs).or_default();
        for r in &rule.rhs {
            used[r.symbol.index()] += 1;
            if b.symbols[r.symbol.index()].kind == SymbolKind::Nonterminal {
                targets.insert(r.symbol);
            }
        }

        if let Some(ps) = rule.prec_sym {
            let sym = &b.symbols[ps.index()];
            if sym.kind != SymbolKind::Terminal {
                pending.push(Diagnostic::error(
                    format!("precedence override symbol {:?} must be a terminal", sym.name),
                    rule.span.clone(),
                ));
            } else if sym.precedence == 0 {
                pending.push(Diagnostic::warning(
                    format!(
                        "precedence override uses {:?}, but it has no precedence level",
                        sym.name
                    ),
                    rule.span.clone(),
                ));
            }
            used[ps.index()] += 1;
        }
    }

    // Nonterminals referenced on some RHS but never defined.
    for (i, sym) in b.symbols.iter().enumerate() {
        if used[i] > 0
            && sym.kind == SymbolKind::Nonterminal
            && !lhs_has_rule[i]
            && sym.name != SENTINEL
        {
            pending.push(Diagnostic::error(
                format!("nonterminal {:?} is used but has no rule", sym.name),
                sym.declared_at.clone(),
            ));
        }
    }

    // Reachability from the start symbol over nonterminal edges.
    let start_nt = b
        .start
        .filter(|&s| b.symbols[s.index()].kind == SymbolKind::Nonterminal);
    if let Some(start) = start_nt {
        let mut reachable = vec![false; nsym];
        reachable[start.index()] = true;
        let mut stack = vec![start];
        while let Some(nt) = stack.pop() {
            if let Some(targets) = edges.get(&nt) {
                for &next in targets {
                    if !reachable[next.index()] {
                        reachable[next.index()] = true;
                        stack.push(next);
                    }
                }
            }
        }
        for (i, sym) in b.symbols.iter().enumerate() {
            if lhs_has_rule[i] && !reachable[i] {
                pending.push(Diagnostic::warning(
                    format!(
                        "nonterminal {:?} has rules but is unreachable from start symbol {:?}",
                        sym.name,
                        b.symbols[start.index()].name
                    ),
                    sym.declared_at.clone(),
                ));
            }
        }
    }

    // Productivity: terminals are productive; a nonterminal becomes
    // productive once some rule's RHS is entirely productive.
    let mut productive = vec![false; nsym];
    for (i, sym) in b.symbols.iter().enumerate() {
        productive[i] = sym.kind == SymbolKind::Terminal;
    }
    let mut changed = true;
    while changed {
        changed = false;
        for rule in &b.rules {
            if productive[rule.lhs.index()] {
                continue;
            }
            if rule.rhs.iter().all(|r| productive[r.symbol.index()]) {
                productive[rule.lhs.index()] = true;
                changed = true;
            }
        }
    }
    for (i, sym) in b.symbols.iter().enumerate() {
        if lhs_has_rule[i] && !productive[i] {
            pending.push(Diagnostic::warning(
                format!(
                    "nonterminal {:?} is unproductive; none of its rules derive a terminal string",
                    sym.name
                ),
                sym.declared_at.clone(),
            ));
        }
    }

    // Declared but never referenced. The start symbol is referenced by the
    // augmentation; reserved and placeholder symbols are exempt.
    for (i, sym) in b.symbols.iter().enumerate() {
        let id = SymbolId::from_raw(i as u32);
        if id == SymbolId::EOI || sym.name == SENTINEL || Some(id) == b.start {
            continue;
        }
        if used[i] != 0 {
            continue;
        }
        let msg = match sym.kind {
            SymbolKind::Terminal => format!("terminal {:?} is declared but never used", sym.name),
            SymbolKind::Nonterminal if lhs_has_rule[i] => {
                format!("nonterminal {:?} has rules but is never referenced", sym.name)
            }
            SymbolKind::Nonterminal => format!(
                "nonterminal {:?} is declared but never used and has no rules",
                sym.name
            ),
        };
        pending.push(Diagnostic::warning(msg, sym.declared_at.clone()));
    }

    b.diags.extend(pending);
}
