//! Shared fixtures and the table-driven oracle used by the integration
//! tests.
#![allow(dead_code)] // each test binary uses a different subset

use citron::{
    builder::{Alt, GrammarBuilder, SymRef},
    grammar::{Grammar, SymbolId},
    lr0::StateId,
    table::{Action, ParseTable},
};

pub fn trace_init() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Stream one rule with its alternatives into the builder.
pub fn rule(b: &mut GrammarBuilder, lhs: &str, alts: &[&[&str]]) {
    b.begin_rule(SymRef::new(lhs));
    for alt in alts {
        b.alternative(Alt::new(alt.iter().map(|name| SymRef::new(*name))));
    }
    b.end_rule(None);
}

pub fn finalize_ok(b: GrammarBuilder) -> Grammar {
    let (g, diags) = b.finalize();
    assert!(
        !g.has_errors(),
        "grammar unexpectedly has errors: {:#?}",
        diags
    );
    g
}

/// Scenario 1: the classic unambiguous arithmetic grammar.
///
///   expr   ::= expr PLUS term | term
///   term   ::= term TIMES factor | factor
///   factor ::= LP expr RP | NUM
pub fn arithmetic() -> Grammar {
    let mut b = GrammarBuilder::new();
    rule(&mut b, "expr", &[&["expr", "PLUS", "term"], &["term"]]);
    rule(&mut b, "term", &[&["term", "TIMES", "factor"], &["factor"]]);
    rule(&mut b, "factor", &[&["LP", "expr", "RP"], &["NUM"]]);
    finalize_ok(b)
}

/// Reduce-driven oracle: runs the generated tables over a terminal string
/// and reports whether it is accepted. Any `Error` cell (or missing goto)
/// rejects.
pub fn accepts(g: &Grammar, table: &ParseTable, input: &[&str]) -> bool {
    let column = |name: &str| -> usize {
        let id = g.lookup(name).unwrap_or_else(|| panic!("unknown terminal {:?}", name));
        g.symbol(id)
            .terminal_index()
            .unwrap_or_else(|| panic!("{:?} is not a terminal", name))
    };

    let mut columns: Vec<usize> = input.iter().map(|name| column(name)).collect();
    columns.push(
        g.symbol(SymbolId::EOI)
            .terminal_index()
            .expect("$ must be a terminal"),
    );

    let mut stack = vec![StateId::from_raw(0)];
    let mut pos = 0;
    loop {
        let state = *stack.last().unwrap();
        match table.action(state, columns[pos]) {
            Action::Shift(to) => {
                stack.push(to);
                pos += 1;
            }
            Action::Reduce(rule) => {
                let entry = &table.rules()[rule.index()];
                for _ in 0..entry.rhs_len {
                    stack.pop();
                }
                let top = *stack.last().unwrap();
                match table.goto(top, entry.lhs as usize) {
                    Some(to) => stack.push(to),
                    None => return false,
                }
            }
            Action::Accept => return true,
            Action::Error => return false,
        }
    }
}
