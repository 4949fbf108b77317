//! An LALR(1) parser generator core.
//!
//! The crate turns a declarative grammar, delivered as a stream of builder
//! events, into deterministic shift/reduce parse tables:
//!
//! 1. [`builder::GrammarBuilder`] receives events from a grammar-file parser,
//!    interns symbols, records rules and precedence groups, and finalizes
//!    into a validated, augmented [`grammar::Grammar`].
//! 2. [`first_sets::FirstSets`] and [`follow_sets::FollowSets`] run the
//!    fixed-point set analyses.
//! 3. [`lr0::Automaton`] builds the canonical LR(0) item-set collection.
//! 4. [`lalr::compute_lookaheads`] promotes it to LALR(1) (or SLR(1)).
//! 5. [`table::build_tables`] resolves conflicts and emits the dense
//!    ACTION/GOTO matrices together with a [`table::ConflictReport`].
//!
//! Every stage collects diagnostics instead of aborting; callers inspect
//! [`grammar::Grammar::has_errors`] and the report between stages.

pub mod builder;
pub mod diag;
pub mod first_sets;
pub mod follow_sets;
pub mod grammar;
pub mod lalr;
pub mod lr0;
pub mod table;

mod types;
mod util;
mod validate;

use crate::{
    first_sets::FirstSets,
    follow_sets::FollowSets,
    grammar::Grammar,
    lalr::Mode,
    lr0::Automaton,
    table::{ConflictReport, ParseTable},
};

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The grammar carries error-level diagnostics from building or
    /// validation; tables built from it would be meaningless.
    #[error("the grammar has errors; refusing to build parse tables")]
    InvalidGrammar,
}

/// Run the full pipeline on a finalized grammar.
///
/// Convenience driver for callers that do not need to observe the
/// intermediate stages. Conflicts do not fail the build; they are returned
/// in the report for the caller to inspect.
pub fn generate(grammar: &Grammar, mode: Mode) -> Result<(ParseTable, ConflictReport), GenerateError> {
    if grammar.has_errors() {
        return Err(GenerateError::InvalidGrammar);
    }

    let first = FirstSets::new(grammar);
    let follow = FollowSets::new(grammar, &first);
    let automaton = Automaton::build(grammar);
    let lookaheads = lalr::compute_lookaheads(&automaton, &first, &follow, mode);
    Ok(table::build_tables(&automaton, &lookaheads))
}
