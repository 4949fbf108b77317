//! Grammar types.
//!
//! The ground truth consumed by every analysis stage: interned symbols,
//! flattened production rules, precedence records, and the free-form
//! directive table carried through for downstream emitters.

use crate::{diag::Span, types::Map, util::display_fn};
use std::fmt;

/// Dense symbol identity assigned at interning, shared by terminals and
/// nonterminals.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Reserved terminal marking the end of input (`$`).
    pub const EOI: Self = Self(0);

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOI => f.write_str("$"),
            Self(raw) => write!(f, "Sym#{:03}", raw),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Terminal,
    Nonterminal,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => f.write_str("terminal"),
            Self::Nonterminal => f.write_str("nonterminal"),
        }
    }
}

/// Operator associativity, used when a shift/reduce conflict ties on
/// precedence level.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Assoc {
    #[default]
    None,
    Left,
    Right,
    NonAssoc,
}

/// A named grammar symbol. Terminals and nonterminals share one namespace.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,

    /// Optional type annotation from `%type`-style directives. Opaque here;
    /// downstream emitters interpret it.
    pub type_tag: Option<String>,

    /// Precedence level; 0 means unassigned, higher binds tighter.
    pub precedence: u16,
    pub assoc: Assoc,

    pub declared_at: Option<Span>,

    /// Position within this symbol's kind, used for table addressing.
    pub(crate) kind_index: u32,
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        self.kind == SymbolKind::Terminal
    }

    /// Dense index into the ACTION columns; `$` has terminal index 0.
    pub fn terminal_index(&self) -> Option<usize> {
        self.is_terminal().then_some(self.kind_index as usize)
    }

    /// Dense index into the GOTO columns.
    pub fn nonterminal_index(&self) -> Option<usize> {
        (!self.is_terminal()).then_some(self.kind_index as usize)
    }
}

/// One occurrence of a symbol on a right-hand side.
#[derive(Debug, Clone)]
pub struct SymbolRef {
    pub symbol: SymbolId,
    /// Optional alias attached to the occurrence, e.g. `expr(A)`.
    pub label: Option<String>,
    pub span: Option<Span>,
}

/// Rule identity: the rule's 0-based insertion order, stable for the life
/// of the grammar. The reduce/reduce tie-break relies on this ordering.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleId(u32);

impl RuleId {
    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R#{:03}", self.0)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A single production `lhs -> rhs`. Alternatives streamed by the
/// grammar-file parser are flattened into one `Rule` each, in source order.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub lhs: SymbolId,
    pub rhs: Vec<SymbolRef>,

    /// Opaque semantic action text; never parsed here.
    pub action: Option<String>,

    /// Explicit precedence override: a terminal whose precedence supersedes
    /// the rightmost-terminal default.
    pub prec_sym: Option<SymbolId>,

    pub span: Option<Span>,
}

impl Rule {
    pub fn rhs_len(&self) -> usize {
        self.rhs.len()
    }

    pub fn symbol_at(&self, pos: usize) -> Option<SymbolId> {
        self.rhs.get(pos).map(|r| r.symbol)
    }

    pub fn rhs_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.rhs.iter().map(|r| r.symbol)
    }

    /// The precedence level arbitrating this rule in shift/reduce
    /// conflicts: the explicit override if any, else the rightmost terminal
    /// of the RHS, else 0.
    pub fn precedence_level(&self, g: &Grammar) -> u16 {
        if let Some(sym) = self.prec_sym {
            return g.symbol(sym).precedence;
        }
        for r in self.rhs.iter().rev() {
            if g.symbol(r.symbol).is_terminal() {
                return g.symbol(r.symbol).precedence;
            }
        }
        0
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            write!(f, "{} ::=", g.name(self.lhs))?;
            for r in &self.rhs {
                write!(f, " {}", g.name(r.symbol))?;
            }
            Ok(())
        })
    }
}

/// A set of terminals, backed by a bitset over dense symbol ids. Iteration
/// is always in ascending id order, which keeps every consumer
/// deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TermSet {
    inner: bit_set::BitSet,
}

impl TermSet {
    pub fn contains(&self, id: SymbolId) -> bool {
        self.inner.contains(id.index())
    }

    pub fn insert(&mut self, id: SymbolId) -> bool {
        self.inner.insert(id.index())
    }

    /// Union in `other`; reports whether anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.inner.len();
        self.inner.union_with(&other.inner);
        self.inner.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.inner
            .iter()
            .map(|raw| SymbolId::from_raw(raw.try_into().expect("symbol id overflow")))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            f.write_str("{")?;
            for (i, id) in self.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(g.name(id))?;
            }
            f.write_str("}")
        })
    }
}

impl FromIterator<SymbolId> for TermSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = SymbolId>,
    {
        Self {
            inner: iter.into_iter().map(SymbolId::index).collect(),
        }
    }
}

/// The frozen grammar produced by [`crate::builder::GrammarBuilder::finalize`].
/// Read-only from then on; every later stage borrows it.
#[derive(Debug)]
pub struct Grammar {
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) by_name: Map<String, SymbolId>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) start: SymbolId,
    pub(crate) accept_rule: Option<RuleId>,
    pub(crate) directives: Map<String, String>,
    pub(crate) term_index: Vec<SymbolId>,
    pub(crate) nt_index: Vec<SymbolId>,
    pub(crate) has_errors: bool,
}

impl Grammar {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.symbols[id.index()].name
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| (SymbolId::from_raw(i as u32), sym))
    }

    pub fn terminals(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| sym.is_terminal())
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| !sym.is_terminal())
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn terminal_count(&self) -> usize {
        self.term_index.len()
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nt_index.len()
    }

    pub fn terminal_by_index(&self, index: usize) -> SymbolId {
        self.term_index[index]
    }

    pub fn nonterminal_by_index(&self, index: usize) -> SymbolId {
        self.nt_index[index]
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> + '_ {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleId::from_raw(i as u32), rule))
    }

    pub fn start_symbol(&self) -> SymbolId {
        self.start
    }

    /// The augmentation rule `$accept ::= S`, present when finalization
    /// succeeded.
    pub fn accept_rule(&self) -> Option<RuleId> {
        self.accept_rule
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives.get(key).map(String::as_str)
    }

    pub fn directives(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.directives.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether building or validation recorded error-level diagnostics.
    /// Drivers check this before moving to the next stage.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminals:")?;
        for (i, (_, sym)) in self.terminals().enumerate() {
            f.write_str(if i > 0 { ", " } else { " " })?;
            f.write_str(&sym.name)?;
        }
        write!(f, "\nnonterminals:")?;
        for (i, (_, sym)) in self.nonterminals().enumerate() {
            f.write_str(if i > 0 { ", " } else { " " })?;
            f.write_str(&sym.name)?;
        }
        writeln!(f, "\nstart: {}", self.name(self.start))?;
        writeln!(f, "rules:")?;
        for (id, rule) in self.rules() {
            writeln!(f, "  [{:02}] {}", id, rule.display(self))?;
        }
        Ok(())
    }
}
