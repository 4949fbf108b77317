//! Grammar construction from parser events.
//!
//! The grammar-file parser is an external collaborator; it pushes a stream
//! of events (`directive`, `begin_rule`, `alternative`, `end_rule`,
//! `parser_error`) into a [`GrammarBuilder`], which interns symbols, flattens
//! alternatives into rules, and records diagnostics instead of failing.
//! [`GrammarBuilder::finalize`] runs semantic validation, appends the
//! augmentation rule, and freezes the result into a [`Grammar`].

use crate::{
    diag::{self, Diagnostic, Span},
    grammar::{Assoc, Grammar, Rule, RuleId, Symbol, SymbolId, SymbolKind, SymbolRef},
    types::{Map, Set},
    validate,
};

/// Name of the stable placeholder symbol substituted for unresolvable
/// references, so one bad ref does not cascade.
pub(crate) const SENTINEL: &str = "<invalid>";

/// Directive kinds recognized by the core. Kinds without semantic effect
/// here are stored verbatim in [`Grammar::directives`] for downstream
/// emitters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    StartSymbol,
    Token,
    Type,
    TokenType,
    Left,
    Right,
    Nonassoc,
    Include,
    Code,
    Fallback,
    Wildcard,
    DefaultType,
    DefaultDestructor,
    Destructor,
    ExtraArgument,
    TokenPrefix,
    Name,
    StackSize,
    StackOverflow,
    SyntaxError,
    ParseAccept,
    ParseFailure,
    Unknown,
}

impl DirectiveKind {
    /// Storage key for pass-through directives; `None` for kinds the core
    /// interprets itself and for `Unknown` (which carries its own key).
    fn storage_key(self) -> Option<&'static str> {
        match self {
            Self::TokenType => Some("token_type"),
            Self::Include => Some("include"),
            Self::Code => Some("code"),
            Self::Fallback => Some("fallback"),
            Self::Wildcard => Some("wildcard"),
            Self::DefaultType => Some("default_type"),
            Self::DefaultDestructor => Some("default_destructor"),
            Self::Destructor => Some("destructor"),
            Self::ExtraArgument => Some("extra_argument"),
            Self::TokenPrefix => Some("token_prefix"),
            Self::Name => Some("name"),
            Self::StackSize => Some("stack_size"),
            Self::StackOverflow => Some("stack_overflow"),
            Self::SyntaxError => Some("syntax_error"),
            Self::ParseAccept => Some("parse_accept"),
            Self::ParseFailure => Some("parse_failure"),
            _ => None,
        }
    }
}

/// How the parser refers to a symbol occurrence: by name, with an optional
/// alias. The builder decides terminal vs. nonterminal late, from
/// declarations, prior interning, or spelling.
#[derive(Debug, Clone, Default)]
pub struct SymRef {
    pub name: String,
    pub label: Option<String>,
    pub span: Option<Span>,
}

impl SymRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            span: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// A structured directive record. Different kinds use different payload
/// fields: a single `value`, a `list` of symbol references, or both.
#[derive(Debug, Clone)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Storage key for `Unknown` directives.
    pub key: String,
    /// Single value and/or raw code block, verbatim.
    pub value: String,
    pub list: Vec<SymRef>,
    pub span: Option<Span>,
}

impl Directive {
    pub fn new(kind: DirectiveKind) -> Self {
        Self {
            kind,
            key: String::new(),
            value: String::new(),
            list: Vec::new(),
            span: None,
        }
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn list<I>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = SymRef>,
    {
        self.list = refs.into_iter().collect();
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// One right-hand side of the currently open rule.
#[derive(Debug, Clone, Default)]
pub struct Alt {
    pub rhs: Vec<SymRef>,
    /// Opaque semantic action block.
    pub action: Option<String>,
    /// Optional precedence override, e.g. `%prec PLUS`.
    pub prec: Option<SymRef>,
    pub span: Option<Span>,
}

impl Alt {
    pub fn new<I>(rhs: I) -> Self
    where
        I: IntoIterator<Item = SymRef>,
    {
        Self {
            rhs: rhs.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn prec(mut self, sym: SymRef) -> Self {
        self.prec = Some(sym);
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Incremental grammar builder and event sink.
#[derive(Debug)]
pub struct GrammarBuilder {
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) by_name: Map<String, SymbolId>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) start: Option<SymbolId>,

    directives: Map<String, String>,

    /// Names explicitly declared as tokens (`%token`, precedence groups,
    /// `%prec` overrides). Wins over the spelling heuristic.
    decl_tokens: Set<String>,

    /// `%type` tags seen before the symbol's first rule; applied when the
    /// LHS is opened.
    pending_types: Map<String, String>,

    prec_groups: u16,
    next_terminal_index: u32,
    next_nonterminal_index: u32,

    open_lhs: Option<SymbolId>,
    open_alts: usize,

    /// Treat undeclared ALLCAPS (or non-letter-bearing) RHS names as
    /// terminals. On by default; surprising for users who spell
    /// nonterminals in uppercase, hence the toggle.
    pub use_caps_heuristic: bool,

    pub(crate) diags: Vec<Diagnostic>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        let mut b = Self {
            symbols: Vec::new(),
            by_name: Map::default(),
            rules: Vec::new(),
            start: None,
            directives: Map::default(),
            decl_tokens: Set::default(),
            pending_types: Map::default(),
            prec_groups: 0,
            next_terminal_index: 0,
            next_nonterminal_index: 0,
            open_lhs: None,
            open_alts: 0,
            use_caps_heuristic: true,
            diags: Vec::new(),
        };
        // `$` occupies the reserved id 0 with terminal index 0.
        let eoi = b.intern("$", SymbolKind::Terminal, None);
        debug_assert_eq!(eoi, SymbolId::EOI);
        b
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn has_errors(&self) -> bool {
        diag::has_errors(&self.diags)
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.diags.push(Diagnostic::error(message, span));
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.diags.push(Diagnostic::warning(message, span));
    }

    // ---- symbol interning & metadata ----

    /// Get or create a symbol. A name already interned with a different
    /// kind records an error and keeps the original.
    pub fn intern(&mut self, name: &str, kind: SymbolKind, span: Option<Span>) -> SymbolId {
        let name = name.trim();
        if name.is_empty() {
            self.error("symbol name is empty", span);
            return self.sentinel(None);
        }

        if let Some(&id) = self.by_name.get(name) {
            let existing = self.symbols[id.index()].kind;
            if existing != kind {
                self.error(
                    format!(
                        "symbol {:?} previously declared as {}, cannot redeclare as {}",
                        name, existing, kind
                    ),
                    span,
                );
            }
            return id;
        }

        let id = SymbolId::from_raw(self.symbols.len() as u32);
        let kind_index = match kind {
            SymbolKind::Terminal => {
                let i = self.next_terminal_index;
                self.next_terminal_index += 1;
                i
            }
            SymbolKind::Nonterminal => {
                let i = self.next_nonterminal_index;
                self.next_nonterminal_index += 1;
                i
            }
        };
        self.symbols.push(Symbol {
            name: name.to_owned(),
            kind,
            type_tag: None,
            precedence: 0,
            assoc: Assoc::None,
            declared_at: span,
            kind_index,
        });
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn ensure_terminal(&mut self, name: &str, span: Option<Span>) -> SymbolId {
        self.intern(name, SymbolKind::Terminal, span)
    }

    pub fn ensure_nonterminal(&mut self, name: &str, span: Option<Span>) -> SymbolId {
        self.intern(name, SymbolKind::Nonterminal, span)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name.trim()).copied()
    }

    /// One stable placeholder per builder, so errors do not multiply
    /// symbols.
    pub(crate) fn sentinel(&mut self, span: Option<Span>) -> SymbolId {
        match self.by_name.get(SENTINEL) {
            Some(&id) => id,
            None => self.intern(SENTINEL, SymbolKind::Nonterminal, span),
        }
    }

    /// Set the type annotation on a symbol. Conflicting tags error; the
    /// first wins.
    pub fn set_type_tag(&mut self, id: SymbolId, tag: &str, span: Option<Span>) {
        let tag = tag.trim();
        if tag.is_empty() {
            return;
        }
        let sym = &mut self.symbols[id.index()];
        match &sym.type_tag {
            Some(existing) if existing != tag => {
                let msg = format!(
                    "symbol {:?} already has type {:?}; cannot set to {:?}",
                    sym.name, existing, tag
                );
                self.error(msg, span);
            }
            Some(_) => {}
            None => sym.type_tag = Some(tag.to_owned()),
        }
    }

    pub fn set_start(&mut self, id: SymbolId, span: Option<Span>) {
        let sym = &self.symbols[id.index()];
        if sym.kind != SymbolKind::Nonterminal {
            let msg = format!("start symbol {:?} must be a nonterminal", sym.name);
            self.error(msg, span);
            return;
        }
        if let Some(prev) = self.start {
            if prev != id {
                let msg = format!(
                    "start symbol changed from {:?} to {:?}",
                    self.symbols[prev.index()].name, self.symbols[id.index()].name
                );
                self.warn(msg, span);
            }
        }
        self.start = Some(id);
    }

    /// Assign the next precedence level to a group of terminals. Terminals
    /// that already have a level are skipped with a warning.
    pub fn define_precedence_group(&mut self, assoc: Assoc, terminals: &[SymbolId], span: Option<Span>) {
        if assoc == Assoc::None {
            self.error(
                "precedence group must have associativity (left/right/nonassoc)",
                span.clone(),
            );
            return;
        }
        self.prec_groups += 1;
        let level = self.prec_groups;

        for &t in terminals {
            let sym = &self.symbols[t.index()];
            if sym.kind != SymbolKind::Terminal {
                let msg = format!(
                    "precedence can only be assigned to terminals; {:?} is a {}",
                    sym.name, sym.kind
                );
                self.error(msg, span.clone());
                continue;
            }
            if sym.precedence != 0 {
                let msg = format!(
                    "terminal {:?} already has precedence {}; ignoring new precedence {}",
                    sym.name, sym.precedence, level
                );
                self.warn(msg, span.clone());
                continue;
            }
            let sym = &mut self.symbols[t.index()];
            sym.precedence = level;
            sym.assoc = assoc;
        }
    }

    /// Store a pass-through directive for downstream stages. Overwrites
    /// warn; the last value wins.
    pub fn set_directive(&mut self, key: &str, value: &str, span: Option<Span>) {
        let key = key.trim();
        if key.is_empty() {
            self.error("directive key is empty", span);
            return;
        }
        if self.directives.contains_key(key) {
            self.warn(format!("directive {:?} overwritten", key), span);
        }
        self.directives.insert(key.to_owned(), value.to_owned());
    }

    // ---- event sink ----

    pub fn directive(&mut self, d: Directive) {
        match d.kind {
            DirectiveKind::StartSymbol => {
                let name = d.value.trim();
                if name.is_empty() {
                    self.error("start_symbol requires a symbol name", d.span);
                    return;
                }
                let sym = self.ensure_nonterminal(name, d.span.clone());
                self.set_start(sym, d.span);
            }

            DirectiveKind::Token => {
                let single = d.value.trim().to_owned();
                if !single.is_empty() {
                    self.decl_tokens.insert(single.clone());
                    self.ensure_terminal(&single, d.span.clone());
                }
                for sr in &d.list {
                    let name = sr.name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    self.decl_tokens.insert(name.to_owned());
                    self.ensure_terminal(name, sr.span.clone().or_else(|| d.span.clone()));
                }
            }

            DirectiveKind::Type => {
                let tag = d.value.trim().to_owned();
                if tag.is_empty() {
                    self.error("type directive requires a type tag", d.span);
                    return;
                }
                for sr in &d.list {
                    let name = sr.name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let span = sr.span.clone().or_else(|| d.span.clone());
                    let sym = self.ensure_nonterminal(name, span.clone());
                    self.pending_types.insert(name.to_owned(), tag.clone());
                    self.set_type_tag(sym, &tag, span);
                }
            }

            DirectiveKind::Left | DirectiveKind::Right | DirectiveKind::Nonassoc => {
                let assoc = match d.kind {
                    DirectiveKind::Left => Assoc::Left,
                    DirectiveKind::Right => Assoc::Right,
                    _ => Assoc::NonAssoc,
                };

                let mut terms = Vec::new();
                for sr in &d.list {
                    let name = sr.name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    self.decl_tokens.insert(name.to_owned());
                    terms.push(self.ensure_terminal(name, sr.span.clone().or_else(|| d.span.clone())));
                }
                if terms.is_empty() {
                    // The payload may also be a whitespace-separated list.
                    let names: Vec<String> = d.value.split_whitespace().map(str::to_owned).collect();
                    for name in names {
                        self.decl_tokens.insert(name.clone());
                        terms.push(self.ensure_terminal(&name, d.span.clone()));
                    }
                }
                if terms.is_empty() {
                    self.error("precedence directive requires at least one terminal", d.span);
                    return;
                }
                self.define_precedence_group(assoc, &terms, d.span);
            }

            DirectiveKind::Unknown => {
                let key = d.key.trim();
                let key = if key.is_empty() { "directive" } else { key };
                self.set_directive(key, &d.value, d.span.clone());
            }

            kind => {
                let key = kind.storage_key().expect("pass-through directive kind");
                self.set_directive(key, &d.value, d.span.clone());
            }
        }
    }

    pub fn begin_rule(&mut self, lhs: SymRef) {
        if self.open_lhs.is_some() {
            self.warn(
                "begin rule while previous rule still open; closing previous rule",
                lhs.span.clone(),
            );
            self.close_rule(lhs.span.clone());
        }

        let name = lhs.name.trim();
        if name.is_empty() {
            self.error("rule LHS is empty", lhs.span);
            return;
        }

        let sym = self.ensure_nonterminal(name, lhs.span.clone());
        if let Some(tag) = self.pending_types.get(name).cloned() {
            self.set_type_tag(sym, &tag, lhs.span.clone());
        }

        // The first rule's LHS becomes the start symbol unless a directive
        // chose one.
        if self.start.is_none() && self.symbols[sym.index()].kind == SymbolKind::Nonterminal {
            self.start = Some(sym);
        }

        self.open_lhs = Some(sym);
        self.open_alts = 0;
    }

    pub fn alternative(&mut self, alt: Alt) {
        let Some(lhs) = self.open_lhs else {
            self.error("alternative encountered without an open rule", alt.span);
            return;
        };

        let mut rhs = Vec::with_capacity(alt.rhs.len());
        for sr in &alt.rhs {
            let symbol = self.resolve_rhs_ref(sr);
            let label = sr
                .label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned);
            rhs.push(SymbolRef {
                symbol,
                label,
                span: sr.span.clone(),
            });
        }

        let prec_sym = alt.prec.as_ref().and_then(|ps| {
            let name = ps.name.trim();
            if name.is_empty() {
                self.error("precedence override symbol is empty", ps.span.clone());
                return None;
            }
            self.decl_tokens.insert(name.to_owned());
            Some(self.ensure_terminal(name, ps.span.clone()))
        });

        let action = alt
            .action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_owned);

        let id = RuleId::from_raw(self.rules.len() as u32);
        self.rules.push(Rule {
            id,
            lhs,
            rhs,
            action,
            prec_sym,
            span: alt.span,
        });
        self.open_alts += 1;
    }

    pub fn end_rule(&mut self, span: Option<Span>) {
        // Extra end_rule calls are benign.
        if self.open_lhs.is_some() {
            self.close_rule(span);
        }
    }

    pub fn parser_error(&mut self, span: Option<Span>, message: &str) {
        self.error(message.to_owned(), span);
    }

    fn close_rule(&mut self, span: Option<Span>) {
        if let Some(lhs) = self.open_lhs.take() {
            if self.open_alts == 0 {
                let msg = format!("rule {:?} has no alternatives", self.symbols[lhs.index()].name);
                self.warn(msg, span);
            }
        }
        self.open_alts = 0;
    }

    /// Decide the kind of an untyped RHS reference. Explicit declarations
    /// win over prior interning, which wins over spelling.
    fn resolve_rhs_ref(&mut self, sr: &SymRef) -> SymbolId {
        let name = sr.name.trim();
        if name.is_empty() {
            self.error("rhs symbol name is empty", sr.span.clone());
            return self.sentinel(sr.span.clone());
        }

        if self.decl_tokens.contains(name) {
            return self.ensure_terminal(name, sr.span.clone());
        }
        if let Some(id) = self.lookup(name) {
            return id;
        }
        if self.use_caps_heuristic && looks_like_terminal(name) {
            return self.ensure_terminal(name, sr.span.clone());
        }
        self.ensure_nonterminal(name, sr.span.clone())
    }

    // ---- finalization ----

    /// Validate, augment with `$accept ::= S`, and freeze. Diagnostics are
    /// returned alongside the grammar, never thrown; the grammar carries a
    /// summary `has_errors` flag.
    pub fn finalize(mut self) -> (Grammar, Vec<Diagnostic>) {
        if self.open_lhs.is_some() {
            self.warn("rule still open at end of input; closing it", None);
            self.close_rule(None);
        }

        validate::run(&mut self);

        let start_ok = self
            .start
            .filter(|&s| self.symbols[s.index()].kind == SymbolKind::Nonterminal);

        let mut accept_rule = None;
        // A fatally broken grammar still renders; the error flag prevents
        // any table build from it.
        let start = start_ok.unwrap_or(SymbolId::EOI);
        if !self.rules.is_empty() {
            if let Some(s) = start_ok {
                let accept = self.intern("$accept", SymbolKind::Nonterminal, None);
                let id = RuleId::from_raw(self.rules.len() as u32);
                self.rules.push(Rule {
                    id,
                    lhs: accept,
                    rhs: vec![SymbolRef {
                        symbol: s,
                        label: None,
                        span: None,
                    }],
                    action: None,
                    prec_sym: None,
                    span: None,
                });
                accept_rule = Some(id);
            }
        }

        let mut term_index = Vec::new();
        let mut nt_index = Vec::new();
        for (i, sym) in self.symbols.iter().enumerate() {
            let id = SymbolId::from_raw(i as u32);
            match sym.kind {
                SymbolKind::Terminal => term_index.push(id),
                SymbolKind::Nonterminal => nt_index.push(id),
            }
        }

        let has_errors = diag::has_errors(&self.diags);
        tracing::debug!(
            symbols = self.symbols.len(),
            rules = self.rules.len(),
            diagnostics = self.diags.len(),
            has_errors,
            "grammar finalized"
        );

        let grammar = Grammar {
            symbols: self.symbols,
            by_name: self.by_name,
            rules: self.rules,
            start,
            accept_rule,
            directives: self.directives,
            term_index,
            nt_index,
            has_errors,
        };
        (grammar, self.diags)
    }
}

/// Token-ish spelling: any non-letter character (`"+"`, `"TK_ID"`,
/// `"NUM1"`), or all-uppercase ASCII letters (`"PLUS"`).
fn looks_like_terminal(name: &str) -> bool {
    if name.chars().any(|ch| !ch.is_alphabetic()) {
        return true;
    }
    !name.is_empty() && name.chars().all(|ch| ch.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_spelling_heuristic() {
        assert!(looks_like_terminal("PLUS"));
        assert!(looks_like_terminal("TK_ID"));
        assert!(looks_like_terminal("NUM1"));
        assert!(looks_like_terminal("+"));
        assert!(!looks_like_terminal("expr"));
        assert!(!looks_like_terminal("Expr"));
        assert!(!looks_like_terminal("Überschrift"));
    }

    #[test]
    fn eoi_is_reserved() {
        let b = GrammarBuilder::new();
        assert_eq!(b.lookup("$"), Some(SymbolId::EOI));
        assert_eq!(b.symbols[0].terminal_index(), Some(0));
    }
}
