//! Grammar data model: rules, the production sum type, tokens, and the
//! token-stream cursor the simulator reads from.
//!
//! Production nodes form a closed tagged variant so the ATN builder can match
//! exhaustively — adding or removing a node kind is a compile-time-checked
//! concern, not a virtual-dispatch one.

use std::collections::HashMap;

/// Identifier for a terminal token type.
pub type TokenTypeId = u32;

/// Identifier for a predicate guard attached to an alternative.
///
/// Guard ids index bits of a [`PredicateMask`](crate::PredicateMask) and must
/// therefore be below 64.
pub type GuardId = u32;

/// Reserved token type for end-of-input. The simulator treats it as an
/// ordinary token type: grammars may match it explicitly, and peeking past
/// the end of a stream yields it.
pub const EOF_TOKEN_TYPE: TokenTypeId = 0;

/// Source position span, carried on tokens for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexed token as seen by the lookahead engine.
///
/// `categories` lists the supertype ids this token also satisfies: a token
/// matches an `Atom` transition if its own type equals the expected type or
/// the expected type appears among its categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub type_id: TokenTypeId,
    pub categories: Vec<TokenTypeId>,
    pub span: Span,
}

impl Token {
    /// A token with no declared supertypes.
    pub fn new(type_id: TokenTypeId) -> Self {
        Token { type_id, categories: Vec::new(), span: Span::default() }
    }

    /// A token that also satisfies the given supertype ids.
    pub fn with_categories(type_id: TokenTypeId, categories: Vec<TokenTypeId>) -> Self {
        Token { type_id, categories, span: Span::default() }
    }

    /// The end-of-input sentinel token.
    pub fn eof() -> Self {
        Token::new(EOF_TOKEN_TYPE)
    }

    /// Whether this token satisfies `expected` — exact type match, or a
    /// declared supertype when category matching is enabled.
    pub fn satisfies(&self, expected: TokenTypeId, category_matching: bool) -> bool {
        self.type_id == expected
            || (category_matching && self.categories.contains(&expected))
    }
}

/// Non-consuming token cursor handed to `predict` by the surrounding parser.
///
/// Lookahead is 1-indexed: `peek(1)` is the next unconsumed token. Peeking at
/// or past end of input yields an EOF token, so the simulator never has to
/// special-case stream exhaustion.
pub trait TokenStream {
    fn peek(&self, k: usize) -> &Token;
}

/// `TokenStream` over a token slice, starting at the slice's first element.
pub struct SliceTokenStream<'a> {
    tokens: &'a [Token],
    eof: Token,
}

impl<'a> SliceTokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        SliceTokenStream { tokens, eof: Token::eof() }
    }
}

impl TokenStream for SliceTokenStream<'_> {
    fn peek(&self, k: usize) -> &Token {
        debug_assert!(k >= 1, "lookahead is 1-indexed");
        self.tokens.get(k - 1).unwrap_or(&self.eof)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Productions
// ══════════════════════════════════════════════════════════════════════════════

/// One node of a rule's production tree.
#[derive(Debug, Clone)]
pub enum Production {
    /// Ordered concatenation of sub-productions.
    Sequence(Vec<Production>),
    /// Ordered choice between alternatives; a decision point.
    Alternation(Vec<Alternative>),
    /// Zero-or-one occurrence of the body; a decision point.
    Option(Box<Production>),
    /// Zero-or-more occurrences of the body; a decision point.
    Repetition(Box<Production>),
    /// One-or-more occurrences of the body; the continuation after the
    /// mandatory first occurrence is the decision point.
    RepetitionMandatory(Box<Production>),
    /// Zero-or-more occurrences separated by a terminal.
    RepetitionWithSeparator { body: Box<Production>, separator: TokenTypeId },
    /// One-or-more occurrences separated by a terminal.
    RepetitionMandatoryWithSeparator { body: Box<Production>, separator: TokenTypeId },
    /// Consume exactly one token of the given type (or a token declaring it
    /// as a supertype).
    Terminal(TokenTypeId),
    /// Invoke another rule by name.
    NonTerminal(String),
    /// A semantic action: no syntactic footprint, epsilon in the automaton.
    Action,
}

impl Production {
    pub fn seq(items: Vec<Production>) -> Self {
        Production::Sequence(items)
    }

    /// An alternation of ungated alternatives.
    pub fn alt(alternatives: Vec<Production>) -> Self {
        Production::Alternation(alternatives.into_iter().map(Alternative::new).collect())
    }

    pub fn opt(body: Production) -> Self {
        Production::Option(Box::new(body))
    }

    pub fn rep(body: Production) -> Self {
        Production::Repetition(Box::new(body))
    }

    pub fn rep1(body: Production) -> Self {
        Production::RepetitionMandatory(Box::new(body))
    }

    pub fn rep_sep(body: Production, separator: TokenTypeId) -> Self {
        Production::RepetitionWithSeparator { body: Box::new(body), separator }
    }

    pub fn rep1_sep(body: Production, separator: TokenTypeId) -> Self {
        Production::RepetitionMandatoryWithSeparator { body: Box::new(body), separator }
    }

    pub fn t(token_type: TokenTypeId) -> Self {
        Production::Terminal(token_type)
    }

    pub fn nt(rule: impl Into<String>) -> Self {
        Production::NonTerminal(rule.into())
    }
}

/// One alternative of an alternation, with an optional predicate guard.
///
/// Guards are evaluated by the caller (they may depend on parser state
/// outside the token stream) and supplied to `predict` as a bit mask; the
/// simulator consults them only when lookahead alone cannot disambiguate.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub production: Production,
    pub guard: Option<GuardId>,
}

impl Alternative {
    pub fn new(production: Production) -> Self {
        Alternative { production, guard: None }
    }

    pub fn gated(production: Production, guard: GuardId) -> Self {
        Alternative { production, guard: Some(guard) }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Grammar
// ══════════════════════════════════════════════════════════════════════════════

/// A named grammar rule: the rule's production tree is its body.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub production: Production,
}

/// Declared supertype relation between token types, used by the static
/// validator when comparing lookahead paths under category matching.
///
/// At parse time each `Token` carries its own flattened category set; the
/// hierarchy here is the grammar-side declaration of the same relation.
#[derive(Debug, Clone, Default)]
pub struct TokenHierarchy {
    supertypes: HashMap<TokenTypeId, Vec<TokenTypeId>>,
}

impl TokenHierarchy {
    pub fn new() -> Self {
        TokenHierarchy::default()
    }

    /// Declare the direct supertypes of a token type.
    pub fn declare(&mut self, sub: TokenTypeId, supers: Vec<TokenTypeId>) {
        self.supertypes.entry(sub).or_default().extend(supers);
    }

    /// Whether `sub` satisfies `sup`: reflexive, transitive over the
    /// declared supertype edges.
    pub fn satisfies(&self, sub: TokenTypeId, sup: TokenTypeId) -> bool {
        if sub == sup {
            return true;
        }
        let mut stack = vec![sub];
        let mut seen = vec![sub];
        while let Some(t) = stack.pop() {
            if let Some(supers) = self.supertypes.get(&t) {
                for &s in supers {
                    if s == sup {
                        return true;
                    }
                    if !seen.contains(&s) {
                        seen.push(s);
                        stack.push(s);
                    }
                }
            }
        }
        false
    }

    /// Whether two token types can match the same token under category
    /// matching — equal, or related in either direction.
    pub fn overlaps(&self, a: TokenTypeId, b: TokenTypeId) -> bool {
        self.satisfies(a, b) || self.satisfies(b, a)
    }
}

/// A complete grammar: rules (looked up by name during ATN construction)
/// plus the declared token-type hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub rules: Vec<Rule>,
    pub hierarchy: TokenHierarchy,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Append a rule; builder-style for test and bench fixtures.
    pub fn rule(mut self, name: impl Into<String>, production: Production) -> Self {
        self.rules.push(Rule { name: name.into(), production });
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: TokenHierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}
