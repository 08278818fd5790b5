//! Adaptive lookahead for recursive-descent parsers.
//!
//! A grammar of EBNF-style productions is compiled into an augmented
//! transition network (ATN); at parse time, every decision point —
//! alternation, option, repetition — is resolved by simulating the ATN
//! against the upcoming tokens and caching the simulation as a per-decision
//! DFA, so repeated decisions on similar input cost a handful of hash
//! lookups instead of a re-simulation.
//!
//! The pipeline:
//!
//! 1. [`grammar`] — productions, tokens, token-category hierarchies.
//! 2. [`atn`] — compiling a grammar into the transition network and its
//!    ordered decision registry.
//! 3. [`config`] — derivation configurations and the closure engine.
//! 4. [`simulate`] — the adaptive prediction engine and its DFA cache.
//! 5. [`validate`] — offline grammar analysis: shadowed and overlapping
//!    alternatives, non-terminating repetitions, left recursion.
//!
//! ```
//! use lookatn::{Grammar, LookaheadEngine, Prediction, Production as P,
//!               SliceTokenStream, Token};
//!
//! let grammar = Grammar::new().rule("Stmt", P::alt(vec![P::t(1), P::t(2)]));
//! let mut engine = LookaheadEngine::new(&grammar).expect("well-formed grammar");
//! let tokens = [Token::new(2)];
//! let stream = SliceTokenStream::new(&tokens);
//! assert_eq!(engine.predict(0, &stream), Ok(Prediction::Alternative(1)));
//! ```
//!
//! The engine owns mutable cache state and no interior synchronization;
//! callers that parse concurrently give each worker its own engine.

pub mod atn;
pub mod config;
pub mod grammar;
pub mod simulate;
pub mod validate;

pub use atn::{
    compile, Atn, AtnState, AtnStateKind, DecisionId, DecisionInfo, DecisionKey, DecisionKind,
    DefinitionError, RuleId, StateId, Transition, MAX_ALTERNATIVES,
};
pub use grammar::{
    Alternative, Grammar, GuardId, Production, Rule, SliceTokenStream, Span, Token,
    TokenHierarchy, TokenStream, TokenTypeId, EOF_TOKEN_TYPE,
};
pub use simulate::{
    EngineError, LookaheadEngine, PredicateMask, Prediction, PredictionError,
};
pub use validate::{
    decision_paths, validate, validate_with_depth, GrammarIssue, LookaheadPath, Severity,
    ValidationReport,
};

use serde::{Deserialize, Serialize};

/// How an ambiguous decision — two alternatives matching the same bounded
/// token sequence — is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// Resolve in favour of the lowest-numbered alternative and record a
    /// warning the first time the ambiguity is observed.
    #[default]
    WarnFirstMatch,
    /// Fail prediction with an ambiguity error.
    Fatal,
}

/// Engine tuning knobs. Deserializable so a host can ship prediction
/// settings alongside its grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Depth bound for the offline validator's path enumeration, also used
    /// when listing expected paths in prediction failures. The runtime
    /// simulator itself is adaptive and takes no depth bound.
    pub max_lookahead_depth: usize,
    pub ambiguity_policy: AmbiguityPolicy,
    /// Whether DFA edges computed for gated decisions may be reused on
    /// later calls. Off by default: guard outcomes vary call to call, so a
    /// cached edge could encode a stale guard verdict.
    pub cache_gated_edges: bool,
    /// Whether a token satisfies an expected type through its declared
    /// categories and supertypes, not just by exact id.
    pub category_matching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_lookahead_depth: 4,
            ambiguity_policy: AmbiguityPolicy::default(),
            cache_gated_edges: false,
            category_matching: true,
        }
    }
}

#[cfg(test)]
mod tests;
