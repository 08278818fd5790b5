//! The adaptive prediction engine.
//!
//! Each decision gets its own lazily grown DFA whose states are closed
//! configuration sets, memoized by canonical set identity. A prediction
//! walks the DFA over the upcoming tokens, extending it on first contact
//! with a token sequence and replaying cached edges afterwards, so the
//! steady-state cost of a decision is one hash lookup per peeked token.
//!
//! The walk is not depth-bounded: it runs until a single alternative
//! survives, a token kills every derivation, or end of input is reached.
//! Termination is structural — every step either consumes a real token or,
//! once peeking returns EOF, visits a DFA state not seen under EOF before,
//! and the state space is finite.
//!
//! Guard outcomes arrive per call as a [`PredicateMask`] and are applied
//! only when the simulation terminates with several alternatives still
//! standing. They are never baked into cached DFA edges: a gated decision
//! recomputes its moves each call (unless edge caching for gated decisions
//! is explicitly enabled), while still interning into the shared state
//! table so the automaton stays bounded.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::atn::{self, Atn, DecisionId, DecisionInfo, DecisionKey, DefinitionError};
use crate::config::{closure, move_configs, Config, ConfigKey, ConfigSet, DedupMode};
use crate::grammar::{Grammar, Token, TokenStream, TokenTypeId, EOF_TOKEN_TYPE};
use crate::validate::{self, GrammarIssue};
use crate::{AmbiguityPolicy, EngineConfig};

// ══════════════════════════════════════════════════════════════════════════════
// Public surface
// ══════════════════════════════════════════════════════════════════════════════

/// Caller-evaluated guard verdicts for one prediction call. Bit `i` set
/// means alternative `i`'s guard passed; ungated alternatives ignore their
/// bit. `MAX_ALTERNATIVES` keeps every alternative addressable in 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateMask(pub u64);

impl PredicateMask {
    /// Every guard passes.
    pub const ALL: PredicateMask = PredicateMask(u64::MAX);
    /// Every guard fails.
    pub const NONE: PredicateMask = PredicateMask(0);

    pub fn allow(self, alt: usize) -> Self {
        PredicateMask(self.0 | (1 << alt))
    }

    pub fn allows(self, alt: usize) -> bool {
        (self.0 >> alt) & 1 == 1
    }
}

/// The outcome of a successful prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prediction {
    /// For alternations: the index of the alternative to take.
    Alternative(usize),
    /// For options and repetitions: whether to enter the body (or take
    /// another iteration).
    Continue(bool),
}

/// A prediction that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    /// No alternative of the decision matches the upcoming tokens.
    NoViableAlternative {
        decision: DecisionId,
        rule: String,
        /// The token at which every derivation died.
        actual: Token,
        /// Bounded token-type paths that would have been accepted from the
        /// point of failure.
        expected: Vec<Vec<TokenTypeId>>,
    },
    /// Under [`AmbiguityPolicy::Fatal`]: several alternatives match the
    /// same bounded token sequence.
    Ambiguity {
        decision: DecisionId,
        rule: String,
        alternatives: Vec<usize>,
        /// The token types peeked before the ambiguity surfaced.
        prefix: Vec<TokenTypeId>,
    },
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::NoViableAlternative { decision, rule, actual, expected } => write!(
                f,
                "no viable alternative at decision {} in rule '{}': \
                 found token type {}, expected one of {:?}",
                decision, rule, actual.type_id, expected
            ),
            PredictionError::Ambiguity { decision, rule, alternatives, prefix } => write!(
                f,
                "ambiguous alternatives {:?} at decision {} in rule '{}' after input {:?}",
                alternatives, decision, rule, prefix
            ),
        }
    }
}

/// Failure to construct an engine.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// The grammar itself is malformed.
    Definition(Vec<DefinitionError>),
    /// Static validation found error-severity issues.
    Validation(Vec<GrammarIssue>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Definition(errors) => {
                write!(f, "grammar definition errors:")?;
                for e in errors {
                    write!(f, "\n  {}", e)?;
                }
                Ok(())
            }
            EngineError::Validation(issues) => {
                write!(f, "grammar validation errors:")?;
                for i in issues {
                    write!(f, "\n  {}", i)?;
                }
                Ok(())
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Per-decision DFA
// ══════════════════════════════════════════════════════════════════════════════

struct DfaState {
    configs: ConfigSet,
    /// Cached moves, keyed by the peeked token's type id. Token categories
    /// are a function of the type, so the key is sound under category
    /// matching as well.
    edges: HashMap<TokenTypeId, usize>,
    /// Memoized outcome when exactly one alternative survives here. Guard
    /// resolution never reaches an accept state, so memoizing is safe.
    accept: Option<usize>,
}

struct Dfa {
    states: Vec<DfaState>,
    by_key: HashMap<ConfigKey, usize>,
    /// Ambiguities already warned about, keyed by the competing set.
    warned: HashSet<Vec<usize>>,
}

impl Dfa {
    fn new(atn: &Atn, info: &DecisionInfo, mode: DedupMode) -> Self {
        let mut seeds = ConfigSet::new(mode);
        for (alt, t) in atn.state(info.state).transitions.iter().enumerate() {
            seeds.insert(Config::new(t.target(), alt));
        }
        closure(atn, &mut seeds);
        let mut dfa = Dfa { states: Vec::new(), by_key: HashMap::new(), warned: HashSet::new() };
        intern(&mut dfa, atn, seeds);
        dfa
    }
}

/// Intern a closed configuration set, returning its DFA state index. One
/// state table per decision, shared between gated and ungated calls.
fn intern(dfa: &mut Dfa, atn: &Atn, set: ConfigSet) -> usize {
    let key = set.key();
    if let Some(&existing) = dfa.by_key.get(&key) {
        return existing;
    }
    let alts = set.alts();
    let accept = if alts.len() == 1 { Some(alts[0]) } else { None };
    let index = dfa.states.len();
    dfa.states.push(DfaState { configs: set, edges: HashMap::new(), accept });
    dfa.by_key.insert(key, index);
    index
}

// ══════════════════════════════════════════════════════════════════════════════
// Engine
// ══════════════════════════════════════════════════════════════════════════════

/// The adaptive lookahead engine: a compiled ATN plus one lazily built DFA
/// per decision.
///
/// The engine mutates its caches during prediction and carries no interior
/// synchronization; concurrent parsers each own an engine.
pub struct LookaheadEngine {
    atn: Atn,
    config: EngineConfig,
    dfas: Vec<Option<Dfa>>,
}

impl LookaheadEngine {
    /// Compile `grammar` and build an engine with default settings.
    pub fn new(grammar: &Grammar) -> Result<Self, Vec<DefinitionError>> {
        Self::with_config(grammar, EngineConfig::default())
    }

    pub fn with_config(
        grammar: &Grammar,
        config: EngineConfig,
    ) -> Result<Self, Vec<DefinitionError>> {
        let atn = atn::compile(grammar)?;
        Ok(Self::from_atn(atn, config))
    }

    /// Compile and statically validate `grammar`. Error-severity issues
    /// (left recursion, repetitions over an empty-matching body) block
    /// construction; ambiguity warnings are logged and the engine is built
    /// anyway.
    pub fn validated(grammar: &Grammar, config: EngineConfig) -> Result<Self, EngineError> {
        let atn = atn::compile(grammar).map_err(EngineError::Definition)?;
        let report = validate::validate_with_depth(grammar, &atn, config.max_lookahead_depth);
        if report.has_errors() {
            return Err(EngineError::Validation(report.into_issues()));
        }
        for issue in report.issues() {
            warn!("{}", issue);
        }
        Ok(Self::from_atn(atn, config))
    }

    fn from_atn(atn: Atn, config: EngineConfig) -> Self {
        let dfas = (0..atn.decisions.len()).map(|_| None).collect();
        LookaheadEngine { atn, config, dfas }
    }

    pub fn atn(&self) -> &Atn {
        &self.atn
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a stable decision address to its decision id.
    pub fn decision_id(&self, key: &DecisionKey) -> Option<DecisionId> {
        self.atn.decision_id(key)
    }

    /// Number of DFA states built so far for a decision. Zero until the
    /// decision is first predicted.
    pub fn dfa_size(&self, decision: DecisionId) -> usize {
        self.dfas[decision].as_ref().map_or(0, |d| d.states.len())
    }

    /// Predict an ungated decision (every guard treated as passing).
    pub fn predict(
        &mut self,
        decision: DecisionId,
        tokens: &impl TokenStream,
    ) -> Result<Prediction, PredictionError> {
        self.predict_gated(decision, tokens, PredicateMask::ALL)
    }

    /// Predict a decision with the caller's guard verdicts for this call.
    ///
    /// The mask participates only when simulation terminates with several
    /// alternatives still viable; it is re-read on every call and never
    /// memoized into the DFA.
    pub fn predict_gated(
        &mut self,
        decision: DecisionId,
        tokens: &impl TokenStream,
        mask: PredicateMask,
    ) -> Result<Prediction, PredictionError> {
        let info = &self.atn.decisions[decision];

        // A one-alternative alternation needs no lookahead at all.
        if !info.kind.is_boolean() && info.alternatives == 1 {
            return Ok(Prediction::Alternative(0));
        }

        // Gated alternatives may converge on the same ATN state; guard
        // resolution must still see each of them, so gated decisions keep
        // competing alternatives apart regardless of the ambiguity policy.
        let mode = if info.is_gated() {
            DedupMode::AltSensitive
        } else {
            match self.config.ambiguity_policy {
                AmbiguityPolicy::WarnFirstMatch => DedupMode::AltInsensitive,
                AmbiguityPolicy::Fatal => DedupMode::AltSensitive,
            }
        };
        let atn = &self.atn;
        let dfa = self.dfas[decision].get_or_insert_with(|| {
            debug!(
                "building DFA for decision {} in rule '{}'",
                decision,
                atn.rule_name(info.rule)
            );
            Dfa::new(atn, info, mode)
        });

        let alt = simulate(atn, &self.config, decision, info, dfa, tokens, mask)?;
        Ok(if info.kind.is_boolean() {
            // Alternative 0 enters the body (or iterates again); the exit
            // pseudo-alternative is last.
            Prediction::Continue(alt == 0)
        } else {
            Prediction::Alternative(alt)
        })
    }
}

fn simulate(
    atn: &Atn,
    config: &EngineConfig,
    decision: DecisionId,
    info: &DecisionInfo,
    dfa: &mut Dfa,
    tokens: &impl TokenStream,
    mask: PredicateMask,
) -> Result<usize, PredictionError> {
    let cache_edges = !info.is_gated() || config.cache_gated_edges;
    let mut current = 0usize;
    let mut prefix: Vec<TokenTypeId> = Vec::new();
    // Alternatives that could complete at the most recent state where any
    // could. A later token may kill every remaining derivation; these stay
    // viable because the parser can stop consuming where they completed.
    let mut last_completed: Vec<usize> = Vec::new();
    // DFA states visited while peeking EOF. Once input is exhausted the
    // walk is a pure function of the state, so revisiting one means no
    // further token can separate the survivors.
    let mut eof_visited: HashSet<usize> = HashSet::new();

    loop {
        if let Some(alt) = dfa.states[current].accept {
            return Ok(alt);
        }

        let completed = dfa.states[current].configs.completed_alts(atn);
        if !completed.is_empty() {
            last_completed = completed;
        }

        let token = tokens.peek(prefix.len() + 1);
        let cached = if cache_edges {
            dfa.states[current].edges.get(&token.type_id).copied()
        } else {
            None
        };
        let next = match cached {
            Some(next) => next,
            None => {
                let moved =
                    move_configs(atn, &dfa.states[current].configs, token, config.category_matching);
                if moved.is_empty() {
                    // Dead end: fall back to the alternatives that completed
                    // most recently along the walk, however far back.
                    if last_completed.is_empty() {
                        let expected = validate::enumerate_paths(
                            atn,
                            &dfa.states[current].configs,
                            config.max_lookahead_depth,
                        )
                        .into_iter()
                        .map(|p| p.tokens)
                        .collect();
                        return Err(PredictionError::NoViableAlternative {
                            decision,
                            rule: atn.rule_name(info.rule).to_string(),
                            actual: token.clone(),
                            expected,
                        });
                    }
                    return resolve(
                        atn,
                        config,
                        decision,
                        info,
                        dfa,
                        last_completed,
                        mask,
                        prefix,
                        token,
                    );
                }
                let next = intern(dfa, atn, moved);
                if cache_edges {
                    dfa.states[current].edges.insert(token.type_id, next);
                }
                next
            }
        };

        if token.type_id == EOF_TOKEN_TYPE && !eof_visited.insert(next) {
            break;
        }
        prefix.push(token.type_id);
        current = next;
    }

    // End of input with several alternatives alive and no state change in
    // sight: ambiguous termination.
    let candidates = dfa.states[current].configs.alts();
    let at = tokens.peek(prefix.len() + 1).clone();
    resolve(atn, config, decision, info, dfa, candidates, mask, prefix, &at)
}

/// Resolve a termination with multiple candidate alternatives: guards break
/// the tie, then the ambiguity policy decides what is left.
#[allow(clippy::too_many_arguments)]
fn resolve(
    atn: &Atn,
    config: &EngineConfig,
    decision: DecisionId,
    info: &DecisionInfo,
    dfa: &mut Dfa,
    candidates: Vec<usize>,
    mask: PredicateMask,
    prefix: Vec<TokenTypeId>,
    at: &Token,
) -> Result<usize, PredictionError> {
    let viable: Vec<usize> = candidates
        .into_iter()
        .filter(|&alt| match info.guards.get(alt) {
            Some(Some(_)) => mask.allows(alt),
            _ => true,
        })
        .collect();

    match viable.as_slice() {
        [] => Err(PredictionError::NoViableAlternative {
            decision,
            rule: atn.rule_name(info.rule).to_string(),
            actual: at.clone(),
            expected: Vec::new(),
        }),
        [alt] => Ok(*alt),
        _ => match config.ambiguity_policy {
            AmbiguityPolicy::WarnFirstMatch => {
                let chosen = viable[0];
                if dfa.warned.insert(viable.clone()) {
                    warn!(
                        "ambiguous alternatives {:?} at decision {} in rule '{}' \
                         after input {:?}; choosing alternative {}",
                        viable,
                        decision,
                        atn.rule_name(info.rule),
                        prefix,
                        chosen
                    );
                }
                Ok(chosen)
            }
            AmbiguityPolicy::Fatal => Err(PredictionError::Ambiguity {
                decision,
                rule: atn.rule_name(info.rule).to_string(),
                alternatives: viable,
                prefix,
            }),
        },
    }
}
