//! Prediction configurations and the closure engine.
//!
//! A configuration is a point in a simulated derivation: an ATN state, the
//! alternative index the derivation committed to at the decision entry, and
//! the stack of follow states for rule invocations entered during
//! simulation. Closure saturates a configuration set across epsilon and
//! rule transitions so that every configuration left afterwards sits at an
//! Atom edge or at an unreturnable RuleStop.
//!
//! Termination on recursive grammars comes from stack truncation: a follow
//! state already present on the call stack is not pushed again. The
//! resulting approximation can only merge derivations, never lose one, so
//! prediction stays sound and the reachable stack space stays finite.

use std::collections::HashSet;

use crate::atn::{Atn, AtnStateKind, StateId, Transition};
use crate::grammar::{Token, TokenTypeId};

/// How a configuration set deduplicates configurations that differ only in
/// alternative index.
///
/// First-match prediction resolves an ambiguity in favour of the lowest
/// alternative, so `AltInsensitive` folds such configurations together and
/// keeps the lowest alt. Fatal ambiguity reporting needs to observe the
/// competing alternatives, so `AltSensitive` keeps them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    AltInsensitive,
    AltSensitive,
}

/// One point in a simulated derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    pub state: StateId,
    /// Alternative committed to at the decision entry.
    pub alt: usize,
    /// Follow states of rule invocations entered during simulation,
    /// innermost last.
    pub stack: Vec<StateId>,
}

impl Config {
    pub fn new(state: StateId, alt: usize) -> Self {
        Config { state, alt, stack: Vec::new() }
    }

    /// Whether this configuration has run off the end of the decision's
    /// rule with no pending return, i.e. the alternative can complete here.
    pub fn is_completed(&self, atn: &Atn) -> bool {
        self.stack.is_empty() && atn.state(self.state).kind == AtnStateKind::RuleStop
    }
}

/// Identity key of a configuration's dedup bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConfigBucket {
    state: StateId,
    /// `None` under alt-insensitive dedup.
    alt: Option<usize>,
    stack: Vec<StateId>,
}

/// Canonical identity of a closed configuration set, used to memoize DFA
/// states. Sorted so insertion order cannot split equal sets.
pub type ConfigKey = Vec<(StateId, usize, Vec<StateId>)>;

/// A set of configurations with mode-dependent deduplication.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    configs: Vec<Config>,
    seen: HashSet<ConfigBucket>,
    mode: DedupMode,
}

impl ConfigSet {
    pub fn new(mode: DedupMode) -> Self {
        ConfigSet { configs: Vec::new(), seen: HashSet::new(), mode }
    }

    pub fn mode(&self) -> DedupMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Config> {
        self.configs.iter()
    }

    /// Insert a configuration, honouring the dedup mode. Under
    /// alt-insensitive dedup a colliding configuration keeps the lowest
    /// alternative index. Returns whether the set changed.
    pub fn insert(&mut self, config: Config) -> bool {
        let bucket = ConfigBucket {
            state: config.state,
            alt: match self.mode {
                DedupMode::AltInsensitive => None,
                DedupMode::AltSensitive => Some(config.alt),
            },
            stack: config.stack.clone(),
        };
        if !self.seen.insert(bucket) {
            if self.mode == DedupMode::AltInsensitive {
                for existing in &mut self.configs {
                    if existing.state == config.state
                        && existing.stack == config.stack
                        && config.alt < existing.alt
                    {
                        existing.alt = config.alt;
                        return true;
                    }
                }
            }
            return false;
        }
        self.configs.push(config);
        true
    }

    /// Alternative indices present, ascending and deduplicated.
    pub fn alts(&self) -> Vec<usize> {
        let mut alts: Vec<usize> = self.configs.iter().map(|c| c.alt).collect();
        alts.sort_unstable();
        alts.dedup();
        alts
    }

    /// Lowest alternative that can complete at this point, if any.
    pub fn lowest_completed_alt(&self, atn: &Atn) -> Option<usize> {
        self.configs.iter().filter(|c| c.is_completed(atn)).map(|c| c.alt).min()
    }

    /// Alternatives that can complete at this point, ascending and
    /// deduplicated.
    pub fn completed_alts(&self, atn: &Atn) -> Vec<usize> {
        let mut alts: Vec<usize> = self
            .configs
            .iter()
            .filter(|c| c.is_completed(atn))
            .map(|c| c.alt)
            .collect();
        alts.sort_unstable();
        alts.dedup();
        alts
    }

    /// Canonical identity for DFA-state memoization.
    pub fn key(&self) -> ConfigKey {
        let mut key: ConfigKey = self
            .configs
            .iter()
            .map(|c| (c.state, c.alt, c.stack.clone()))
            .collect();
        key.sort_unstable();
        key.dedup();
        key
    }
}

/// Saturate `set` across epsilon and rule transitions.
///
/// Expansion per configuration:
///  - `Epsilon` follows to the target with the same alt and stack.
///  - `Rule` pushes the follow state and enters the callee's RuleStart —
///    unless the follow state is already on the stack, in which case the
///    push is skipped and the callee is entered with the stack unchanged.
///  - at `RuleStop` with a non-empty stack, the innermost follow state is
///    popped and resumed; with an empty stack the configuration is left in
///    place as a completion marker.
///
/// The visited set is keyed on (state, alt, stack) regardless of the set's
/// dedup mode: under alt-insensitive dedup a configuration re-discovered
/// with a lower alternative must still be re-expanded so the lower alt
/// propagates to everything downstream of it.
pub fn closure(atn: &Atn, set: &mut ConfigSet) {
    let mut work: Vec<Config> = set.iter().cloned().collect();
    let mut visited: HashSet<(StateId, usize, Vec<StateId>)> = HashSet::new();

    while let Some(config) = work.pop() {
        if !visited.insert((config.state, config.alt, config.stack.clone())) {
            continue;
        }

        let state = atn.state(config.state);
        if state.kind == AtnStateKind::RuleStop {
            if let Some((&follow, rest)) = config.stack.split_last() {
                let next = Config { state: follow, alt: config.alt, stack: rest.to_vec() };
                set.insert(next.clone());
                work.push(next);
            }
            // Empty stack: completion marker, no further expansion.
            continue;
        }

        for transition in &state.transitions {
            match *transition {
                Transition::Epsilon { target } => {
                    let next = Config { state: target, alt: config.alt, stack: config.stack.clone() };
                    set.insert(next.clone());
                    work.push(next);
                }
                Transition::Rule { target, follow, .. } => {
                    // Stack truncation: never re-push a follow state already
                    // pending, or left recursion would grow the stack forever.
                    let stack = if config.stack.contains(&follow) {
                        config.stack.clone()
                    } else {
                        let mut s = config.stack.clone();
                        s.push(follow);
                        s
                    };
                    let next = Config { state: target, alt: config.alt, stack };
                    set.insert(next.clone());
                    work.push(next);
                }
                Transition::Atom { .. } => {}
            }
        }
    }
}

/// Advance every configuration across Atom transitions the token satisfies,
/// then close the result. The returned set is empty when no derivation can
/// consume the token.
pub(crate) fn move_configs(
    atn: &Atn,
    from: &ConfigSet,
    token: &Token,
    category_matching: bool,
) -> ConfigSet {
    let mut next = ConfigSet::new(from.mode());
    for config in from.iter() {
        for transition in &atn.state(config.state).transitions {
            if let Transition::Atom { target, token_type } = *transition {
                if token.satisfies(token_type, category_matching) {
                    next.insert(Config {
                        state: target,
                        alt: config.alt,
                        stack: config.stack.clone(),
                    });
                }
            }
        }
    }
    closure(atn, &mut next);
    next
}

/// Token types with an Atom transition out of any configuration in the set,
/// ascending and deduplicated.
pub(crate) fn atom_types(atn: &Atn, set: &ConfigSet) -> Vec<TokenTypeId> {
    let mut types: Vec<TokenTypeId> = set
        .iter()
        .flat_map(|c| atn.state(c.state).transitions.iter())
        .filter_map(|t| match *t {
            Transition::Atom { token_type, .. } => Some(token_type),
            _ => None,
        })
        .collect();
    types.sort_unstable();
    types.dedup();
    types
}
