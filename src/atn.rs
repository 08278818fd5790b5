//! ATN construction: compiling grammar productions into an augmented
//! transition network, one sub-graph per rule.
//!
//! Each production node is built bottom-up into an `(entry, exit)` state
//! pair and the pairs are wired together:
//!
//! ```text
//!   Terminal(t)      A --Atom(t)--> B
//!   NonTerminal(R)   A --Rule(start_R, follow=B)-->
//!   Sequence         exit(i) ~~> entry(i+1)        (epsilon or splice)
//!   Alternation      BlockStart --eps--> alt_i ... --eps--> BlockEnd
//!   Option           BlockStart with an implicit empty alternative
//!   Repetition       LoopEntry --eps--> body --> LoopBack --eps--> LoopEntry
//!                    LoopEntry --eps--> exit
//!   Rep. mandatory   body once, then LoopBack decides loop-again vs exit
//!   *WithSeparator   the loop-back path consumes the separator first
//! ```
//!
//! Decision states (BlockStart for alternations, LoopEntry / LoopBack for
//! the optional and repetition forms) are registered in build order in
//! `Atn::decisions`; the list index is the decision id. A decision state's
//! outgoing epsilon transitions are ordered so that transition index equals
//! alternative index, with the exit pseudo-alternative last for boolean
//! decisions.
//!
//! The ATN is a cyclic graph, so states live in an arena addressed by
//! integer id and transitions store target ids — no ownership cycles.
//!
//! Building never panics for well-formed grammars: undefined rule
//! references, duplicate rule names, and oversized alternations are
//! collected and returned as a batch of definition errors.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::grammar::{Grammar, GuardId, Production, TokenTypeId};

/// Identifier for an ATN state (index into the state arena).
pub type StateId = u32;

/// Identifier for a grammar rule within a compiled ATN.
pub type RuleId = u32;

/// Identifier for a decision: index into `Atn::decisions`.
pub type DecisionId = usize;

/// Maximum number of alternatives in a single alternation — the width of a
/// predicate mask, so every alternative's guard stays addressable.
pub const MAX_ALTERNATIVES: usize = 64;

// ══════════════════════════════════════════════════════════════════════════════
// States and transitions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtnStateKind {
    Basic,
    RuleStart,
    RuleStop,
    BlockStart,
    BlockEnd,
    LoopBack,
    LoopEntry,
}

/// An edge of the ATN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Traversed without consuming a token.
    Epsilon { target: StateId },
    /// Consumes exactly one token satisfying `token_type`.
    Atom { target: StateId, token_type: TokenTypeId },
    /// Invoke a sub-automaton: simulation enters `target` (the callee's
    /// RuleStart) and resumes at `follow` when its RuleStop is reached.
    Rule { target: StateId, rule: RuleId, follow: StateId },
}

impl Transition {
    pub fn target(&self) -> StateId {
        match *self {
            Transition::Epsilon { target }
            | Transition::Atom { target, .. }
            | Transition::Rule { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtnState {
    pub id: StateId,
    pub kind: AtnStateKind,
    /// Owning rule.
    pub rule: RuleId,
    /// Ordered outgoing transitions. For decision states, the order of the
    /// epsilon transitions defines the alternative indices.
    pub transitions: Vec<Transition>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Decisions
// ══════════════════════════════════════════════════════════════════════════════

/// The production kind a decision was registered for. Determines whether a
/// prediction is an alternative index or a "continue?" boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Alternation,
    Option,
    Repetition,
    RepetitionMandatory,
    RepetitionWithSeparator,
    RepetitionMandatoryWithSeparator,
}

impl DecisionKind {
    /// Boolean decisions answer "enter the body / take another iteration?"
    /// rather than selecting among declared alternatives.
    pub fn is_boolean(self) -> bool {
        !matches!(self, DecisionKind::Alternation)
    }
}

/// Stable external address of a decision: the owning rule's name, the
/// production kind, and the occurrence index of that kind within the rule
/// in build order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub rule: String,
    pub kind: DecisionKind,
    pub occurrence: usize,
}

#[derive(Debug, Clone)]
pub struct DecisionInfo {
    /// The registered decision state.
    pub state: StateId,
    pub rule: RuleId,
    pub kind: DecisionKind,
    pub key: DecisionKey,
    /// Number of alternatives, including the exit pseudo-alternative of
    /// boolean decisions. Always equals the decision state's out-degree.
    pub alternatives: usize,
    /// Guard id per alternative, aligned with alternative indices. Empty
    /// when no alternative is gated.
    pub guards: Vec<Option<GuardId>>,
}

impl DecisionInfo {
    pub fn is_gated(&self) -> bool {
        self.guards.iter().any(Option::is_some)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Definition errors
// ══════════════════════════════════════════════════════════════════════════════

/// A grammar defect detected while building the ATN. Collected as a batch;
/// never raised one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// A NonTerminal references a rule name that is not defined.
    UndefinedRule { rule: String, referenced: String },
    /// Two rules share a name; the second definition is ignored.
    DuplicateRule { name: String },
    /// An alternation exceeds `MAX_ALTERNATIVES`.
    OversizedAlternation { rule: String, alternatives: usize },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::UndefinedRule { rule, referenced } => {
                write!(f, "rule '{}' references undefined rule '{}'", rule, referenced)
            }
            DefinitionError::DuplicateRule { name } => {
                write!(f, "duplicate definition of rule '{}'", name)
            }
            DefinitionError::OversizedAlternation { rule, alternatives } => {
                write!(
                    f,
                    "alternation in rule '{}' has {} alternatives (maximum {})",
                    rule, alternatives, MAX_ALTERNATIVES
                )
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// The ATN
// ══════════════════════════════════════════════════════════════════════════════

/// A compiled augmented transition network. Built once at grammar-compile
/// time and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Atn {
    pub states: Vec<AtnState>,
    rule_names: Vec<String>,
    name_to_rule: HashMap<String, RuleId>,
    rule_start: Vec<StateId>,
    rule_stop: Vec<StateId>,
    /// Ordered decision registry; list index = decision id.
    pub decisions: Vec<DecisionInfo>,
    decision_ids: HashMap<DecisionKey, DecisionId>,
}

impl Atn {
    #[inline]
    pub fn state(&self, id: StateId) -> &AtnState {
        &self.states[id as usize]
    }

    pub fn num_rules(&self) -> usize {
        self.rule_names.len()
    }

    pub fn rule_name(&self, rule: RuleId) -> &str {
        &self.rule_names[rule as usize]
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.name_to_rule.get(name).copied()
    }

    pub fn rule_start(&self, rule: RuleId) -> StateId {
        self.rule_start[rule as usize]
    }

    pub fn rule_stop(&self, rule: RuleId) -> StateId {
        self.rule_stop[rule as usize]
    }

    /// Resolve a stable decision address to its decision id.
    pub fn decision_id(&self, key: &DecisionKey) -> Option<DecisionId> {
        self.decision_ids.get(key).copied()
    }

    /// Human-readable dump of states, transitions, and decisions, for
    /// debugging grammar compilations.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Atn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rule, name) in self.rule_names.iter().enumerate() {
            writeln!(
                f,
                "rule {} '{}': start s{} stop s{}",
                rule, name, self.rule_start[rule], self.rule_stop[rule]
            )?;
            for state in self.states.iter().filter(|s| s.rule as usize == rule) {
                write!(f, "  s{} {:?}", state.id, state.kind)?;
                for t in &state.transitions {
                    match *t {
                        Transition::Epsilon { target } => write!(f, "  --eps--> s{}", target)?,
                        Transition::Atom { target, token_type } => {
                            write!(f, "  --atom({})--> s{}", token_type, target)?
                        }
                        Transition::Rule { target, rule, follow } => write!(
                            f,
                            "  --rule({}, follow s{})--> s{}",
                            self.rule_names[rule as usize], follow, target
                        )?,
                    }
                }
                writeln!(f)?;
            }
        }
        for (id, d) in self.decisions.iter().enumerate() {
            writeln!(
                f,
                "decision {}: s{} {:?} in '{}' ({} alternatives, occurrence {})",
                id, d.state, d.kind, d.key.rule, d.alternatives, d.key.occurrence
            )?;
        }
        Ok(())
    }
}

/// Compile a grammar into an ATN.
///
/// Definition errors (undefined rule references, duplicate rule names,
/// oversized alternations) are collected and returned together. A rule
/// whose body fails to build contributes no decision states.
pub fn compile(grammar: &Grammar) -> Result<Atn, Vec<DefinitionError>> {
    let mut builder = Builder::new();
    builder.run(grammar);
    if builder.errors.is_empty() {
        debug!(
            "compiled ATN: {} rules, {} states, {} decisions",
            builder.atn.num_rules(),
            builder.atn.states.len(),
            builder.atn.decisions.len()
        );
        Ok(builder.atn)
    } else {
        Err(builder.errors)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Builder
// ══════════════════════════════════════════════════════════════════════════════

/// A built sub-automaton, addressed by its entry and exit states. Leaf
/// productions accept an entry hint: a sequence offers its previous exit as
/// the hint so a spliceable leaf is built directly onto that state instead
/// of behind an extra epsilon transition.
struct Fragment {
    entry: StateId,
    exit: StateId,
}

struct Builder {
    atn: Atn,
    errors: Vec<DefinitionError>,
    current_rule: RuleId,
    /// Per-rule occurrence counters for decision addressing.
    occurrences: HashMap<DecisionKind, usize>,
}

impl Builder {
    fn new() -> Self {
        Builder {
            atn: Atn {
                states: Vec::new(),
                rule_names: Vec::new(),
                name_to_rule: HashMap::new(),
                rule_start: Vec::new(),
                rule_stop: Vec::new(),
                decisions: Vec::new(),
                decision_ids: HashMap::new(),
            },
            errors: Vec::new(),
            current_rule: 0,
            occurrences: HashMap::new(),
        }
    }

    fn run(&mut self, grammar: &Grammar) {
        // Pass 1: register every rule name and allocate its start/stop
        // states, so call sites can be wired regardless of rule order.
        for rule in &grammar.rules {
            if self.atn.name_to_rule.contains_key(&rule.name) {
                self.errors.push(DefinitionError::DuplicateRule { name: rule.name.clone() });
                continue;
            }
            let id = self.atn.rule_names.len() as RuleId;
            self.atn.name_to_rule.insert(rule.name.clone(), id);
            self.atn.rule_names.push(rule.name.clone());
            self.current_rule = id;
            let start = self.add_state(AtnStateKind::RuleStart);
            let stop = self.add_state(AtnStateKind::RuleStop);
            self.atn.rule_start.push(start);
            self.atn.rule_stop.push(stop);
        }

        // Pass 2: build each rule body. On failure, roll back any decisions
        // the partial build registered.
        let mut built = vec![false; self.atn.rule_names.len()];
        for rule in &grammar.rules {
            let Some(id) = self.atn.rule_id(&rule.name) else { continue };
            if built[id as usize] {
                continue; // duplicate definition, already reported
            }
            built[id as usize] = true;
            self.current_rule = id;
            self.occurrences.clear();
            let checkpoint = self.atn.decisions.len();
            match self.build(&rule.production, None) {
                Ok(frag) => {
                    self.epsilon(self.atn.rule_start[id as usize], frag.entry);
                    self.epsilon(frag.exit, self.atn.rule_stop[id as usize]);
                }
                Err(e) => {
                    self.errors.push(e);
                    for dropped in self.atn.decisions.drain(checkpoint..) {
                        self.atn.decision_ids.remove(&dropped.key);
                    }
                }
            }
        }
    }

    fn add_state(&mut self, kind: AtnStateKind) -> StateId {
        let id = self.atn.states.len() as StateId;
        self.atn.states.push(AtnState { id, kind, rule: self.current_rule, transitions: Vec::new() });
        id
    }

    fn epsilon(&mut self, from: StateId, to: StateId) {
        self.atn.states[from as usize].transitions.push(Transition::Epsilon { target: to });
    }

    fn atom(&mut self, from: StateId, to: StateId, token_type: TokenTypeId) {
        self.atn.states[from as usize]
            .transitions
            .push(Transition::Atom { target: to, token_type });
    }

    fn register_decision(
        &mut self,
        state: StateId,
        kind: DecisionKind,
        alternatives: usize,
        guards: Vec<Option<GuardId>>,
    ) {
        let occurrence = {
            let counter = self.occurrences.entry(kind).or_insert(0);
            let o = *counter;
            *counter += 1;
            o
        };
        let key = DecisionKey {
            rule: self.atn.rule_names[self.current_rule as usize].clone(),
            kind,
            occurrence,
        };
        let id = self.atn.decisions.len();
        self.atn.decision_ids.insert(key.clone(), id);
        self.atn.decisions.push(DecisionInfo {
            state,
            rule: self.current_rule,
            kind,
            key,
            alternatives,
            guards,
        });
    }

    /// Whether `state` can absorb the entry of the next simple fragment:
    /// trivial, no outgoing transitions yet, nothing depends on its kind.
    fn can_splice(&self, state: StateId) -> bool {
        let s = &self.atn.states[state as usize];
        s.kind == AtnStateKind::Basic && s.transitions.is_empty()
    }

    /// Build one production node into an `(entry, exit)` fragment.
    ///
    /// `entry_hint` is the structural-sharing splice: a trivial exit state of
    /// the preceding sequence element that a simple fragment (Terminal,
    /// NonTerminal, Action) may use as its entry instead of allocating a
    /// fresh state behind an epsilon link. Composite fragments ignore the
    /// hint because their entries carry decision or loop-back wiring. The
    /// splice bounds automaton size and cannot alter the accepted language.
    fn build(
        &mut self,
        production: &Production,
        entry_hint: Option<StateId>,
    ) -> Result<Fragment, DefinitionError> {
        match production {
            Production::Terminal(token_type) => {
                let entry = entry_hint.unwrap_or_else(|| self.add_state(AtnStateKind::Basic));
                let exit = self.add_state(AtnStateKind::Basic);
                self.atom(entry, exit, *token_type);
                Ok(Fragment { entry, exit })
            }

            Production::NonTerminal(name) => {
                let Some(rule) = self.atn.rule_id(name) else {
                    return Err(DefinitionError::UndefinedRule {
                        rule: self.atn.rule_names[self.current_rule as usize].clone(),
                        referenced: name.clone(),
                    });
                };
                let entry = entry_hint.unwrap_or_else(|| self.add_state(AtnStateKind::Basic));
                let exit = self.add_state(AtnStateKind::Basic);
                let target = self.atn.rule_start[rule as usize];
                self.atn.states[entry as usize]
                    .transitions
                    .push(Transition::Rule { target, rule, follow: exit });
                Ok(Fragment { entry, exit })
            }

            Production::Action => {
                let entry = entry_hint.unwrap_or_else(|| self.add_state(AtnStateKind::Basic));
                let exit = self.add_state(AtnStateKind::Basic);
                self.epsilon(entry, exit);
                Ok(Fragment { entry, exit })
            }

            Production::Sequence(items) => {
                if items.is_empty() {
                    let entry = entry_hint.unwrap_or_else(|| self.add_state(AtnStateKind::Basic));
                    let exit = self.add_state(AtnStateKind::Basic);
                    self.epsilon(entry, exit);
                    return Ok(Fragment { entry, exit });
                }
                let mut entry = None;
                let mut prev_exit: Option<StateId> = None;
                for item in items {
                    let hint = match prev_exit {
                        Some(exit) if self.can_splice(exit) => Some(exit),
                        Some(_) => None,
                        // First element inherits the outer splice hint.
                        None => entry_hint,
                    };
                    let frag = self.build(item, hint)?;
                    if let Some(exit) = prev_exit {
                        if frag.entry != exit {
                            self.epsilon(exit, frag.entry);
                        }
                    }
                    entry.get_or_insert(frag.entry);
                    prev_exit = Some(frag.exit);
                }
                // items is non-empty, so both ends are set.
                Ok(Fragment { entry: entry.unwrap_or(0), exit: prev_exit.unwrap_or(0) })
            }

            Production::Alternation(alternatives) => {
                if alternatives.len() > MAX_ALTERNATIVES {
                    return Err(DefinitionError::OversizedAlternation {
                        rule: self.atn.rule_names[self.current_rule as usize].clone(),
                        alternatives: alternatives.len(),
                    });
                }
                let block_start = self.add_state(AtnStateKind::BlockStart);
                let block_end = self.add_state(AtnStateKind::BlockEnd);
                let guards: Vec<Option<GuardId>> =
                    alternatives.iter().map(|a| a.guard).collect();
                let guards = if guards.iter().any(Option::is_some) { guards } else { Vec::new() };
                self.register_decision(
                    block_start,
                    DecisionKind::Alternation,
                    alternatives.len(),
                    guards,
                );
                for alt in alternatives {
                    let frag = self.build(&alt.production, None)?;
                    self.epsilon(block_start, frag.entry);
                    self.epsilon(frag.exit, block_end);
                }
                Ok(Fragment { entry: block_start, exit: block_end })
            }

            Production::Option(body) => {
                let block_start = self.add_state(AtnStateKind::BlockStart);
                let block_end = self.add_state(AtnStateKind::BlockEnd);
                self.register_decision(block_start, DecisionKind::Option, 2, Vec::new());
                let frag = self.build(body, None)?;
                // Alternative 0: enter the body; alternative 1: skip it.
                self.epsilon(block_start, frag.entry);
                self.epsilon(frag.exit, block_end);
                self.epsilon(block_start, block_end);
                Ok(Fragment { entry: block_start, exit: block_end })
            }

            Production::Repetition(body) => {
                let loop_entry = self.add_state(AtnStateKind::LoopEntry);
                let exit = self.add_state(AtnStateKind::BlockEnd);
                self.register_decision(loop_entry, DecisionKind::Repetition, 2, Vec::new());
                let frag = self.build(body, None)?;
                let loop_back = self.add_state(AtnStateKind::LoopBack);
                // Alternative 0: enter the body; alternative 1: exit. Each
                // iteration loops back through the entry and re-decides.
                self.epsilon(loop_entry, frag.entry);
                self.epsilon(loop_entry, exit);
                self.epsilon(frag.exit, loop_back);
                self.epsilon(loop_back, loop_entry);
                Ok(Fragment { entry: loop_entry, exit })
            }

            Production::RepetitionMandatory(body) => {
                let frag = self.build(body, None)?;
                let loop_back = self.add_state(AtnStateKind::LoopBack);
                let exit = self.add_state(AtnStateKind::BlockEnd);
                self.register_decision(loop_back, DecisionKind::RepetitionMandatory, 2, Vec::new());
                self.epsilon(frag.exit, loop_back);
                // Alternative 0: another iteration; alternative 1: exit.
                self.epsilon(loop_back, frag.entry);
                self.epsilon(loop_back, exit);
                Ok(Fragment { entry: frag.entry, exit })
            }

            Production::RepetitionWithSeparator { body, separator } => {
                let loop_entry = self.add_state(AtnStateKind::LoopEntry);
                let exit = self.add_state(AtnStateKind::BlockEnd);
                self.register_decision(
                    loop_entry,
                    DecisionKind::RepetitionWithSeparator,
                    2,
                    Vec::new(),
                );
                let frag = self.build(body, None)?;
                let loop_back = self.add_state(AtnStateKind::LoopBack);
                let sep_done = self.add_state(AtnStateKind::Basic);
                // Alternative 0: enter the first iteration; alternative 1:
                // match nothing. Continuation after an iteration consumes
                // the separator before returning to the body entry.
                self.epsilon(loop_entry, frag.entry);
                self.epsilon(loop_entry, exit);
                self.epsilon(frag.exit, loop_back);
                self.atom(loop_back, sep_done, *separator);
                self.epsilon(sep_done, frag.entry);
                self.epsilon(loop_back, exit);
                Ok(Fragment { entry: loop_entry, exit })
            }

            Production::RepetitionMandatoryWithSeparator { body, separator } => {
                let frag = self.build(body, None)?;
                let loop_back = self.add_state(AtnStateKind::LoopBack);
                let exit = self.add_state(AtnStateKind::BlockEnd);
                self.register_decision(
                    loop_back,
                    DecisionKind::RepetitionMandatoryWithSeparator,
                    2,
                    Vec::new(),
                );
                let sep_entry = self.add_state(AtnStateKind::Basic);
                let sep_done = self.add_state(AtnStateKind::Basic);
                self.epsilon(frag.exit, loop_back);
                // Alternative 0: consume the separator and iterate again;
                // alternative 1: exit.
                self.epsilon(loop_back, sep_entry);
                self.epsilon(loop_back, exit);
                self.atom(sep_entry, sep_done, *separator);
                self.epsilon(sep_done, frag.entry);
                Ok(Fragment { entry: frag.entry, exit })
            }
        }
    }
}
