//! Offline grammar analysis, run once per grammar before any parsing.
//!
//! Four checks over the compiled automaton and the production trees:
//!
//! - **shadowed alternatives** — every bounded lookahead path of a later
//!   alternative is already matched by an earlier one, so first-match
//!   dispatch can never select it;
//! - **overlapping alternatives** — two alternatives share a token prefix
//!   but diverge within the depth bound; resolved at runtime, reported so
//!   grammar authors know where lookahead cost concentrates;
//! - **repetitions over an empty-matching body** — the parse loop would
//!   iterate without consuming;
//! - **left recursion** — a rule reachable from itself with no consuming
//!   transition in between, reported with the full cycle.
//!
//! Shadowing and overlap use bounded-depth path enumeration over each
//! decision's alternatives, not the online simulator; the boundary between
//! the two is a path-set comparison under the declared token hierarchy and
//! is pinned by the tests in `tests/validation_tests.rs`.
//!
//! Everything found in one pass is batched into a single report. Shadowing
//! and overlap are warnings and never block engine construction; empty
//! repetition bodies and left recursion are errors.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::atn::{Atn, DecisionId, DecisionKind};
use crate::config::{atom_types, closure, move_configs, Config, ConfigSet, DedupMode};
use crate::grammar::{Grammar, Production, Token, TokenHierarchy, TokenTypeId};

/// Default depth bound for static path enumeration.
pub const DEFAULT_STATIC_DEPTH: usize = 4;

// ══════════════════════════════════════════════════════════════════════════════
// Issues and the report
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One finding of the static validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarIssue {
    /// Alternative `shadowed` can never win first-match dispatch against
    /// the earlier alternative `by`.
    ShadowedAlternative { rule: String, decision: DecisionId, shadowed: usize, by: usize },
    /// Two alternatives share a token prefix but diverge within the depth
    /// bound.
    OverlappingAlternatives {
        rule: String,
        decision: DecisionId,
        first: usize,
        second: usize,
        prefix: Vec<TokenTypeId>,
    },
    /// A repetition whose body can match the empty sequence; its parse
    /// loop would never advance.
    EmptyRepetitionBody { rule: String },
    /// A cycle of rules with no consuming transition, reported as the full
    /// path (first rule repeated at the end).
    LeftRecursion { cycle: Vec<String> },
}

impl GrammarIssue {
    pub fn severity(&self) -> Severity {
        match self {
            GrammarIssue::ShadowedAlternative { .. }
            | GrammarIssue::OverlappingAlternatives { .. } => Severity::Warning,
            GrammarIssue::EmptyRepetitionBody { .. } | GrammarIssue::LeftRecursion { .. } => {
                Severity::Error
            }
        }
    }
}

impl fmt::Display for GrammarIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarIssue::ShadowedAlternative { rule, decision, shadowed, by } => write!(
                f,
                "alternative {} at decision {} in rule '{}' is shadowed by alternative {} \
                 and can never match",
                shadowed, decision, rule, by
            ),
            GrammarIssue::OverlappingAlternatives { rule, decision, first, second, prefix } => {
                write!(
                    f,
                    "alternatives {} and {} at decision {} in rule '{}' overlap on prefix {:?}",
                    first, second, decision, rule, prefix
                )
            }
            GrammarIssue::EmptyRepetitionBody { rule } => write!(
                f,
                "repetition in rule '{}' has a body that can match the empty sequence",
                rule
            ),
            GrammarIssue::LeftRecursion { cycle } => {
                write!(f, "left recursion: {}", cycle.join(" -> "))
            }
        }
    }
}

/// All findings from one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    issues: Vec<GrammarIssue>,
}

impl ValidationReport {
    pub fn issues(&self) -> &[GrammarIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<GrammarIssue> {
        self.issues
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &GrammarIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GrammarIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Warning)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Path enumeration
// ══════════════════════════════════════════════════════════════════════════════

/// One bounded lookahead path: the token types consumed in order, and
/// whether the derivation can complete at the end of them (as opposed to
/// being cut off by the depth bound).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LookaheadPath {
    pub tokens: Vec<TokenTypeId>,
    pub complete: bool,
}

/// Enumerate every token-type path of length at most `depth` from a closed
/// configuration set. A set that can both complete and continue yields the
/// completed path and all of its extensions.
pub(crate) fn enumerate_paths(atn: &Atn, start: &ConfigSet, depth: usize) -> Vec<LookaheadPath> {
    let mut out = Vec::new();
    let mut frontier: Vec<(ConfigSet, Vec<TokenTypeId>)> = vec![(start.clone(), Vec::new())];
    while let Some((set, path)) = frontier.pop() {
        let completes = set.lowest_completed_alt(atn).is_some();
        if completes {
            out.push(LookaheadPath { tokens: path.clone(), complete: true });
        }
        if path.len() == depth {
            if !completes {
                out.push(LookaheadPath { tokens: path, complete: false });
            }
            continue;
        }
        for token_type in atom_types(atn, &set) {
            let token = Token::new(token_type);
            // Atom labels are grammar-side expected types; hierarchy
            // awareness enters when paths are compared, not here.
            let next = move_configs(atn, &set, &token, false);
            if !next.is_empty() {
                let mut extended = path.clone();
                extended.push(token_type);
                frontier.push((next, extended));
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Bounded lookahead paths per alternative of a decision, in alternative
/// order. Useful for tooling that reports what each alternative expects.
pub fn decision_paths(atn: &Atn, decision: DecisionId, depth: usize) -> Vec<Vec<LookaheadPath>> {
    let info = &atn.decisions[decision];
    atn.state(info.state)
        .transitions
        .iter()
        .enumerate()
        .map(|(alt, t)| {
            let mut set = ConfigSet::new(DedupMode::AltSensitive);
            set.insert(Config::new(t.target(), alt));
            closure(atn, &mut set);
            enumerate_paths(atn, &set, depth)
        })
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Validation pass
// ══════════════════════════════════════════════════════════════════════════════

/// Validate with the default static depth.
pub fn validate(grammar: &Grammar, atn: &Atn) -> ValidationReport {
    validate_with_depth(grammar, atn, DEFAULT_STATIC_DEPTH)
}

/// Run every static check and batch the findings into one report.
pub fn validate_with_depth(grammar: &Grammar, atn: &Atn, depth: usize) -> ValidationReport {
    let mut issues = Vec::new();
    let nullable = rule_nullability(grammar);
    check_left_recursion(grammar, &nullable, &mut issues);
    check_repetitions(grammar, &nullable, &mut issues);
    check_decisions(atn, &grammar.hierarchy, depth, &mut issues);
    debug!(
        "validated grammar: {} issues ({} errors)",
        issues.len(),
        issues.iter().filter(|i| i.severity() == Severity::Error).count()
    );
    ValidationReport { issues }
}

// ── Nullability ───────────────────────────────────────────────────────────────

/// Fixed-point nullability per rule: can the rule match the empty token
/// sequence? Undefined references count as non-nullable; the ATN builder
/// reports them separately.
fn rule_nullability(grammar: &Grammar) -> HashMap<String, bool> {
    let mut nullable: HashMap<String, bool> =
        grammar.rules.iter().map(|r| (r.name.clone(), false)).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for rule in &grammar.rules {
            if !nullable.get(&rule.name).copied().unwrap_or(false)
                && production_nullable(&rule.production, &nullable)
            {
                nullable.insert(rule.name.clone(), true);
                changed = true;
            }
        }
    }
    nullable
}

fn production_nullable(production: &Production, nullable: &HashMap<String, bool>) -> bool {
    match production {
        Production::Terminal(_) => false,
        Production::Action => true,
        Production::Sequence(items) => items.iter().all(|i| production_nullable(i, nullable)),
        Production::Alternation(alts) => {
            alts.iter().any(|a| production_nullable(&a.production, nullable))
        }
        Production::Option(_)
        | Production::Repetition(_)
        | Production::RepetitionWithSeparator { .. } => true,
        Production::RepetitionMandatory(body) => production_nullable(body, nullable),
        Production::RepetitionMandatoryWithSeparator { body, .. } => {
            production_nullable(body, nullable)
        }
        Production::NonTerminal(name) => nullable.get(name).copied().unwrap_or(false),
    }
}

// ── Left recursion ────────────────────────────────────────────────────────────

/// Rules reachable from the start of `production` without consuming a
/// token.
fn leading_refs(
    production: &Production,
    nullable: &HashMap<String, bool>,
    out: &mut Vec<String>,
) {
    match production {
        Production::Terminal(_) | Production::Action => {}
        Production::NonTerminal(name) => out.push(name.clone()),
        Production::Sequence(items) => {
            for item in items {
                leading_refs(item, nullable, out);
                if !production_nullable(item, nullable) {
                    break;
                }
            }
        }
        Production::Alternation(alts) => {
            for alt in alts {
                leading_refs(&alt.production, nullable, out);
            }
        }
        Production::Option(body)
        | Production::Repetition(body)
        | Production::RepetitionMandatory(body)
        | Production::RepetitionWithSeparator { body, .. }
        | Production::RepetitionMandatoryWithSeparator { body, .. } => {
            leading_refs(body, nullable, out)
        }
    }
}

fn check_left_recursion(
    grammar: &Grammar,
    nullable: &HashMap<String, bool>,
    issues: &mut Vec<GrammarIssue>,
) {
    let mut graph: HashMap<&str, Vec<String>> = HashMap::new();
    for rule in &grammar.rules {
        let mut refs = Vec::new();
        leading_refs(&rule.production, nullable, &mut refs);
        refs.sort();
        refs.dedup();
        graph.entry(rule.name.as_str()).or_insert(refs);
    }

    let mut reported: HashSet<Vec<String>> = HashSet::new();
    let mut done: HashSet<String> = HashSet::new();
    for rule in &grammar.rules {
        if !done.contains(&rule.name) {
            let mut path = Vec::new();
            dfs_cycles(&rule.name, &graph, &mut path, &mut done, &mut reported, issues);
        }
    }
}

fn dfs_cycles(
    rule: &str,
    graph: &HashMap<&str, Vec<String>>,
    path: &mut Vec<String>,
    done: &mut HashSet<String>,
    reported: &mut HashSet<Vec<String>>,
    issues: &mut Vec<GrammarIssue>,
) {
    if let Some(pos) = path.iter().position(|r| r == rule) {
        let cycle: Vec<String> = path[pos..].to_vec();
        // Rotate to the lexicographically smallest member so each cycle is
        // reported once no matter where the traversal entered it.
        if reported.insert(normalize_cycle(&cycle)) {
            let mut full = cycle;
            full.push(rule.to_string());
            issues.push(GrammarIssue::LeftRecursion { cycle: full });
        }
        return;
    }
    if done.contains(rule) {
        return;
    }
    path.push(rule.to_string());
    if let Some(refs) = graph.get(rule) {
        for next in refs {
            dfs_cycles(next, graph, path, done, reported, issues);
        }
    }
    path.pop();
    done.insert(rule.to_string());
}

fn normalize_cycle(cycle: &[String]) -> Vec<String> {
    let min = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, name)| name.as_str())
        .map_or(0, |(i, _)| i);
    cycle[min..].iter().chain(cycle[..min].iter()).cloned().collect()
}

// ── Repetitions ───────────────────────────────────────────────────────────────

fn check_repetitions(
    grammar: &Grammar,
    nullable: &HashMap<String, bool>,
    issues: &mut Vec<GrammarIssue>,
) {
    for rule in &grammar.rules {
        walk_repetitions(&rule.production, &rule.name, nullable, issues);
    }
}

fn walk_repetitions(
    production: &Production,
    rule: &str,
    nullable: &HashMap<String, bool>,
    issues: &mut Vec<GrammarIssue>,
) {
    match production {
        Production::Terminal(_) | Production::NonTerminal(_) | Production::Action => {}
        Production::Sequence(items) => {
            for item in items {
                walk_repetitions(item, rule, nullable, issues);
            }
        }
        Production::Alternation(alts) => {
            for alt in alts {
                walk_repetitions(&alt.production, rule, nullable, issues);
            }
        }
        Production::Option(body) => walk_repetitions(body, rule, nullable, issues),
        Production::Repetition(body) | Production::RepetitionMandatory(body) => {
            if production_nullable(body, nullable) {
                issues.push(GrammarIssue::EmptyRepetitionBody { rule: rule.to_string() });
            }
            walk_repetitions(body, rule, nullable, issues);
        }
        // Separator variants consume the separator on every extra
        // iteration, so an empty-matching body still advances.
        Production::RepetitionWithSeparator { body, .. }
        | Production::RepetitionMandatoryWithSeparator { body, .. } => {
            walk_repetitions(body, rule, nullable, issues)
        }
    }
}

// ── Shadowing and overlap ─────────────────────────────────────────────────────

fn tokens_overlap(a: TokenTypeId, b: TokenTypeId, hierarchy: &TokenHierarchy) -> bool {
    a == b || hierarchy.overlaps(a, b)
}

/// Whether a label `by` matches every token a label `covered` matches:
/// the same type, or `covered` declares `by` among its supertypes. This is
/// directional; a subtype label does not cover its supertype.
fn token_covers(by: TokenTypeId, covered: TokenTypeId, hierarchy: &TokenHierarchy) -> bool {
    by == covered || hierarchy.satisfies(covered, by)
}

/// Whether `path` is subsumed by some path of `earlier`: same length, same
/// completeness, every position covered under the hierarchy.
fn path_covered(path: &LookaheadPath, earlier: &[LookaheadPath], hierarchy: &TokenHierarchy) -> bool {
    earlier.iter().any(|candidate| {
        candidate.complete == path.complete
            && candidate.tokens.len() == path.tokens.len()
            && candidate
                .tokens
                .iter()
                .zip(&path.tokens)
                .all(|(&by, &covered)| token_covers(by, covered, hierarchy))
    })
}

/// Longest token prefix shared by any pair of paths from the two sets, if
/// nonempty.
fn shared_prefix(
    first: &[LookaheadPath],
    second: &[LookaheadPath],
    hierarchy: &TokenHierarchy,
) -> Option<Vec<TokenTypeId>> {
    let mut best: Option<Vec<TokenTypeId>> = None;
    for a in first {
        for b in second {
            let len = a
                .tokens
                .iter()
                .zip(&b.tokens)
                .take_while(|&(&x, &y)| tokens_overlap(x, y, hierarchy))
                .count();
            if len > 0 && best.as_ref().map_or(true, |p| p.len() < len) {
                best = Some(a.tokens[..len].to_vec());
            }
        }
    }
    best
}

fn check_decisions(
    atn: &Atn,
    hierarchy: &TokenHierarchy,
    depth: usize,
    issues: &mut Vec<GrammarIssue>,
) {
    for (decision, info) in atn.decisions.iter().enumerate() {
        if info.kind != DecisionKind::Alternation || info.alternatives < 2 {
            continue;
        }
        let paths = decision_paths(atn, decision, depth);
        for second in 1..paths.len() {
            for first in 0..second {
                let shadowed = !paths[second].is_empty()
                    && paths[second]
                        .iter()
                        .all(|p| path_covered(p, &paths[first], hierarchy));
                if shadowed {
                    issues.push(GrammarIssue::ShadowedAlternative {
                        rule: info.key.rule.clone(),
                        decision,
                        shadowed: second,
                        by: first,
                    });
                } else if let Some(prefix) =
                    shared_prefix(&paths[first], &paths[second], hierarchy)
                {
                    issues.push(GrammarIssue::OverlappingAlternatives {
                        rule: info.key.rule.clone(),
                        decision,
                        first,
                        second,
                        prefix,
                    });
                }
            }
        }
    }
}
