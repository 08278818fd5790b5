//! Tests for the static validator: shadowing, overlap, empty repetition
//! bodies, and left recursion. These pin the boundary between "always
//! ambiguous" and "overlap resolved at runtime".

use crate::atn::compile;
use crate::grammar::{Grammar, Production as P, TokenHierarchy};
use crate::validate::{validate, GrammarIssue, Severity};

fn issues_for(grammar: &Grammar) -> Vec<GrammarIssue> {
    let atn = compile(grammar).expect("well-formed grammar");
    validate(grammar, &atn).into_issues()
}

#[test]
fn test_disjoint_alternatives_are_clean() {
    let grammar = Grammar::new().rule("R", P::alt(vec![P::t(1), P::t(2)]));
    assert!(issues_for(&grammar).is_empty());
}

#[test]
fn test_identical_alternatives_are_shadowed() {
    let grammar = Grammar::new().rule("R", P::alt(vec![P::t(1), P::t(1)]));
    let issues = issues_for(&grammar);
    assert_eq!(
        issues,
        vec![GrammarIssue::ShadowedAlternative {
            rule: "R".to_string(),
            decision: 0,
            shadowed: 1,
            by: 0
        }]
    );
    assert_eq!(issues[0].severity(), Severity::Warning);
}

#[test]
fn test_shared_prefix_is_overlap_not_shadowing() {
    // Alt := 'a' 'b' | 'a' 'c' diverges on the second token.
    let grammar = Grammar::new().rule(
        "Alt",
        P::alt(vec![P::seq(vec![P::t(1), P::t(2)]), P::seq(vec![P::t(1), P::t(3)])]),
    );
    let issues = issues_for(&grammar);
    assert_eq!(
        issues,
        vec![GrammarIssue::OverlappingAlternatives {
            rule: "Alt".to_string(),
            decision: 0,
            first: 0,
            second: 1,
            prefix: vec![1]
        }]
    );
}

#[test]
fn test_prefix_of_longer_alternative_is_overlap() {
    // 'a' | 'a' 'b': the adaptive simulator separates them at runtime, so
    // this is an overlap, not shadowing.
    let grammar =
        Grammar::new().rule("R", P::alt(vec![P::t(1), P::seq(vec![P::t(1), P::t(2)])]));
    let issues = issues_for(&grammar);
    assert_eq!(issues.len(), 1);
    assert!(matches!(issues[0], GrammarIssue::OverlappingAlternatives { .. }));
}

#[test]
fn test_hierarchy_aware_overlap() {
    // Keyword 5 declares identifier 6 as its supertype: an alternative
    // expecting 6 overlaps one expecting 5.
    let mut hierarchy = TokenHierarchy::new();
    hierarchy.declare(5, vec![6]);
    let grammar = Grammar::new()
        .rule("R", P::alt(vec![P::t(6), P::t(5)]))
        .with_hierarchy(hierarchy);
    let issues = issues_for(&grammar);
    assert_eq!(issues.len(), 1);
    match &issues[0] {
        GrammarIssue::ShadowedAlternative { shadowed, by, .. } => {
            // Every token satisfying 5 also satisfies 6, so the later
            // alternative can never win first-match.
            assert_eq!((*shadowed, *by), (1, 0));
        }
        other => panic!("expected shadowing, got {:?}", other),
    }
}

#[test]
fn test_subtype_listed_first_is_overlap_not_shadowing() {
    // Reversed order: the subtype alternative comes first. A plain
    // identifier 6 still selects the second alternative, so this is an
    // overlap, not shadowing.
    let mut hierarchy = TokenHierarchy::new();
    hierarchy.declare(5, vec![6]);
    let grammar = Grammar::new()
        .rule("R", P::alt(vec![P::t(5), P::t(6)]))
        .with_hierarchy(hierarchy);
    let issues = issues_for(&grammar);
    assert!(!issues
        .iter()
        .any(|i| matches!(i, GrammarIssue::ShadowedAlternative { .. })));
    assert!(issues
        .iter()
        .any(|i| matches!(i, GrammarIssue::OverlappingAlternatives { .. })));
}

#[test]
fn test_empty_repetition_body_is_error() {
    let grammar = Grammar::new().rule("R", P::rep(P::opt(P::t(1))));
    let issues = issues_for(&grammar);
    assert_eq!(
        issues,
        vec![GrammarIssue::EmptyRepetitionBody { rule: "R".to_string() }]
    );
    assert_eq!(issues[0].severity(), Severity::Error);
}

#[test]
fn test_mandatory_repetition_with_nullable_body_is_error() {
    let grammar = Grammar::new().rule("R", P::rep1(P::rep(P::t(1))));
    let issues = issues_for(&grammar);
    assert!(issues
        .iter()
        .any(|i| matches!(i, GrammarIssue::EmptyRepetitionBody { .. })));
}

#[test]
fn test_separated_repetition_tolerates_nullable_body() {
    // Each extra iteration consumes the separator, so the loop advances.
    let grammar = Grammar::new().rule("R", P::rep_sep(P::opt(P::t(1)), 2));
    assert!(issues_for(&grammar).is_empty());
}

#[test]
fn test_direct_left_recursion() {
    let grammar =
        Grammar::new().rule("E", P::alt(vec![P::seq(vec![P::nt("E"), P::t(1)]), P::t(2)]));
    let issues = issues_for(&grammar);
    let recursion = issues
        .iter()
        .find(|i| matches!(i, GrammarIssue::LeftRecursion { .. }))
        .expect("left recursion reported");
    assert_eq!(
        recursion,
        &GrammarIssue::LeftRecursion { cycle: vec!["E".to_string(), "E".to_string()] }
    );
    assert_eq!(recursion.severity(), Severity::Error);
}

#[test]
fn test_mutual_left_recursion_reports_full_cycle() {
    let grammar = Grammar::new()
        .rule("A", P::seq(vec![P::nt("B"), P::t(1)]))
        .rule("B", P::seq(vec![P::nt("A"), P::t(2)]));
    let issues = issues_for(&grammar);
    assert_eq!(issues.len(), 1, "one cycle, reported once: {:?}", issues);
    match &issues[0] {
        GrammarIssue::LeftRecursion { cycle } => {
            assert_eq!(cycle.len(), 3);
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("expected left recursion, got {:?}", other),
    }
}

#[test]
fn test_recursion_behind_nullable_prefix_is_left_recursion() {
    // A := ('x')? A 'y' — the optional prefix can match nothing.
    let grammar =
        Grammar::new().rule("A", P::seq(vec![P::opt(P::t(1)), P::nt("A"), P::t(2)]));
    let issues = issues_for(&grammar);
    assert!(issues
        .iter()
        .any(|i| matches!(i, GrammarIssue::LeftRecursion { .. })));
}

#[test]
fn test_recursion_behind_token_is_fine() {
    let grammar = Grammar::new()
        .rule("A", P::alt(vec![P::seq(vec![P::t(1), P::nt("A")]), P::t(2)]));
    assert!(issues_for(&grammar).is_empty());
}

#[test]
fn test_findings_are_batched() {
    let grammar = Grammar::new()
        .rule("E", P::seq(vec![P::nt("E"), P::t(1)]))
        .rule("R", P::rep(P::opt(P::t(2))))
        .rule("S", P::alt(vec![P::t(3), P::t(3)]));
    let issues = issues_for(&grammar);
    assert!(issues.iter().any(|i| matches!(i, GrammarIssue::LeftRecursion { .. })));
    assert!(issues.iter().any(|i| matches!(i, GrammarIssue::EmptyRepetitionBody { .. })));
    assert!(issues.iter().any(|i| matches!(i, GrammarIssue::ShadowedAlternative { .. })));
}
