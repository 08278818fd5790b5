//! Tests for engine construction, configuration, and decision addressing.

use crate::atn::{DecisionKey, DecisionKind};
use crate::grammar::{Grammar, Production as P, SliceTokenStream, Token};
use crate::simulate::{EngineError, LookaheadEngine, Prediction};
use crate::{AmbiguityPolicy, EngineConfig};

#[test]
fn test_default_config() {
    let config = EngineConfig::default();
    assert_eq!(config.max_lookahead_depth, 4);
    assert_eq!(config.ambiguity_policy, AmbiguityPolicy::WarnFirstMatch);
    assert!(!config.cache_gated_edges);
    assert!(config.category_matching);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = EngineConfig {
        max_lookahead_depth: 7,
        ambiguity_policy: AmbiguityPolicy::Fatal,
        cache_gated_edges: true,
        category_matching: false,
    };
    let json = serde_json::to_string(&config).expect("serialize");
    let back: EngineConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let back: EngineConfig =
        serde_json::from_str(r#"{"ambiguity_policy":"Fatal"}"#).expect("deserialize");
    assert_eq!(back.ambiguity_policy, AmbiguityPolicy::Fatal);
    assert_eq!(back.max_lookahead_depth, 4);
}

#[test]
fn test_decisions_are_addressable_by_key() {
    let grammar = Grammar::new()
        .rule("Stmt", P::seq(vec![P::alt(vec![P::t(1), P::t(2)]), P::opt(P::t(3))]))
        .rule("Expr", P::alt(vec![P::t(4), P::t(5)]));
    let engine = LookaheadEngine::new(&grammar).expect("well-formed grammar");
    assert_eq!(engine.atn().decisions.len(), 3);

    let stmt_alt = DecisionKey {
        rule: "Stmt".to_string(),
        kind: DecisionKind::Alternation,
        occurrence: 0,
    };
    let stmt_opt =
        DecisionKey { rule: "Stmt".to_string(), kind: DecisionKind::Option, occurrence: 0 };
    let expr_alt = DecisionKey {
        rule: "Expr".to_string(),
        kind: DecisionKind::Alternation,
        occurrence: 0,
    };
    assert_eq!(engine.decision_id(&stmt_alt), Some(0));
    assert_eq!(engine.decision_id(&stmt_opt), Some(1));
    assert_eq!(engine.decision_id(&expr_alt), Some(2));
}

#[test]
fn test_dfa_grows_lazily_per_decision() {
    let grammar = Grammar::new()
        .rule("A", P::alt(vec![P::t(1), P::t(2)]))
        .rule("B", P::alt(vec![P::t(3), P::t(4)]));
    let mut engine = LookaheadEngine::new(&grammar).expect("well-formed grammar");
    assert_eq!(engine.dfa_size(0), 0);
    assert_eq!(engine.dfa_size(1), 0);

    let input = vec![Token::new(2)];
    let stream = SliceTokenStream::new(&input);
    assert_eq!(engine.predict(0, &stream), Ok(Prediction::Alternative(1)));
    assert!(engine.dfa_size(0) > 0);
    assert_eq!(engine.dfa_size(1), 0, "untouched decisions stay unbuilt");
}

#[test]
fn test_validated_blocks_left_recursion() {
    let grammar = Grammar::new().rule("E", P::alt(vec![P::seq(vec![P::nt("E"), P::t(1)]), P::t(2)]));
    match LookaheadEngine::validated(&grammar, EngineConfig::default()) {
        Err(EngineError::Validation(issues)) => assert!(!issues.is_empty()),
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_validated_accepts_warning_only_grammars() {
    // Overlapping prefix is a warning; the engine must still build.
    let grammar = Grammar::new().rule(
        "R",
        P::alt(vec![P::seq(vec![P::t(1), P::t(2)]), P::seq(vec![P::t(1), P::t(3)])]),
    );
    assert!(LookaheadEngine::validated(&grammar, EngineConfig::default()).is_ok());
}

#[test]
fn test_atn_dump_lists_rules_and_decisions() {
    let grammar = Grammar::new()
        .rule("Stmt", P::alt(vec![P::nt("Expr"), P::t(9)]))
        .rule("Expr", P::t(1));
    let engine = LookaheadEngine::new(&grammar).expect("well-formed grammar");
    let dump = engine.atn().dump();
    assert!(dump.contains("'Stmt'"));
    assert!(dump.contains("'Expr'"));
    assert!(dump.contains("decision 0"));
    assert!(dump.contains("--rule(Expr"));
}
