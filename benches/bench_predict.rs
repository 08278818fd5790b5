//! Criterion benchmarks for the lookahead engine.
//!
//! Three benchmark groups:
//! 1. `predict/cold` — DFA construction cost: engine rebuilt per iteration
//! 2. `predict/warm` — steady-state prediction over a fully cached DFA
//! 3. `predict/scaling` — warm prediction at alternation widths 2..32
//!
//! Run with:
//!   cargo bench --bench bench_predict

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lookatn::{Grammar, LookaheadEngine, Production as P, SliceTokenStream, Token};

// ══════════════════════════════════════════════════════════════════════════════
// Fixture grammars
// ══════════════════════════════════════════════════════════════════════════════

/// Two alternatives distinguished at the first token.
fn disjoint_grammar() -> Grammar {
    Grammar::new().rule("R", P::alt(vec![P::t(1), P::t(2)]))
}

/// Shared three-token prefix before the alternatives diverge.
fn deep_prefix_grammar() -> Grammar {
    Grammar::new().rule(
        "R",
        P::alt(vec![
            P::seq(vec![P::t(1), P::t(2), P::t(3), P::t(4)]),
            P::seq(vec![P::t(1), P::t(2), P::t(3), P::t(5)]),
        ]),
    )
}

/// Lookahead through nested rule invocations.
fn nested_grammar() -> Grammar {
    Grammar::new()
        .rule("Stmt", P::alt(vec![P::nt("A"), P::nt("B")]))
        .rule("A", P::seq(vec![P::t(1), P::t(2)]))
        .rule("B", P::seq(vec![P::t(1), P::t(3)]))
}

/// An alternation of `width` single-token alternatives with a shared
/// leading token, forcing two peeks per prediction.
fn wide_grammar(width: u32) -> Grammar {
    let alts = (0..width).map(|i| P::seq(vec![P::t(100), P::t(i + 1)])).collect();
    Grammar::new().rule("Wide", P::alt(alts))
}

fn tokens(types: &[u32]) -> Vec<Token> {
    types.iter().map(|&t| Token::new(t)).collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Group 1: cold prediction (DFA built from scratch)
// ══════════════════════════════════════════════════════════════════════════════

fn predict_cold(c: &mut Criterion) {
    let cases: Vec<(&str, Grammar, Vec<Token>)> = vec![
        ("disjoint", disjoint_grammar(), tokens(&[2])),
        ("deep_prefix", deep_prefix_grammar(), tokens(&[1, 2, 3, 5])),
        ("nested", nested_grammar(), tokens(&[1, 3])),
    ];

    let mut group = c.benchmark_group("predict/cold");
    for (name, grammar, input) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), grammar, |b, g| {
            b.iter(|| {
                let mut engine = LookaheadEngine::new(g).expect("well-formed grammar");
                engine.predict(0, &SliceTokenStream::new(input))
            })
        });
    }
    group.finish();
}

// ══════════════════════════════════════════════════════════════════════════════
// Group 2: warm prediction (cached edges only)
// ══════════════════════════════════════════════════════════════════════════════

fn predict_warm(c: &mut Criterion) {
    let cases: Vec<(&str, Grammar, Vec<Token>)> = vec![
        ("disjoint", disjoint_grammar(), tokens(&[2])),
        ("deep_prefix", deep_prefix_grammar(), tokens(&[1, 2, 3, 5])),
        ("nested", nested_grammar(), tokens(&[1, 3])),
    ];

    let mut group = c.benchmark_group("predict/warm");
    for (name, grammar, input) in &cases {
        let mut engine = LookaheadEngine::new(grammar).expect("well-formed grammar");
        let stream = SliceTokenStream::new(input);
        engine
            .predict(0, &stream)
            .expect("warmup prediction succeeds");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| engine.predict(0, &stream))
        });
    }
    group.finish();
}

// ══════════════════════════════════════════════════════════════════════════════
// Group 3: alternation width scaling
// ══════════════════════════════════════════════════════════════════════════════

fn predict_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict/scaling");
    for width in [2u32, 8, 16, 32] {
        let grammar = wide_grammar(width);
        let input = tokens(&[100, width]);
        let mut engine = LookaheadEngine::new(&grammar).expect("well-formed grammar");
        let stream = SliceTokenStream::new(&input);
        engine
            .predict(0, &stream)
            .expect("warmup prediction succeeds");
        group.bench_function(BenchmarkId::from_parameter(width), |b| {
            b.iter(|| engine.predict(0, &stream))
        });
    }
    group.finish();
}

criterion_group!(benches, predict_cold, predict_warm, predict_scaling);
criterion_main!(benches);
