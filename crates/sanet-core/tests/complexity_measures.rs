//! Complexity measures on the reference block shapes.

use num::BigUint;
use proptest::prelude::*;
use sanet_core::{parse_time, ActivityGraph, ActivityId, Complexity, TimingFeature};

// ============================================================================
// Helpers
// ============================================================================

fn leaf(graph: &mut ActivityGraph, name: &str) -> ActivityId {
    let feature = TimingFeature::uniform(parse_time("0").unwrap(), parse_time("0.8").unwrap()).unwrap();
    graph.simple(name, feature).unwrap()
}

fn big(value: u32) -> BigUint {
    BigUint::from(value)
}

/// BEGIN -> Q, R, S; Q, R -> U; R, S -> V; U, V -> END.
fn simple_dag(graph: &mut ActivityGraph) -> ActivityId {
    let p = graph.dag("P").unwrap();
    let (begin, end) = graph.dag_ends(p).unwrap();
    let q = leaf(graph, "Q");
    let r = leaf(graph, "R");
    let s = leaf(graph, "S");
    let u = leaf(graph, "U");
    let v = leaf(graph, "V");
    graph.add_precondition(q, &[begin]).unwrap();
    graph.add_precondition(r, &[begin]).unwrap();
    graph.add_precondition(s, &[begin]).unwrap();
    graph.add_precondition(u, &[q, r]).unwrap();
    graph.add_precondition(v, &[s, r]).unwrap();
    graph.add_precondition(end, &[u, v]).unwrap();
    p
}

/// Like the simple DAG, with fork-joins TU and WX in place of single leaves.
fn complex_dag(graph: &mut ActivityGraph) -> ActivityId {
    let p = graph.dag("P").unwrap();
    let (begin, end) = graph.dag_ends(p).unwrap();
    let q = leaf(graph, "Q");
    let r = leaf(graph, "R");
    let s = leaf(graph, "S");
    let v = leaf(graph, "V");

    let t1 = leaf(graph, "T1");
    let t2 = leaf(graph, "T2");
    let t = graph.sequence("T", &[t1, t2]).unwrap();
    let u = leaf(graph, "U");
    let tu = graph.fork_join("TU", &[t, u]).unwrap();

    let x1 = leaf(graph, "X1");
    let x2 = leaf(graph, "X2");
    let x = graph.sequence("X", &[x1, x2]).unwrap();
    let w = leaf(graph, "W");
    let wx = graph.fork_join("WX", &[x, w]).unwrap();

    graph.add_precondition(q, &[begin]).unwrap();
    graph.add_precondition(r, &[begin]).unwrap();
    graph.add_precondition(s, &[begin]).unwrap();
    graph.add_precondition(tu, &[q, r]).unwrap();
    graph.add_precondition(v, &[r]).unwrap();
    graph.add_precondition(wx, &[s, r]).unwrap();
    graph.add_precondition(end, &[tu, v, wx]).unwrap();
    p
}

// ============================================================================
// Well-nested blocks
// ============================================================================

#[test]
fn test_single_activity() {
    let mut graph = ActivityGraph::new();
    let a = leaf(&mut graph, "A6");
    assert_eq!(graph.complexity(a).unwrap(), Complexity::unit());
    assert_eq!(graph.simplified_complexity(a).unwrap(), Complexity::unit());
}

#[test]
fn test_and_and_sequence() {
    let mut graph = ActivityGraph::new();
    let a = leaf(&mut graph, "A6");
    let b = leaf(&mut graph, "A1");
    let and = graph.fork_join("AND", &[a, b]).unwrap();
    assert_eq!(graph.c(and).unwrap(), big(2));
    assert_eq!(graph.simplified_c(and).unwrap(), big(2));

    let c = leaf(&mut graph, "C6");
    let d = leaf(&mut graph, "C1");
    let seq = graph.sequence("SEQ", &[c, d]).unwrap();
    assert_eq!(graph.c(seq).unwrap(), big(1));
    assert_eq!(graph.simplified_c(seq).unwrap(), big(1));
    assert_eq!(graph.r(seq).unwrap(), big(2));
}

#[test]
fn test_xor_takes_the_widest_alternative() {
    let mut graph = ActivityGraph::new();
    let a6 = leaf(&mut graph, "A6");
    let a1 = leaf(&mut graph, "A1");
    let simple = graph.xor("test", &[a6, a1], &[0.3, 0.7]).unwrap();
    assert_eq!(graph.c(simple).unwrap(), big(1));

    let a5 = leaf(&mut graph, "A5");
    let b1 = leaf(&mut graph, "B1");
    let b2 = leaf(&mut graph, "B2");
    let and = graph.fork_join("AND", &[b1, b2]).unwrap();
    let complex = graph.xor("testC", &[a5, and], &[0.3, 0.7]).unwrap();
    assert_eq!(graph.c(complex).unwrap(), big(2));
    assert_eq!(graph.simplified_c(complex).unwrap(), big(1));

    let c6 = leaf(&mut graph, "C6");
    let c1 = leaf(&mut graph, "C1");
    let c3 = leaf(&mut graph, "C3");
    let c4 = leaf(&mut graph, "C4");
    let c5 = leaf(&mut graph, "C5");
    let inner = graph.fork_join("AND_inner", &[c3, c4]).unwrap();
    let outer = graph.fork_join("AND_outer", &[c1, inner]).unwrap();
    let seq = graph.sequence("SEQ", &[outer, c5]).unwrap();
    let very = graph.xor("testB", &[c6, seq], &[0.3, 0.7]).unwrap();
    assert_eq!(graph.c(very).unwrap(), big(3));
    assert_eq!(graph.simplified_c(very).unwrap(), big(1));
}

#[test]
fn test_repeat_measures() {
    let mut graph = ActivityGraph::new();
    let a6 = leaf(&mut graph, "A6");
    let a3 = leaf(&mut graph, "A3");
    let a4 = leaf(&mut graph, "A4");
    let a5 = leaf(&mut graph, "A5");
    let inner = graph.fork_join("AND_inner", &[a3, a4]).unwrap();
    let seq = graph.sequence("SEQ", &[inner, a5]).unwrap();
    let body = graph.xor("testB", &[a6, seq], &[0.3, 0.7]).unwrap();
    let repeat = graph.repeat("Repeat", 0.4, body).unwrap();

    assert_eq!(graph.complexity(repeat).unwrap(), Complexity::new(2u32, 6u32));
    assert_eq!(graph.simplified_complexity(repeat).unwrap(), Complexity::new(1u32, 2u32));

    let b6 = leaf(&mut graph, "B6");
    let b3 = leaf(&mut graph, "B3");
    let b4 = leaf(&mut graph, "B4");
    let b5 = leaf(&mut graph, "B5");
    let b7 = leaf(&mut graph, "B7");
    let left = graph.fork_join("AND_inner_b", &[b3, b4]).unwrap();
    let right = graph.fork_join("AND_inner2", &[b5, b7]).unwrap();
    let fj = graph.fork_join("FJ", &[left, right]).unwrap();
    let body = graph.xor("testC", &[b6, fj], &[0.3, 0.7]).unwrap();
    let complex = graph.repeat("CRepeat", 0.4, body).unwrap();

    assert_eq!(graph.complexity(complex).unwrap(), Complexity::new(4u32, 8u32));
    assert_eq!(graph.simplified_c(complex).unwrap(), big(1));
}

// ============================================================================
// DAGs
// ============================================================================

#[test]
fn test_simple_dag() {
    let mut graph = ActivityGraph::new();
    let p = simple_dag(&mut graph);
    assert_eq!(graph.complexity(p).unwrap(), Complexity::new(3u32, 3u32));
    assert_eq!(graph.simplified_complexity(p).unwrap(), Complexity::new(3u32, 3u32));
}

#[test]
fn test_complex_dag() {
    let mut graph = ActivityGraph::new();
    let p = complex_dag(&mut graph);
    // {TU, V, WX} is the heaviest antichain under both weightings.
    assert_eq!(graph.complexity(p).unwrap(), Complexity::new(5u32, 7u32));
    assert_eq!(graph.simplified_complexity(p).unwrap(), Complexity::new(3u32, 3u32));
}

#[test]
fn test_replacement_lowers_measures() {
    let mut graph = ActivityGraph::new();
    let p = complex_dag(&mut graph);
    let tu = graph.find("TU").unwrap();
    let surrogate = leaf(&mut graph, "TU_N");
    graph.replace(tu, surrogate).unwrap();

    assert_eq!(graph.complexity(p).unwrap(), Complexity::new(4u32, 5u32));
    assert_eq!(graph.simplified_complexity(p).unwrap(), Complexity::new(3u32, 3u32));
}

#[test]
fn test_simplified_measures_are_stable() {
    let mut graph = ActivityGraph::new();
    let p = complex_dag(&mut graph);
    let first = graph.simplified_complexity(p).unwrap();
    graph.reset_complexity_measures();
    assert_eq!(graph.simplified_complexity(p).unwrap(), first);
}

#[test]
fn test_measures_serialize_as_strings() {
    let json = serde_json::to_string(&Complexity::new(5u32, 14u32)).unwrap();
    assert_eq!(json, r#"{"c":"5","r":"14"}"#);
    let back: Complexity = serde_json::from_str(r#"{"c":5,"r":"14"}"#).unwrap();
    assert_eq!(back, Complexity::new(5u32, 14u32));
}

// ============================================================================
// Properties
// ============================================================================

/// One fork-join of `width` leaves per group.
fn forks(graph: &mut ActivityGraph, widths: &[usize]) -> Vec<ActivityId> {
    widths
        .iter()
        .enumerate()
        .map(|(g, &width)| {
            let leaves: Vec<ActivityId> = (0..width).map(|i| leaf(graph, &format!("L{g}_{i}"))).collect();
            graph.fork_join(format!("F{g}"), &leaves).unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_sequence_adds_regeneration_only(widths in prop::collection::vec(1usize..5, 1..5)) {
        let mut graph = ActivityGraph::new();
        let groups = forks(&mut graph, &widths);
        let seq = graph.sequence("SEQ", &groups).unwrap();
        let max = *widths.iter().max().unwrap() as u32;
        let sum = widths.iter().sum::<usize>() as u32;
        prop_assert_eq!(graph.complexity(seq).unwrap(), Complexity::new(max, sum));
    }

    #[test]
    fn prop_parallel_composition_is_additive(widths in prop::collection::vec(1usize..5, 1..5)) {
        let mut graph = ActivityGraph::new();
        let groups = forks(&mut graph, &widths);
        let sum = widths.iter().sum::<usize>() as u32;

        let dag = graph.dag("P").unwrap();
        let (begin, end) = graph.dag_ends(dag).unwrap();
        for &g in &groups {
            graph.add_precondition(g, &[begin]).unwrap();
        }
        graph.add_precondition(end, &groups).unwrap();

        prop_assert_eq!(graph.complexity(dag).unwrap(), Complexity::new(sum, sum));
        let parts: Vec<Complexity> = groups.iter().map(|&g| graph.complexity(g).unwrap()).collect();
        let c: BigUint = parts.iter().map(|m| m.c.clone()).sum();
        prop_assert_eq!(c, big(sum));
    }

    #[test]
    fn prop_measures_are_idempotent(widths in prop::collection::vec(1usize..4, 1..4)) {
        let mut graph = ActivityGraph::new();
        let groups = forks(&mut graph, &widths);
        let and = graph.fork_join("AND", &groups).unwrap();
        let repeat = graph.repeat("LOOP", 0.5, and).unwrap();

        let full = graph.complexity(repeat).unwrap();
        let simplified = graph.simplified_complexity(repeat).unwrap();
        prop_assert_eq!(&graph.complexity(repeat).unwrap(), &full);
        graph.reset_complexity_measures();
        prop_assert_eq!(graph.complexity(repeat).unwrap(), full);
        prop_assert_eq!(graph.simplified_complexity(repeat).unwrap(), simplified);
    }
}
