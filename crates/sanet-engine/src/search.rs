//! Selection of the blocks that get rewritten.

use sanet_core::{ActivityGraph, ActivityId, BlockKind, Complexity, ModelResult};

use crate::config::{Descend, HeuristicConfig};

/// Child of `root` with the largest `(C, R)` among those with C > 1 or R > 1.
///
/// Ties go to the child that comes last in topological order.
pub fn most_complex_child(
    graph: &ActivityGraph,
    root: ActivityId,
) -> ModelResult<Option<(ActivityId, Complexity)>> {
    let mut best: Option<(ActivityId, Complexity)> = None;
    for child in graph.children(root)? {
        let measure = graph.complexity(child)?;
        if !measure.is_complex() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, current)| measure >= *current) {
            best = Some((child, measure));
        }
    }
    Ok(best)
}

/// Deepest block under `root` worth replacing with a surrogate.
///
/// Starting from the most complex child, the search keeps descending while
/// the selected block is of a kind it may enter and its measures satisfy the
/// configured descent policy. `None` means every child is already a leaf or
/// equivalent to one.
pub fn deepest_complex_block(
    graph: &ActivityGraph,
    root: ActivityId,
    config: &HeuristicConfig,
) -> ModelResult<Option<ActivityId>> {
    let Some((chosen, measure)) = most_complex_child(graph, root)? else {
        return Ok(None);
    };
    let kind = graph.kind_of(chosen)?;
    let enterable = match config.inner_block.descend {
        Descend::Dags => matches!(kind, BlockKind::Dag | BlockKind::Repeat),
        Descend::AnyComposite => kind.is_composite(),
    };
    if enterable && config.descends_into(&measure) {
        if let Some(deeper) = deepest_complex_block(graph, chosen, config)? {
            return Ok(Some(deeper));
        }
    }
    Ok(Some(chosen))
}

/// First repetition found under `root`, without looking inside repetitions.
pub fn outermost_repeat(graph: &ActivityGraph, root: ActivityId) -> ModelResult<Option<ActivityId>> {
    let mut pending = graph.children(root)?;
    pending.reverse();
    while let Some(id) = pending.pop() {
        if graph.kind_of(id)? == BlockKind::Repeat {
            return Ok(Some(id));
        }
        let mut children = graph.children(id)?;
        children.reverse();
        pending.extend(children);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Combine, Comparison, InnerBlockSearch, ThresholdPolicy};
    use sanet_core::{time_from_int, TimingFeature};

    fn leaf(graph: &mut ActivityGraph, name: &str) -> ActivityId {
        let feature = TimingFeature::uniform(time_from_int(0), time_from_int(1)).unwrap();
        graph.simple(name, feature).unwrap()
    }

    /// DAG with members A, W = AND(X, inner DAG(Y1 || Y2 || Y3)), B.
    fn nested_model(graph: &mut ActivityGraph) -> ActivityId {
        let inner = graph.dag("I").unwrap();
        let (ib, ie) = graph.dag_ends(inner).unwrap();
        let ys: Vec<ActivityId> = ["Y1", "Y2", "Y3"].iter().map(|n| leaf(graph, n)).collect();
        for &y in &ys {
            graph.add_precondition(y, &[ib]).unwrap();
        }
        graph.add_precondition(ie, &ys).unwrap();

        let outer = graph.dag("P").unwrap();
        let (begin, end) = graph.dag_ends(outer).unwrap();
        let a = leaf(graph, "A");
        let b = leaf(graph, "B");
        graph.add_precondition(a, &[begin]).unwrap();
        graph.add_precondition(inner, &[a]).unwrap();
        graph.add_precondition(b, &[a]).unwrap();
        graph.add_precondition(end, &[inner, b]).unwrap();
        outer
    }

    #[test]
    fn test_descends_into_dags_over_threshold() {
        let mut graph = ActivityGraph::new();
        let outer = nested_model(&mut graph);
        let inner = graph.find("I").unwrap();

        let config = HeuristicConfig::with_thresholds(2, 2);
        // I has C = R = 3 but only leaves inside, so it is the deepest candidate.
        assert_eq!(deepest_complex_block(&graph, outer, &config).unwrap(), Some(inner));
    }

    #[test]
    fn test_stops_when_policy_does_not_hold() {
        let mut graph = ActivityGraph::new();
        let outer = nested_model(&mut graph);
        let inner = graph.find("I").unwrap();

        let config = HeuristicConfig {
            inner_block: InnerBlockSearch {
                policy: ThresholdPolicy::new(Comparison::Exceeds, Combine::Both),
                descend: Descend::AnyComposite,
            },
            ..HeuristicConfig::with_thresholds(5, 5)
        };
        assert_eq!(deepest_complex_block(&graph, outer, &config).unwrap(), Some(inner));
    }

    #[test]
    fn test_no_candidate_when_all_leaves() {
        let mut graph = ActivityGraph::new();
        let outer = nested_model(&mut graph);
        let inner = graph.find("I").unwrap();
        let config = HeuristicConfig::default();
        assert_eq!(deepest_complex_block(&graph, inner, &config).unwrap(), None);
        assert!(most_complex_child(&graph, outer).unwrap().is_some());
    }

    #[test]
    fn test_outermost_repeat() {
        let mut graph = ActivityGraph::new();
        let a = leaf(&mut graph, "A");
        let inner = graph.repeat("Inner", 0.5, a).unwrap();
        let outer = graph.repeat("Outer", 0.5, inner).unwrap();
        let b = leaf(&mut graph, "B");
        let seq = graph.sequence("S", &[b, outer]).unwrap();

        assert_eq!(outermost_repeat(&graph, seq).unwrap(), Some(outer));
        assert_eq!(outermost_repeat(&graph, a).unwrap(), None);
    }
}
