//! Depth-first traversal over precedence edges.
//!
//! The iterator yields `Open` when a node is first reached, `Skip` when an
//! edge leads to a node already seen and `Close` when all successors of a
//! node are done. A `Skip` onto a node that is still open is a back edge.

use std::collections::HashMap;

use crate::activity::ActivityId;
use crate::graph::ActivityGraph;

/// Which precedence edges to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From an activity to its successors.
    Forward,
    /// From an activity to its predecessors.
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitEvent {
    Open {
        node: ActivityId,
        from: Option<ActivityId>,
    },
    Skip {
        node: ActivityId,
        from: ActivityId,
        on_stack: bool,
    },
    Close {
        node: ActivityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Closed,
}

struct Frame {
    node: ActivityId,
    neighbors: Vec<ActivityId>,
    next: usize,
}

/// Lazy depth-first visit starting from a single activity.
pub struct DepthFirst<'g> {
    graph: &'g ActivityGraph,
    direction: Direction,
    stack: Vec<Frame>,
    marks: HashMap<ActivityId, Mark>,
    pending: Option<VisitEvent>,
}

impl<'g> DepthFirst<'g> {
    pub fn new(graph: &'g ActivityGraph, start: ActivityId, direction: Direction) -> Self {
        let mut visit = Self {
            graph,
            direction,
            stack: Vec::new(),
            marks: HashMap::new(),
            pending: Some(VisitEvent::Open {
                node: start,
                from: None,
            }),
        };
        visit.enter(start);
        visit
    }

    fn enter(&mut self, node: ActivityId) {
        let neighbors = match self.direction {
            Direction::Forward => self.graph.post(node),
            Direction::Backward => self.graph.pre(node),
        };
        self.marks.insert(node, Mark::Open);
        self.stack.push(Frame {
            node,
            neighbors,
            next: 0,
        });
    }
}

impl Iterator for DepthFirst<'_> {
    type Item = VisitEvent;

    fn next(&mut self) -> Option<VisitEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        let frame = self.stack.last_mut()?;
        if let Some(&node) = frame.neighbors.get(frame.next) {
            frame.next += 1;
            let from = frame.node;
            return Some(match self.marks.get(&node) {
                Some(mark) => VisitEvent::Skip {
                    node,
                    from,
                    on_stack: *mark == Mark::Open,
                },
                None => {
                    self.enter(node);
                    VisitEvent::Open {
                        node,
                        from: Some(from),
                    }
                }
            });
        }
        let node = frame.node;
        self.stack.pop();
        self.marks.insert(node, Mark::Closed);
        Some(VisitEvent::Close { node })
    }
}

impl ActivityGraph {
    /// Depth-first event stream from `start`.
    pub fn depth_first(&self, start: ActivityId, direction: Direction) -> DepthFirst<'_> {
        DepthFirst::new(self, start, direction)
    }

    /// Every activity reachable from `start` (inclusive) along `direction`.
    pub fn reachable(&self, start: ActivityId, direction: Direction) -> Vec<ActivityId> {
        self.depth_first(start, direction)
            .filter_map(|event| match event {
                VisitEvent::Open { node, .. } => Some(node),
                _ => None,
            })
            .collect()
    }
}
