//! Structural edits on DAG blocks: copying, pruning, nesting and flattening.

use std::collections::{HashMap, HashSet};

use crate::activity::{ActivityId, ActivityKind, BlockKind};
use crate::error::{ModelError, ModelResult};
use crate::graph::ActivityGraph;
use crate::traversal::{Direction, VisitEvent};

impl ActivityGraph {
    fn edit_error(&self, id: ActivityId, message: impl Into<String>) -> ModelError {
        ModelError::InvalidEdit {
            name: self.name(id).unwrap_or("?").to_string(),
            message: message.into(),
        }
    }

    /// Activities on some path from `from` to `to` inside `dag`, both included.
    pub fn activities_between(
        &self,
        dag: ActivityId,
        from: ActivityId,
        to: ActivityId,
    ) -> ModelResult<HashSet<ActivityId>> {
        self.dag_ends(dag)?;
        let forward: HashSet<ActivityId> = self.reachable(from, Direction::Forward).into_iter().collect();
        if !forward.contains(&to) {
            return Err(self.edit_error(dag, format!(
                "no path from {} to {}",
                self.name(from)?,
                self.name(to)?
            )));
        }
        Ok(self
            .reachable(to, Direction::Backward)
            .into_iter()
            .filter(|id| forward.contains(id))
            .collect())
    }

    /// Deep copy of an activity; every copied name gets `suffix` appended.
    pub fn copy_recursive(&mut self, id: ActivityId, suffix: &str) -> ModelResult<ActivityId> {
        let activity = self.get(id)?.clone();
        let name = format!("{}{}", activity.name(), suffix);
        let copy = match activity.kind() {
            ActivityKind::Simple { features } => {
                let copy = self.mixture(name, features.clone())?;
                self.set_bounds(copy, activity.eft().clone(), activity.lft().clone())?;
                copy
            }
            ActivityKind::Sequence { children } => {
                let copies = self.copy_all(children, suffix)?;
                self.sequence(name, &copies)?
            }
            ActivityKind::And { children } => {
                let copies = self.copy_all(children, suffix)?;
                self.fork_join(name, &copies)?
            }
            ActivityKind::Xor { alternatives, probs } => {
                let copies = self.copy_all(alternatives, suffix)?;
                self.xor(name, &copies, probs)?
            }
            ActivityKind::Repeat { body, probability } => {
                let body = self.copy_recursive(*body, suffix)?;
                self.repeat(name, *probability, body)?
            }
            ActivityKind::Dag { begin, end } => self.copy_between(id, *begin, *end, suffix)?.0,
        };
        Ok(copy)
    }

    fn copy_all(&mut self, ids: &[ActivityId], suffix: &str) -> ModelResult<Vec<ActivityId>> {
        ids.iter().map(|&id| self.copy_recursive(id, suffix)).collect()
    }

    /// Copy the part of `dag` between `from` and `to` into a new detached DAG.
    ///
    /// `from` is linked after the new begin and `to` before the new end, unless
    /// they are the begin and end of `dag` themselves. Returns the new DAG and
    /// the mapping from original to copied activities.
    pub fn copy_between(
        &mut self,
        dag: ActivityId,
        from: ActivityId,
        to: ActivityId,
        suffix: &str,
    ) -> ModelResult<(ActivityId, HashMap<ActivityId, ActivityId>)> {
        let (begin, end) = self.dag_ends(dag)?;
        let between = self.activities_between(dag, from, to)?;
        let order: Vec<ActivityId> = self
            .topological_order(dag)?
            .into_iter()
            .filter(|id| between.contains(id))
            .collect();

        let copy_name = format!("{}{}", self.name(dag)?, suffix);
        let copy = self.dag(copy_name)?;
        let (copy_begin, copy_end) = self.dag_ends(copy)?;

        let mut mapping = HashMap::new();
        for &id in &order {
            let mapped = if id == begin {
                copy_begin
            } else if id == end {
                copy_end
            } else {
                self.copy_recursive(id, suffix)?
            };
            mapping.insert(id, mapped);
        }
        let mapped = |id: &ActivityId| {
            mapping
                .get(id)
                .copied()
                .ok_or(ModelError::UnknownActivity { id: *id })
        };

        if from != begin {
            self.add_precondition(mapped(&from)?, &[copy_begin])?;
        }
        for &id in order.iter().filter(|&&id| id != from) {
            let pre: Vec<ActivityId> = self
                .pre(id)
                .iter()
                .filter(|p| between.contains(p))
                .map(mapped)
                .collect::<ModelResult<_>>()?;
            self.add_precondition(mapped(&id)?, &pre)?;
        }
        if to != end {
            self.add_precondition(copy_end, &[mapped(&to)?])?;
        }
        Ok((copy, mapping))
    }

    /// Remove the activities between `from` and `to`.
    ///
    /// Unless `remove_shared` is set, the outgoing edges of `to` are cut first
    /// and activities still on a path from begin to end are kept.
    pub fn remove_between(
        &mut self,
        dag: ActivityId,
        from: ActivityId,
        to: ActivityId,
        remove_shared: bool,
    ) -> ModelResult<()> {
        let (begin, end) = self.dag_ends(dag)?;
        let mut doomed = self.activities_between(dag, from, to)?;
        if !remove_shared {
            for next in self.post(to) {
                self.remove_edge(to, next);
            }
            if let Ok(kept) = self.activities_between(dag, begin, end) {
                doomed.retain(|id| !kept.contains(id));
            }
        }
        doomed.remove(&begin);
        doomed.remove(&end);
        // Sorted so that freed arena slots are reused in a reproducible order.
        let mut doomed: Vec<ActivityId> = doomed.into_iter().collect();
        doomed.sort();
        for id in doomed {
            if self.contains(id) {
                self.remove_subtree(id)?;
            }
        }
        self.refresh_support(dag)
    }

    /// Nest the part of `dag` that only `pred` needs into a parallel copy.
    ///
    /// Returns a detached AND of two DAGs: a copy of `dag` without the
    /// activities exclusively preceding `pred`, and a copy of everything
    /// between the begin and `pred`. The original `dag` is left unchanged.
    /// Fails with [`ModelError::Malformed`], leaving no copies behind, when
    /// the pruned copy is not well formed.
    pub fn nest(&mut self, dag: ActivityId, pred: ActivityId) -> ModelResult<ActivityId> {
        let (begin, end) = self.dag_ends(dag)?;
        let exits = self.pre(end);
        if !exits.contains(&pred) {
            return Err(self.edit_error(dag, format!("{} does not precede the end", self.name(pred)?)));
        }
        if exits.len() < 2 {
            return Err(self.edit_error(dag, "nesting needs at least two predecessors of the end"));
        }

        let dag_name = self.name(dag)?.to_string();
        let pred_name = self.name(pred)?.to_string();
        let (prefix, _) = self.copy_between(dag, begin, pred, &format!("_before_{pred_name}"))?;
        let (rest, mapping) = self.copy_between(dag, begin, end, "_rest")?;
        let (rest_begin, _) = self.dag_ends(rest)?;
        let rest_pred = mapping
            .get(&pred)
            .copied()
            .ok_or(ModelError::UnknownActivity { id: pred })?;
        self.remove_between(rest, rest_begin, rest_pred, false)?;
        // Successors of `pred` other than the end can be left without an entry.
        if let Err(err) = self.validate(rest) {
            self.discard(rest)?;
            self.discard(prefix)?;
            return Err(err);
        }

        let name = self.fresh_name(&format!("{dag_name}_nested"));
        self.fork_join(name, &[rest, prefix])
    }

    /// Inline nested DAG members into `dag` until none remain.
    pub fn flatten(&mut self, dag: ActivityId) -> ModelResult<()> {
        loop {
            let nested: Vec<ActivityId> = self
                .members(dag)?
                .into_iter()
                .filter(|&id| self.kind_of(id).is_ok_and(|kind| kind == BlockKind::Dag))
                .collect();
            if nested.is_empty() {
                break;
            }
            for inner in nested {
                self.inline(dag, inner)?;
            }
        }
        self.refresh_support(dag)
    }

    fn inline(&mut self, dag: ActivityId, inner: ActivityId) -> ModelResult<()> {
        let (inner_begin, inner_end) = self.dag_ends(inner)?;
        let entries = self.pre(inner);
        let exits = self.post(inner);
        let firsts = self.post(inner_begin);
        let lasts = self.pre(inner_end);

        for member in self.members(inner)? {
            self.set_parent(member, Some(dag))?;
        }
        for &p in &entries {
            for &first in &firsts {
                if first == inner_end {
                    for &s in &exits {
                        self.insert_edge(p, s);
                    }
                } else {
                    self.insert_edge(p, first);
                }
            }
        }
        for &s in &exits {
            for &last in lasts.iter().filter(|&&last| last != inner_begin) {
                self.insert_edge(last, s);
            }
        }
        self.remove_node(inner_begin);
        self.remove_node(inner_end);
        self.remove_node(inner);
        Ok(())
    }

    /// Well-formedness problems of every DAG at or below `block`.
    pub fn problems(&self, block: ActivityId) -> ModelResult<Vec<String>> {
        let mut found = Vec::new();
        let dags: Vec<ActivityId> = std::iter::once(block)
            .chain(self.descendants(block)?)
            .filter(|&id| self.kind_of(id).is_ok_and(|kind| kind == BlockKind::Dag))
            .collect();
        for current in dags {
            self.dag_problems(current, &mut found)?;
        }
        Ok(found)
    }

    fn dag_problems(&self, dag: ActivityId, found: &mut Vec<String>) -> ModelResult<()> {
        let (begin, end) = self.dag_ends(dag)?;
        let name = self.name(dag)?;
        let firsts = self.post(begin);
        if firsts.is_empty() || firsts.contains(&end) {
            found.push(format!("{name}: empty DAG"));
        }

        let mut reached = HashSet::new();
        for event in self.depth_first(begin, Direction::Forward) {
            match event {
                VisitEvent::Open { node, .. } => {
                    reached.insert(node);
                }
                VisitEvent::Skip {
                    node,
                    from,
                    on_stack: true,
                } => found.push(format!(
                    "{name}: cycle through {} -> {}",
                    self.name(from)?,
                    self.name(node)?
                )),
                _ => {}
            }
        }
        let reaching: HashSet<ActivityId> = self.reachable(end, Direction::Backward).into_iter().collect();
        for member in self.members(dag).unwrap_or_default() {
            let member_name = self.name(member)?;
            if !reached.contains(&member) {
                found.push(format!("{name}: {member_name} is not reachable from the begin"));
            }
            if !reaching.contains(&member) {
                found.push(format!("{name}: {member_name} does not reach the end"));
            }
        }
        Ok(())
    }

    /// Fail with every problem found by [`Self::problems`].
    pub fn validate(&self, block: ActivityId) -> ModelResult<()> {
        let problems = self.problems(block)?;
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Malformed {
                name: self.name(block)?.to_string(),
                problems,
            })
        }
    }
}
