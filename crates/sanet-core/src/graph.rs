//! Arena-backed activity graph.
//!
//! All activities live in one [`StableDiGraph`]; structural containment is
//! expressed by parent links and child lists, precedence inside a DAG by the
//! graph's edges. Ids stay valid until the activity is removed.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use num::Zero;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction as EdgeDirection;
use tracing::debug;

use crate::activity::{Activity, ActivityId, ActivityKind, BlockKind};
use crate::complexity::MeasureCache;
use crate::error::{ModelError, ModelResult};
use crate::feature::{mixture_cdf, mixture_support, validate_mixture, TimingFeature, WeightedFeature};
use crate::grid::{Cdf, TimeGrid};
use crate::time::{Time, TimeBound};

/// Container for every activity of a model.
#[derive(Debug, Clone, Default)]
pub struct ActivityGraph {
    arena: StableDiGraph<Activity, ()>,
    names: HashMap<String, ActivityId>,
    revision: u64,
    pub(crate) measures: RefCell<MeasureCache>,
}

impl ActivityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter bumped by every structural mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.arena.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.node_count() == 0
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.arena.contains_node(id.0)
    }

    pub fn get(&self, id: ActivityId) -> ModelResult<&Activity> {
        self.arena
            .node_weight(id.0)
            .ok_or(ModelError::UnknownActivity { id })
    }

    pub fn name(&self, id: ActivityId) -> ModelResult<&str> {
        Ok(self.get(id)?.name())
    }

    pub fn kind_of(&self, id: ActivityId) -> ModelResult<BlockKind> {
        Ok(self.get(id)?.block_kind())
    }

    /// Look up an activity by its unique name.
    pub fn find(&self, name: &str) -> Option<ActivityId> {
        self.names.get(name).copied()
    }

    /// `base`, or `base_2`, `base_3`, ... if that name is taken.
    pub fn fresh_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Activities without a parent.
    pub fn roots(&self) -> Vec<ActivityId> {
        let mut roots: Vec<ActivityId> = self
            .arena
            .node_indices()
            .filter(|&index| self.arena[index].parent.is_none())
            .map(ActivityId)
            .collect();
        roots.sort();
        roots
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn node_mut(&mut self, id: ActivityId) -> ModelResult<&mut Activity> {
        self.arena
            .node_weight_mut(id.0)
            .ok_or(ModelError::UnknownActivity { id })
    }

    fn insert(&mut self, activity: Activity) -> ModelResult<ActivityId> {
        if self.names.contains_key(activity.name()) {
            return Err(ModelError::DuplicateName {
                name: activity.name,
            });
        }
        let name = activity.name.clone();
        let id = ActivityId(self.arena.add_node(activity));
        self.names.insert(name, id);
        self.touch();
        Ok(id)
    }

    fn check_name_free(&self, name: &str) -> ModelResult<()> {
        if self.names.contains_key(name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Children must exist, be distinct, have no parent and no precedence edges.
    fn check_adoptable(&self, children: &[ActivityId]) -> ModelResult<()> {
        let mut seen = HashSet::new();
        for &child in children {
            let activity = self.get(child)?;
            let linked = !self.pre(child).is_empty() || !self.post(child).is_empty();
            if !seen.insert(child) || activity.parent.is_some() || linked {
                return Err(ModelError::AlreadyAttached {
                    name: activity.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn adopt(&mut self, children: &[ActivityId], parent: ActivityId) -> ModelResult<()> {
        for &child in children {
            self.node_mut(child)?.parent = Some(parent);
        }
        Ok(())
    }

    fn composite(
        &mut self,
        name: String,
        children: &[ActivityId],
        kind: ActivityKind,
    ) -> ModelResult<ActivityId> {
        if children.is_empty() {
            return Err(ModelError::EmptyBlock { name });
        }
        self.check_adoptable(children)?;
        let mut activity = Activity::new(name, Time::zero(), TimeBound::zero(), kind);
        let (eft, lft) = self.support_of(&activity.kind)?;
        activity.eft = eft;
        activity.lft = lft;
        let id = self.insert(activity)?;
        self.adopt(children, id)?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    /// Leaf activity with a single timing feature.
    pub fn simple(&mut self, name: impl Into<String>, feature: TimingFeature) -> ModelResult<ActivityId> {
        self.mixture(name, vec![WeightedFeature::new(1.0, feature)])
    }

    /// Leaf activity with a weighted mixture of timing features.
    pub fn mixture(
        &mut self,
        name: impl Into<String>,
        features: Vec<WeightedFeature>,
    ) -> ModelResult<ActivityId> {
        let name = name.into();
        validate_mixture(&name, &features)?;
        let (eft, lft) = mixture_support(&features);
        self.insert(Activity::new(name, eft, lft, ActivityKind::Simple { features }))
    }

    /// Children executed one after another.
    pub fn sequence(&mut self, name: impl Into<String>, children: &[ActivityId]) -> ModelResult<ActivityId> {
        let kind = ActivityKind::Sequence {
            children: children.to_vec(),
        };
        self.composite(name.into(), children, kind)
    }

    /// Children executed in parallel, joined when all complete.
    pub fn fork_join(&mut self, name: impl Into<String>, children: &[ActivityId]) -> ModelResult<ActivityId> {
        let kind = ActivityKind::And {
            children: children.to_vec(),
        };
        self.composite(name.into(), children, kind)
    }

    /// Exclusive choice between alternatives with the given probabilities.
    pub fn xor(
        &mut self,
        name: impl Into<String>,
        alternatives: &[ActivityId],
        probs: &[f64],
    ) -> ModelResult<ActivityId> {
        let name = name.into();
        if alternatives.len() != probs.len() {
            return Err(ModelError::ProbabilityMismatch {
                name,
                alternatives: alternatives.len(),
                probabilities: probs.len(),
            });
        }
        if let Some(&value) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ModelError::InvalidProbability { name, value });
        }
        let kind = ActivityKind::Xor {
            alternatives: alternatives.to_vec(),
            probs: probs.to_vec(),
        };
        self.composite(name, alternatives, kind)
    }

    /// Body repeated while a coin with `probability` of continuing says so.
    pub fn repeat(
        &mut self,
        name: impl Into<String>,
        probability: f64,
        body: ActivityId,
    ) -> ModelResult<ActivityId> {
        let name = name.into();
        if !(0.0..1.0).contains(&probability) {
            return Err(ModelError::InvalidProbability {
                name,
                value: probability,
            });
        }
        let kind = ActivityKind::Repeat { body, probability };
        self.composite(name, &[body], kind)
    }

    /// Empty DAG with fresh begin and end activities; populate with [`Self::add_precondition`].
    pub fn dag(&mut self, name: impl Into<String>) -> ModelResult<ActivityId> {
        let name = name.into();
        let begin_name = format!("{name}_BEGIN");
        let end_name = format!("{name}_END");
        self.check_name_free(&name)?;
        self.check_name_free(&begin_name)?;
        self.check_name_free(&end_name)?;

        let begin = self.simple(begin_name, TimingFeature::Deterministic(Time::zero()))?;
        let end = self.simple(end_name, TimingFeature::Deterministic(Time::zero()))?;
        let kind = ActivityKind::Dag { begin, end };
        let id = self.insert(Activity::new(name, Time::zero(), TimeBound::zero(), kind))?;
        self.adopt(&[begin, end], id)?;
        Ok(id)
    }

    /// Add precedence edges `pre -> target` inside a DAG.
    ///
    /// Detached activities join the DAG that the other endpoint belongs to.
    pub fn add_precondition(&mut self, target: ActivityId, pre: &[ActivityId]) -> ModelResult<()> {
        let scope = self.link_scope(target, pre)?;
        let (begin, end) = self.dag_ends(scope)?;
        if target == begin || pre.contains(&end) {
            return Err(ModelError::InvalidEdit {
                name: self.name(scope)?.to_string(),
                message: "edges cannot enter the begin or leave the end".to_string(),
            });
        }
        for &p in pre {
            if self.arena.find_edge(p.0, target.0).is_some() {
                continue;
            }
            if p == target || has_path_connecting(&self.arena, target.0, p.0, None) {
                return Err(ModelError::Cycle {
                    from: self.name(p)?.to_string(),
                    to: self.name(target)?.to_string(),
                });
            }
            self.arena.add_edge(p.0, target.0, ());
        }
        for id in std::iter::once(target).chain(pre.iter().copied()) {
            let node = self.node_mut(id)?;
            if node.parent.is_none() {
                node.parent = Some(scope);
            }
        }
        self.touch();
        self.refresh_support(scope)
    }

    /// DAG that every endpoint of a new edge belongs to or will join.
    fn link_scope(&self, target: ActivityId, pre: &[ActivityId]) -> ModelResult<ActivityId> {
        let mut scope: Option<ActivityId> = None;
        for id in std::iter::once(target).chain(pre.iter().copied()) {
            let activity = self.get(id)?;
            let Some(parent) = activity.parent else {
                continue;
            };
            if self.kind_of(parent)? != BlockKind::Dag {
                return Err(ModelError::AlreadyAttached {
                    name: activity.name.clone(),
                });
            }
            match scope {
                Some(existing) if existing != parent => {
                    return Err(ModelError::InvalidEdit {
                        name: activity.name.clone(),
                        message: "precedence edges cannot cross DAG boundaries".to_string(),
                    })
                }
                _ => scope = Some(parent),
            }
        }
        match scope {
            Some(scope) => Ok(scope),
            None => Err(ModelError::InvalidEdit {
                name: self.name(target)?.to_string(),
                message: "neither endpoint belongs to a DAG".to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Structural queries
    // ------------------------------------------------------------------

    fn neighbors(&self, id: ActivityId, direction: EdgeDirection) -> Vec<ActivityId> {
        if !self.arena.contains_node(id.0) {
            return Vec::new();
        }
        let mut neighbors: Vec<ActivityId> = self
            .arena
            .neighbors_directed(id.0, direction)
            .map(ActivityId)
            .collect();
        neighbors.reverse();
        neighbors
    }

    /// Direct predecessors in insertion order.
    pub fn pre(&self, id: ActivityId) -> Vec<ActivityId> {
        self.neighbors(id, EdgeDirection::Incoming)
    }

    /// Direct successors in insertion order.
    pub fn post(&self, id: ActivityId) -> Vec<ActivityId> {
        self.neighbors(id, EdgeDirection::Outgoing)
    }

    pub fn has_edge(&self, from: ActivityId, to: ActivityId) -> bool {
        self.arena.find_edge(from.0, to.0).is_some()
    }

    pub(crate) fn remove_edge(&mut self, from: ActivityId, to: ActivityId) {
        if let Some(edge) = self.arena.find_edge(from.0, to.0) {
            self.arena.remove_edge(edge);
            self.touch();
        }
    }

    pub(crate) fn insert_edge(&mut self, from: ActivityId, to: ActivityId) {
        if self.arena.find_edge(from.0, to.0).is_none() {
            self.arena.add_edge(from.0, to.0, ());
            self.touch();
        }
    }

    /// Begin and end of a DAG block.
    pub fn dag_ends(&self, dag: ActivityId) -> ModelResult<(ActivityId, ActivityId)> {
        match self.get(dag)?.kind {
            ActivityKind::Dag { begin, end } => Ok((begin, end)),
            ref other => Err(ModelError::UnexpectedKind {
                name: self.name(dag)?.to_string(),
                expected: BlockKind::Dag.label(),
                found: other.block_kind().label(),
            }),
        }
    }

    /// Whether `id` is the begin or end of its parent DAG.
    pub fn is_fictitious(&self, id: ActivityId) -> bool {
        let Some(parent) = self.get(id).ok().and_then(|a| a.parent) else {
            return false;
        };
        matches!(self.dag_ends(parent), Ok((begin, end)) if begin == id || end == id)
    }

    /// Begin, members and end of a DAG in a deterministic topological order.
    pub fn topological_order(&self, dag: ActivityId) -> ModelResult<Vec<ActivityId>> {
        let (begin, end) = self.dag_ends(dag)?;
        let scope: Vec<ActivityId> = std::iter::once(begin)
            .chain(self.scoped(dag, begin, end))
            .chain(std::iter::once(end))
            .collect();
        let in_scope: HashSet<ActivityId> = scope.iter().copied().collect();

        let mut indegree: HashMap<ActivityId, usize> = scope
            .iter()
            .map(|&id| {
                let count = self.pre(id).iter().filter(|p| in_scope.contains(p)).count();
                (id, count)
            })
            .collect();
        let mut ready: BTreeSet<ActivityId> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(scope.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in self.post(id) {
                if let Some(count) = indegree.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        if order.len() != scope.len() {
            return Err(ModelError::Malformed {
                name: self.name(dag)?.to_string(),
                problems: vec!["precedence edges contain a cycle".to_string()],
            });
        }
        Ok(order)
    }

    fn scoped(&self, dag: ActivityId, begin: ActivityId, end: ActivityId) -> Vec<ActivityId> {
        let mut members: Vec<ActivityId> = self
            .arena
            .node_indices()
            .map(ActivityId)
            .filter(|&id| id != begin && id != end)
            .filter(|&id| self.arena[id.0].parent == Some(dag))
            .collect();
        members.sort();
        members
    }

    /// Activities of a DAG other than its begin and end, in topological order.
    pub fn members(&self, dag: ActivityId) -> ModelResult<Vec<ActivityId>> {
        let (begin, end) = self.dag_ends(dag)?;
        Ok(self
            .topological_order(dag)?
            .into_iter()
            .filter(|&id| id != begin && id != end)
            .collect())
    }

    /// Direct structural children of a block.
    pub fn children(&self, id: ActivityId) -> ModelResult<Vec<ActivityId>> {
        match &self.get(id)?.kind {
            ActivityKind::Simple { .. } => Ok(Vec::new()),
            ActivityKind::Sequence { children } | ActivityKind::And { children } => {
                Ok(children.clone())
            }
            ActivityKind::Xor { alternatives, .. } => Ok(alternatives.clone()),
            ActivityKind::Repeat { body, .. } => Ok(vec![*body]),
            ActivityKind::Dag { .. } => self.members(id),
        }
    }

    /// Every activity structurally contained in `id`, including DAG begin and end nodes.
    pub fn descendants(&self, id: ActivityId) -> ModelResult<Vec<ActivityId>> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let contained = match self.get(current)?.kind {
                ActivityKind::Dag { begin, end } => {
                    let mut inner = vec![begin, end];
                    inner.extend(self.scoped(current, begin, end));
                    inner
                }
                _ => self.children(current)?,
            };
            for child in contained {
                found.push(child);
                stack.push(child);
            }
        }
        Ok(found)
    }

    /// Whether a block is built only from SEQ, AND and XOR over leaves.
    pub fn is_well_nested(&self, id: ActivityId) -> ModelResult<bool> {
        match &self.get(id)?.kind {
            ActivityKind::Simple { .. } => Ok(true),
            ActivityKind::Repeat { .. } | ActivityKind::Dag { .. } => Ok(false),
            _ => {
                for child in self.children(id)? {
                    if !self.is_well_nested(child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Closed-form CDF of a leaf activity.
    pub fn closed_form_cdf(&self, id: ActivityId, grid: &TimeGrid) -> ModelResult<Cdf> {
        let activity = self.get(id)?;
        match activity.features() {
            Some(features) => Ok(mixture_cdf(features, grid)),
            None => Err(ModelError::UnexpectedKind {
                name: activity.name.clone(),
                expected: BlockKind::Simple.label(),
                found: activity.block_kind().label(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Support bounds
    // ------------------------------------------------------------------

    /// Earliest and latest completion of every node of a DAG, measured from its begin.
    pub fn completion_bounds(&self, dag: ActivityId) -> ModelResult<HashMap<ActivityId, (Time, TimeBound)>> {
        let mut bounds: HashMap<ActivityId, (Time, TimeBound)> = HashMap::new();
        for id in self.topological_order(dag)? {
            let mut start_low = Time::zero();
            let mut start_high = TimeBound::zero();
            for p in self.pre(id) {
                if let Some((low, high)) = bounds.get(&p) {
                    if *low > start_low {
                        start_low = low.clone();
                    }
                    if *high > start_high {
                        start_high = high.clone();
                    }
                }
            }
            let activity = self.get(id)?;
            bounds.insert(
                id,
                (start_low + activity.eft(), start_high.add(activity.lft())),
            );
        }
        Ok(bounds)
    }

    /// Earliest completion time of `id` inside `dag`.
    pub fn support_lower_bound(&self, dag: ActivityId, id: ActivityId) -> ModelResult<Time> {
        self.completion_bounds(dag)?
            .remove(&id)
            .map(|(low, _)| low)
            .ok_or(ModelError::UnknownActivity { id })
    }

    /// Latest completion time of `id` inside `dag`.
    pub fn support_upper_bound(&self, dag: ActivityId, id: ActivityId) -> ModelResult<TimeBound> {
        self.completion_bounds(dag)?
            .remove(&id)
            .map(|(_, high)| high)
            .ok_or(ModelError::UnknownActivity { id })
    }

    fn support_of(&self, kind: &ActivityKind) -> ModelResult<(Time, TimeBound)> {
        let bounds = |ids: &[ActivityId]| -> ModelResult<Vec<(Time, TimeBound)>> {
            ids.iter()
                .map(|&id| self.get(id).map(|a| (a.eft.clone(), a.lft.clone())))
                .collect()
        };
        Ok(match kind {
            ActivityKind::Simple { features } => mixture_support(features),
            ActivityKind::Sequence { children } => bounds(children)?
                .into_iter()
                .fold((Time::zero(), TimeBound::zero()), |(eft, lft), (e, l)| {
                    (eft + e, lft.add(&l))
                }),
            ActivityKind::And { children } => bounds(children)?
                .into_iter()
                .fold((Time::zero(), TimeBound::zero()), |(eft, lft), (e, l)| {
                    (eft.max(e), lft.max(l))
                }),
            ActivityKind::Xor { alternatives, .. } => {
                let all = bounds(alternatives)?;
                let eft = all.iter().map(|(e, _)| e.clone()).min().unwrap_or_else(Time::zero);
                let lft = all.into_iter().map(|(_, l)| l).max().unwrap_or_else(TimeBound::zero);
                (eft, lft)
            }
            ActivityKind::Repeat { body, probability } => {
                let body = self.get(*body)?;
                let lft = if *probability > 0.0 {
                    TimeBound::Infinite
                } else {
                    body.lft.clone()
                };
                (body.eft.clone(), lft)
            }
            ActivityKind::Dag { end, .. } => {
                let Some(dag) = self.get(*end)?.parent else {
                    return Ok((Time::zero(), TimeBound::zero()));
                };
                self.completion_bounds(dag)?
                    .remove(end)
                    .unwrap_or((Time::zero(), TimeBound::zero()))
            }
        })
    }

    /// Recompute the support of a composite and of every enclosing block.
    ///
    /// Leaves keep their declared bounds.
    pub(crate) fn refresh_support(&mut self, id: ActivityId) -> ModelResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let activity = self.get(id)?;
            if !activity.is_simple() {
                let (eft, lft) = self.support_of(&activity.kind)?;
                let node = self.node_mut(id)?;
                node.eft = eft;
                node.lft = lft;
            }
            current = self.get(id)?.parent;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Replacement
    // ------------------------------------------------------------------

    /// Put the detached `surrogate` where `old` is and drop `old` with its subtree.
    ///
    /// The surrogate inherits the precedence edges, the parent slot and the
    /// declared time bounds of `old`.
    pub fn replace(&mut self, old: ActivityId, surrogate: ActivityId) -> ModelResult<()> {
        let replaced_name = self.name(old)?.to_string();
        if old == surrogate || self.is_fictitious(old) {
            return Err(ModelError::InvalidEdit {
                name: replaced_name,
                message: "cannot replace this activity".to_string(),
            });
        }
        self.check_adoptable(&[surrogate])?;
        if self.descendants(old)?.contains(&surrogate) {
            return Err(ModelError::AlreadyAttached {
                name: self.name(surrogate)?.to_string(),
            });
        }

        let (parent, eft, lft) = {
            let activity = self.get(old)?;
            (activity.parent, activity.eft.clone(), activity.lft.clone())
        };
        for p in self.pre(old) {
            self.arena.add_edge(p.0, surrogate.0, ());
        }
        for s in self.post(old) {
            self.arena.add_edge(surrogate.0, s.0, ());
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.kind.substitute_child(old, surrogate);
        }
        {
            let node = self.node_mut(surrogate)?;
            node.parent = parent;
            node.eft = eft;
            node.lft = lft;
        }
        self.remove_subtree(old)?;
        debug!(
            replaced = %replaced_name,
            surrogate = %self.name(surrogate)?,
            "activity_replaced"
        );
        Ok(())
    }

    /// Remove a detached block and everything it contains.
    pub fn discard(&mut self, id: ActivityId) -> ModelResult<()> {
        let activity = self.get(id)?;
        if activity.parent.is_some() {
            return Err(ModelError::AlreadyAttached {
                name: activity.name.clone(),
            });
        }
        self.remove_subtree(id)
    }

    pub(crate) fn remove_subtree(&mut self, id: ActivityId) -> ModelResult<()> {
        let mut doomed = self.descendants(id)?;
        doomed.push(id);
        for victim in doomed {
            if let Some(activity) = self.arena.remove_node(victim.0) {
                self.names.remove(&activity.name);
            }
        }
        self.touch();
        Ok(())
    }

    /// Remove a single node, keeping whatever it contains.
    pub(crate) fn remove_node(&mut self, id: ActivityId) {
        if let Some(activity) = self.arena.remove_node(id.0) {
            self.names.remove(&activity.name);
            self.touch();
        }
    }

    pub(crate) fn set_parent(&mut self, id: ActivityId, parent: Option<ActivityId>) -> ModelResult<()> {
        self.node_mut(id)?.parent = parent;
        self.touch();
        Ok(())
    }

    pub(crate) fn set_bounds(&mut self, id: ActivityId, eft: Time, lft: TimeBound) -> ModelResult<()> {
        let node = self.node_mut(id)?;
        node.eft = eft;
        node.lft = lft;
        self.touch();
        Ok(())
    }
}
