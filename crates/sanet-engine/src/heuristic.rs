//! Heuristic evaluation of activity graphs.
//!
//! The engine walks a block top-down. Leaves are evaluated in closed form,
//! well-nested operators are combined numerically, and everything else is
//! either rewritten into something simpler or handed to the oracle:
//!
//! * a repetition whose body is complex gets its body replaced by a fitted
//!   surrogate,
//! * a DAG first loses its nested repetitions, then its deepest complex
//!   blocks while it stays over threshold,
//! * a DAG whose simplified measures are still high is evaluated through
//!   replication, which nests the prefix of one end predecessor into a
//!   parallel copy.
//!
//! Every step is recorded in the returned [`Evaluation`] trace.

use sanet_core::{
    adaptive_step, combinators, ActivityGraph, ActivityId, ActivityKind, Cdf, Complexity,
    ModelError, Time, TimeGrid,
};
use tracing::{debug, info, warn};

use crate::config::{HeuristicConfig, ReplicationMode, SurrogateStep};
use crate::error::{EngineError, EngineResult};
use crate::oracle::{Approximator, TransientOracle};
use crate::search;
use crate::trace::{Action, Decision, Evaluation};

/// Evaluates completion-time CDFs, decomposing blocks that are too complex
/// for the oracle.
pub struct HeuristicEngine<O, A> {
    config: HeuristicConfig,
    oracle: O,
    approximator: A,
}

impl<O: TransientOracle, A: Approximator> HeuristicEngine<O, A> {
    /// Create an engine; the configuration is validated first.
    pub fn new(config: HeuristicConfig, oracle: O, approximator: A) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            oracle,
            approximator,
        })
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// CDF of `block` on `[0, time_limit]` with spacing `step`.
    pub fn analyze(
        &self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        time_limit: Time,
        step: Time,
    ) -> EngineResult<Cdf> {
        let grid = TimeGrid::new(time_limit, step)?;
        Ok(self.evaluate(graph, block, &grid)?.cdf)
    }

    /// CDF of `block` on `grid`, with the trace of decisions taken.
    ///
    /// Every DAG at or below `block` is validated first; a malformed one is
    /// reported as [`ModelError::Malformed`] before anything is analyzed.
    /// Surrogate replacements are applied to `graph` in place and stay there
    /// once the evaluation returns.
    pub fn evaluate(
        &self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
    ) -> EngineResult<Evaluation> {
        if let Err(err) = graph.validate(block) {
            warn!(block = %graph.name(block)?, error = %err, "evaluation_rejected");
            return Err(err.into());
        }
        info!(
            block = %graph.name(block)?,
            points = grid.len(),
            c_threshold = %self.config.c_threshold,
            r_threshold = %self.config.r_threshold,
            "evaluation_start"
        );
        let mut session = Session {
            engine: self,
            trace: Vec::new(),
            rewrites: 0,
        };
        let cdf = session.analyze(graph, block, grid, 0)?;
        let evaluation = Evaluation {
            cdf,
            trace: session.trace,
        };
        info!(
            block = %graph.name(block)?,
            surrogates = evaluation.surrogates(),
            replications = evaluation.replications(),
            oracle_calls = evaluation.oracle_calls(),
            max_fit_error = evaluation.max_fit_error(),
            "evaluation_complete"
        );
        Ok(evaluation)
    }
}

/// State of one `evaluate` call.
struct Session<'e, O, A> {
    engine: &'e HeuristicEngine<O, A>,
    trace: Vec<Decision>,
    rewrites: usize,
}

impl<O: TransientOracle, A: Approximator> Session<'_, O, A> {
    fn config(&self) -> &HeuristicConfig {
        &self.engine.config
    }

    fn budget_left(&self) -> bool {
        self.rewrites < self.config().max_replacements
    }

    fn analyze(
        &mut self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<Cdf> {
        let kind = graph.get(block)?.kind().clone();
        match kind {
            ActivityKind::Simple { .. } => {
                self.record(graph, block, depth, None, Action::ClosedForm)?;
                Ok(graph.closed_form_cdf(block, grid)?)
            }
            ActivityKind::Xor {
                alternatives,
                probs,
            } => {
                self.record(graph, block, depth, None, Action::Mixture)?;
                let mut branches = Vec::with_capacity(alternatives.len());
                for (alternative, probability) in alternatives.into_iter().zip(probs) {
                    branches.push((probability, self.analyze(graph, alternative, grid, depth + 1)?));
                }
                Ok(combinators::mixture(&branches)?)
            }
            ActivityKind::And { children } => {
                self.record(graph, block, depth, None, Action::Product)?;
                let cdfs = self.analyze_all(graph, &children, grid, depth + 1)?;
                Ok(combinators::product(&cdfs)?)
            }
            ActivityKind::Sequence { children } => {
                self.record(graph, block, depth, None, Action::Convolution)?;
                let cdfs = self.analyze_all(graph, &children, grid, depth + 1)?;
                Ok(combinators::convolve_all(&cdfs)?)
            }
            ActivityKind::Repeat { body, .. } => self.analyze_repeat(graph, block, body, grid, depth),
            ActivityKind::Dag { .. } => self.analyze_dag(graph, block, grid, depth),
        }
    }

    fn analyze_all(
        &mut self,
        graph: &mut ActivityGraph,
        blocks: &[ActivityId],
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<Vec<Cdf>> {
        blocks
            .iter()
            .map(|&id| self.analyze(graph, id, grid, depth))
            .collect()
    }

    fn analyze_repeat(
        &mut self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        body: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<Cdf> {
        let measures = Measures::of(graph, block)?;
        if measures.decomposition_helps() && self.config().exceeds_thresholds(&measures.full) {
            if !self.budget_left() {
                return self.fallback(graph, block, grid, depth, measures, "replacement budget exhausted");
            }
            self.substitute(graph, body, grid, depth + 1)?;
            return self.analyze(graph, block, grid, depth);
        }
        self.call_oracle(graph, block, grid, depth, Some(measures), Action::Oracle)
    }

    fn analyze_dag(
        &mut self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<Cdf> {
        self.remove_repetitions(graph, block, grid, depth)?;
        loop {
            let measures = Measures::of(graph, block)?;
            if measures.decomposition_helps() && self.config().exceeds_thresholds(&measures.full) {
                if !self.budget_left() {
                    return self.fallback(graph, block, grid, depth, measures, "replacement budget exhausted");
                }
                match search::deepest_complex_block(graph, block, self.config())? {
                    Some(target) => {
                        self.substitute(graph, target, grid, depth + 1)?;
                        continue;
                    }
                    None => {
                        return self.fallback(graph, block, grid, depth, measures, "no inner block to simplify")
                    }
                }
            }
            if self.config().calls_for_replication(&measures.simplified) {
                return self.replicate(graph, block, grid, depth, measures);
            }
            return self.call_oracle(graph, block, grid, depth, Some(measures), Action::Oracle);
        }
    }

    /// Replace every repetition nested in `dag` with a surrogate.
    fn remove_repetitions(
        &mut self,
        graph: &mut ActivityGraph,
        dag: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<()> {
        while let Some(repetition) = search::outermost_repeat(graph, dag)? {
            if !self.budget_left() {
                warn!(
                    block = %graph.name(dag)?,
                    repetition = %graph.name(repetition)?,
                    "repetition_left_in_place"
                );
                break;
            }
            self.substitute(graph, repetition, grid, depth + 1)?;
        }
        Ok(())
    }

    fn replicate(
        &mut self,
        graph: &mut ActivityGraph,
        dag: ActivityId,
        grid: &TimeGrid,
        depth: usize,
        measures: Measures,
    ) -> EngineResult<Cdf> {
        let (begin, end) = graph.dag_ends(dag)?;
        let exits = graph.pre(end);
        if exits.len() < 2 {
            warn!(block = %graph.name(dag)?, exits = exits.len(), "replication_not_applicable");
            return self.fallback(graph, dag, grid, depth, measures, "single predecessor of the end");
        }
        if !self.budget_left() {
            return self.fallback(graph, dag, grid, depth, measures, "replacement budget exhausted");
        }

        let mut best: Option<(Complexity, ActivityId)> = None;
        for pred in exits {
            let suffix = format!("_ranked_{}", graph.name(pred)?);
            let (prefix, _) = graph.copy_between(dag, begin, pred, &suffix)?;
            let rank = graph.complexity(prefix)?;
            graph.discard(prefix)?;
            debug!(block = %graph.name(dag)?, predecessor = %graph.name(pred)?, rank = %rank, "replication_candidate");
            if best.as_ref().map_or(true, |(current, _)| rank >= *current) {
                best = Some((rank, pred));
            }
        }
        let Some((_, pred)) = best else {
            return self.fallback(graph, dag, grid, depth, measures, "no predecessor to nest");
        };

        let nested = match graph.nest(dag, pred) {
            Ok(nested) => nested,
            Err(ModelError::Malformed { problems, .. }) => {
                warn!(block = %graph.name(dag)?, predecessor = %graph.name(pred)?, ?problems, "replication_malformed");
                return self.fallback(graph, dag, grid, depth, measures, "nested copy is malformed");
            }
            Err(err) => return Err(err.into()),
        };
        self.rewrites += 1;
        let action = Action::Replication {
            predecessor: graph.name(pred)?.to_string(),
            nested: graph.name(nested)?.to_string(),
        };
        self.record(graph, dag, depth, Some(measures), action)?;

        let result = self.analyze_nested(graph, nested, grid, depth + 1);
        graph.discard(nested)?;
        result
    }

    fn analyze_nested(
        &mut self,
        graph: &mut ActivityGraph,
        nested: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<Cdf> {
        if self.config().replication_mode == ReplicationMode::NestAndApproximate {
            for branch in graph.children(nested)? {
                if self.budget_left() {
                    self.substitute(graph, branch, grid, depth + 1)?;
                }
            }
        }
        self.analyze(graph, nested, grid, depth)
    }

    /// Analyze `target` on its own support, fit a surrogate and put it in place.
    fn substitute(
        &mut self,
        graph: &mut ActivityGraph,
        target: ActivityId,
        grid: &TimeGrid,
        depth: usize,
    ) -> EngineResult<()> {
        let (name, lower, upper) = {
            let activity = graph.get(target)?;
            (
                activity.name().to_string(),
                activity.eft().clone(),
                activity.lft().or_limit(grid.time_limit()),
            )
        };
        let step = match self.config().surrogate_step {
            SurrogateStep::Adaptive => adaptive_step(&upper),
            SurrogateStep::Grid => grid.step().clone(),
        };
        let local = TimeGrid::new(upper.clone(), step)?;
        debug!(block = %name, upper = %upper, step = %local.step(), "surrogate_fit_start");

        let samples = self.analyze(graph, target, &local, depth)?;
        let features = self
            .engine
            .approximator
            .fit(&samples, &lower, &upper, local.step())
            .map_err(|source| EngineError::oracle(&name, source))?;
        let surrogate_name = graph.fresh_name(&format!("{name}_N"));
        let surrogate = graph.mixture(surrogate_name.clone(), features)?;
        let fit_error = graph.closed_form_cdf(surrogate, &local)?.max_abs_diff(&samples)?;
        if fit_error > self.config().error {
            debug!(block = %name, fit_error, budget = self.config().error, "surrogate_fit_loose");
        }

        let measures = Measures::of(graph, target)?;
        let action = Action::Surrogate {
            target: name,
            surrogate: surrogate_name,
            fit_error,
        };
        self.record(graph, target, depth, Some(measures), action)?;
        graph.replace(target, surrogate)?;
        graph.reset_complexity_measures();
        self.rewrites += 1;
        Ok(())
    }

    fn fallback(
        &mut self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        depth: usize,
        measures: Measures,
        reason: &str,
    ) -> EngineResult<Cdf> {
        warn!(block = %graph.name(block)?, reason, "oracle_fallback");
        let action = Action::Fallback {
            reason: reason.to_string(),
        };
        self.call_oracle(graph, block, grid, depth, Some(measures), action)
    }

    fn call_oracle(
        &mut self,
        graph: &mut ActivityGraph,
        block: ActivityId,
        grid: &TimeGrid,
        depth: usize,
        measures: Option<Measures>,
        action: Action,
    ) -> EngineResult<Cdf> {
        self.record(graph, block, depth, measures, action)?;
        let cdf = self
            .engine
            .oracle
            .analyze_exact(graph, block, grid, self.config().error)
            .map_err(|source| EngineError::oracle(graph.name(block).unwrap_or("?"), source))?;
        if cdf.len() != grid.len() {
            return Err(ModelError::GridMismatch {
                expected: grid.len(),
                found: cdf.len(),
            }
            .into());
        }
        Ok(cdf)
    }

    fn record(
        &mut self,
        graph: &ActivityGraph,
        block: ActivityId,
        depth: usize,
        measures: Option<Measures>,
        action: Action,
    ) -> EngineResult<()> {
        let activity = graph.get(block)?;
        let (complexity, simplified) = match measures {
            Some(m) => (Some(m.full), Some(m.simplified)),
            None => (None, None),
        };
        let decision = Decision {
            depth,
            block: activity.name().to_string(),
            kind: activity.block_kind(),
            complexity,
            simplified,
            action,
        };
        if self.config().verbose {
            info!(depth, block = %decision.block, kind = decision.kind.label(), action = ?decision.action, "block_decision");
        } else {
            debug!(depth, block = %decision.block, kind = decision.kind.label(), action = ?decision.action, "block_decision");
        }
        self.trace.push(decision);
        Ok(())
    }
}

/// Full and simplified measures of one block.
#[derive(Debug, Clone)]
struct Measures {
    full: Complexity,
    simplified: Complexity,
}

impl Measures {
    fn of(graph: &ActivityGraph, id: ActivityId) -> EngineResult<Self> {
        Ok(Self {
            full: graph.complexity(id)?,
            simplified: graph.simplified_complexity(id)?,
        })
    }

    /// Whether replacing inner blocks can lower the measures.
    fn decomposition_helps(&self) -> bool {
        self.full != self.simplified
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::{OracleError, OracleResult};
    use sanet_core::{time_from_int, TimingFeature, WeightedFeature};

    /// Oracle returning a step at the grid end and remembering what it saw.
    #[derive(Default)]
    struct RecordingOracle {
        calls: RefCell<Vec<String>>,
    }

    impl TransientOracle for RecordingOracle {
        fn analyze_exact(
            &self,
            graph: &ActivityGraph,
            block: ActivityId,
            grid: &TimeGrid,
            _error: f64,
        ) -> OracleResult<Cdf> {
            self.calls.borrow_mut().push(graph.name(block)?.to_string());
            let mut values = vec![0.0; grid.len()];
            if let Some(last) = values.last_mut() {
                *last = 1.0;
            }
            Ok(Cdf::new(grid.step_f64(), values))
        }
    }

    struct FailingOracle;

    impl TransientOracle for FailingOracle {
        fn analyze_exact(&self, _: &ActivityGraph, _: ActivityId, _: &TimeGrid, _: f64) -> OracleResult<Cdf> {
            Err(OracleError::NonConvergence {
                message: "stub".to_string(),
            })
        }
    }

    /// Fits a single uniform over the whole support.
    struct UniformFit;

    impl Approximator for UniformFit {
        fn fit(&self, _: &Cdf, lower: &Time, upper: &Time, _: &Time) -> OracleResult<Vec<WeightedFeature>> {
            let feature = TimingFeature::uniform(lower.clone(), upper.clone())?;
            Ok(vec![WeightedFeature::new(1.0, feature)])
        }
    }

    fn uniform(graph: &mut ActivityGraph, name: &str, eft: i64, lft: i64) -> ActivityId {
        let feature = TimingFeature::uniform(time_from_int(eft), time_from_int(lft)).unwrap();
        graph.simple(name, feature).unwrap()
    }

    fn grid(limit: i64) -> TimeGrid {
        TimeGrid::new(time_from_int(limit), time_from_int(1) / time_from_int(10)).unwrap()
    }

    /// DAG with n parallel uniform activities between begin and end.
    fn parallel_dag(graph: &mut ActivityGraph, name: &str, n: usize) -> ActivityId {
        let dag = graph.dag(name).unwrap();
        let (begin, end) = graph.dag_ends(dag).unwrap();
        let members: Vec<ActivityId> = (0..n)
            .map(|i| uniform(graph, &format!("{name}{i}"), 0, 1))
            .collect();
        for &m in &members {
            graph.add_precondition(m, &[begin]).unwrap();
        }
        graph.add_precondition(end, &members).unwrap();
        dag
    }

    #[test]
    fn test_well_nested_block_needs_no_oracle() {
        let mut graph = ActivityGraph::new();
        let a = uniform(&mut graph, "A", 0, 1);
        let b = uniform(&mut graph, "B", 0, 1);
        let c = uniform(&mut graph, "C", 1, 2);
        let and = graph.fork_join("AND", &[a, b]).unwrap();
        let seq = graph.sequence("SEQ", &[and, c]).unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, seq, &grid(4)).unwrap();

        assert!(engine.oracle().calls.borrow().is_empty());
        assert_eq!(evaluation.oracle_calls(), 0);
        assert_eq!(evaluation.trace[0].action, Action::Convolution);
        assert_eq!(evaluation.trace[1].action, Action::Product);
        assert!(evaluation.cdf.is_monotone(1e-12));
        assert!((evaluation.cdf.last() - 1.0).abs() < 1e-9);
        assert_eq!(evaluation.cdf.at(0), Some(0.0));
    }

    #[test]
    fn test_xor_mixture() {
        let mut graph = ActivityGraph::new();
        let fast = graph
            .simple("FAST", TimingFeature::deterministic(time_from_int(1)).unwrap())
            .unwrap();
        let slow = graph
            .simple("SLOW", TimingFeature::deterministic(time_from_int(3)).unwrap())
            .unwrap();
        let xor = graph.xor("X", &[fast, slow], &[0.25, 0.75]).unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let cdf = engine.analyze(&mut graph, xor, time_from_int(4), time_from_int(1)).unwrap();
        assert_eq!(cdf.values(), &[0.0, 0.25, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_small_dag_goes_to_oracle() {
        let mut graph = ActivityGraph::new();
        let dag = parallel_dag(&mut graph, "P", 2);

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(2)).unwrap();

        assert_eq!(*engine.oracle().calls.borrow(), vec!["P".to_string()]);
        assert_eq!(evaluation.trace.len(), 1);
        assert_eq!(evaluation.trace[0].action, Action::Oracle);
        assert_eq!(evaluation.trace[0].complexity, Some(Complexity::new(2u32, 2u32)));
    }

    /// Repetition with p = 0.5 around AND(B0, B1, B2): C = 3 and R = 6.
    fn looped_fork(graph: &mut ActivityGraph) -> ActivityId {
        let branches: Vec<ActivityId> = (0..3)
            .map(|i| uniform(graph, &format!("B{i}"), 0, 1))
            .collect();
        let body = graph.fork_join("B", &branches).unwrap();
        graph.repeat("LOOP", 0.5, body).unwrap()
    }

    #[test]
    fn test_complex_repeat_body_is_replaced() {
        let mut graph = ActivityGraph::new();
        let repeat = looped_fork(&mut graph);
        assert_eq!(graph.complexity(repeat).unwrap(), Complexity::new(3u32, 6u32));

        let config = HeuristicConfig::with_thresholds(2, 2);
        let engine = HeuristicEngine::new(config, RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, repeat, &grid(5)).unwrap();

        assert_eq!(evaluation.surrogates(), 1);
        assert!(graph.find("B").is_none());
        let surrogate = graph.find("B_N").unwrap();
        assert_eq!(graph.children(repeat).unwrap(), vec![surrogate]);
        // The fork is combined numerically; only the rewritten loop reaches the oracle.
        assert_eq!(*engine.oracle().calls.borrow(), vec!["LOOP".to_string()]);
        assert_eq!(evaluation.trace.last().map(|d| &d.action), Some(&Action::Oracle));
    }

    #[test]
    fn test_simple_repeat_goes_to_oracle() {
        let mut graph = ActivityGraph::new();
        let body = uniform(&mut graph, "A", 0, 1);
        let repeat = graph.repeat("LOOP", 0.9, body).unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::with_thresholds(1, 1), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, repeat, &grid(3)).unwrap();
        assert_eq!(evaluation.surrogates(), 0);
        assert_eq!(evaluation.oracle_calls(), 1);
    }

    #[test]
    fn test_dag_repetitions_replaced_first() {
        let mut graph = ActivityGraph::new();
        let dag = graph.dag("P").unwrap();
        let (begin, end) = graph.dag_ends(dag).unwrap();
        let a = uniform(&mut graph, "A", 0, 1);
        let body = uniform(&mut graph, "R_BODY", 0, 1);
        let repeat = graph.repeat("R", 0.5, body).unwrap();
        graph.add_precondition(a, &[begin]).unwrap();
        graph.add_precondition(repeat, &[a]).unwrap();
        graph.add_precondition(end, &[repeat]).unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(5)).unwrap();

        assert!(graph.find("R").is_none());
        assert!(graph.find("R_N").is_some());
        assert_eq!(evaluation.surrogates(), 1);
        let calls = engine.oracle().calls.borrow();
        assert_eq!(*calls, vec!["R".to_string(), "P".to_string()]);
    }

    #[test]
    fn test_inner_block_replaced_until_under_threshold() {
        let mut graph = ActivityGraph::new();
        let inner = parallel_dag(&mut graph, "I", 4);
        let dag = graph.dag("P").unwrap();
        let (begin, end) = graph.dag_ends(dag).unwrap();
        let a = uniform(&mut graph, "A", 0, 1);
        graph.add_precondition(a, &[begin]).unwrap();
        graph.add_precondition(inner, &[a]).unwrap();
        graph.add_precondition(end, &[inner]).unwrap();
        assert_eq!(graph.complexity(dag).unwrap(), Complexity::new(4u32, 4u32));

        let engine = HeuristicEngine::new(HeuristicConfig::with_thresholds(3, 3), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(3)).unwrap();

        assert_eq!(evaluation.surrogates(), 1);
        let surrogate = graph.find("I_N").unwrap();
        assert_eq!(graph.members(dag).unwrap(), vec![a, surrogate]);
        assert_eq!(graph.complexity(dag).unwrap(), Complexity::unit());
        assert_eq!(engine.oracle().calls.borrow().last().map(String::as_str), Some("P"));
    }

    #[test]
    fn test_replication_nests_and_cleans_up() {
        let mut graph = ActivityGraph::new();
        let dag = parallel_dag(&mut graph, "P", 3);
        let before = graph.len();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(2)).unwrap();

        assert_eq!(evaluation.replications(), 1);
        assert_eq!(evaluation.trace[0].block, "P");
        match &evaluation.trace[0].action {
            Action::Replication { predecessor, nested } => {
                assert_eq!(predecessor, "P2");
                assert_eq!(nested, "P_nested");
            }
            other => panic!("unexpected action {other:?}"),
        }
        // Detached copies are gone and the original DAG is untouched.
        assert_eq!(graph.len(), before);
        assert_eq!(graph.members(dag).unwrap().len(), 3);
        assert!(graph.find("P_nested").is_none());
        assert!((evaluation.cdf.last() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nest_and_approximate_fits_both_branches() {
        let mut graph = ActivityGraph::new();
        let dag = parallel_dag(&mut graph, "P", 3);

        let config = HeuristicConfig {
            replication_mode: ReplicationMode::NestAndApproximate,
            ..HeuristicConfig::default()
        };
        let engine = HeuristicEngine::new(config, RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(2)).unwrap();

        assert_eq!(evaluation.replications(), 1);
        assert_eq!(evaluation.surrogates(), 2);
        assert!(evaluation
            .trace
            .iter()
            .any(|d| d.action == Action::Product));
    }

    #[test]
    fn test_budget_exhaustion_falls_back() {
        let mut graph = ActivityGraph::new();
        let dag = parallel_dag(&mut graph, "P", 4);

        let config = HeuristicConfig {
            max_replacements: 1,
            ..HeuristicConfig::default()
        };
        let engine = HeuristicEngine::new(config, RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, dag, &grid(2)).unwrap();

        // The single rewrite goes to replication; the three-way remainder falls back.
        assert_eq!(evaluation.replications(), 1);
        assert!(evaluation
            .trace
            .iter()
            .any(|d| matches!(d.action, Action::Fallback { .. })));
    }

    #[test]
    fn test_oracle_error_names_block() {
        let mut graph = ActivityGraph::new();
        let dag = parallel_dag(&mut graph, "P", 2);
        let engine = HeuristicEngine::new(HeuristicConfig::default(), FailingOracle, UniformFit).unwrap();
        let err = engine.evaluate(&mut graph, dag, &grid(2)).unwrap_err();
        match err {
            EngineError::Oracle { block, .. } => assert_eq!(block, "P"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HeuristicConfig {
            error: -1.0,
            ..HeuristicConfig::default()
        };
        assert!(HeuristicEngine::new(config, RecordingOracle::default(), UniformFit).is_err());
    }

    #[test]
    fn test_surrogate_fit_error_recorded() {
        let mut graph = ActivityGraph::new();
        let repeat = looped_fork(&mut graph);

        let engine = HeuristicEngine::new(HeuristicConfig::with_thresholds(2, 2), RecordingOracle::default(), UniformFit).unwrap();
        let evaluation = engine.evaluate(&mut graph, repeat, &grid(5)).unwrap();

        // max |t - t^3| on [0, 1] is about 0.385.
        let error = evaluation.max_fit_error();
        assert!((error - 0.385).abs() < 0.01, "fit error {error}");
        let surrogate = graph.find("B_N").unwrap();
        let features = graph.get(surrogate).unwrap().features().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].feature.label(), "uniform");
    }

    #[test]
    fn test_empty_dag_is_rejected() {
        let mut graph = ActivityGraph::new();
        let dag = graph.dag("EMPTY").unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let err = engine
            .analyze(&mut graph, dag, time_from_int(2), time_from_int(1))
            .unwrap_err();

        match err {
            EngineError::Model(ModelError::Malformed { name, problems }) => {
                assert_eq!(name, "EMPTY");
                assert_eq!(problems, vec!["EMPTY: empty DAG".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(engine.oracle().calls.borrow().is_empty());
    }

    #[test]
    fn test_member_missing_the_end_is_rejected() {
        let mut graph = ActivityGraph::new();
        let dag = graph.dag("P").unwrap();
        let (begin, end) = graph.dag_ends(dag).unwrap();
        let a = uniform(&mut graph, "A", 0, 1);
        let b = uniform(&mut graph, "B", 0, 1);
        graph.add_precondition(a, &[begin]).unwrap();
        graph.add_precondition(b, &[begin]).unwrap();
        graph.add_precondition(end, &[a]).unwrap();

        let engine = HeuristicEngine::new(HeuristicConfig::default(), RecordingOracle::default(), UniformFit).unwrap();
        let err = engine.evaluate(&mut graph, dag, &grid(2)).unwrap_err();

        match err {
            EngineError::Model(ModelError::Malformed { problems, .. }) => {
                assert!(problems.contains(&"P: B does not reach the end".to_string()));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(engine.oracle().calls.borrow().is_empty());
        // Nothing was rewritten.
        assert_eq!(graph.members(dag).unwrap(), vec![a, b]);
    }
}
