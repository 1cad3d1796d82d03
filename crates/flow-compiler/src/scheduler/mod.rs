//! Lowering validated workflows into execution plans
//!
//! The scheduler repeatedly takes every instance whose step
//! predecessors and data producers have already been placed and emits
//! them as one batch. A batch of one is a plain step, a larger batch a
//! parallel block. On top of that loop:
//!
//! - An instance whose `onSuccess` and `onFailure` outputs lead to
//!   different instances becomes a branch; values leaving an arm are
//!   hoisted into merge bindings declared before the branch.
//! - Expression instances are never scheduled. They are inlined right
//!   before the first batch that reads them, after the expressions they
//!   read.
//! - An instance that owns scopes becomes a repeat whose bodies are
//!   lowered the same way, one region at a time.
//!
//! Scheduling assumes validation passed. When it still cannot make
//! progress it fails with [`SchedulerError::Stuck`] instead of emitting a
//! partial plan.
//!
//! # Example
//!
//! ```ignore
//! use flow_compiler::scheduler::Scheduler;
//!
//! let plan = Scheduler::new()
//!     .with_predicate("quorum", |q: &ReadinessQuery<'_>| q.resolved.len() >= 2)
//!     .schedule(&workflow)?;
//! ```

mod analysis;
mod bindings;
mod branch;
mod lower;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use flow_model::{ExecuteWhen, GraphIndex, NodeType, Workflow};

use crate::config::CompilerConfig;
use crate::constants::defaults;
use crate::error::SchedulerError;
use crate::plan::ExecutionPlan;

use analysis::Analysis;
use branch::Unit;
use lower::Lowerer;

/// What a custom readiness predicate sees about one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessQuery<'a> {
    /// Instance being considered
    pub instance: &'a str,
    /// Step predecessors already scheduled
    pub resolved: Vec<&'a str>,
    /// Step predecessors not yet scheduled
    pub pending: Vec<&'a str>,
}

/// Readiness rule for node types declaring [`ExecuteWhen::Custom`]
///
/// A predicate is only consulted once every data producer of the
/// instance has been scheduled.
pub trait ReadinessPredicate: Send + Sync {
    fn is_ready(&self, query: &ReadinessQuery<'_>) -> bool;
}

impl<F> ReadinessPredicate for F
where
    F: Fn(&ReadinessQuery<'_>) -> bool + Send + Sync,
{
    fn is_ready(&self, query: &ReadinessQuery<'_>) -> bool {
        self(query)
    }
}

/// Lowers workflows into execution plans
#[derive(Clone)]
pub struct Scheduler {
    predicates: BTreeMap<String, Arc<dyn ReadinessPredicate>>,
    max_scope_depth: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            predicates: BTreeMap::new(),
            max_scope_depth: defaults::MAX_SCOPE_DEPTH,
        }
    }

    /// Scheduler honouring a compiler configuration
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new().with_max_scope_depth(config.max_scope_depth)
    }

    /// Register a predicate for `ExecuteWhen::Custom(name)`
    pub fn with_predicate(
        mut self,
        name: impl Into<String>,
        predicate: impl ReadinessPredicate + 'static,
    ) -> Self {
        self.predicates.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Limit how deeply scopes may nest
    pub fn with_max_scope_depth(mut self, max_scope_depth: u32) -> Self {
        self.max_scope_depth = max_scope_depth;
        self
    }

    pub fn max_scope_depth(&self) -> u32 {
        self.max_scope_depth
    }

    /// Names of the registered predicates
    pub fn predicate_names(&self) -> Vec<&str> {
        self.predicates.keys().map(String::as_str).collect()
    }

    /// Lower a workflow into an execution plan
    ///
    /// The workflow must have passed validation; the errors returned here
    /// mean it did not, or that the graph defeats the scheduler.
    pub fn schedule(&self, workflow: &Workflow) -> Result<ExecutionPlan, SchedulerError> {
        let index = GraphIndex::new(workflow);
        let analysis = Analysis::new(&index)?;

        let mut lowerer = Lowerer::new(&index, &analysis, self);
        let body = lowerer.lower_workflow()?;
        let merges = lowerer.into_merges();
        let returns = bindings::return_bindings(&index, &merges);

        let plan = ExecutionPlan {
            workflow: workflow.name.clone(),
            body,
            returns,
        };
        log::info!(
            "Scheduled workflow '{}': {} step(s), {} merge binding(s)",
            workflow.name,
            plan.step_count(),
            merges.len()
        );
        Ok(plan)
    }

    /// Whether a unit can run once everything in `resolved` has run
    pub(crate) fn is_ready(
        &self,
        index: &GraphIndex<'_>,
        analysis: &Analysis<'_>,
        unit: &Unit<'_>,
        resolved: &BTreeSet<&str>,
    ) -> Result<bool, SchedulerError> {
        if !unit.hard_deps.iter().all(|dep| resolved.contains(dep)) {
            return Ok(false);
        }

        let preds = analysis.step_preds(unit.head);
        let (done, waiting): (Vec<&str>, Vec<&str>) =
            preds.iter().copied().partition(|p| resolved.contains(p));

        let node_type = require_node_type(index, unit.head)?;
        match &node_type.execute_when {
            ExecuteWhen::Conjunction => Ok(waiting.is_empty()),
            ExecuteWhen::Disjunction => Ok(preds.is_empty() || !done.is_empty()),
            ExecuteWhen::Custom(name) => {
                let predicate =
                    self.predicates
                        .get(name)
                        .ok_or_else(|| SchedulerError::UnknownPredicate {
                            name: name.clone(),
                            instance: unit.head.to_string(),
                        })?;
                Ok(predicate.is_ready(&ReadinessQuery {
                    instance: unit.head,
                    resolved: done,
                    pending: waiting,
                }))
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("predicates", &self.predicate_names())
            .field("max_scope_depth", &self.max_scope_depth)
            .finish()
    }
}

/// Lower a workflow with the default scheduler
pub fn schedule(workflow: &Workflow) -> Result<ExecutionPlan, SchedulerError> {
    Scheduler::new().schedule(workflow)
}

pub(crate) fn require_node_type<'i>(
    index: &'i GraphIndex<'_>,
    id: &str,
) -> Result<&'i NodeType, SchedulerError> {
    match index.instance(id) {
        None => Err(SchedulerError::UnknownInstance(id.to_string())),
        Some(instance) => {
            index
                .node_type_of(id)
                .ok_or_else(|| SchedulerError::UnknownNodeType {
                    instance: id.to_string(),
                    node_type: instance.node_type.clone(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{dry_run, PlanNode, StepNode, ValueSource};
    use flow_model::{DataType, NodeType, Port, WorkflowBuilder};
    use serde_json::Value;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn catalog(name: &str) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
            .node_type(
                NodeType::function("Task")
                    .with_optional_input("in", DataType::String)
                    .with_output("out", DataType::String),
            )
            .node_type(
                NodeType::expression("Upper")
                    .with_input("text", DataType::String)
                    .with_output("upper", DataType::String),
            )
            .node_type(
                NodeType::function("Either")
                    .with_execute_when(ExecuteWhen::Disjunction)
                    .with_output("out", DataType::String),
            )
            .node_type(
                NodeType::function("Quorum")
                    .with_execute_when(ExecuteWhen::Custom("after_b".to_string()))
                    .with_output("out", DataType::String),
            )
            .node_type(
                NodeType::function("ForEach")
                    .with_input("items", DataType::Array)
                    .with_port(Port::step_output("start").in_scope("body"))
                    .with_port(Port::data_output("item", DataType::String).in_scope("body"))
                    .with_port(Port::data_input("processed", DataType::String).in_scope("body"))
                    .with_output("results", DataType::Array),
            )
    }

    fn step_ids(node: &PlanNode) -> Vec<&str> {
        match node {
            PlanNode::Sequence { steps } => steps.iter().flat_map(step_ids).collect(),
            PlanNode::Step(step) | PlanNode::InlineExpr(step) => vec![step.instance.as_str()],
            _ => Vec::new(),
        }
    }

    fn as_step(node: &PlanNode) -> &StepNode {
        match node {
            PlanNode::Step(step) | PlanNode::InlineExpr(step) => step,
            other => panic!("expected a step, got {:?}", other),
        }
    }

    #[test]
    fn test_linear_sequence() {
        init();
        let workflow = catalog("linear")
            .returns("result", DataType::String)
            .add_instance("a", "Task")
            .add_instance("b", "Task")
            .add_instance("c", "Task")
            .connect("Start", "execute", "a", "execute")
            .connect("a", "onSuccess", "b", "execute")
            .connect("b", "onSuccess", "c", "execute")
            .connect("a", "out", "b", "in")
            .connect("c", "out", "Exit", "result")
            .build();
        let plan = schedule(&workflow).unwrap();

        assert_eq!(step_ids(&plan.body), vec!["a", "b", "c"]);
        let PlanNode::Sequence { steps } = &plan.body else {
            panic!("expected a sequence");
        };
        assert_eq!(
            as_step(&steps[1]).input("in"),
            Some(&ValueSource::Output {
                instance: "a".to_string(),
                port: "out".to_string()
            })
        );
        assert_eq!(as_step(&steps[0]).input("in"), Some(&ValueSource::Unbound));
    }

    #[test]
    fn test_independent_instances_run_in_parallel() {
        init();
        let workflow = catalog("fan-out")
            .returns("ra", DataType::String)
            .returns("rb", DataType::String)
            .returns("rc", DataType::String)
            .add_instance("a", "Task")
            .add_instance("b", "Task")
            .add_instance("c", "Task")
            .connect("Start", "execute", "a", "execute")
            .connect("Start", "execute", "b", "execute")
            .connect("Start", "execute", "c", "execute")
            .connect("a", "out", "Exit", "ra")
            .connect("b", "out", "Exit", "rb")
            .connect("c", "out", "Exit", "rc")
            .build();
        let plan = schedule(&workflow).unwrap();

        let PlanNode::Parallel { branches } = &plan.body else {
            panic!("expected a parallel batch, got {}", plan.body);
        };
        let ids: Vec<&str> = branches.iter().map(|b| as_step(b).instance.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_branch_hoists_merged_returns() {
        init();
        let workflow = catalog("branch")
            .returns("result", DataType::String)
            .add_instance("h", "Task")
            .add_instance("x", "Task")
            .add_instance("y", "Task")
            .connect("Start", "execute", "h", "execute")
            .connect("h", "onSuccess", "x", "execute")
            .connect("h", "onFailure", "y", "execute")
            .connect("x", "out", "Exit", "result")
            .connect("y", "out", "Exit", "result")
            .connect("x", "onSuccess", "Exit", "onSuccess")
            .connect("y", "onSuccess", "Exit", "onSuccess")
            .build();
        let plan = schedule(&workflow).unwrap();

        let PlanNode::Sequence { steps } = &plan.body else {
            panic!("expected a sequence, got {}", plan.body);
        };
        assert_eq!(steps.len(), 2);
        let PlanNode::Branch(branch) = &steps[1] else {
            panic!("expected a branch");
        };
        assert_eq!(branch.instance, "h");
        assert_eq!(branch.condition, "onSuccess");
        assert_eq!(branch.hoisted.len(), 1);
        assert_eq!(branch.hoisted[0].id, "Exit.result");
        assert_eq!(branch.hoisted[0].data_type, Some(DataType::String));
        assert_eq!(as_step(&branch.then_branch).instance, "x");
        assert_eq!(as_step(&branch.else_branch).instance, "y");
        assert_eq!(
            plan.return_for("result").map(|r| r.sources.clone()),
            Some(vec![ValueSource::Merged {
                binding: "Exit.result".to_string()
            }])
        );

        let success = dry_run(&plan, &BTreeSet::new());
        assert_eq!(success.executed, vec!["h", "x"]);
        assert_eq!(success.returns["result"], Value::String("x.out".to_string()));

        let failure = dry_run(&plan, &BTreeSet::from(["h".to_string()]));
        assert_eq!(failure.executed, vec!["h", "y"]);
        assert_eq!(failure.returns["result"], Value::String("y.out".to_string()));
        assert_eq!(failure.returns["onSuccess"], Value::Bool(true));
    }

    fn hoisted_by_branch(plan: &ExecutionPlan) -> Vec<(String, Vec<String>)> {
        let mut found = Vec::new();
        plan.body.walk(&mut |node| {
            if let PlanNode::Branch(branch) = node {
                let ids: Vec<String> = branch.hoisted.iter().map(|h| h.id.clone()).collect();
                found.push((branch.instance.clone(), ids));
            }
        });
        found
    }

    fn nested_branches(name: &str) -> WorkflowBuilder {
        catalog(name)
            .add_instance("outer", "Task")
            .add_instance("inner", "Task")
            .add_instance("p", "Task")
            .add_instance("q", "Task")
            .add_instance("z", "Task")
            .connect("Start", "execute", "outer", "execute")
            .connect("outer", "onSuccess", "inner", "execute")
            .connect("outer", "onFailure", "z", "execute")
            .connect("inner", "onSuccess", "p", "execute")
            .connect("inner", "onFailure", "q", "execute")
    }

    #[test]
    fn test_inner_join_binding_stays_on_inner_branch() {
        init();
        let workflow = nested_branches("inner-join")
            .add_instance("j", "Task")
            .connect("p", "onSuccess", "j", "execute")
            .connect("q", "onSuccess", "j", "execute")
            .connect("p", "out", "j", "in")
            .build();
        let plan = schedule(&workflow).unwrap();

        assert_eq!(
            hoisted_by_branch(&plan),
            vec![
                ("outer".to_string(), Vec::new()),
                ("inner".to_string(), vec!["j.in".to_string()]),
            ]
        );

        let success = dry_run(&plan, &BTreeSet::new());
        assert_eq!(success.executed, vec!["outer", "inner", "p", "j"]);
        let failure = dry_run(&plan, &BTreeSet::from(["inner".to_string()]));
        assert_eq!(failure.executed, vec!["outer", "inner", "q", "j"]);
    }

    #[test]
    fn test_value_leaving_both_branches_binds_on_outer() {
        init();
        let workflow = nested_branches("outer-exit")
            .returns("result", DataType::String)
            .connect("p", "out", "Exit", "result")
            .connect("q", "out", "Exit", "result")
            .build();
        let plan = schedule(&workflow).unwrap();

        assert_eq!(
            hoisted_by_branch(&plan),
            vec![
                ("outer".to_string(), vec!["Exit.result".to_string()]),
                ("inner".to_string(), Vec::new()),
            ]
        );

        let success = dry_run(&plan, &BTreeSet::new());
        assert_eq!(success.returns["result"], Value::String("p.out".to_string()));
        let failure = dry_run(&plan, &BTreeSet::from(["inner".to_string()]));
        assert_eq!(failure.returns["result"], Value::String("q.out".to_string()));
        let outer_failure = dry_run(&plan, &BTreeSet::from(["outer".to_string()]));
        assert_eq!(outer_failure.executed, vec!["outer", "z"]);
        assert_eq!(outer_failure.returns["result"], Value::Null);
    }

    #[test]
    fn test_expressions_follow_their_inputs() {
        init();
        // `second` is declared first but reads `first`
        let workflow = catalog("expressions")
            .parameter("name", DataType::String)
            .add_instance("second", "Upper")
            .add_instance("first", "Upper")
            .add_instance("log", "Task")
            .connect("Start", "name", "first", "text")
            .connect("first", "upper", "second", "text")
            .connect("second", "upper", "log", "in")
            .connect("Start", "execute", "log", "execute")
            .build();
        let plan = schedule(&workflow).unwrap();

        assert_eq!(plan.instances(), vec!["first", "second", "log"]);
        let PlanNode::Sequence { steps } = &plan.body else {
            panic!("expected a sequence");
        };
        assert!(matches!(steps[0], PlanNode::InlineExpr(_)));
        assert!(matches!(steps[2], PlanNode::Step(_)));
        assert_eq!(plan.step_count(), 1);
    }

    #[test]
    fn test_empty_workflow_copies_parameters_through() {
        init();
        let workflow = catalog("empty")
            .parameter("x", DataType::Number)
            .returns("x", DataType::Number)
            .connect("Start", "x", "Exit", "x")
            .connect("Start", "execute", "Exit", "onSuccess")
            .build();
        let plan = schedule(&workflow).unwrap();

        assert_eq!(plan.body, PlanNode::Sequence { steps: Vec::new() });
        assert_eq!(
            plan.return_for("x").map(|r| r.sources.clone()),
            Some(vec![ValueSource::WorkflowInput {
                port: "x".to_string()
            }])
        );
        let run = dry_run(&plan, &BTreeSet::new());
        assert_eq!(run.returns["x"], Value::String("Start.x".to_string()));
        assert_eq!(run.returns["onSuccess"], Value::Bool(true));
    }

    #[test]
    fn test_scope_becomes_repeat() {
        init();
        // `shout` lives outside the loop but is read inside the body
        let workflow = catalog("loop")
            .parameter("items", DataType::Array)
            .parameter("prefix", DataType::String)
            .returns("results", DataType::Array)
            .add_instance("loop", "ForEach")
            .add_instance("shout", "Upper")
            .add_scoped_instance("work", "Task", "loop", "body")
            .connect("Start", "execute", "loop", "execute")
            .connect("Start", "items", "loop", "items")
            .connect("Start", "prefix", "shout", "text")
            .connect_scoped("loop", "start", "work", "execute", "body")
            .connect("shout", "upper", "work", "in")
            .connect_into_scope("work", "out", "loop", "processed", "body")
            .connect("loop", "results", "Exit", "results")
            .build();
        let plan = schedule(&workflow).unwrap();

        let PlanNode::Sequence { steps } = &plan.body else {
            panic!("expected a sequence, got {}", plan.body);
        };
        assert!(matches!(steps[0], PlanNode::InlineExpr(_)));
        assert_eq!(as_step(&steps[0]).instance, "shout");
        let PlanNode::Repeat(repeat) = &steps[1] else {
            panic!("expected a repeat");
        };
        assert_eq!(repeat.instance, "loop");
        assert_eq!(repeat.scopes.len(), 1);
        let scope = &repeat.scopes[0];
        assert_eq!(scope.name, "body");
        assert_eq!(scope.items, vec!["item"]);
        assert_eq!(as_step(&scope.body).instance, "work");
        assert_eq!(
            scope.results[0].source,
            ValueSource::Output {
                instance: "work".to_string(),
                port: "out".to_string()
            }
        );
        assert_eq!(plan.step_count(), 2);
    }

    #[test]
    fn test_scope_items_resolve_to_parent() {
        let workflow = catalog("items")
            .add_instance("loop", "ForEach")
            .add_scoped_instance("work", "Task", "loop", "body")
            .connect("Start", "execute", "loop", "execute")
            .connect_scoped("loop", "start", "work", "execute", "body")
            .connect_scoped("loop", "item", "work", "in", "body")
            .build();
        let plan = schedule(&workflow).unwrap();

        let PlanNode::Repeat(repeat) = &plan.body else {
            panic!("expected a repeat, got {}", plan.body);
        };
        assert_eq!(
            as_step(&repeat.scopes[0].body).input("in"),
            Some(&ValueSource::ScopeItem {
                instance: "loop".to_string(),
                scope: "body".to_string(),
                port: "item".to_string()
            })
        );
        assert_eq!(repeat.scopes[0].results[0].source, ValueSource::Unbound);
    }

    fn join_workflow(join_type: &str) -> Workflow {
        catalog("join")
            .add_instance("a", "Task")
            .add_instance("b", "Task")
            .add_instance("j", join_type)
            .connect("Start", "execute", "a", "execute")
            .connect("a", "onSuccess", "b", "execute")
            .connect("a", "onSuccess", "j", "execute")
            .connect("b", "onSuccess", "j", "execute")
            .build()
    }

    #[test]
    fn test_conjunction_waits_for_every_predecessor() {
        init();
        let plan = schedule(&join_workflow("Task")).unwrap();
        assert_eq!(step_ids(&plan.body), vec!["a", "b", "j"]);
    }

    #[test]
    fn test_disjunction_runs_after_any_predecessor() {
        init();
        let plan = schedule(&join_workflow("Either")).unwrap();

        let PlanNode::Sequence { steps } = &plan.body else {
            panic!("expected a sequence, got {}", plan.body);
        };
        assert_eq!(as_step(&steps[0]).instance, "a");
        let PlanNode::Parallel { branches } = &steps[1] else {
            panic!("expected b and j together");
        };
        let ids: Vec<&str> = branches.iter().map(|b| as_step(b).instance.as_str()).collect();
        assert_eq!(ids, vec!["b", "j"]);
    }

    #[test]
    fn test_custom_predicate() {
        init();
        let scheduler = Scheduler::new()
            .with_predicate("after_b", |q: &ReadinessQuery<'_>| q.resolved.contains(&"b"));
        assert_eq!(scheduler.predicate_names(), vec!["after_b"]);

        let plan = scheduler.schedule(&join_workflow("Quorum")).unwrap();
        assert_eq!(step_ids(&plan.body), vec!["a", "b", "j"]);
    }

    #[test]
    fn test_unknown_predicate() {
        let err = schedule(&join_workflow("Quorum")).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::UnknownPredicate {
                name: "after_b".to_string(),
                instance: "j".to_string()
            }
        );
    }

    #[test]
    fn test_data_cycle_is_stuck() {
        let workflow = catalog("cycle")
            .add_instance("a", "Task")
            .add_instance("b", "Task")
            .connect("Start", "execute", "a", "execute")
            .connect("Start", "execute", "b", "execute")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "a", "in")
            .build();
        let err = schedule(&workflow).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Stuck {
                region: "workflow".to_string(),
                instance: "a".to_string(),
                pending: vec!["a".to_string(), "b".to_string()],
            }
        );
    }

    #[test]
    fn test_scope_depth_limit() {
        let workflow = catalog("deep")
            .add_instance("outer", "ForEach")
            .add_scoped_instance("inner", "ForEach", "outer", "body")
            .add_scoped_instance("work", "Task", "inner", "body")
            .connect("Start", "execute", "outer", "execute")
            .connect_scoped("outer", "start", "inner", "execute", "body")
            .connect_scoped("inner", "start", "work", "execute", "body")
            .build();

        assert!(schedule(&workflow).is_ok());
        let err = Scheduler::new()
            .with_max_scope_depth(1)
            .schedule(&workflow)
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::ScopeDepthExceeded {
                scope: "inner.body".to_string(),
                max_depth: 1
            }
        );
    }

    #[test]
    fn test_unknown_node_type() {
        let workflow = catalog("unknown")
            .add_instance("a", "Missing")
            .connect("Start", "execute", "a", "execute")
            .build();
        assert_eq!(
            schedule(&workflow).unwrap_err(),
            SchedulerError::UnknownNodeType {
                instance: "a".to_string(),
                node_type: "Missing".to_string()
            }
        );
    }
}
