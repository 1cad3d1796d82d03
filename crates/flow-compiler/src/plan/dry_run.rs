//! Symbolic execution of a plan
//!
//! A dry run walks a plan without running any node. Every output is a
//! symbolic string `"instance.port"`, every branching instance succeeds
//! unless it is listed in `failures`, and every scope body runs once.
//! This is enough to check which steps a given outcome runs and what
//! the workflow would return.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use flow_model::{ports, NodeId, START};

use super::{ExecutionPlan, Export, PlanNode, StepNode, ValueSource};

/// Values visible while walking a plan
#[derive(Debug, Clone, Default)]
pub struct DryRunContext {
    /// Merge bindings by id
    bindings: BTreeMap<String, Value>,
    /// Outcome of every instance that ran: `true` for success
    outcomes: BTreeMap<NodeId, bool>,
    /// Instances in the order they ran
    executed: Vec<NodeId>,
}

impl DryRunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a merge binding
    pub fn get(&self, binding: &str) -> Option<&Value> {
        self.bindings.get(binding)
    }

    /// Set a merge binding
    pub fn set(&mut self, binding: impl Into<String>, value: Value) {
        self.bindings.insert(binding.into(), value);
    }

    /// Whether an instance has run
    pub fn has_run(&self, instance: &str) -> bool {
        self.outcomes.contains_key(instance)
    }

    /// Resolve a value source against what has run so far
    pub fn resolve(&self, source: &ValueSource) -> Value {
        match source {
            ValueSource::Literal { value } => value.clone(),
            ValueSource::Expression { code } => Value::String(code.clone()),
            ValueSource::WorkflowInput { port } => Value::String(format!("{}.{}", START, port)),
            ValueSource::Output { instance, port } if self.has_run(instance) => {
                Value::String(format!("{}.{}", instance, port))
            }
            ValueSource::ScopeItem {
                instance,
                scope,
                port,
            } if self.has_run(instance) => {
                Value::String(format!("{}.{}[{}]", instance, port, scope))
            }
            ValueSource::Merged { binding } => self.get(binding).cloned().unwrap_or(Value::Null),
            ValueSource::Signal { instance, port } => {
                if instance == START {
                    return Value::Bool(port == ports::EXECUTE);
                }
                let fired = match self.outcomes.get(instance) {
                    Some(true) => port == ports::ON_SUCCESS,
                    Some(false) => port == ports::ON_FAILURE,
                    None => false,
                };
                Value::Bool(fired)
            }
            _ => Value::Null,
        }
    }

    fn run(&mut self, instance: &str, exports: &[Export], failures: &BTreeSet<NodeId>) {
        self.outcomes
            .insert(instance.to_string(), !failures.contains(instance));
        self.executed.push(instance.to_string());
        for export in exports {
            self.set(
                export.binding.clone(),
                Value::String(format!("{}.{}", instance, export.port)),
            );
        }
    }
}

/// Outcome of a dry run
#[derive(Debug, Clone, PartialEq)]
pub struct DryRun {
    /// Instances in the order they ran
    pub executed: Vec<NodeId>,
    /// Value handed to each exit port
    pub returns: BTreeMap<String, Value>,
}

/// Walk a plan, failing the instances in `failures`
pub fn dry_run(plan: &ExecutionPlan, failures: &BTreeSet<NodeId>) -> DryRun {
    let mut ctx = DryRunContext::new();
    walk(&plan.body, &mut ctx, failures);

    let returns = plan
        .returns
        .iter()
        .map(|binding| {
            let values: Vec<Value> = binding.sources.iter().map(|s| ctx.resolve(s)).collect();
            let signals = !binding.sources.is_empty()
                && binding
                    .sources
                    .iter()
                    .all(|s| matches!(s, ValueSource::Signal { .. }));
            let value = if signals {
                Value::Bool(values.iter().any(|v| v == &Value::Bool(true)))
            } else {
                values
                    .into_iter()
                    .rev()
                    .find(|v| !v.is_null())
                    .unwrap_or(Value::Null)
            };
            (binding.port.clone(), value)
        })
        .collect();

    DryRun {
        executed: ctx.executed,
        returns,
    }
}

fn run_step(step: &StepNode, ctx: &mut DryRunContext, failures: &BTreeSet<NodeId>) {
    log::trace!(
        "Dry run of '{}' with {} input(s)",
        step.instance,
        step.inputs.len()
    );
    ctx.run(&step.instance, &step.exports, failures);
}

fn walk(node: &PlanNode, ctx: &mut DryRunContext, failures: &BTreeSet<NodeId>) {
    match node {
        PlanNode::Sequence { steps } => steps.iter().for_each(|s| walk(s, ctx, failures)),
        PlanNode::Parallel { branches } => branches.iter().for_each(|b| walk(b, ctx, failures)),
        PlanNode::Step(step) | PlanNode::InlineExpr(step) => run_step(step, ctx, failures),
        PlanNode::Branch(branch) => {
            let took_condition = ctx.resolve(&ValueSource::Signal {
                instance: branch.instance.clone(),
                port: branch.condition.clone(),
            });
            if took_condition == Value::Bool(true) {
                walk(&branch.then_branch, ctx, failures);
            } else {
                walk(&branch.else_branch, ctx, failures);
            }
        }
        PlanNode::Repeat(repeat) => {
            ctx.run(&repeat.instance, &repeat.exports, failures);
            for scope in &repeat.scopes {
                walk(&scope.body, ctx, failures);
            }
        }
    }
}
