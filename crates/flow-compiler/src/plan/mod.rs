//! Execution plans
//!
//! An execution plan is the target-independent result of lowering a
//! workflow: a tree of sequences, parallel batches, branches, steps,
//! inlined expressions and repeated scope bodies. Code generators walk
//! the tree and emit one construct per node.
//!
//! # Example
//!
//! ```ignore
//! let plan = Scheduler::new().schedule(&workflow)?;
//! println!("{}", plan);
//! let json = plan.to_json()?;
//! ```

mod display;
mod dry_run;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flow_model::{DataType, NodeId, PortName, PortRef};

use crate::error::Result;

pub use dry_run::{dry_run, DryRun, DryRunContext};

/// The lowered form of one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Name of the workflow this plan was lowered from
    pub workflow: String,
    /// What to run
    pub body: PlanNode,
    /// Values handed to `Exit`, one per exit port
    pub returns: Vec<ReturnBinding>,
}

impl ExecutionPlan {
    /// Serialize the plan to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a plan from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Instances run by the plan, in tree order
    pub fn instances(&self) -> Vec<&str> {
        self.body.instances()
    }

    /// Position of an instance in tree order
    pub fn position_of(&self, instance: &str) -> Option<usize> {
        self.instances().iter().position(|i| *i == instance)
    }

    /// Number of scheduled (non-inlined) steps
    pub fn step_count(&self) -> usize {
        let mut count = 0;
        self.body.walk(&mut |node| {
            if matches!(node, PlanNode::Step(_) | PlanNode::Repeat(_)) {
                count += 1;
            }
        });
        count
    }

    /// Binding handed to an exit port
    pub fn return_for(&self, port: &str) -> Option<&ReturnBinding> {
        self.returns.iter().find(|r| r.port == port)
    }
}

/// A node of the plan tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
    /// Children run one after another
    Sequence { steps: Vec<PlanNode> },
    /// Children may run concurrently; all finish before the next node
    Parallel { branches: Vec<PlanNode> },
    /// Pick one arm depending on how an instance finished
    Branch(BranchNode),
    /// Run one function or stub instance
    Step(StepNode),
    /// Evaluate one expression instance in place
    InlineExpr(StepNode),
    /// Run an instance that owns scopes, repeating each scope body
    Repeat(RepeatNode),
}

impl PlanNode {
    /// An empty sequence
    pub fn empty() -> Self {
        PlanNode::Sequence { steps: Vec::new() }
    }

    /// Wrap a block of nodes: a single node stands alone, anything else
    /// becomes a sequence
    pub fn from_block(mut nodes: Vec<PlanNode>) -> Self {
        if nodes.len() == 1 {
            if let Some(node) = nodes.pop() {
                return node;
            }
        }
        PlanNode::Sequence { steps: nodes }
    }

    /// Visit this node and all descendants in pre-order
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(&PlanNode),
    {
        visit(self);
        match self {
            PlanNode::Sequence { steps } => steps.iter().for_each(|s| s.walk(visit)),
            PlanNode::Parallel { branches } => branches.iter().for_each(|b| b.walk(visit)),
            PlanNode::Branch(branch) => {
                branch.then_branch.walk(visit);
                branch.else_branch.walk(visit);
            }
            PlanNode::Repeat(repeat) => repeat.scopes.iter().for_each(|s| s.body.walk(visit)),
            PlanNode::Step(_) | PlanNode::InlineExpr(_) => {}
        }
    }

    /// Instances run by this subtree, in tree order
    pub fn instances(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.collect_instances(&mut found);
        found
    }

    fn collect_instances<'p>(&'p self, found: &mut Vec<&'p str>) {
        match self {
            PlanNode::Sequence { steps } => steps.iter().for_each(|s| s.collect_instances(found)),
            PlanNode::Parallel { branches } => {
                branches.iter().for_each(|b| b.collect_instances(found))
            }
            PlanNode::Branch(branch) => {
                branch.then_branch.collect_instances(found);
                branch.else_branch.collect_instances(found);
            }
            PlanNode::Step(step) | PlanNode::InlineExpr(step) => found.push(&step.instance),
            PlanNode::Repeat(repeat) => {
                found.push(&repeat.instance);
                repeat
                    .scopes
                    .iter()
                    .for_each(|s| s.body.collect_instances(found));
            }
        }
    }
}

/// A single instance invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    pub instance: NodeId,
    pub node_type: String,
    /// One binding per unscoped data input, in port order
    pub inputs: Vec<InputBinding>,
    /// Outputs published into hoisted merge bindings after the step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
}

impl StepNode {
    /// Source bound to an input port
    pub fn input(&self, port: &str) -> Option<&ValueSource> {
        self.inputs.iter().find(|i| i.port == port).map(|i| &i.source)
    }
}

/// Where an input port gets its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBinding {
    pub port: PortName,
    pub source: ValueSource,
}

/// A value as seen by generated code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSource {
    /// Literal JSON value
    Literal { value: Value },
    /// Source expression evaluated in place
    Expression { code: String },
    /// A workflow parameter
    WorkflowInput { port: PortName },
    /// Output of an instance that ran earlier
    Output { instance: NodeId, port: PortName },
    /// The current item of a scope, produced by its parent
    ScopeItem {
        instance: NodeId,
        scope: String,
        port: PortName,
    },
    /// A hoisted binding filled by whichever branch ran
    Merged { binding: String },
    /// Whether a step output fired
    Signal { instance: NodeId, port: PortName },
    /// Nothing supplies this optional input
    Unbound,
}

/// An output published into a merge binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    pub port: PortName,
    pub binding: String,
}

/// Conditional execution after a branching instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchNode {
    /// Instance whose outcome selects the arm
    pub instance: NodeId,
    /// Step output that selects the `then` arm
    pub condition: PortName,
    /// Bindings declared before the branch and read after it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hoisted: Vec<HoistedBinding>,
    #[serde(rename = "then")]
    pub then_branch: Box<PlanNode>,
    #[serde(rename = "else")]
    pub else_branch: Box<PlanNode>,
}

/// A mutable binding declared ahead of a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoistedBinding {
    pub id: String,
    /// The input read after the join
    pub consumer: PortRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

/// An instance whose scopes run once per item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatNode {
    pub instance: NodeId,
    pub node_type: String,
    pub inputs: Vec<InputBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
    pub scopes: Vec<ScopeBody>,
}

/// The lowered body of one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeBody {
    pub name: String,
    /// Parent outputs available to the body for each item
    pub items: Vec<PortName>,
    pub body: PlanNode,
    /// Parent scoped inputs collecting each item's result
    pub results: Vec<InputBinding>,
}

/// Values handed to one exit port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBinding {
    pub port: PortName,
    /// Candidate sources in connection order
    pub sources: Vec<ValueSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(instance: &str) -> PlanNode {
        PlanNode::Step(StepNode {
            instance: instance.to_string(),
            node_type: "Log".to_string(),
            inputs: Vec::new(),
            exports: Vec::new(),
        })
    }

    #[test]
    fn test_from_block() {
        assert_eq!(PlanNode::from_block(vec![]), PlanNode::empty());
        assert_eq!(PlanNode::from_block(vec![step("a")]), step("a"));
        assert!(matches!(
            PlanNode::from_block(vec![step("a"), step("b")]),
            PlanNode::Sequence { steps } if steps.len() == 2
        ));
    }

    #[test]
    fn test_instances_in_tree_order() {
        let plan = ExecutionPlan {
            workflow: "wf".to_string(),
            body: PlanNode::Sequence {
                steps: vec![
                    step("h"),
                    PlanNode::Branch(BranchNode {
                        instance: "h".to_string(),
                        condition: "onSuccess".to_string(),
                        hoisted: Vec::new(),
                        then_branch: Box::new(step("x")),
                        else_branch: Box::new(PlanNode::Parallel {
                            branches: vec![step("y"), step("z")],
                        }),
                    }),
                ],
            },
            returns: Vec::new(),
        };

        assert_eq!(plan.instances(), vec!["h", "x", "y", "z"]);
        assert_eq!(plan.position_of("y"), Some(2));
        assert_eq!(plan.step_count(), 4);
    }

    #[test]
    fn test_serialized_shape() {
        let node = PlanNode::Step(StepNode {
            instance: "fetch".to_string(),
            node_type: "Fetch".to_string(),
            inputs: vec![InputBinding {
                port: "url".to_string(),
                source: ValueSource::WorkflowInput {
                    port: "url".to_string(),
                },
            }],
            exports: Vec::new(),
        });
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["type"], "step");
        assert_eq!(json["nodeType"], "Fetch");
        assert_eq!(json["inputs"][0]["source"]["kind"], "workflow_input");
        assert!(json.get("exports").is_none());
    }
}
