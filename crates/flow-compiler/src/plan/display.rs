//! Tree rendering of execution plans for logs and test output

use std::fmt;

use super::{ExecutionPlan, InputBinding, PlanNode, StepNode, ValueSource};

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan {}", self.workflow)?;
        fmt_tree(&self.body, f, "", true)?;
        for binding in &self.returns {
            let sources: Vec<String> = binding.sources.iter().map(|s| s.to_string()).collect();
            writeln!(f, "return {} <- {}", binding.port, sources.join(" | "))?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_tree(self, f, "", true)
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Literal { value } => write!(f, "{}", value),
            ValueSource::Expression { code } => write!(f, "`{}`", code),
            ValueSource::WorkflowInput { port } => write!(f, "Start.{}", port),
            ValueSource::Output { instance, port } => write!(f, "{}.{}", instance, port),
            ValueSource::ScopeItem {
                instance,
                scope,
                port,
            } => write!(f, "{}.{}[{}]", instance, port, scope),
            ValueSource::Merged { binding } => write!(f, "${}", binding),
            ValueSource::Signal { instance, port } => write!(f, "signal({}.{})", instance, port),
            ValueSource::Unbound => write!(f, "unbound"),
        }
    }
}

fn fmt_inputs(inputs: &[InputBinding]) -> String {
    inputs
        .iter()
        .map(|i| format!("{}={}", i.port, i.source))
        .collect::<Vec<_>>()
        .join(", ")
}

fn step_label(kind: &str, step: &StepNode) -> String {
    let mut label = format!(
        "{} {}: {}({})",
        kind,
        step.instance,
        step.node_type,
        fmt_inputs(&step.inputs)
    );
    for export in &step.exports {
        label.push_str(&format!(" -> ${}", export.binding));
    }
    label
}

/// Recursively formats a node with box-drawing connectors
fn fmt_tree(node: &PlanNode, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool) -> fmt::Result {
    let marker = if is_last { "└── " } else { "├── " };
    write!(f, "{}{}", prefix, marker)?;
    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });

    match node {
        PlanNode::Sequence { steps } => {
            writeln!(f, "sequence")?;
            fmt_children(steps.iter(), f, &child_prefix)?;
        }
        PlanNode::Parallel { branches } => {
            writeln!(f, "parallel")?;
            fmt_children(branches.iter(), f, &child_prefix)?;
        }
        PlanNode::Step(step) => writeln!(f, "{}", step_label("step", step))?,
        PlanNode::InlineExpr(step) => writeln!(f, "{}", step_label("inline", step))?,
        PlanNode::Branch(branch) => {
            writeln!(f, "branch on {}.{}", branch.instance, branch.condition)?;
            for hoisted in &branch.hoisted {
                writeln!(f, "{}│   hoist ${} for {}", child_prefix, hoisted.id, hoisted.consumer)?;
            }
            writeln!(f, "{}├── then", child_prefix)?;
            fmt_tree(&branch.then_branch, f, &format!("{}│   ", child_prefix), true)?;
            writeln!(f, "{}└── else", child_prefix)?;
            fmt_tree(&branch.else_branch, f, &format!("{}    ", child_prefix), true)?;
        }
        PlanNode::Repeat(repeat) => {
            write!(
                f,
                "repeat {}: {}({})",
                repeat.instance,
                repeat.node_type,
                fmt_inputs(&repeat.inputs)
            )?;
            for export in &repeat.exports {
                write!(f, " -> ${}", export.binding)?;
            }
            writeln!(f)?;
            let count = repeat.scopes.len();
            for (i, scope) in repeat.scopes.iter().enumerate() {
                let last = i + 1 == count;
                writeln!(
                    f,
                    "{}{}scope {} over [{}] collect ({})",
                    child_prefix,
                    if last { "└── " } else { "├── " },
                    scope.name,
                    scope.items.join(", "),
                    fmt_inputs(&scope.results)
                )?;
                let body_prefix = format!("{}{}", child_prefix, if last { "    " } else { "│   " });
                fmt_tree(&scope.body, f, &body_prefix, true)?;
            }
        }
    }
    Ok(())
}

fn fmt_children<'p>(
    children: impl ExactSizeIterator<Item = &'p PlanNode>,
    f: &mut fmt::Formatter<'_>,
    prefix: &str,
) -> fmt::Result {
    let count = children.len();
    for (i, child) in children.enumerate() {
        fmt_tree(child, f, prefix, i + 1 == count)?;
    }
    Ok(())
}
