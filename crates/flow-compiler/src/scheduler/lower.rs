//! Round-based lowering of regions into plan nodes

use std::collections::BTreeSet;

use flow_model::{ports, Direction, GraphIndex, Region, ScopeRef, EXIT};

use super::analysis::{region_label, Analysis};
use super::bindings::{resolve_input, MergeTable};
use super::branch::{build_units, hoist, Unit};
use super::{require_node_type, Scheduler};
use crate::error::SchedulerError;
use crate::plan::{BranchNode, InputBinding, PlanNode, RepeatNode, ScopeBody, StepNode};

type Names<'a> = BTreeSet<&'a str>;

pub(crate) struct Lowerer<'s, 'a> {
    index: &'s GraphIndex<'a>,
    analysis: &'s Analysis<'a>,
    scheduler: &'s Scheduler,
    merges: MergeTable,
}

impl<'s, 'a> Lowerer<'s, 'a> {
    pub fn new(index: &'s GraphIndex<'a>, analysis: &'s Analysis<'a>, scheduler: &'s Scheduler) -> Self {
        Self {
            index,
            analysis,
            scheduler,
            merges: MergeTable::new(),
        }
    }

    /// Lower the top-level region
    pub fn lower_workflow(&mut self) -> Result<PlanNode, SchedulerError> {
        self.lower_region(&None, &Names::new(), &Names::new())
    }

    pub fn into_merges(self) -> MergeTable {
        self.merges
    }

    fn lower_region(
        &mut self,
        region: &Region,
        resolved: &Names<'a>,
        available: &Names<'a>,
    ) -> Result<PlanNode, SchedulerError> {
        let index = self.index;
        let members: Vec<&'a str> = index
            .members(region)
            .into_iter()
            .map(|i| i.id.as_str())
            .filter(|id| !index.is_expression(id))
            .collect();
        self.lower_block(region, &members, resolved.clone(), available.clone(), true)
    }

    /// Lower a block of instances in rounds
    ///
    /// Each round takes every unit whose dependencies have been
    /// scheduled. A root block also inlines the expressions feeding its
    /// region's sink once every unit has been placed.
    fn lower_block(
        &mut self,
        region: &Region,
        members: &[&'a str],
        mut resolved: Names<'a>,
        mut available: Names<'a>,
        is_root: bool,
    ) -> Result<PlanNode, SchedulerError> {
        let label = region_label(region);
        let mut pending = build_units(self.index, self.analysis, members);
        let mut block: Vec<PlanNode> = Vec::new();
        let mut round = 0;

        while !pending.is_empty() {
            let mut ready: Vec<Unit<'a>> = Vec::new();
            let mut waiting: Vec<Unit<'a>> = Vec::new();
            for unit in pending {
                if self.scheduler.is_ready(self.index, self.analysis, &unit, &resolved)? {
                    ready.push(unit);
                } else {
                    waiting.push(unit);
                }
            }
            pending = waiting;

            if ready.is_empty() {
                let heads: Vec<String> = pending.iter().map(|u| u.head.to_string()).collect();
                return Err(SchedulerError::Stuck {
                    region: label,
                    instance: heads.first().cloned().unwrap_or_default(),
                    pending: heads,
                });
            }

            round += 1;
            log::debug!(
                "Round {} in {} schedules [{}] with {} branch(es)",
                round,
                label,
                ready.iter().map(|u| u.head).collect::<Vec<_>>().join(", "),
                ready.iter().filter(|u| u.is_branch()).count()
            );

            let needed = self.needed_expressions(&ready, &available);
            self.emit_expressions(&label, needed, &mut available, &mut block)?;

            let mut lowered: Vec<Vec<PlanNode>> = Vec::with_capacity(ready.len());
            for unit in &ready {
                lowered.push(self.lower_unit(unit, &resolved, &available)?);
            }
            if lowered.len() == 1 {
                if let Some(nodes) = lowered.pop() {
                    block.extend(nodes);
                }
            } else {
                block.push(PlanNode::Parallel {
                    branches: lowered.into_iter().map(PlanNode::from_block).collect(),
                });
            }

            for unit in &ready {
                resolved.extend(unit.inside.iter().copied());
            }
        }

        if is_root {
            let sinks = self.sink_expressions(region, &available);
            self.emit_expressions(&label, sinks, &mut available, &mut block)?;
        }

        Ok(PlanNode::from_block(block))
    }

    fn lower_unit(
        &mut self,
        unit: &Unit<'a>,
        resolved: &Names<'a>,
        available: &Names<'a>,
    ) -> Result<Vec<PlanNode>, SchedulerError> {
        let Some(arms) = &unit.arms else {
            return Ok(vec![self.lower_instance(unit.head, resolved, available)?]);
        };

        // Bindings must exist before any arm member is lowered
        let hoisted = hoist(self.index, unit, &mut self.merges);
        let head = self.lower_instance(unit.head, resolved, available)?;

        let mut after_head = resolved.clone();
        after_head.insert(unit.head);
        after_head.extend(self.analysis.descendants(unit.head));

        let region = self.index.region_of(unit.head);
        let then_branch = self.lower_block(
            &region,
            &arms.then_members,
            after_head.clone(),
            available.clone(),
            false,
        )?;
        let else_branch =
            self.lower_block(&region, &arms.else_members, after_head, available.clone(), false)?;

        log::debug!(
            "Branch on '{}': {} then, {} else, {} hoisted",
            unit.head,
            arms.then_members.len(),
            arms.else_members.len(),
            hoisted.len()
        );

        Ok(vec![
            head,
            PlanNode::Branch(BranchNode {
                instance: unit.head.to_string(),
                condition: ports::ON_SUCCESS.to_string(),
                hoisted,
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }),
        ])
    }

    /// Lower one scheduled instance into a step or a repeat
    fn lower_instance(
        &mut self,
        id: &'a str,
        resolved: &Names<'a>,
        available: &Names<'a>,
    ) -> Result<PlanNode, SchedulerError> {
        let index = self.index;
        let node_type = require_node_type(index, id)?;
        let step = self.step_node(id)?;

        let scopes = node_type.scopes();
        if scopes.is_empty() {
            return Ok(PlanNode::Step(step));
        }

        let mut inside = resolved.clone();
        inside.insert(id);

        let mut bodies = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let region = Some(ScopeRef::new(id, scope));
            let max_depth = self.scheduler.max_scope_depth();
            match index.depth(&region) {
                Some(depth) if depth <= max_depth as usize => {}
                _ => {
                    return Err(SchedulerError::ScopeDepthExceeded {
                        scope: region_label(&region),
                        max_depth,
                    })
                }
            }

            let body = self.lower_region(&region, &inside, available)?;
            let items = node_type
                .scoped_ports(scope, Direction::Output)
                .into_iter()
                .filter(|p| p.is_data())
                .map(|p| p.name.clone())
                .collect();
            let results = node_type
                .scoped_ports(scope, Direction::Input)
                .into_iter()
                .filter(|p| p.is_data())
                .map(|p| InputBinding {
                    port: p.name.clone(),
                    source: resolve_input(index, &self.merges, id, p),
                })
                .collect();

            bodies.push(ScopeBody {
                name: scope.to_string(),
                items,
                body,
                results,
            });
        }

        Ok(PlanNode::Repeat(RepeatNode {
            instance: step.instance,
            node_type: step.node_type,
            inputs: step.inputs,
            exports: step.exports,
            scopes: bodies,
        }))
    }

    fn step_node(&self, id: &str) -> Result<StepNode, SchedulerError> {
        let index = self.index;
        let node_type = require_node_type(index, id)?;
        let inputs = node_type
            .data_inputs()
            .into_iter()
            .map(|port| InputBinding {
                port: port.name.clone(),
                source: resolve_input(index, &self.merges, id, port),
            })
            .collect();

        Ok(StepNode {
            instance: id.to_string(),
            node_type: node_type.id.clone(),
            inputs,
            exports: self.merges.exports_of(id),
        })
    }

    /// Expressions the units of one round read, not yet inlined
    ///
    /// A repeat also pulls in outer expressions its scope bodies read.
    fn needed_expressions(&self, ready: &[Unit<'a>], available: &Names<'a>) -> Names<'a> {
        let analysis = self.analysis;
        let mut needed = Names::new();
        for unit in ready {
            needed.extend(analysis.expr_deps(unit.head));
            for nested in analysis.descendants(unit.head) {
                needed.extend(
                    analysis
                        .expr_deps(nested)
                        .filter(|e| !analysis.is_descendant(e, unit.head)),
                );
            }
        }
        needed.retain(|e| !available.contains(e));
        needed
    }

    /// Expressions feeding the sink of a region, not yet inlined
    fn sink_expressions(&self, region: &Region, available: &Names<'a>) -> Names<'a> {
        let index = self.index;
        let connections: Vec<_> = match region {
            None => index
                .incoming(EXIT)
                .into_iter()
                .map(|(_, c)| c)
                .filter(|c| index.is_data(c))
                .collect(),
            Some(scope) => index
                .incoming(&scope.instance)
                .into_iter()
                .map(|(_, c)| c)
                .filter(|c| {
                    index.is_data(c)
                        && index
                            .target_port(c)
                            .is_some_and(|p| p.scope.as_deref() == Some(scope.scope.as_str()))
                })
                .collect(),
        };

        let mut needed = self.analysis.deps_of(index, &connections).expressions;
        needed.retain(|e| !available.contains(e));
        needed
    }

    /// Inline expressions so each follows the expressions it reads
    ///
    /// Ties go to declaration order.
    fn emit_expressions(
        &self,
        label: &str,
        needed: Names<'a>,
        available: &mut Names<'a>,
        block: &mut Vec<PlanNode>,
    ) -> Result<(), SchedulerError> {
        let index = self.index;
        let mut remaining: Vec<&'a str> = needed.into_iter().collect();
        remaining.sort_by_key(|id| index.position(id));

        while !remaining.is_empty() {
            let next = remaining.iter().position(|id| {
                self.expression_inputs(id)
                    .iter()
                    .all(|input| available.contains(input) || !remaining.contains(input))
            });
            let Some(position) = next else {
                return Err(SchedulerError::Stuck {
                    region: label.to_string(),
                    instance: remaining[0].to_string(),
                    pending: remaining.iter().map(|id| id.to_string()).collect(),
                });
            };

            let id = remaining.remove(position);
            log::trace!("Inlining expression '{}'", id);
            block.push(PlanNode::InlineExpr(self.step_node(id)?));
            available.insert(id);
        }
        Ok(())
    }

    /// Expressions wired directly into an expression's inputs
    fn expression_inputs(&self, id: &str) -> Vec<&'a str> {
        let index = self.index;
        index
            .incoming(id)
            .into_iter()
            .filter(|(_, c)| {
                index.is_data(c)
                    && index.source_port(c).is_some_and(|p| p.scope.is_none())
                    && index.is_expression(&c.from.node)
            })
            .map(|(_, c)| c.from.node.as_str())
            .collect()
    }
}
