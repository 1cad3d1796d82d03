//! Scheduling units and branch detection
//!
//! A block of instances is partitioned into units. Most units are a
//! single instance. An instance whose `onSuccess` and `onFailure`
//! outputs both lead somewhere heads a branch unit that also owns every
//! instance reachable from exactly one of those outputs. An arm member
//! also triggered by something that itself waits on the head leaves the
//! arm; triggers that run before the head become dependencies of the
//! whole unit. Instances reachable from both outputs are joins and stay
//! outside the branch.

use std::collections::{BTreeSet, VecDeque};

use flow_model::{is_boundary, ports, Connection, Direction, GraphIndex, PortRef, EXIT};

use super::analysis::Analysis;
use super::bindings::{MergeEntry, MergeTable};
use crate::plan::HoistedBinding;

/// The two arms of a branch unit, members in block order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Arms<'a> {
    pub then_members: Vec<&'a str>,
    pub else_members: Vec<&'a str>,
}

impl<'a> Arms<'a> {
    fn is_empty(&self) -> bool {
        self.then_members.is_empty() && self.else_members.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.then_members
            .iter()
            .chain(self.else_members.iter())
            .copied()
    }
}

/// A group of instances scheduled together
#[derive(Debug, Clone)]
pub(crate) struct Unit<'a> {
    /// Instance whose readiness decides the unit's
    pub head: &'a str,
    pub arms: Option<Arms<'a>>,
    /// Head, arm members and everything nested in their scopes
    pub inside: BTreeSet<&'a str>,
    /// Producers outside the unit that must run first
    pub hard_deps: BTreeSet<&'a str>,
}

impl<'a> Unit<'a> {
    fn new(analysis: &Analysis<'a>, head: &'a str, arms: Option<Arms<'a>>) -> Self {
        let mut members = vec![head];
        if let Some(arms) = &arms {
            members.extend(arms.iter());
        }

        let mut inside: BTreeSet<&'a str> = members.iter().copied().collect();
        for member in &members {
            inside.extend(analysis.descendants(member));
        }

        let mut hard_deps = BTreeSet::new();
        for id in &inside {
            hard_deps.extend(analysis.data_deps(id));
        }
        for member in members.iter().skip(1) {
            hard_deps.extend(analysis.step_preds(member).iter().copied());
        }
        hard_deps.retain(|dep| !inside.contains(dep));

        Self {
            head,
            arms,
            inside,
            hard_deps,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.arms.is_some()
    }
}

/// Partition `members` into units, in declaration order of their heads
pub(crate) fn build_units<'a>(
    index: &GraphIndex<'a>,
    analysis: &Analysis<'a>,
    members: &[&'a str],
) -> Vec<Unit<'a>> {
    let block: BTreeSet<&'a str> = members.iter().copied().collect();

    let mut candidates: Vec<(&'a str, Arms<'a>)> = Vec::new();
    for &id in members {
        if let Some(arms) = branch_arms(index, analysis, id, members, &block) {
            candidates.push((id, arms));
        }
    }

    let nested: BTreeSet<&'a str> = candidates
        .iter()
        .flat_map(|(_, arms)| arms.iter())
        .collect();

    let mut claimed: BTreeSet<&'a str> = BTreeSet::new();
    let mut heads: Vec<(&'a str, Arms<'a>)> = Vec::new();
    for (head, arms) in candidates {
        if nested.contains(head) || arms.iter().any(|m| claimed.contains(m)) {
            continue;
        }
        claimed.extend(arms.iter());
        heads.push((head, arms));
    }

    let mut units = Vec::new();
    for &id in members {
        if let Some(position) = heads.iter().position(|(head, _)| *head == id) {
            let (head, arms) = heads.swap_remove(position);
            units.push(Unit::new(analysis, head, Some(arms)));
        } else if !claimed.contains(id) {
            units.push(Unit::new(analysis, id, None));
        }
    }
    units
}

/// Arms of `head` within the block, or `None` when it does not branch
fn branch_arms<'a>(
    index: &GraphIndex<'a>,
    analysis: &Analysis<'a>,
    head: &'a str,
    members: &[&'a str],
    block: &BTreeSet<&'a str>,
) -> Option<Arms<'a>> {
    let outgoing = index.outgoing(head);
    let fires = |port: &str| {
        outgoing
            .iter()
            .any(|(_, c)| c.from.port == port && c.from.scope.is_none())
    };
    if !fires(ports::ON_SUCCESS) || !fires(ports::ON_FAILURE) {
        return None;
    }

    let on_success = reach(index, head, ports::ON_SUCCESS, block);
    let on_failure = reach(index, head, ports::ON_FAILURE, block);

    let after_head = dependents(analysis, head, members);
    let then_set = close_arm(
        analysis,
        head,
        &after_head,
        on_success
            .difference(&on_failure)
            .copied()
            .filter(|id| *id != head)
            .collect(),
    );
    let else_set = close_arm(
        analysis,
        head,
        &after_head,
        on_failure
            .difference(&on_success)
            .copied()
            .filter(|id| *id != head)
            .collect(),
    );

    let arms = Arms {
        then_members: members
            .iter()
            .copied()
            .filter(|m| then_set.contains(m))
            .collect(),
        else_members: members
            .iter()
            .copied()
            .filter(|m| else_set.contains(m))
            .collect(),
    };
    (!arms.is_empty()).then_some(arms)
}

/// Members of the block that cannot run before `head` has run
///
/// Follows step and data edges forward from the head.
fn dependents<'a>(analysis: &Analysis<'a>, head: &'a str, members: &[&'a str]) -> BTreeSet<&'a str> {
    let mut found = BTreeSet::from([head]);
    loop {
        let before = found.len();
        for &id in members {
            if found.contains(id) {
                continue;
            }
            let triggered = analysis.step_preds(id).iter().any(|p| found.contains(p));
            if triggered || analysis.data_deps(id).any(|d| found.contains(d)) {
                found.insert(id);
            }
        }
        if found.len() == before {
            return found;
        }
    }
}

/// Drop members triggered by instances downstream of `head` but outside
/// the arm, until none remain
///
/// A trigger that runs before the head stays a dependency of the whole
/// branch unit, so its member keeps its place in the arm.
fn close_arm<'a>(
    analysis: &Analysis<'a>,
    head: &str,
    after_head: &BTreeSet<&'a str>,
    mut arm: BTreeSet<&'a str>,
) -> BTreeSet<&'a str> {
    loop {
        let outsiders: Vec<&'a str> = arm
            .iter()
            .copied()
            .filter(|id| {
                analysis.step_preds(id).iter().any(|pred| {
                    *pred != head && !arm.contains(pred) && after_head.contains(pred)
                })
            })
            .collect();
        if outsiders.is_empty() {
            return arm;
        }
        for id in outsiders {
            arm.remove(id);
        }
    }
}

/// Instances in the block reachable from one step output of `from`
fn reach<'a>(
    index: &GraphIndex<'a>,
    from: &'a str,
    port: &str,
    block: &BTreeSet<&'a str>,
) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&'a str> = step_targets(index, from, Some(port), block).collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        queue.extend(step_targets(index, id, None, block));
    }
    seen
}

fn step_targets<'s, 'a: 's>(
    index: &'s GraphIndex<'a>,
    from: &'a str,
    port: Option<&'s str>,
    block: &'s BTreeSet<&'a str>,
) -> impl Iterator<Item = &'a str> + 's {
    index.outgoing(from).into_iter().filter_map(move |(_, c)| {
        let step = index
            .source_port(c)
            .is_some_and(|p| p.is_step() && p.scope.is_none());
        let matches_port = port.is_none_or(|p| c.from.port == p);
        let target = c.to.node.as_str();
        (step && matches_port && block.contains(target)).then_some(target)
    })
}

/// Declare merge bindings for values that leave a branch unit
///
/// Every data output of an arm member read by a consumer outside the
/// unit gets a binding keyed by that consumer's input. Bindings already
/// declared by an enclosing branch are reused.
pub(crate) fn hoist<'a>(
    index: &GraphIndex<'a>,
    unit: &Unit<'a>,
    merges: &mut MergeTable,
) -> Vec<HoistedBinding> {
    let Some(arms) = &unit.arms else {
        return Vec::new();
    };

    let mut declared: Vec<MergeEntry> = Vec::new();
    for member in arms.iter() {
        for (_, connection) in index.outgoing(member) {
            let Some(source) = index.source_port(connection) else {
                continue;
            };
            if !source.is_data() || source.scope.is_some() {
                continue;
            }
            if !leaves_unit(index, unit, connection, &mut BTreeSet::new()) {
                continue;
            }

            let consumer = &connection.to;
            if merges.contains(&consumer.node, &consumer.port) {
                continue;
            }
            let producer = (connection.from.node.clone(), connection.from.port.clone());
            match declared
                .iter_mut()
                .find(|e| e.consumer.node == consumer.node && e.consumer.port == consumer.port)
            {
                Some(entry) => {
                    entry.producers.insert(producer);
                }
                None => declared.push(MergeEntry {
                    id: format!("{}.{}", consumer.node, consumer.port),
                    consumer: consumer.clone(),
                    producers: BTreeSet::from([producer]),
                    data_type: index
                        .target_port(connection)
                        .and_then(|p| p.data_type())
                        .cloned(),
                }),
            }
        }
    }

    let mut hoisted = Vec::new();
    for entry in declared {
        log::debug!(
            "Hoisting ${} out of branch on '{}' ({} producer(s))",
            entry.id,
            unit.head,
            entry.producers.len()
        );
        hoisted.push(entry.hoisted());
        merges.insert(entry);
    }
    hoisted
}

/// Whether a data connection's value is read outside the unit
fn leaves_unit<'a>(
    index: &GraphIndex<'a>,
    unit: &Unit<'a>,
    connection: &'a Connection,
    visiting: &mut BTreeSet<&'a str>,
) -> bool {
    let target = &connection.to;
    if target.node == EXIT || is_scoped_sink(index, target) {
        return true;
    }
    if is_boundary(&target.node) {
        return false;
    }
    if !index.is_expression(&target.node) {
        return !unit.inside.contains(target.node.as_str());
    }

    // An expression is inlined at each consumer; follow it to them
    let expression = target.node.as_str();
    if !visiting.insert(expression) {
        return false;
    }
    index.outgoing(expression).into_iter().any(|(_, next)| {
        index.is_data(next) && leaves_unit(index, unit, next, visiting)
    })
}

fn is_scoped_sink(index: &GraphIndex<'_>, target: &PortRef) -> bool {
    index
        .resolve(target, Direction::Input)
        .is_some_and(|p| p.scope.is_some())
}
