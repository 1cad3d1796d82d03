//! Dependency tables computed once per workflow
//!
//! Step predecessors, data producers and inlined expression
//! dependencies are resolved up front so that scheduling rounds only
//! do set lookups.

use std::collections::{BTreeMap, BTreeSet};

use flow_model::{is_boundary, Connection, GraphIndex, ScopeRef};

use crate::error::SchedulerError;

/// Dependencies of one instance
#[derive(Debug, Default, Clone)]
pub(crate) struct Dependencies<'a> {
    /// Scheduled producers of this instance's data, seen through expressions
    pub data: BTreeSet<&'a str>,
    /// Expressions feeding this instance, directly or transitively
    pub expressions: BTreeSet<&'a str>,
}

impl<'a> Dependencies<'a> {
    fn absorb(&mut self, other: &Dependencies<'a>) {
        self.data.extend(other.data.iter().copied());
        self.expressions.extend(other.expressions.iter().copied());
    }
}

pub(crate) struct Analysis<'a> {
    step_preds: BTreeMap<&'a str, Vec<&'a str>>,
    deps: BTreeMap<&'a str, Dependencies<'a>>,
    descendants: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> Analysis<'a> {
    pub fn new(index: &GraphIndex<'a>) -> Result<Self, SchedulerError> {
        let workflow = index.workflow();
        let mut analysis = Self {
            step_preds: BTreeMap::new(),
            deps: BTreeMap::new(),
            descendants: BTreeMap::new(),
        };

        for instance in &workflow.instances {
            let id = instance.id.as_str();
            let preds = step_predecessors(index, id)?;
            analysis.step_preds.insert(id, preds);

            let mut visiting = BTreeSet::new();
            analysis.compute_deps(index, id, &mut visiting);

            // Record this instance under every enclosing scope owner
            let mut region = instance.parent_scope.as_ref();
            let mut hops = 0;
            while let Some(scope) = region {
                if hops > workflow.instances.len() {
                    break;
                }
                analysis
                    .descendants
                    .entry(scope.instance.as_str())
                    .or_default()
                    .insert(id);
                region = index
                    .instance(&scope.instance)
                    .and_then(|parent| parent.parent_scope.as_ref());
                hops += 1;
            }
        }

        Ok(analysis)
    }

    /// Distinct instances whose step outputs trigger `id`
    pub fn step_preds(&self, id: &str) -> &[&'a str] {
        self.step_preds.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn deps(&self, id: &str) -> Option<&Dependencies<'a>> {
        self.deps.get(id)
    }

    /// Scheduled producers `id` reads from
    pub fn data_deps(&self, id: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.deps(id).into_iter().flat_map(|d| d.data.iter().copied())
    }

    /// Expressions `id` reads from
    pub fn expr_deps(&self, id: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.deps(id)
            .into_iter()
            .flat_map(|d| d.expressions.iter().copied())
    }

    /// Instances nested anywhere inside `id`'s scopes
    pub fn descendants(&self, id: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.descendants
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        self.descendants
            .get(ancestor)
            .is_some_and(|set| set.contains(id))
    }

    /// Dependencies of a set of connections, such as those into `Exit`
    pub fn deps_of(&self, index: &GraphIndex<'a>, connections: &[&'a Connection]) -> Dependencies<'a> {
        let mut deps = Dependencies::default();
        for connection in connections {
            let Some(source) = data_source(index, connection) else {
                continue;
            };
            if index.is_expression(source) {
                deps.expressions.insert(source);
                if let Some(inner) = self.deps.get(source) {
                    deps.absorb(inner);
                }
            } else {
                deps.data.insert(source);
            }
        }
        deps
    }

    fn compute_deps(&mut self, index: &GraphIndex<'a>, id: &'a str, visiting: &mut BTreeSet<&'a str>) {
        if self.deps.contains_key(id) || !visiting.insert(id) {
            return;
        }

        let mut deps = Dependencies::default();
        for (_, connection) in index.incoming(id) {
            // Scoped inputs collect body results and are not prerequisites
            if index.target_port(connection).is_none_or(|p| p.scope.is_some()) {
                continue;
            }
            let Some(source) = data_source(index, connection) else {
                continue;
            };
            if index.is_expression(source) {
                deps.expressions.insert(source);
                self.compute_deps(index, source, visiting);
                if let Some(inner) = self.deps.get(source) {
                    deps.absorb(inner);
                }
            } else {
                deps.data.insert(source);
            }
        }

        visiting.remove(id);
        self.deps.insert(id, deps);
    }
}

/// Source instance of a data connection, unless it is a workflow
/// parameter or a parent's scoped item
fn data_source<'a>(index: &GraphIndex<'a>, connection: &'a Connection) -> Option<&'a str> {
    let port = index.source_port(connection)?;
    if !port.is_data() || port.scope.is_some() || is_boundary(&connection.from.node) {
        return None;
    }
    Some(connection.from.node.as_str())
}

fn step_predecessors<'a>(index: &GraphIndex<'a>, id: &str) -> Result<Vec<&'a str>, SchedulerError> {
    let mut preds: Vec<&'a str> = Vec::new();
    for (_, connection) in index.incoming(id) {
        let Some(port) = index.source_port(connection) else {
            if !index.has_node(&connection.from.node) {
                return Err(SchedulerError::UnknownInstance(connection.from.node.clone()));
            }
            continue;
        };
        // Entry from Start or from a parent scope is the region trigger
        if !port.is_step() || port.scope.is_some() || is_boundary(&connection.from.node) {
            continue;
        }
        let source = connection.from.node.as_str();
        if !preds.contains(&source) {
            preds.push(source);
        }
    }
    Ok(preds)
}

/// Human-readable label for a region
pub(crate) fn region_label(region: &Option<ScopeRef>) -> String {
    match region {
        Some(scope) => scope.to_string(),
        None => crate::constants::ROOT_REGION.to_string(),
    }
}
