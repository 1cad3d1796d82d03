//! Input resolution and hoisted merge bindings

use std::collections::{BTreeMap, BTreeSet};

use flow_model::{DataType, Direction, GraphIndex, Port, PortBinding, PortRef, EXIT, START};

use crate::plan::{Export, HoistedBinding, ReturnBinding, ValueSource};

/// A binding declared before a branch and written by the arm that ran
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergeEntry {
    pub id: String,
    pub consumer: PortRef,
    /// `(instance, port)` outputs that write the binding
    pub producers: BTreeSet<(String, String)>,
    pub data_type: Option<DataType>,
}

impl MergeEntry {
    pub fn hoisted(&self) -> HoistedBinding {
        HoistedBinding {
            id: self.id.clone(),
            consumer: self.consumer.clone(),
            data_type: self.data_type.clone(),
        }
    }
}

/// All merge bindings of a plan, keyed by consumer input
#[derive(Debug, Default)]
pub(crate) struct MergeTable {
    entries: Vec<MergeEntry>,
    by_consumer: BTreeMap<(String, String), usize>,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, node: &str, port: &str) -> bool {
        self.by_consumer
            .contains_key(&(node.to_string(), port.to_string()))
    }

    /// Insert a new entry; returns `false` when the consumer already has one
    pub fn insert(&mut self, entry: MergeEntry) -> bool {
        let key = (entry.consumer.node.clone(), entry.consumer.port.clone());
        if self.by_consumer.contains_key(&key) {
            return false;
        }
        self.by_consumer.insert(key, self.entries.len());
        self.entries.push(entry);
        true
    }

    pub fn get(&self, node: &str, port: &str) -> Option<&MergeEntry> {
        self.by_consumer
            .get(&(node.to_string(), port.to_string()))
            .map(|&idx| &self.entries[idx])
    }

    /// Binding id that `producer` writes for `consumer`, if hoisted
    pub fn binding_for(&self, consumer: &PortRef, producer: &PortRef) -> Option<&str> {
        self.get(&consumer.node, &consumer.port)
            .filter(|entry| {
                entry
                    .producers
                    .contains(&(producer.node.clone(), producer.port.clone()))
            })
            .map(|entry| entry.id.as_str())
    }

    /// Outputs an instance publishes, in entry order
    pub fn exports_of(&self, instance: &str) -> Vec<Export> {
        let mut exports = Vec::new();
        for entry in &self.entries {
            for (node, port) in &entry.producers {
                if node == instance {
                    exports.push(Export {
                        port: port.clone(),
                        binding: entry.id.clone(),
                    });
                }
            }
        }
        exports
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Where an input port of `instance` gets its value
///
/// A connection wins over an instance binding, which wins over the
/// port's own default or fallback expression.
pub(crate) fn resolve_input(
    index: &GraphIndex<'_>,
    merges: &MergeTable,
    instance: &str,
    port: &Port,
) -> ValueSource {
    let connections = index.connections_into(instance, &port.name);
    if let Some((_, connection)) = connections.first() {
        return connection_source(index, merges, &connection.from, &connection.to);
    }

    let bound = index
        .instance(instance)
        .and_then(|i| i.bindings.get(&port.name));
    match bound {
        Some(PortBinding::Literal(value)) => ValueSource::Literal {
            value: value.clone(),
        },
        Some(PortBinding::Expression(code)) => ValueSource::Expression { code: code.clone() },
        None => match (port.default_value(), port.expression()) {
            (Some(value), _) => ValueSource::Literal {
                value: value.clone(),
            },
            (None, Some(code)) => ValueSource::Expression {
                code: code.to_string(),
            },
            (None, None) => ValueSource::Unbound,
        },
    }
}

fn connection_source(
    index: &GraphIndex<'_>,
    merges: &MergeTable,
    from: &PortRef,
    to: &PortRef,
) -> ValueSource {
    if let Some(binding) = merges.binding_for(to, from) {
        return ValueSource::Merged {
            binding: binding.to_string(),
        };
    }
    if from.node == START {
        return ValueSource::WorkflowInput {
            port: from.port.clone(),
        };
    }
    let scoped = index
        .resolve(from, Direction::Output)
        .and_then(|p| p.scope.clone());
    match scoped {
        Some(scope) => ValueSource::ScopeItem {
            instance: from.node.clone(),
            scope,
            port: from.port.clone(),
        },
        None => ValueSource::Output {
            instance: from.node.clone(),
            port: from.port.clone(),
        },
    }
}

/// One binding per exit port, in port order
pub(crate) fn return_bindings(index: &GraphIndex<'_>, merges: &MergeTable) -> Vec<ReturnBinding> {
    let Some(exit_ports) = index.node_ports(EXIT) else {
        return Vec::new();
    };

    exit_ports
        .iter()
        .map(|port| {
            let mut sources: Vec<ValueSource> = Vec::new();
            for (_, connection) in index.connections_into(EXIT, &port.name) {
                let source = if port.is_step() {
                    ValueSource::Signal {
                        instance: connection.from.node.clone(),
                        port: connection.from.port.clone(),
                    }
                } else {
                    connection_source(index, merges, &connection.from, &connection.to)
                };
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
            ReturnBinding {
                port: port.name.clone(),
                sources,
            }
        })
        .collect()
}
