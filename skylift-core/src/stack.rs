//! Stack - The set of resources composed for one deployment
//!
//! A Stack owns every declared resource. Declaring a resource checks that
//! its binding and identity are unique and that everything it refers to has
//! already been declared, so a Stack is always a closed, acyclic graph.

use std::collections::HashMap;

use log::debug;

use crate::graph::{Dependency, DependencyGraph, DependencyKind, GraphError};
use crate::resource::{Handle, Resource, ResourceId};

#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a resource to the stack and return a handle to it
    pub fn declare(&mut self, resource: Resource) -> Result<Handle, GraphError> {
        if self.index.contains_key(&resource.binding) {
            return Err(GraphError::DuplicateBinding(resource.binding));
        }
        if self.find(&resource.id).is_some() {
            return Err(GraphError::DuplicateResource {
                resource_type: resource.id.resource_type,
                name: resource.id.name,
            });
        }

        let targets = resource
            .references()
            .into_iter()
            .chain(resource.options.depends_on.iter().cloned())
            .chain(resource.options.provider.iter().cloned());
        for target in targets {
            if !self.index.contains_key(&target) {
                return Err(GraphError::UnknownReference {
                    from: resource.binding.clone(),
                    target,
                });
            }
        }

        debug!("declared {} as '{}'", resource.id, resource.binding);

        let handle = Handle {
            binding: resource.binding.clone(),
            resource_type: resource.id.resource_type.clone(),
        };
        self.index
            .insert(resource.binding.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(handle)
    }

    pub fn get(&self, binding: &str) -> Option<&Resource> {
        self.index.get(binding).map(|&i| &self.resources[i])
    }

    pub fn find(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Build the dependency graph (references, explicit ordering, providers)
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for resource in &self.resources {
            graph.add_node(resource.binding.clone());
            for target in resource.references() {
                graph.add_edge(
                    resource.binding.clone(),
                    Dependency {
                        target,
                        kind: DependencyKind::Reference,
                    },
                );
            }
            for target in &resource.options.depends_on {
                graph.add_edge(
                    resource.binding.clone(),
                    Dependency {
                        target: target.clone(),
                        kind: DependencyKind::Explicit,
                    },
                );
            }
            if let Some(provider) = &resource.options.provider {
                graph.add_edge(
                    resource.binding.clone(),
                    Dependency {
                        target: provider.clone(),
                        kind: DependencyKind::Provider,
                    },
                );
            }
        }
        graph
    }

    /// Resources sorted so every dependency precedes its dependents
    pub fn ordered(&self) -> Result<Vec<&Resource>, GraphError> {
        let order = self.dependency_graph().topological_order()?;
        order
            .iter()
            .map(|binding| {
                self.get(binding)
                    .ok_or_else(|| GraphError::MissingHandle(binding.clone()))
            })
            .collect()
    }
}
