//! Graph - Dependency analysis over declared resources

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// Errors raised while building or ordering the resource graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Binding '{0}' is declared more than once")]
    DuplicateBinding(String),

    #[error("Resource {resource_type}::{name} is declared more than once")]
    DuplicateResource { resource_type: String, name: String },

    #[error("'{from}' refers to undeclared binding '{target}'")]
    UnknownReference { from: String, target: String },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("No handle available for {0}")]
    MissingHandle(String),
}

/// Why one resource depends on another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
    /// An attribute refers to one of the target's outputs
    Reference,
    /// Declared ordering (`dependsOn`)
    Explicit,
    /// The target is the resource's explicit provider
    Provider,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Reference => write!(f, "ref"),
            DependencyKind::Explicit => write!(f, "dependsOn"),
            DependencyKind::Provider => write!(f, "provider"),
        }
    }
}

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target resource binding name
    pub target: String,
    pub kind: DependencyKind,
}

/// Dependency graph keyed by binding name
///
/// Nodes keep their insertion order so orderings are deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    /// Resource binding name -> list of dependencies
    pub edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        let node = node.into();
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    /// Add a dependency edge; both ends become nodes
    pub fn add_edge(&mut self, from: impl Into<String>, dependency: Dependency) {
        let from = from.into();
        self.add_node(from.clone());
        self.add_node(dependency.target.clone());

        let existing = self.edges.entry(from.clone()).or_default();
        if existing.iter().any(|d| d.target == dependency.target) {
            return;
        }
        let target = dependency.target.clone();
        existing.push(dependency);
        self.reverse_edges.entry(target).or_default().push(from);
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Get direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    /// Get resources that depend on this resource
    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

    /// Resources with no dependencies
    pub fn roots(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(n).is_empty())
            .cloned()
            .collect()
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Return one cycle as a path of bindings, first node repeated at the end
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.find_cycle_from(node, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_from(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.dependencies_of(node) {
            if let Some(cycle) = self.find_cycle_from(&dep.target, visited, stack) {
                return Some(cycle);
            }
        }

        stack.pop();
        None
    }

    /// Order nodes so every dependency precedes its dependents
    ///
    /// Ties are broken by insertion order.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let position: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.dependencies_of(n).len()))
            .collect();

        // position -> binding, smallest position first
        let mut ready: BTreeMap<usize, &str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(n, _)| (position[n], *n))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some((_, node)) = ready.pop_first() {
            order.push(node.to_string());
            for dependent in self.dependents_of(node) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(position[dependent.as_str()], dependent.as_str());
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(GraphError::DependencyCycle(
                self.find_cycle().unwrap_or_default(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(target: &str) -> Dependency {
        Dependency {
            target: target.to_string(),
            kind: DependencyKind::Reference,
        }
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut g = DependencyGraph::new();
        g.add_node("folder");
        g.add_edge("folder", edge("ownership"));
        g.add_edge("folder", edge("accessBlock"));
        g.add_edge("ownership", edge("bucket"));
        g.add_edge("accessBlock", edge("bucket"));

        let order = g.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
        assert!(pos("bucket") < pos("ownership"));
        assert!(pos("bucket") < pos("accessBlock"));
        assert!(pos("ownership") < pos("folder"));
        assert!(pos("accessBlock") < pos("folder"));
    }

    #[test]
    fn independent_nodes_keep_insertion_order() {
        let mut g = DependencyGraph::new();
        g.add_node("c");
        g.add_node("a");
        g.add_node("b");
        assert_eq!(g.topological_order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn cycle_is_reported() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", edge("b"));
        g.add_edge("b", edge("c"));
        g.add_edge("c", edge("a"));

        assert!(g.has_cycle());
        match g.topological_order() {
            Err(GraphError::DependencyCycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("Expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_edges_are_collapsed() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", edge("b"));
        g.add_edge("a", edge("b"));
        assert_eq!(g.dependencies_of("a").len(), 1);
        assert_eq!(g.dependents_of("b"), &["a".to_string()]);
    }

    #[test]
    fn roots_have_no_dependencies() {
        let mut g = DependencyGraph::new();
        g.add_edge("cdn", edge("bucket"));
        g.add_edge("record", edge("cdn"));
        assert_eq!(g.roots(), vec!["bucket".to_string()]);
    }
}
