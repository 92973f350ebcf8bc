// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Dependency resolution for recipe targets
//!
//! [`Resolver`] turns a requested set of identifiers into a build order by
//! depth-first post-order traversal over local `prepared` references.
//! [`DependencyGraph`] is a petgraph view of the whole recipe used for
//! graph output and transitive queries.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

use crate::errors::{PrepError, PrepResult};
use crate::recipe::Recipe;

/// Linear build order for a requested set of targets
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    /// Collection every planned target belongs to
    pub collection: String,

    /// Declared targets, each after all of its local dependencies
    pub order: Vec<String>,

    /// Local declared dependencies of each planned target
    pub dependencies: IndexMap<String, Vec<String>>,

    /// Local references satisfied by the store instead of the recipe
    pub external: Vec<String>,
}

impl BuildPlan {
    /// Declared local dependencies of a target
    pub fn dependencies_of(&self, identifier: &str) -> &[String] {
        self.dependencies
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

#[derive(Default)]
struct Walk {
    marks: HashMap<String, Mark>,
    stack: Vec<String>,
    order: Vec<String>,
    dependencies: IndexMap<String, Vec<String>>,
    external: Vec<String>,
}

/// Computes build orders for one recipe
pub struct Resolver<'a> {
    recipe: &'a Recipe,
    materialized: HashSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(recipe: &'a Recipe) -> Self {
        Self {
            recipe,
            materialized: HashSet::new(),
        }
    }

    /// Identifiers of the local collection already present in the store
    ///
    /// Only consulted for references the recipe does not declare.
    pub fn with_materialized(mut self, identifiers: impl IntoIterator<Item = String>) -> Self {
        self.materialized.extend(identifiers);
        self
    }

    /// Local `prepared` references with no matching recipe entry
    pub fn undeclared_references(recipe: &Recipe) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for entry in recipe.prepare.values() {
            for reference in &entry.uses.prepared {
                let identifier = reference.identifier();
                if reference.is_local(&recipe.name)
                    && recipe.entry(identifier).is_none()
                    && seen.insert(identifier)
                {
                    out.push(identifier.to_string());
                }
            }
        }

        out
    }

    /// Order every declared target
    pub fn resolve_all(&self) -> PrepResult<BuildPlan> {
        let all: Vec<String> = self.recipe.prepare.keys().cloned().collect();
        self.resolve(&all)
    }

    /// Order the requested targets and their local dependencies
    ///
    /// Requested identifiers are visited in declaration order, dependencies
    /// in the order they are listed, so the result is deterministic.
    pub fn resolve(&self, requested: &[String]) -> PrepResult<BuildPlan> {
        let mut roots = Vec::with_capacity(requested.len());
        for identifier in requested {
            let position =
                self.recipe
                    .position(identifier)
                    .ok_or_else(|| PrepError::UnknownTarget {
                        target: identifier.clone(),
                        referenced_by: None,
                    })?;
            roots.push((position, identifier.as_str()));
        }
        roots.sort_unstable();
        roots.dedup();

        let mut walk = Walk::default();
        for (_, identifier) in roots {
            self.visit(identifier, None, &mut walk)?;
        }

        Ok(BuildPlan {
            collection: self.recipe.name.clone(),
            order: walk.order,
            dependencies: walk.dependencies,
            external: walk.external,
        })
    }

    fn visit(&self, identifier: &str, parent: Option<&str>, walk: &mut Walk) -> PrepResult<()> {
        match walk.marks.get(identifier) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = walk
                    .stack
                    .iter()
                    .position(|s| s == identifier)
                    .unwrap_or(0);
                let mut cycle = walk.stack[start..].to_vec();
                cycle.push(identifier.to_string());
                return Err(PrepError::CyclicDependency { cycle });
            }
            None => {}
        }

        let Some(entry) = self.recipe.entry(identifier) else {
            if self.materialized.contains(identifier) {
                walk.marks.insert(identifier.to_string(), Mark::Done);
                walk.external.push(identifier.to_string());
                return Ok(());
            }
            return Err(PrepError::UnknownTarget {
                target: identifier.to_string(),
                referenced_by: parent.map(String::from),
            });
        };

        walk.marks.insert(identifier.to_string(), Mark::InProgress);
        walk.stack.push(identifier.to_string());

        let mut deps = Vec::new();
        for reference in &entry.uses.prepared {
            // Foreign collections are leaves
            if !reference.is_local(&self.recipe.name) {
                continue;
            }
            let dep = reference.identifier();
            self.visit(dep, Some(identifier), walk)?;
            if self.recipe.entry(dep).is_some() && !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }

        walk.stack.pop();
        walk.marks.insert(identifier.to_string(), Mark::Done);
        walk.order.push(identifier.to_string());
        walk.dependencies.insert(identifier.to_string(), deps);

        Ok(())
    }
}

/// Whole-recipe dependency graph
///
/// Nodes are declared targets plus every referenced target the recipe does
/// not declare; an edge runs from a dependency to its dependent.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph; cycles and undeclared references are kept as-is
    pub fn build(recipe: &Recipe) -> Self {
        let mut dag = Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
        };

        for identifier in recipe.prepare.keys() {
            dag.node(identifier);
        }

        for (identifier, entry) in &recipe.prepare {
            let target = dag.name_to_index[identifier];
            for reference in &entry.uses.prepared {
                let label = if reference.is_local(&recipe.name) {
                    reference.identifier().to_string()
                } else {
                    reference.to_string()
                };
                let dep = dag.node(&label);
                if !dag.graph.contains_edge(dep, target) {
                    dag.graph.add_edge(dep, target, ());
                }
            }
        }

        dag
    }

    fn node(&mut self, label: &str) -> NodeIndex {
        if let Some(&idx) = self.name_to_index.get(label) {
            return idx;
        }
        let idx = self.graph.add_node(label.to_string());
        self.name_to_index.insert(label.to_string(), idx);
        idx
    }

    /// Number of nodes, including undeclared references
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Direct dependencies of a target, in the order they were declared
    pub fn dependencies(&self, identifier: &str) -> Option<Vec<String>> {
        self.neighbors(identifier, petgraph::Direction::Incoming)
    }

    /// Targets that directly depend on this one
    pub fn dependents(&self, identifier: &str) -> Option<Vec<String>> {
        self.neighbors(identifier, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, identifier: &str, direction: petgraph::Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(identifier)?;
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(*node, direction).collect();
        nodes.sort_unstable();
        Some(nodes.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    /// Check if target A depends (directly or transitively) on target B
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(&node_a), Some(&node_b)) = (self.name_to_index.get(a), self.name_to_index.get(b))
        else {
            return false;
        };
        if node_a == node_b {
            return self.graph.contains_edge(node_a, node_a);
        }

        petgraph::algo::has_path_connecting(&self.graph, node_b, node_a, None)
    }

    /// Whether the graph contains any cycle
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Text listing of a build plan
    pub fn to_text(&self, plan: &BuildPlan) -> String {
        let mut out = String::new();

        for (i, identifier) in plan.order.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, identifier));

            let deps = self.dependencies(identifier).unwrap_or_default();
            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }
            out.push('\n');
        }

        out
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for idx in self.graph.node_indices() {
            out.push_str(&format!("    n{}[\"{}\"]\n", idx.index(), self.graph[idx]));
        }

        for edge in self.graph.raw_edges() {
            out.push_str(&format!(
                "    n{} --> n{}\n",
                edge.source().index(),
                edge.target().index()
            ));
        }

        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph recipe {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for edge in self.graph.raw_edges() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.graph[edge.source()],
                self.graph[edge.target()]
            ));
        }

        for idx in self.graph.node_indices() {
            if self.graph.neighbors_undirected(idx).next().is_none() {
                out.push_str(&format!("    \"{}\";\n", self.graph[idx]));
            }
        }

        out.push_str("}\n");
        out
    }
}
