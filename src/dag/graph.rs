// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::TaskConfig;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must finish before this one runs.
    deps: Vec<String>,
    /// Direct dependents: tasks that list this one in `dependsOn`.
    dependents: Vec<String>,
}

/// Adjacency view over a set of task definitions, keyed by label.
///
/// Unlike the run-time resolver this graph tolerates dangling references and
/// cycles; it exists for reporting (cycle warnings at load time, "who
/// depends on me" when a task is removed).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DagNode>,
}

impl DependencyGraph {
    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskConfig>,
    {
        let mut nodes: HashMap<String, DagNode> = HashMap::new();

        for task in tasks {
            nodes.entry(task.label.clone()).or_default().deps = task.depends_on.clone();
        }

        let labels: Vec<String> = nodes.keys().cloned().collect();
        for label in labels {
            let deps = nodes
                .get(&label)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(label.clone());
                }
            }
        }

        Self { nodes }
    }

    pub fn dependents_of(&self, label: &str) -> &[String] {
        self.nodes
            .get(label)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Groups of labels that depend on each other, including tasks that list
    /// themselves. Each group is sorted; groups are sorted by first label.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for label in self.nodes.keys() {
            graph.add_node(label.as_str());
        }
        for (label, node) in &self.nodes {
            for dep in &node.deps {
                if self.nodes.contains_key(dep) {
                    graph.add_edge(dep.as_str(), label.as_str(), ());
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut labels: Vec<String> = scc.into_iter().map(str::to_string).collect();
                labels.sort();
                labels
            })
            .collect();
        cycles.sort();
        cycles
    }
}
