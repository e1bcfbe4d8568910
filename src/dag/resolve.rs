// src/dag/resolve.rs

//! Turning a task's `dependsOn` tree into a linear execution order.

use std::collections::HashSet;

use tracing::debug;

use crate::config::model::TaskConfig;
use crate::errors::{Result, TaskdeckError};

/// Resolve the execution order for `root`.
///
/// Depth-first over `dependsOn`, in list order. Every distinct label appears
/// once, after all of its own dependencies; `root` is always last. `lookup`
/// maps a label to its current definition.
///
/// Fails with [`TaskdeckError::DependencyCycle`] (carrying the label chain
/// that closes the loop) or [`TaskdeckError::UnknownDependency`].
pub fn resolve_execution_order<F>(root: &TaskConfig, lookup: F) -> Result<Vec<TaskConfig>>
where
    F: Fn(&str) -> Option<TaskConfig>,
{
    let mut resolver = Resolver {
        lookup,
        path: Vec::new(),
        done: HashSet::new(),
        order: Vec::new(),
    };
    resolver.visit(root)?;

    debug!(
        task = %root.label,
        order = ?resolver.order.iter().map(|t| t.label.as_str()).collect::<Vec<_>>(),
        "resolved execution order"
    );
    Ok(resolver.order)
}

struct Resolver<F> {
    lookup: F,
    /// Labels on the current DFS path.
    path: Vec<String>,
    done: HashSet<String>,
    order: Vec<TaskConfig>,
}

impl<F> Resolver<F>
where
    F: Fn(&str) -> Option<TaskConfig>,
{
    fn visit(&mut self, task: &TaskConfig) -> Result<()> {
        if self.done.contains(&task.label) {
            return Ok(());
        }

        if let Some(pos) = self.path.iter().position(|l| *l == task.label) {
            let mut chain = self.path[pos..].to_vec();
            chain.push(task.label.clone());
            return Err(TaskdeckError::DependencyCycle { chain });
        }

        self.path.push(task.label.clone());
        for dep_label in &task.depends_on {
            let dep = (self.lookup)(dep_label).ok_or_else(|| TaskdeckError::UnknownDependency {
                task: task.label.clone(),
                dependency: dep_label.clone(),
            })?;
            self.visit(&dep)?;
        }
        self.path.pop();

        self.done.insert(task.label.clone());
        self.order.push(task.clone());
        Ok(())
    }
}
