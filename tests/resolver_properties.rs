use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use taskdeck::config::TaskConfig;
use taskdeck::dag::resolve_execution_order;
use taskdeck_test_utils::TaskConfigBuilder;

// Acyclic by construction: task N may only depend on tasks 0..N.
fn acyclic_tasks(max_tasks: usize) -> impl Strategy<Value = Vec<TaskConfig>> {
    (1..=max_tasks).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            |raw_deps| {
                raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let mut builder = TaskConfigBuilder::new(&format!("task_{i}"));
                        if i > 0 {
                            for pick in picks {
                                builder = builder.depends_on(&format!("task_{}", pick % i));
                            }
                        }
                        builder.build()
                    })
                    .collect()
            },
        )
    })
}

proptest! {
    #[test]
    fn every_label_once_and_after_its_dependencies(tasks in acyclic_tasks(12), root_pick in any::<usize>()) {
        let by_label: HashMap<String, TaskConfig> =
            tasks.iter().map(|t| (t.label.clone(), t.clone())).collect();
        let root = &tasks[root_pick % tasks.len()];

        let order = resolve_execution_order(root, |l| by_label.get(l).cloned())
            .expect("acyclic graphs always resolve");

        let labels: Vec<&str> = order.iter().map(|t| t.label.as_str()).collect();
        let unique: HashSet<&str> = labels.iter().copied().collect();
        prop_assert_eq!(unique.len(), labels.len());
        prop_assert_eq!(labels.last().copied(), Some(root.label.as_str()));

        for (pos, task) in order.iter().enumerate() {
            for dep in &task.depends_on {
                let dep_pos = labels.iter().position(|l| l == dep);
                prop_assert!(dep_pos.is_some_and(|p| p < pos), "{} ran before {}", task.label, dep);
            }
        }
    }
}
