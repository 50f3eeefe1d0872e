//! Wave computation
//!
//! A wave is a maximal antichain in the remaining DAG: every task whose
//! dependencies are satisfied by the waves before it. Waves are derived on
//! demand and never stored. Tasks that no pass can reach (cyclic or
//! dangling dependencies) are excluded and reported.

use std::collections::{HashMap, HashSet};

use crate::domain::Task;

/// Result of one wave computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavePlan {
    /// Task ids per wave; within a wave, priority order then insertion order
    pub waves: Vec<Vec<String>>,
    /// Tasks unreachable from the completed set
    pub unreachable: Vec<String>,
}

impl WavePlan {
    /// Map from task id to its wave index (1-based, matching display)
    pub fn index(&self) -> HashMap<String, usize> {
        self.waves
            .iter()
            .enumerate()
            .flat_map(|(i, wave)| wave.iter().map(move |id| (id.clone(), i + 1)))
            .collect()
    }
}

/// Compute execution waves for `tasks` given already-completed ids
pub fn compute_waves(tasks: &[&Task], completed: &HashSet<String>) -> WavePlan {
    let mut completed: HashSet<String> = completed.clone();
    let mut remaining: Vec<&Task> = tasks.to_vec();
    let mut waves = Vec::new();

    loop {
        let (ready, rest): (Vec<&Task>, Vec<&Task>) = remaining
            .into_iter()
            .partition(|t| t.dependencies.iter().all(|d| completed.contains(d)));
        if ready.is_empty() {
            remaining = rest;
            break;
        }

        let mut wave = ready;
        // Stable sort keeps insertion order within equal priority
        wave.sort_by_key(|t| t.priority);

        for task in &wave {
            completed.insert(task.id.clone());
        }
        waves.push(wave.into_iter().map(|t| t.id.clone()).collect());
        remaining = rest;
    }

    WavePlan {
        waves,
        unreachable: remaining.into_iter().map(|t| t.id.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id).with_deps(deps)
    }

    fn plan(tasks: &[Task]) -> WavePlan {
        let refs: Vec<&Task> = tasks.iter().collect();
        compute_waves(&refs, &HashSet::new())
    }

    #[test]
    fn test_empty_input() {
        let p = plan(&[]);
        assert!(p.waves.is_empty());
        assert!(p.unreachable.is_empty());
    }

    #[test]
    fn test_single_task() {
        let p = plan(&[task("a", &[])]);
        assert_eq!(p.waves, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_diamond() {
        let tasks = [
            task("r", &[]),
            task("a", &["r"]),
            task("b", &["r"]),
            task("j", &["a", "b"]),
        ];
        let p = plan(&tasks);
        assert_eq!(
            p.waves,
            vec![
                vec!["r".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["j".to_string()],
            ]
        );
        assert!(p.unreachable.is_empty());
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let tasks = [task("a", &["b"]), task("b", &["a"])];
        let p = plan(&tasks);
        assert!(p.waves.is_empty());
        assert_eq!(p.unreachable.len(), 2);
    }

    #[test]
    fn test_dangling_dependency_is_unreachable() {
        let tasks = [task("a", &[]), task("b", &["ghost"])];
        let p = plan(&tasks);
        assert_eq!(p.waves, vec![vec!["a".to_string()]]);
        assert_eq!(p.unreachable, vec!["b".to_string()]);
    }

    #[test]
    fn test_already_completed_satisfies_deps() {
        let tasks = [task("b", &["a"]), task("c", &["b"])];
        let refs: Vec<&Task> = tasks.iter().collect();
        let completed: HashSet<String> = ["a".to_string()].into();
        let p = compute_waves(&refs, &completed);
        assert_eq!(p.waves, vec![vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn test_priority_orders_within_wave() {
        let tasks = [
            task("low", &[]).with_priority(Priority::Low),
            task("crit", &[]).with_priority(Priority::Critical),
            task("med-1", &[]),
            task("med-2", &[]),
        ];
        let p = plan(&tasks);
        assert_eq!(
            p.waves[0],
            vec![
                "crit".to_string(),
                "med-1".to_string(),
                "med-2".to_string(),
                "low".to_string(),
            ]
        );
    }

    #[test]
    fn test_index_is_one_based() {
        let tasks = [task("a", &[]), task("b", &["a"])];
        let p = plan(&tasks);
        let index = p.index();
        assert_eq!(index.get("a"), Some(&1));
        assert_eq!(index.get("b"), Some(&2));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Random DAG: each task may depend only on lower-indexed tasks
        fn arb_dag() -> impl Strategy<Value = Vec<Task>> {
            prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..12).prop_map(
                |dep_picks| {
                    dep_picks
                        .into_iter()
                        .enumerate()
                        .map(|(i, picks)| {
                            let id = format!("t{}", i);
                            let deps: Vec<String> = if i == 0 {
                                Vec::new()
                            } else {
                                let mut deps: Vec<String> =
                                    picks.iter().map(|p| format!("t{}", p.index(i))).collect();
                                deps.sort();
                                deps.dedup();
                                deps
                            };
                            let mut task = Task::new(&id, &id);
                            task.dependencies = deps;
                            task
                        })
                        .collect()
                },
            )
        }

        proptest! {
            /// Waves partition the reachable tasks exactly
            #[test]
            fn waves_partition_tasks(tasks in arb_dag()) {
                let p = plan(&tasks);
                let mut seen = HashSet::new();
                for wave in &p.waves {
                    for id in wave {
                        prop_assert!(seen.insert(id.clone()), "task {} appears twice", id);
                    }
                }
                for id in &p.unreachable {
                    prop_assert!(seen.insert(id.clone()));
                }
                prop_assert_eq!(seen.len(), tasks.len());
            }

            /// Every task's deps are satisfied by strictly earlier waves
            #[test]
            fn waves_respect_dependencies(tasks in arb_dag()) {
                let p = plan(&tasks);
                let mut done: HashSet<String> = HashSet::new();
                for wave in &p.waves {
                    for id in wave {
                        let task = tasks.iter().find(|t| &t.id == id).unwrap();
                        for dep in &task.dependencies {
                            prop_assert!(done.contains(dep), "{} admitted before dep {}", id, dep);
                        }
                    }
                    done.extend(wave.iter().cloned());
                }
            }

            /// Completing the first wave then recomputing yields the same
            /// remaining waves
            #[test]
            fn prefix_completion_is_stable(tasks in arb_dag()) {
                let p = plan(&tasks);
                prop_assume!(!p.waves.is_empty());

                let first: HashSet<String> = p.waves[0].iter().cloned().collect();
                let rest: Vec<&Task> = tasks.iter().filter(|t| !first.contains(&t.id)).collect();
                let p2 = compute_waves(&rest, &first);

                prop_assert_eq!(&p.waves[1..], &p2.waves[..]);
            }
        }
    }
}
