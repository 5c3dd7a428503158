//! Structural validation for a parsed task graph (§4.J steps 2-5): cycle
//! detection via DFS with a recursion stack, dangling-reference detection,
//! and an optional agent-availability warning pass.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;

use super::file_format::TaskGraphFile;

pub fn validate_no_cycles(graph: &TaskGraphFile) -> Result<(), CoreError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    for task_id in graph.tasks.keys() {
        let mut cycle_path = Vec::new();
        if !visited.contains(task_id.as_str())
            && has_cycle_dfs(task_id, &graph.tasks, &mut visited, &mut rec_stack, &mut cycle_path)
        {
            return Err(CoreError::TaskGraphCycle { cycle_path });
        }
    }
    Ok(())
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    tasks: &'a std::collections::BTreeMap<String, super::file_format::TaskDef>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    if let Some(task) = tasks.get(node) {
        for dep_id in &task.depends_on {
            if !visited.contains(dep_id.as_str()) {
                if tasks.contains_key(dep_id.as_str())
                    && has_cycle_dfs(dep_id, tasks, visited, rec_stack, cycle_path)
                {
                    return true;
                }
            } else if rec_stack.contains(dep_id.as_str()) {
                cycle_path.push(dep_id.clone());
                return true;
            }
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}

pub fn validate_no_dangling_references(graph: &TaskGraphFile) -> Result<(), CoreError> {
    for (task_id, task) in &graph.tasks {
        for dep in &task.depends_on {
            if !graph.tasks.contains_key(dep) {
                return Err(CoreError::TaskGraph(format!("task '{task_id}' depends on unknown task '{dep}'")));
            }
        }
    }
    Ok(())
}

/// Warnings, not errors, for tasks naming an agent absent from the
/// registry (§4.J step 5).
pub fn check_agent_availability(graph: &TaskGraphFile, known_agents: &[String]) -> Vec<String> {
    let known: HashMap<&str, ()> = known_agents.iter().map(|a| (a.as_str(), ())).collect();
    graph
        .tasks
        .iter()
        .filter_map(|(task_id, task)| {
            let agent = task.agent.as_deref()?;
            if known.contains_key(agent) {
                None
            } else {
                Some(format!("task '{task_id}' names unknown agent '{agent}'"))
            }
        })
        .collect()
}

/// Runs the full validation pipeline in the order §4.J specifies (version
/// check happens during parsing). Returns agent-availability warnings on
/// success.
pub fn validate_pipeline(graph: &TaskGraphFile, known_agents: &[String]) -> Result<Vec<String>, CoreError> {
    validate_no_cycles(graph)?;
    validate_no_dangling_references(graph)?;
    Ok(check_agent_availability(graph, known_agents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::file_format::{SessionDef, TaskDef};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn task(prompt: &str, depends_on: &[&str]) -> TaskDef {
        TaskDef {
            name: prompt.to_string(),
            prompt: prompt.to_string(),
            task_type: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            budget_usd: None,
            agent: None,
            model: None,
            timeout_ms: None,
            max_retries: None,
        }
    }

    fn graph(tasks: Vec<(&str, TaskDef)>) -> TaskGraphFile {
        TaskGraphFile {
            version: "1".to_string(),
            session: SessionDef { name: "s".to_string(), budget_usd: None },
            tasks: tasks.into_iter().map(|(id, t)| (id.to_string(), t)).collect(),
        }
    }

    #[test]
    fn detects_two_node_cycle() {
        let g = graph(vec![("a", task("a", &["b"])), ("b", task("b", &["a"]))]);
        let err = validate_no_cycles(&g).unwrap_err();
        assert!(matches!(err, CoreError::TaskGraphCycle { .. }));
    }

    #[test]
    fn accepts_dag() {
        let g = graph(vec![("a", task("a", &[])), ("b", task("b", &["a"]))]);
        assert!(validate_no_cycles(&g).is_ok());
    }

    #[test]
    fn flags_dangling_reference() {
        let g = graph(vec![("a", task("a", &["missing"]))]);
        assert!(validate_no_dangling_references(&g).is_err());
    }

    #[test]
    fn warns_on_unknown_agent_without_failing() {
        let mut t = task("a", &[]);
        t.agent = Some("ghost".to_string());
        let g = graph(vec![("a", t)]);
        let warnings = check_agent_availability(&g, &["claude".to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    /// Builds a graph of `n` tasks named `t0..t{n-1}` where task `i`'s
    /// `depends_on` is drawn only from `0..i` according to `edge_mask`'s
    /// bits — this can never contain a cycle, since every edge points to a
    /// strictly lower index.
    fn forward_only_graph(n: usize, edge_mask: u64) -> TaskGraphFile {
        let ids: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
        let tasks: BTreeMap<String, TaskDef> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let deps: Vec<&str> = (0..i).filter(|j| edge_mask & (1 << j) != 0).map(|j| ids[j].as_str()).collect();
                (id.clone(), task("p", &deps))
            })
            .collect();
        TaskGraphFile { version: "1".to_string(), session: SessionDef { name: "s".to_string(), budget_usd: None }, tasks }
    }

    proptest! {
        #[test]
        fn acyclic_by_construction_graphs_always_validate(n in 1usize..12, edge_mask in 0u64..4096) {
            let g = forward_only_graph(n, edge_mask);
            prop_assert!(validate_no_cycles(&g).is_ok());
        }

        #[test]
        fn adding_a_back_edge_always_creates_a_detected_cycle(n in 2usize..12, edge_mask in 0u64..4096) {
            let mut g = forward_only_graph(n, edge_mask);
            let last = format!("t{}", n - 1);
            // force a 2-cycle between the first and last node regardless of
            // whatever forward edges already exist between them.
            g.tasks.get_mut(&last).unwrap().depends_on.push("t0".to_string());
            g.tasks.get_mut("t0").unwrap().depends_on.push(last.clone());
            prop_assert!(validate_no_cycles(&g).is_err());
        }
    }
}
