//! The wants/wanted_by selection graph.
//!
//! `wants` and `wanted_by` clauses form a directed graph over stacks: an
//! edge S → T means selecting S pulls T in. Cycles are tolerated; they
//! only mean the pulled-in set is computed by reachability rather than
//! any strict ordering, so detection logs a warning and traversal carries
//! on regardless.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{trace, warn};

use crate::config::Stack;
use crate::project::ProjectPath;

use super::Manager;

/// Directed graph over stack directories built from `wants`/`wanted_by`
/// relations.
pub struct WantsDag {
    graph: DiGraph<ProjectPath, ()>,
    node_map: HashMap<ProjectPath, NodeIndex>,
}

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl WantsDag {
    /// Builds the graph over the given stacks: one edge S → T per entry T
    /// in `S.wants`, one edge U → S per entry U in `S.wanted_by`.
    pub fn build<'a>(stacks: impl IntoIterator<Item = &'a Stack>) -> Self {
        let mut dag = Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        };

        for stack in stacks {
            trace!(stack = %stack.dir, "adding stack to wants dag");
            let stack_idx = dag.ensure_node(&stack.dir);
            for wanted in &stack.wants {
                let wanted_idx = dag.ensure_node(wanted);
                dag.add_edge(stack_idx, wanted_idx);
            }
            for wanting in &stack.wanted_by {
                let wanting_idx = dag.ensure_node(wanting);
                dag.add_edge(wanting_idx, stack_idx);
            }
        }

        dag
    }

    fn ensure_node(&mut self, dir: &ProjectPath) -> NodeIndex {
        if let Some(&index) = self.node_map.get(dir) {
            index
        } else {
            let index = self.graph.add_node(dir.clone());
            self.node_map.insert(dir.clone(), index);
            index
        }
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Detects cycles with a colored DFS. Returns the cycle path for the
    /// caller to report; the graph stays usable either way.
    pub fn detect_cycles(&self) -> Result<(), String> {
        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut path: Vec<ProjectPath> = Vec::new();

        for node in self.graph.node_indices() {
            colors.insert(node, Color::White);
        }

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                let cycle_str = cycle
                    .iter()
                    .map(|dir| dir.as_str().to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(cycle_str);
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<ProjectPath>,
    ) -> Option<Vec<ProjectPath>> {
        colors.insert(node, Color::Gray);
        path.push(self.graph[node].clone());

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let cycle_start =
                        path.iter().position(|dir| *dir == self.graph[neighbor]).unwrap();
                    let mut cycle = path[cycle_start..].to_vec();
                    cycle.push(self.graph[neighbor].clone());
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// The set of stacks pulled in by the given seeds: every node
    /// reachable along wants edges, seeds included, each at most once, in
    /// first-visit (BFS) order. Robust to cycles.
    pub fn wanted_closure(&self, seeds: &[ProjectPath]) -> Vec<ProjectPath> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        for seed in seeds {
            if let Some(&index) = self.node_map.get(seed)
                && visited.insert(index)
            {
                order.push(self.graph[index].clone());
                queue.push_back(index);
            }
        }

        while let Some(current) = queue.pop_front() {
            for neighbor in self.graph.neighbors(current) {
                if visited.insert(neighbor) {
                    order.push(self.graph[neighbor].clone());
                    queue.push_back(neighbor);
                }
            }
        }

        order
    }
}

impl Manager {
    /// Expands a selection of stacks with every stack their `wants` and
    /// `wanted_by` clauses pull in, transitively.
    ///
    /// Cycles in the clauses are reported as a warning and otherwise
    /// ignored; clauses naming directories that are not stacks are skipped
    /// with a warning.
    pub fn add_wanted_of(&self, seeds: &[&Stack]) -> Vec<Stack> {
        let dag = WantsDag::build(self.root().stacks());

        if let Err(cycle) = dag.detect_cycles() {
            warn!(%cycle, "stack selection clauses (wants/wanted_by) have cycles (ignored)");
        }

        let seed_dirs: Vec<ProjectPath> = seeds.iter().map(|stack| stack.dir.clone()).collect();
        dag.wanted_closure(&seed_dirs)
            .into_iter()
            .filter_map(|dir| match self.root().lookup(&dir) {
                Some(stack) => Some(stack.clone()),
                None => {
                    warn!(%dir, "wants clause names a directory that is not a stack (ignored)");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stack(dir: &str, wants: &[&str], wanted_by: &[&str]) -> Stack {
        Stack {
            dir: ProjectPath::new(dir),
            host_dir: PathBuf::from(dir),
            name: dir.trim_start_matches('/').to_string(),
            description: String::new(),
            tags: Vec::new(),
            watch: Vec::new(),
            wants: wants.iter().map(|s| ProjectPath::new(*s)).collect(),
            wanted_by: wanted_by.iter().map(|s| ProjectPath::new(*s)).collect(),
            is_changed: false,
        }
    }

    #[test]
    fn wants_edges_are_followed_transitively() {
        let stacks = vec![
            stack("/a", &["/b"], &[]),
            stack("/b", &["/c"], &[]),
            stack("/c", &[], &[]),
            stack("/d", &[], &[]),
        ];
        let dag = WantsDag::build(&stacks);
        assert!(dag.detect_cycles().is_ok());

        let closure = dag.wanted_closure(&[ProjectPath::new("/a")]);
        assert_eq!(
            closure,
            vec![ProjectPath::new("/a"), ProjectPath::new("/b"), ProjectPath::new("/c")]
        );
    }

    #[test]
    fn wanted_by_reverses_the_edge() {
        // "/b wanted_by /a" pulls /b in whenever /a is selected
        let stacks = vec![stack("/a", &[], &[]), stack("/b", &[], &["/a"])];
        let dag = WantsDag::build(&stacks);

        let closure = dag.wanted_closure(&[ProjectPath::new("/a")]);
        assert_eq!(closure, vec![ProjectPath::new("/a"), ProjectPath::new("/b")]);

        let closure = dag.wanted_closure(&[ProjectPath::new("/b")]);
        assert_eq!(closure, vec![ProjectPath::new("/b")]);
    }

    #[test]
    fn cycles_are_detected_but_traversal_terminates() {
        let stacks = vec![
            stack("/a", &["/b"], &[]),
            stack("/b", &["/c"], &[]),
            stack("/c", &["/a"], &[]),
        ];
        let dag = WantsDag::build(&stacks);

        let cycle = dag.detect_cycles().unwrap_err();
        assert!(cycle.contains("/a"), "got: {cycle}");

        let closure = dag.wanted_closure(&[ProjectPath::new("/b")]);
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn duplicate_edges_collapse() {
        // /a wants /b and /b is wanted_by /a: same edge both ways
        let stacks = vec![stack("/a", &["/b"], &[]), stack("/b", &[], &["/a"])];
        let dag = WantsDag::build(&stacks);
        assert_eq!(dag.node_count(), 2);
        assert_eq!(dag.edge_count(), 1);
    }

    #[test]
    fn seeds_appear_once_in_first_visit_order() {
        let stacks = vec![stack("/a", &["/c"], &[]), stack("/b", &["/c"], &[]), stack("/c", &[], &[])];
        let dag = WantsDag::build(&stacks);

        let closure = dag.wanted_closure(&[
            ProjectPath::new("/b"),
            ProjectPath::new("/a"),
            ProjectPath::new("/b"),
        ]);
        assert_eq!(
            closure,
            vec![ProjectPath::new("/b"), ProjectPath::new("/a"), ProjectPath::new("/c")]
        );
    }
}
