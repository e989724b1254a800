//! Step dependency graph
//!
//! Edges are inferred at load time from output-key -> input-key wiring
//! plus explicit `after` conditions. The graph is checked for cycles
//! once (Kahn's algorithm); a ready-set scheduler walks it at run time.

/// Dependency graph over steps, indexed by declared step order
#[derive(Debug)]
pub struct StepGraph {
    /// index -> successor indexes
    adjacency: Vec<Vec<usize>>,
    /// index -> predecessor indexes (dependencies)
    predecessors: Vec<Vec<usize>>,
}

impl StepGraph {
    pub fn new(step_count: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); step_count],
            predecessors: vec![Vec::new(); step_count],
        }
    }

    /// Record that `to` depends on `from`. Duplicate edges are dropped.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if self.adjacency[from].contains(&to) {
            return;
        }
        self.adjacency[from].push(to);
        self.predecessors[to].push(from);
    }

    /// Direct dependencies of a step, as declared step indexes
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Kahn's algorithm. Returns the index of some step on a cycle when
    /// the graph is not a DAG.
    pub fn check_acyclic(&self) -> Result<(), usize> {
        let n = self.adjacency.len();
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(|p| p.len()).collect();

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0usize;

        while let Some(node) = queue.pop() {
            visited += 1;
            for &next in &self.adjacency[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if visited == n {
            Ok(())
        } else {
            // Any node still holding an in-degree sits on a cycle
            let on_cycle = (0..n)
                .find(|&i| in_degree[i] > 0)
                .unwrap_or(0);
            Err(on_cycle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_is_acyclic() {
        let mut g = StepGraph::new(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);

        assert!(g.check_acyclic().is_ok());
        assert_eq!(g.dependencies(2), &[1]);
        assert!(g.dependencies(0).is_empty());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = StepGraph::new(2);
        g.add_edge(0, 1);
        g.add_edge(0, 1);

        assert_eq!(g.dependencies(1), &[0]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut g = StepGraph::new(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 0);

        let on_cycle = g.check_acyclic().unwrap_err();
        assert!(on_cycle < 3);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = StepGraph::new(1);
        g.add_edge(0, 0);
        assert!(g.check_acyclic().is_err());
    }

    #[test]
    fn diamond_is_acyclic() {
        let mut g = StepGraph::new(4);
        g.add_edge(0, 1);
        g.add_edge(0, 2);
        g.add_edge(1, 3);
        g.add_edge(2, 3);

        assert!(g.check_acyclic().is_ok());
        assert_eq!(g.dependencies(3), &[1, 2]);
    }
}
