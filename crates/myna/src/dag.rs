//! A directed acyclic graph keyed by a comparable value.
//!
//! Cycles are not checked while adding nodes and links; callers run
//! `find_cycle` before relying on `toposort`.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct Dag<T, D> {
    nodes: Vec<Node<T, D>>,
    index: HashMap<T, usize>,
}

#[derive(Debug)]
struct Node<T, D> {
    val: T,
    data: D,
    neighbors: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl<T: Clone + Eq + Hash, D> Dag<T, D> {
    pub fn new(expected_size: usize) -> Dag<T, D> {
        Dag {
            nodes: Vec::with_capacity(expected_size),
            index: HashMap::with_capacity(expected_size),
        }
    }

    pub fn add_node(&mut self, val: T, data: D) {
        let id = self.nodes.len();
        self.index.insert(val.clone(), id);
        self.nodes.push(Node {
            val,
            data,
            neighbors: Vec::new(),
        });
    }

    pub fn contains(&self, val: &T) -> bool {
        self.index.contains_key(val)
    }

    /// Adds an edge `from -> to`. Both nodes must have been added.
    pub fn link(&mut self, from: &T, to: &T) {
        let from = self.index[from];
        let to = self.index[to];
        self.nodes[from].neighbors.push(to);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn val(&self, id: usize) -> &T {
        &self.nodes[id].val
    }

    pub fn data(&self, id: usize) -> &D {
        &self.nodes[id].data
    }

    /// Finds the first cycle in the graph with a white/gray/black depth-first
    /// search. The returned path is the detected node followed by its
    /// ancestor chain in the DFS tree.
    pub fn find_cycle(&self) -> Option<Vec<usize>> {
        let mut colors = vec![Color::White; self.nodes.len()];
        let mut parents: Vec<Option<usize>> = vec![None; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if colors[start] != Color::White {
                continue;
            }
            if let Some(found) = self.dfs(start, None, &mut colors, &mut parents) {
                let mut cycle = vec![found];
                let mut parent = parents[found];
                while let Some(p) = parent {
                    cycle.push(p);
                    parent = parents[p];
                }
                return Some(cycle);
            }
        }
        None
    }

    fn dfs(
        &self,
        current: usize,
        parent: Option<usize>,
        colors: &mut Vec<Color>,
        parents: &mut Vec<Option<usize>>,
    ) -> Option<usize> {
        colors[current] = Color::Gray;
        parents[current] = parent;

        for &neighbor in &self.nodes[current].neighbors {
            match colors[neighbor] {
                Color::Black => continue,
                Color::Gray => return Some(current),
                Color::White => {
                    if let Some(found) = self.dfs(neighbor, Some(current), colors, parents) {
                        return Some(found);
                    }
                }
            }
        }

        colors[current] = Color::Black;
        None
    }

    /// Topological order via post-order DFS stacking.
    pub fn toposort(&self) -> Vec<usize> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = Vec::with_capacity(self.nodes.len());

        for id in (0..self.nodes.len()).rev() {
            if !visited[id] {
                self.sort_from(id, &mut visited, &mut stack);
            }
        }

        stack.reverse();
        stack
    }

    fn sort_from(&self, id: usize, visited: &mut Vec<bool>, stack: &mut Vec<usize>) {
        visited[id] = true;
        for &neighbor in &self.nodes[id].neighbors {
            if !visited[neighbor] {
                self.sort_from(neighbor, visited, stack);
            }
        }
        stack.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fixture() -> Dag<i32, ()> {
        let mut dag = Dag::new(6);
        for n in 1..=6 {
            dag.add_node(n, ());
        }
        dag.link(&1, &2);
        dag.link(&1, &3);
        dag.link(&2, &3);
        dag.link(&4, &1);
        dag.link(&4, &5);
        dag.link(&5, &6);
        dag
    }

    #[test]
    fn no_cycles_in_fixture() {
        let dag = fixture();
        assert!(dag.find_cycle().is_none());
    }

    #[test]
    fn closing_edge_creates_cycle() {
        let mut dag = fixture();
        dag.link(&6, &4);

        let cycle = dag.find_cycle().expect("cycle");
        let vals: HashSet<i32> = cycle.iter().map(|&id| *dag.val(id)).collect();
        assert!(vals.is_superset(&HashSet::from([4, 5, 6])));
    }

    #[test]
    fn another_cycle_reports_ancestor_chain() {
        let mut dag = Dag::new(5);
        for n in [1, 2, 4, 5, 6] {
            dag.add_node(n, ());
        }
        dag.link(&1, &2);
        dag.link(&2, &6);
        dag.link(&4, &1);
        dag.link(&4, &5);
        dag.link(&6, &4);

        let cycle = dag.find_cycle().expect("cycle");
        let vals: HashSet<i32> = cycle.iter().map(|&id| *dag.val(id)).collect();
        assert!(vals.is_superset(&HashSet::from([1, 2, 4, 6])));
    }

    #[test]
    fn toposort_orders_dependencies_first() {
        let dag = fixture();
        let sorted: Vec<i32> = dag.toposort().into_iter().map(|id| *dag.val(id)).collect();
        assert_eq!(sorted, vec![4, 1, 2, 3, 5, 6]);
    }
}
