//! k-hop neighborhood counting.
//!
//! Counts the distinct nodes reachable from a start node within `k`
//! edges, treating the graph as undirected: both forward and reverse
//! adjacencies are followed.

use std::collections::VecDeque;

use quiver_core::{Graph, NodeId};
use roaring::RoaringBitmap;

/// Number of distinct nodes within `k` undirected hops of `start`,
/// including `start` itself. `k = 0` therefore yields 1.
///
/// BFS with a bitmap visited set and a FIFO of `(node, depth)`;
/// frontier order is deterministic. O(V + E) worst case, bounded by
/// the frontier for small `k`.
pub fn khop_count<G: Graph>(graph: &G, start: NodeId, k: u32) -> u64 {
    let mut visited = RoaringBitmap::new();
    visited.insert(start.as_u32());

    let mut queue = VecDeque::new();
    queue.push_back((start, 0u32));

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= k {
            continue;
        }
        let out = graph.out_edges(node);
        let in_ = graph.in_edges(node);
        for (next, _) in out.iter().chain(in_.iter()) {
            if visited.insert(next.as_u32()) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    visited.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graph::TestGraph;

    #[test]
    fn test_zero_hops_is_just_the_start() {
        let g = TestGraph::new(3, &[(0, 1, 0), (1, 2, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 0), 1);
    }

    #[test]
    fn test_path_graph() {
        // 0 -> 1 -> 2 -> 3
        let g = TestGraph::new(4, &[(0, 1, 0), (1, 2, 0), (2, 3, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 1), 2);
        assert_eq!(khop_count(&g, NodeId(0), 2), 3);
        assert_eq!(khop_count(&g, NodeId(0), 3), 4);
        assert_eq!(khop_count(&g, NodeId(0), 10), 4);
    }

    #[test]
    fn test_traversal_is_undirected() {
        // Edges point at node 0; hops still reach the sources.
        let g = TestGraph::new(3, &[(1, 0, 0), (2, 1, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 1), 2);
        assert_eq!(khop_count(&g, NodeId(0), 2), 3);
    }

    #[test]
    fn test_star() {
        // C -> L1..L4 with C = 0.
        let g = TestGraph::new(5, &[(0, 1, 0), (0, 2, 0), (0, 3, 0), (0, 4, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 1), 5);
        assert_eq!(khop_count(&g, NodeId(1), 1), 2);
        assert_eq!(khop_count(&g, NodeId(1), 2), 5);
    }

    #[test]
    fn test_multi_edges_count_once() {
        let g = TestGraph::new(2, &[(0, 1, 0), (0, 1, 1), (1, 0, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 1), 2);
    }

    #[test]
    fn test_self_loop_does_not_inflate() {
        let g = TestGraph::new(2, &[(0, 0, 0), (0, 1, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 1), 2);
    }

    #[test]
    fn test_isolated_node() {
        let g = TestGraph::new(3, &[(1, 2, 0)]);
        assert_eq!(khop_count(&g, NodeId(0), 5), 1);
    }
}
