//! Weakly connected component counting.

use std::collections::VecDeque;

use quiver_core::{Graph, NodeId};
use roaring::RoaringBitmap;

/// Number of weakly connected components in the full graph.
///
/// Starts a fresh BFS over the union of forward and reverse adjacency
/// from each unvisited node, bumping the counter once per start.
/// O(N + M) time, O(N) space.
pub fn connected_components<G: Graph>(graph: &G) -> u64 {
    let mut visited = RoaringBitmap::new();
    let mut queue = VecDeque::new();
    let mut components = 0u64;

    for start in 0..graph.num_nodes() as u32 {
        if !visited.insert(start) {
            continue;
        }
        components += 1;

        queue.push_back(NodeId(start));
        while let Some(node) = queue.pop_front() {
            let out = graph.out_edges(node);
            let in_ = graph.in_edges(node);
            for (next, _) in out.iter().chain(in_.iter()) {
                if visited.insert(next.as_u32()) {
                    queue.push_back(next);
                }
            }
        }
    }

    components
}
