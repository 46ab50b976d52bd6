//! Directed reachability.

use std::collections::VecDeque;

use quiver_core::{Graph, NodeId};
use roaring::RoaringBitmap;

/// True if a directed path from `src` to `dst` exists.
///
/// Forward BFS with early termination on reaching `dst`. Reachability
/// is reflexive: `src == dst` is always true. Unlike k-hop, only
/// forward adjacency is followed.
pub fn reachable<G: Graph>(graph: &G, src: NodeId, dst: NodeId) -> bool {
    if src == dst {
        return true;
    }

    let mut visited = RoaringBitmap::new();
    visited.insert(src.as_u32());

    let mut queue = VecDeque::new();
    queue.push_back(src);

    while let Some(node) = queue.pop_front() {
        for (next, _) in graph.out_edges(node).iter() {
            if next == dst {
                return true;
            }
            if visited.insert(next.as_u32()) {
                queue.push_back(next);
            }
        }
    }
    false
}
