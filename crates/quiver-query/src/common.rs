//! Common-neighbor counting via bitmap intersection.

use quiver_core::{Graph, NodeId};
use roaring::RoaringBitmap;

/// The union neighborhood of `node`: every node adjacent via either an
/// out-edge or an in-edge, as a bitmap.
pub fn union_neighborhood<G: Graph>(graph: &G, node: NodeId) -> RoaringBitmap {
    let mut bitmap = RoaringBitmap::new();
    for (next, _) in graph.out_edges(node).iter() {
        bitmap.insert(next.as_u32());
    }
    for (next, _) in graph.in_edges(node).iter() {
        bitmap.insert(next.as_u32());
    }
    bitmap
}

/// `|N(n1) ∩ ... ∩ N(nk)|` where `N(x)` is the union neighborhood.
///
/// Materializes the first neighborhood and intersects the rest into it,
/// shrinking as it goes. A single node yields the size of its own union
/// neighborhood; an empty list yields 0.
pub fn common_neighbor_count<G: Graph>(graph: &G, nodes: &[NodeId]) -> u64 {
    let Some((&first, rest)) = nodes.split_first() else {
        return 0;
    };
    let mut acc = union_neighborhood(graph, first);
    for &node in rest {
        if acc.is_empty() {
            return 0;
        }
        acc &= union_neighborhood(graph, node);
    }
    acc.len()
}
