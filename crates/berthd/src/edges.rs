//! Free-edge computation for auto-placing panels.

use berth_core::{DisplaySlot, Edge};

/// Edges of `slot` not occupied by any view in `occupied`.
///
/// `occupied` yields the slot each live view is bound to and the edge it is
/// docked on. The result keeps [`Edge::CANONICAL`] order, so the same
/// input always gives the same sequence. Callers resolve the
/// "use primary" sentinel before calling.
pub fn free_edges<I>(slot: DisplaySlot, occupied: I) -> Vec<Edge>
where
    I: IntoIterator<Item = (DisplaySlot, Edge)>,
{
    let mut edges = Edge::CANONICAL.to_vec();

    for (view_slot, edge) in occupied {
        if view_slot == slot {
            edges.retain(|e| *e != edge);
        }
    }

    edges
}
