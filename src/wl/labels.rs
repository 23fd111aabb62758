//! Per-vertex and per-edge relabeling state.

use crate::sketching::Label;

/// The relabeling state of a vertex: one label and one timestamp per
/// generation. Generation h summarizes the h-hop inbound neighborhood.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// generation labels, length k_hops + 1
    pub lb: Vec<Label>,
    /// minimum inbound timestamp observed at each generation, tm[0] is always 0
    pub tm: Vec<u64>,
    /// true iff the vertex has no inbound edges
    pub is_leaf: bool,
} // end of NodeState

impl NodeState {
    pub fn new(k_hops: usize) -> Self {
        NodeState {
            lb: vec![0; k_hops + 1],
            tm: vec![0; k_hops + 1],
            is_leaf: false,
        }
    } // end of new

    /// number of generations carried
    pub fn nb_generations(&self) -> usize {
        self.lb.len()
    }
} // end of impl NodeState

/// The relabeling state of an edge.
///
/// `itr` is the cursor of a small state machine: 0 the edge was never used,
/// g the edge has contributed up to generation g-1 -> g of its destination,
/// k_hops + 1 the edge is saturated and does not reschedule anything by
/// itself. `new_src`/`new_dst` flag the first sighting of an endpoint
/// streamed into the graph.
#[derive(Debug, Clone)]
pub struct EdgeState {
    /// the source vertex's label at each generation, as published on this edge
    pub src: Vec<Label>,
    /// timestamps carried alongside src
    pub tme: Vec<u64>,
    /// the destination vertex type label
    pub dst: Label,
    /// the edge type label
    pub edg: Label,
    /// generation cursor, see above
    pub itr: usize,
    /// the source vertex has never been seen before this edge was streamed
    pub new_src: bool,
    /// the destination vertex has never been seen before this edge was streamed
    pub new_dst: bool,
} // end of EdgeState

impl EdgeState {
    pub fn new(
        k_hops: usize,
        src_type: Label,
        dst_type: Label,
        edge_type: Label,
        timestamp: u64,
        new_src: bool,
        new_dst: bool,
    ) -> Self {
        let mut src = vec![0; k_hops + 1];
        let mut tme = vec![0; k_hops + 1];
        src[0] = src_type;
        tme[0] = timestamp;
        EdgeState {
            src,
            tme,
            dst: dst_type,
            edg: edge_type,
            itr: 0,
            new_src,
            new_dst,
        }
    } // end of new

    /// true once the cursor has run through every generation
    pub fn is_saturated(&self, k_hops: usize) -> bool {
        self.itr == k_hops + 1
    }
} // end of impl EdgeState

//===============================================================

// end of mod tests
