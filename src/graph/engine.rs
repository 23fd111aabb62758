//! The bulk-synchronous engine.
//!
//! Vertices scheduled for the current iteration are swept (serially or with
//! rayon), each callback getting a [VertexView] on its vertex and an
//! [IterContext] to reschedule work. After the sweep the program's
//! `after_iteration` hook runs with the graph lock released, which is where
//! the streaming coordination of [crate::driver] blocks while the ingest
//! thread grows the graph.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use rayon::prelude::*;

use crate::graph::VertexId;
use crate::sketching::Label;
use crate::wl::labels::{EdgeState, NodeState};

type LGraph = Graph<RwLock<NodeState>, RwLock<EdgeState>, Directed, u32>;

/// Borrowed handle on one edge during a vertex callback.
pub struct EdgeView<'a> {
    data: &'a RwLock<EdgeState>,
    neighbour: VertexId,
} // end of EdgeView

impl<'a> EdgeView<'a> {
    /// the vertex at the other end of the edge
    pub fn neighbour_id(&self) -> VertexId {
        self.neighbour
    }

    ///
    pub fn get_data(&self) -> EdgeState {
        self.data.read().clone()
    }

    ///
    pub fn set_data(&self, state: EdgeState) {
        *self.data.write() = state;
    }
} // end of impl EdgeView

/// Borrowed handle on one vertex during a callback.
pub struct VertexView<'a> {
    graph: &'a LGraph,
    idx: NodeIndex<u32>,
} // end of VertexView

impl<'a> VertexView<'a> {
    ///
    pub fn id(&self) -> VertexId {
        self.idx.index()
    }

    ///
    pub fn get_data(&self) -> NodeState {
        self.graph[self.idx].read().clone()
    }

    ///
    pub fn set_data(&self, state: NodeState) {
        *self.graph[self.idx].write() = state;
    }

    ///
    pub fn num_inedges(&self) -> usize {
        self.graph.edges_directed(self.idx, Direction::Incoming).count()
    }

    ///
    pub fn num_outedges(&self) -> usize {
        self.graph.edges_directed(self.idx, Direction::Outgoing).count()
    }

    /// total degree, isolated vertices are skipped by programs
    pub fn num_edges(&self) -> usize {
        self.num_inedges() + self.num_outedges()
    }

    /// materialized view of the inbound edges
    pub fn in_edges(&self) -> Vec<EdgeView<'a>> {
        self.graph
            .edges_directed(self.idx, Direction::Incoming)
            .map(|e| EdgeView {
                data: e.weight(),
                neighbour: e.source().index(),
            })
            .collect()
    } // end of in_edges

    /// materialized view of the outbound edges
    pub fn out_edges(&self) -> Vec<EdgeView<'a>> {
        self.graph
            .edges_directed(self.idx, Direction::Outgoing)
            .map(|e| EdgeView {
                data: e.weight(),
                neighbour: e.target().index(),
            })
            .collect()
    } // end of out_edges

    /// A fixed arbitrary outbound edge. All outbound edges of a vertex carry
    /// the same source type label, and picking a fixed one keeps
    /// single-threaded runs reproducible.
    pub fn any_outedge(&self) -> Option<EdgeView<'a>> {
        self.graph
            .edges_directed(self.idx, Direction::Outgoing)
            .map(|e| EdgeView {
                data: e.weight(),
                neighbour: e.target().index(),
            })
            .next()
    } // end of any_outedge
} // end of impl VertexView

/// What a vertex callback may do besides touching its own neighborhood:
/// read the iteration counter, schedule vertices for the next iteration and
/// end the run.
pub struct IterContext<'a> {
    iteration: usize,
    tasks: &'a Mutex<BTreeSet<VertexId>>,
    last_iteration: &'a Mutex<Option<usize>>,
} // end of IterContext

impl<'a> IterContext<'a> {
    ///
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// schedule a vertex for the next iteration
    pub fn add_task(&self, vertex: VertexId) {
        self.tasks.lock().insert(vertex);
    }

    /// declare the given iteration the last one; the engine stops after it
    pub fn set_last_iteration(&self, iteration: usize) {
        *self.last_iteration.lock() = Some(iteration);
    }
} // end of impl IterContext

/// A vertex program driven by the engine.
pub trait GraphProgram: Sync {
    /// per-vertex callback; never invoked concurrently for the same vertex
    fn update(&self, vertex: &VertexView<'_>, ctx: &IterContext<'_>);

    /// runs after every sweep, with the graph lock released
    fn after_iteration(&self, _iteration: usize, _ctx: &IterContext<'_>) {}
} // end of trait GraphProgram

/// The growable directed graph plus the scheduler state. External vertex
/// identifiers are interned to dense petgraph indices on first sight.
pub struct DynGraph {
    graph: RwLock<LGraph>,
    ids: Mutex<IndexMap<u64, NodeIndex<u32>>>,
    tasks: Mutex<BTreeSet<VertexId>>,
    last_iteration: Mutex<Option<usize>>,
    iteration: Mutex<usize>,
    k_hops: usize,
    parallel: bool,
} // end of DynGraph

impl DynGraph {
    pub fn new(k_hops: usize, parallel: bool) -> Self {
        DynGraph {
            graph: RwLock::new(Graph::default()),
            ids: Mutex::new(IndexMap::new()),
            tasks: Mutex::new(BTreeSet::new()),
            last_iteration: Mutex::new(None),
            iteration: Mutex::new(0),
            k_hops,
            parallel,
        }
    } // end of new

    ///
    pub fn nb_nodes(&self) -> usize {
        self.graph.read().node_count()
    }

    ///
    pub fn nb_edges(&self) -> usize {
        self.graph.read().edge_count()
    }

    /// the next iteration the engine will execute
    pub fn current_iteration(&self) -> usize {
        *self.iteration.lock()
    }

    fn intern(graph: &mut LGraph, ids: &mut IndexMap<u64, NodeIndex<u32>>, ext: u64, k_hops: usize) -> (NodeIndex<u32>, bool) {
        match ids.get(&ext) {
            Some(&idx) => (idx, false),
            None => {
                let idx = graph.add_node(RwLock::new(NodeState::new(k_hops)));
                ids.insert(ext, idx);
                (idx, true)
            }
        }
    } // end of intern

    /// add an edge of the base snapshot; endpoints are interned, nothing is scheduled
    pub fn add_base_edge(&self, src: u64, dst: u64, src_type: Label, dst_type: Label, edge_type: Label, timestamp: u64) {
        let mut graph = self.graph.write();
        let mut ids = self.ids.lock();
        let (s, _) = Self::intern(&mut graph, &mut ids, src, self.k_hops);
        let (d, _) = Self::intern(&mut graph, &mut ids, dst, self.k_hops);
        let state = EdgeState::new(self.k_hops, src_type, dst_type, edge_type, timestamp, false, false);
        graph.add_edge(s, d, RwLock::new(state));
    } // end of add_base_edge

    /// Add a streamed edge: endpoints seen for the first time are flagged on
    /// the edge, and both endpoints are scheduled for the next iteration.
    pub fn add_stream_edge(&self, src: u64, dst: u64, src_type: Label, dst_type: Label, edge_type: Label, timestamp: u64) {
        let (s, d) = {
            let mut graph = self.graph.write();
            let mut ids = self.ids.lock();
            let (s, s_new) = Self::intern(&mut graph, &mut ids, src, self.k_hops);
            let (d, d_new) = Self::intern(&mut graph, &mut ids, dst, self.k_hops);
            let state = EdgeState::new(self.k_hops, src_type, dst_type, edge_type, timestamp, s_new, d_new);
            graph.add_edge(s, d, RwLock::new(state));
            (s, d)
        };
        let mut tasks = self.tasks.lock();
        tasks.insert(s.index());
        tasks.insert(d.index());
    } // end of add_stream_edge

    /// schedule every vertex, the starting state of the base pass
    pub fn schedule_all(&self) {
        let graph = self.graph.read();
        let mut tasks = self.tasks.lock();
        for idx in graph.node_indices() {
            tasks.insert(idx.index());
        }
    } // end of schedule_all

    /// schedule one vertex by its external identifier
    pub fn schedule_vertex(&self, ext: u64) -> bool {
        match self.ids.lock().get(&ext) {
            Some(&idx) => {
                self.tasks.lock().insert(idx.index());
                true
            }
            None => false,
        }
    } // end of schedule_vertex

    /// the relabeling state of a vertex, by external identifier
    pub fn node_state(&self, ext: u64) -> Option<NodeState> {
        let idx = *self.ids.lock().get(&ext)?;
        let graph = self.graph.read();
        let state = graph[idx].read().clone();
        Some(state)
    } // end of node_state

    /// the state of the first edge between two vertices, by external identifiers
    pub fn edge_state_between(&self, src: u64, dst: u64) -> Option<EdgeState> {
        let (s, d) = {
            let ids = self.ids.lock();
            (*ids.get(&src)?, *ids.get(&dst)?)
        };
        let graph = self.graph.read();
        graph.edges_connecting(s, d).next().map(|e| e.weight().read().clone())
    } // end of edge_state_between

    /// Runs the program until it declares a last iteration. The iteration
    /// counter persists across calls so a run can be resumed after growing
    /// the graph.
    pub fn run<P: GraphProgram>(&self, program: &P, no_new_tasks: &AtomicBool) {
        *self.last_iteration.lock() = None;
        loop {
            let iteration = *self.iteration.lock();
            let current: Vec<VertexId> = {
                let mut tasks = self.tasks.lock();
                let v: Vec<VertexId> = tasks.iter().copied().collect();
                tasks.clear();
                v
            };
            log::debug!("iteration {} sweeps {} vertices", iteration, current.len());
            let ctx = IterContext {
                iteration,
                tasks: &self.tasks,
                last_iteration: &self.last_iteration,
            };
            {
                let guard = self.graph.read();
                let graph = &*guard;
                if self.parallel {
                    current.par_iter().for_each(|&id| {
                        let view = VertexView {
                            graph,
                            idx: NodeIndex::new(id),
                        };
                        program.update(&view, &ctx);
                    });
                } else {
                    for &id in &current {
                        let view = VertexView {
                            graph,
                            idx: NodeIndex::new(id),
                        };
                        program.update(&view, &ctx);
                    }
                }
            } // graph lock released before the coordination hook
            no_new_tasks.store(self.tasks.lock().is_empty(), Ordering::SeqCst);
            program.after_iteration(iteration, &ctx);
            *self.iteration.lock() = iteration + 1;
            if let Some(last) = *self.last_iteration.lock() {
                if iteration >= last {
                    break;
                }
            }
        }
    } // end of run
} // end of impl DynGraph

//===============================================================

// end of mod tests
