//! The relabeling vertex program.
//!
//! The base snapshot is processed in k_hops + 1 synchronous sweeps: sweep 0
//! assigns every vertex its type label, sweep g hashes the previous label of
//! a vertex together with the generation g-1 labels published on its inbound
//! edges, sorted by timestamp. Once the base graph is done the sketch slots
//! are initialized and every subsequent sweep handles streamed edges: a new
//! vertex is initialized on first sight, a known vertex resumes refinement at
//! the lowest generation its inbound edges still owe it (the `itr` cursor of
//! [EdgeState](crate::wl::labels::EdgeState)), so each generation of each
//! vertex is produced exactly once per relevant change.
//!
//! Every produced label goes to the [Histogram]; labels produced after the
//! base phase also re-evaluate the min-hash slots.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::StreamCoordinator;
use crate::graph::engine::{EdgeView, GraphProgram, IterContext, VertexView};
use crate::sketching::hasher::{chunkify, hash};
use crate::sketching::histogram::Histogram;
use crate::sketching::params::SketchParams;
use crate::sketching::Label;
use crate::wl::labels::{EdgeState, NodeState};

/// The WL sketching program: owns the output sink, shares the histogram with
/// the driver and coordinates with the ingest thread through the barriers of
/// [StreamCoordinator].
pub struct WlSketcher {
    params: SketchParams,
    hist: Arc<Histogram>,
    coord: Arc<StreamCoordinator>,
    sink: Mutex<Box<dyn Write + Send>>,
    io_error: Mutex<Option<anyhow::Error>>,
} // end of WlSketcher

// the relabeling string of one generation: the vertex's previous label, then
// for each neighbor (sorted upstream) the edge type label when the first
// generation is being produced, and the neighbor label of the previous
// generation. Tokens are space separated.
fn relabel_string(own: Label, neighborhood: &[EdgeState], generation: usize) -> String {
    let mut text = own.to_string();
    for el in neighborhood {
        if generation == 1 {
            text.push(' ');
            text.push_str(&el.edg.to_string());
        }
        text.push(' ');
        text.push_str(&el.src[generation - 1].to_string());
    }
    text
} // end of relabel_string

fn any_outedge_or_die<'a>(vertex: &VertexView<'a>) -> EdgeView<'a> {
    match vertex.any_outedge() {
        Some(edge) => edge,
        None => {
            log::error!(
                "vertex {} has no inbound edge and no outbound edge to take a type label from",
                vertex.id()
            );
            std::process::exit(1);
        }
    }
} // end of any_outedge_or_die

impl WlSketcher {
    pub fn new(
        params: SketchParams,
        hist: Arc<Histogram>,
        coord: Arc<StreamCoordinator>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        WlSketcher {
            params,
            hist,
            coord,
            sink: Mutex::new(sink),
            io_error: Mutex::new(None),
        }
    } // end of new

    ///
    pub fn get_histogram(&self) -> &Arc<Histogram> {
        &self.hist
    }

    /// flush the sink, to be called once the engine has stopped
    pub fn flush(&self) -> anyhow::Result<()> {
        self.sink.lock().flush()?;
        Ok(())
    }

    /// the first sink write error if one occurred during the run
    pub fn take_io_error(&self) -> Option<anyhow::Error> {
        self.io_error.lock().take()
    }

    // neighborhood strings are chunkified on request; plain labels (type
    // labels, leaf self-hashes) always enter the histogram whole
    fn publish(&self, text: &str, new_label: Label, is_base: bool) {
        if !self.params.chunkify {
            self.hist.update(new_label, is_base);
        } else {
            for chunk in chunkify(text, self.params.chunk_size) {
                self.hist.update(chunk, is_base);
            }
        }
    } // end of publish

    // Sweep 0 of the base graph: the label of generation 0 is the vertex type,
    // read from the destination label of an inbound edge, or from the source
    // label of an outbound edge for a vertex nothing points to.
    fn base_init(&self, vertex: &VertexView<'_>, ctx: &IterContext<'_>) {
        let mut nl = NodeState::new(self.params.k_hops);
        let in_edges = vertex.in_edges();
        if !in_edges.is_empty() {
            nl.lb[0] = in_edges[0].get_data().dst;
            nl.is_leaf = false;
            for edge in &in_edges {
                let mut el = edge.get_data();
                el.itr += 1;
                edge.set_data(el);
            }
        } else {
            nl.lb[0] = any_outedge_or_die(vertex).get_data().src[0];
            nl.is_leaf = true;
        }
        nl.tm[0] = 0;
        vertex.set_data(nl.clone());
        self.hist.update(nl.lb[0], true);
        ctx.add_task(vertex.id());
        log::trace!("vertex {} initial label {}", vertex.id(), nl.lb[0]);
    } // end of base_init

    // Sweeps 1..=k_hops of the base graph. Every inbound edge contributes to
    // exactly the generation named by the sweep.
    fn base_relabel(&self, vertex: &VertexView<'_>, ctx: &IterContext<'_>) {
        let g = ctx.iteration();
        let mut neighborhood = Vec::<EdgeState>::new();
        for edge in vertex.in_edges() {
            let mut el = edge.get_data();
            assert_eq!(
                el.itr,
                g,
                "edge into vertex {} carries cursor {} at base sweep {}",
                vertex.id(),
                el.itr,
                g
            );
            neighborhood.push(el.clone());
            el.itr += 1;
            edge.set_data(el);
        }
        let mut nl = vertex.get_data();
        if neighborhood.is_empty() {
            // no inbound neighbors: the new label derives from the previous self
            let new_label = hash(nl.lb[g - 1].to_string().as_bytes());
            self.hist.update(new_label, true);
            nl.lb[g] = new_label;
            nl.tm[g] = nl.tm[g - 1];
            vertex.set_data(nl);
            for edge in vertex.out_edges() {
                let mut el = edge.get_data();
                el.src[g] = new_label;
                el.tme[g] = el.tme[g - 1];
                edge.set_data(el);
            }
        } else {
            neighborhood.sort_by_key(|el| el.tme[g - 1]);
            let text = relabel_string(nl.lb[g - 1], &neighborhood, g);
            let new_label = hash(text.as_bytes());
            log::trace!("vertex {} relabel string \"{}\" -> {}", vertex.id(), text, new_label);
            self.publish(&text, new_label, true);
            nl.lb[g] = new_label;
            nl.tm[g] = neighborhood[0].tme[g - 1];
            vertex.set_data(nl.clone());
            for edge in vertex.out_edges() {
                let mut el = edge.get_data();
                el.src[g] = new_label;
                el.tme[g] = nl.tm[g];
                edge.set_data(el);
            }
        }
        if g < self.params.k_hops {
            ctx.add_task(vertex.id());
        }
    } // end of base_relabel

    // initialization of a vertex first seen in the stream, without inbound
    // edges: the whole label chain is a repeated self hash and the vertex is
    // done until an inbound edge reaches it
    fn stream_new_leaf(&self, vertex: &VertexView<'_>, out_edges: &[EdgeView<'_>]) {
        let k = self.params.k_hops;
        let mut nl = NodeState::new(k);
        nl.lb[0] = any_outedge_or_die(vertex).get_data().src[0];
        nl.tm[0] = 0;
        for h in 1..=k {
            nl.lb[h] = hash(nl.lb[h - 1].to_string().as_bytes());
            nl.tm[h] = 0;
        }
        nl.is_leaf = true;
        vertex.set_data(nl.clone());
        for h in 0..=k {
            self.hist.update(nl.lb[h], false);
        }
        for edge in out_edges {
            let mut el = edge.get_data();
            for j in 1..=k {
                el.src[j] = nl.lb[j];
                el.tme[j] = el.tme[j - 1];
            }
            el.new_src = false;
            edge.set_data(el);
        }
        log::trace!("new leaf vertex {} labeled up to generation {}", vertex.id(), k);
    } // end of stream_new_leaf

    // initialization of a vertex first seen in the stream, with inbound
    // edges: only generation 0 is known at this point, the rest follows the
    // incremental path right below
    fn stream_new_vertex(&self, vertex: &VertexView<'_>, in_edges: &[EdgeView<'_>], out_edges: &[EdgeView<'_>]) {
        let k = self.params.k_hops;
        let mut nl = vertex.get_data();
        nl.lb[0] = in_edges[0].get_data().dst;
        nl.tm[0] = 0;
        nl.is_leaf = false;
        for h in 1..=k {
            // 0 marks a generation not yet produced
            nl.lb[h] = 0;
        }
        vertex.set_data(nl.clone());
        for edge in in_edges {
            let mut el = edge.get_data();
            assert_eq!(
                el.itr,
                0,
                "fresh vertex {} reached by an edge with cursor {}",
                vertex.id(),
                el.itr
            );
            el.itr += 1;
            el.new_dst = false;
            edge.set_data(el);
        }
        for edge in out_edges {
            let mut el = edge.get_data();
            el.new_src = false;
            edge.set_data(el);
        }
        self.hist.update(nl.lb[0], false);
        log::trace!("new vertex {} initial label {}", vertex.id(), nl.lb[0]);
    } // end of stream_new_vertex

    // Streaming sweeps. New-vertex detection, then either the leaf refresh or
    // the incremental relabeling driven by the lowest owed generation.
    fn stream_update(&self, vertex: &VertexView<'_>, ctx: &IterContext<'_>) {
        let k = self.params.k_hops;
        let in_edges = vertex.in_edges();
        let out_edges = vertex.out_edges();
        // a vertex is new iff one of its edges still flags the endpoint unseen
        let is_new = out_edges.iter().any(|e| e.get_data().new_src)
            || in_edges.iter().any(|e| e.get_data().new_dst);
        if is_new {
            if in_edges.is_empty() {
                self.stream_new_leaf(vertex, &out_edges);
                return;
            }
            self.stream_new_vertex(vertex, &in_edges, &out_edges);
            // falls through: the first incremental relabel happens right away
        }
        if in_edges.is_empty() {
            // a known leaf is only rescheduled to publish its chain onto
            // out-edges that did not exist when the chain was produced
            let nl = vertex.get_data();
            assert!(nl.is_leaf, "vertex {} without inbound edges is not marked leaf", vertex.id());
            for edge in &out_edges {
                let mut el = edge.get_data();
                for j in 1..=k {
                    el.src[j] = nl.lb[j];
                    el.tme[j] = el.tme[j - 1];
                }
                edge.set_data(el);
            }
            log::trace!("streaming refreshed leaf vertex {}", vertex.id());
            return;
        }
        //
        let mut nl = vertex.get_data();
        if nl.is_leaf {
            // a former leaf now has inbound edges
            nl.is_leaf = false;
        }
        // a new edge between two known vertices starts from the labels the
        // source already has, so out-edges are synced before relabeling
        for edge in &out_edges {
            let mut el = edge.get_data();
            for j in 1..=k {
                el.src[j] = nl.lb[j];
                el.tme[j] = nl.tm[j];
            }
            edge.set_data(el);
        }
        // fresh inbound edges enter the cursor machine, then the lowest owed
        // generation is what this callback produces
        let mut min_itr = k + 2;
        for edge in &in_edges {
            let mut el = edge.get_data();
            if el.itr == 0 {
                el.itr += 1;
                edge.set_data(el.clone());
            }
            min_itr = min_itr.min(el.itr);
        }
        assert!(
            min_itr >= 1 && min_itr <= k + 1,
            "vertex {} has generation cursor {} out of range",
            vertex.id(),
            min_itr
        );
        if min_itr == k + 1 {
            // every inbound edge has contributed all its generations
            log::trace!("vertex {} saturated", vertex.id());
            return;
        }
        let mut neighborhood = Vec::<EdgeState>::with_capacity(in_edges.len());
        for edge in &in_edges {
            let mut el = edge.get_data();
            neighborhood.push(el.clone());
            if el.itr < k + 1 {
                el.itr += 1;
                edge.set_data(el);
            }
        }
        neighborhood.sort_by_key(|el| el.tme[min_itr - 1]);
        let text = relabel_string(nl.lb[min_itr - 1], &neighborhood, min_itr);
        let new_label = hash(text.as_bytes());
        log::trace!("vertex {} streaming relabel string \"{}\" -> {}", vertex.id(), text, new_label);
        self.publish(&text, new_label, false);
        nl.lb[min_itr] = new_label;
        vertex.set_data(nl);
        for edge in &out_edges {
            let mut el = edge.get_data();
            el.src[min_itr] = new_label;
            el.tme[min_itr] = neighborhood[0].tme[min_itr - 1];
            if el.itr == k + 1 {
                // a saturated downstream edge must carry this fresh generation
                // again, rewind its cursor
                el.itr = min_itr + 1;
            }
            edge.set_data(el);
            if min_itr < k {
                ctx.add_task(edge.neighbour_id());
            }
        }
        if min_itr < k + 1 {
            ctx.add_task(vertex.id());
        }
    } // end of stream_update
} // end of impl WlSketcher

impl GraphProgram for WlSketcher {
    fn update(&self, vertex: &VertexView<'_>, ctx: &IterContext<'_>) {
        if vertex.num_edges() == 0 {
            log::debug!("isolated vertex {} skipped", vertex.id());
            return;
        }
        let iteration = ctx.iteration();
        if iteration == 0 {
            self.base_init(vertex, ctx);
        } else if iteration <= self.params.k_hops {
            self.base_relabel(vertex, ctx);
        } else {
            self.stream_update(vertex, ctx);
        }
    } // end of update

    fn after_iteration(&self, iteration: usize, ctx: &IterContext<'_>) {
        if iteration == self.params.k_hops {
            self.coord.flags.base_graph_constructed.store(true, Ordering::SeqCst);
            self.hist.create_sketch();
            log::info!("base graph complete at iteration {}, sketch slots initialized", iteration);
        }
        if !self.coord.flags.no_new_tasks.load(Ordering::SeqCst) {
            return;
        }
        // a pass is over: decay if configured, then emit under the window
        if self.params.lambda != 0. {
            self.hist.decay();
        }
        let emitted = {
            let mut sink = self.sink.lock();
            self.hist.emit(&mut **sink)
        };
        if let Err(e) = emitted {
            log::error!("sketch sink write failed: {}", e);
            let mut io_error = self.io_error.lock();
            if io_error.is_none() {
                *io_error = Some(e);
            }
        }
        if self.coord.flags.stop.load(Ordering::SeqCst) {
            log::debug!("stop requested, iteration {} is the last one", iteration);
            ctx.set_last_iteration(iteration);
            return;
        }
        // hand over to the ingest thread for the next batch
        self.coord.stream_barrier.wait();
        self.coord.flags.no_new_tasks.store(false, Ordering::SeqCst);
        self.coord.graph_barrier.wait();
    } // end of after_iteration
} // end of impl GraphProgram for WlSketcher

//===============================================================

// end of mod tests
