//! End-to-end driving of a sketching run.
//!
//! The engine thread drains the graph; whenever a pass leaves no scheduled
//! vertex the program records the pass and, unless the stream is exhausted,
//! meets the ingest thread on `stream_barrier`, waits on `graph_barrier`
//! while the next batch of edges is folded into the graph, and resumes.
//! The ingest thread raises `stop` together with the last batch so the
//! engine terminates at the following quiescence.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::SystemTime;

use cpu_time::ProcessTime;

use crate::graph::engine::DynGraph;
use crate::io::edgelist::EdgeRecord;
use crate::sketching::histogram::Histogram;
use crate::sketching::params::SketchParams;
use crate::wl::relabel::WlSketcher;

/// The flags the program observes at the end of every sweep.
pub struct CoordFlags {
    /// raised once the base snapshot has been processed over every hop
    pub base_graph_constructed: AtomicBool,
    /// raised by the engine when a sweep scheduled nothing
    pub no_new_tasks: AtomicBool,
    /// raised by the ingest side when no more edges will come
    pub stop: AtomicBool,
} // end of CoordFlags

/// The two 2-party barriers pacing "drain the graph" against "ingest the
/// next batch", plus the flags.
pub struct StreamCoordinator {
    pub flags: CoordFlags,
    pub stream_barrier: Barrier,
    pub graph_barrier: Barrier,
} // end of StreamCoordinator

impl StreamCoordinator {
    pub fn new() -> Self {
        StreamCoordinator {
            flags: CoordFlags {
                base_graph_constructed: AtomicBool::new(false),
                no_new_tasks: AtomicBool::new(false),
                stop: AtomicBool::new(false),
            },
            stream_barrier: Barrier::new(2),
            graph_barrier: Barrier::new(2),
        }
    } // end of new
} // end of impl StreamCoordinator

impl Default for StreamCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished run hands back for inspection: the grown graph with its
/// relabeling state and the histogram with its final sketch.
pub struct SketchRun {
    pub engine: DynGraph,
    pub histogram: Arc<Histogram>,
} // end of SketchRun

/// Loads the base snapshot, runs the base passes, then feeds the stream
/// batches through the barrier protocol until exhaustion. Sketch lines go to
/// `sink` as the window dictates. Single-threaded sweeps (`params.parallel`
/// false) make two runs over the same input byte-identical.
pub fn run_sketcher(
    params: SketchParams,
    base: &[EdgeRecord],
    batches: Vec<Vec<EdgeRecord>>,
    sink: Box<dyn Write + Send>,
) -> anyhow::Result<SketchRun> {
    let cpu_start = ProcessTime::now();
    let sys_start = SystemTime::now();
    //
    let engine = DynGraph::new(params.k_hops, params.parallel);
    for record in base {
        engine.add_base_edge(
            record.src,
            record.dst,
            record.src_type,
            record.dst_type,
            record.edge_type,
            record.timestamp,
        );
    }
    engine.schedule_all();
    log::info!(
        "base graph loaded : {} vertices, {} edges, {} stream batches to come",
        engine.nb_nodes(),
        engine.nb_edges(),
        batches.len()
    );
    //
    let coord = Arc::new(StreamCoordinator::new());
    let hist = Arc::new(Histogram::new(&params));
    let program = WlSketcher::new(params, hist.clone(), coord.clone(), sink);
    if batches.is_empty() {
        // nothing will ever be streamed, the engine may stop at the first quiescence
        coord.flags.stop.store(true, Ordering::SeqCst);
    }
    let nb_batches = batches.len();
    std::thread::scope(|scope| {
        let ingest_coord = coord.clone();
        let engine_ref = &engine;
        scope.spawn(move || {
            for (rank, batch) in batches.iter().enumerate() {
                // the engine is quiescent and blocked on the pair of barriers
                // while the graph is grown
                ingest_coord.stream_barrier.wait();
                for record in batch {
                    engine_ref.add_stream_edge(
                        record.src,
                        record.dst,
                        record.src_type,
                        record.dst_type,
                        record.edge_type,
                        record.timestamp,
                    );
                }
                log::debug!("ingested batch {}/{} ({} edges)", rank + 1, nb_batches, batch.len());
                if rank + 1 == nb_batches {
                    // raised before releasing the engine so the stop check at
                    // the next quiescence cannot miss it
                    ingest_coord.flags.stop.store(true, Ordering::SeqCst);
                }
                ingest_coord.graph_barrier.wait();
            }
        });
        engine.run(&program, &coord.flags.no_new_tasks);
    });
    //
    program.flush()?;
    if let Some(e) = program.take_io_error() {
        return Err(e);
    }
    let sys_t: f64 = sys_start.elapsed().unwrap().as_millis() as f64 / 1000.;
    log::info!(" sketching sys time(s) {:.2e} cpu time(s) {:.2e}", sys_t, cpu_start.elapsed().as_secs());
    Ok(SketchRun {
        engine,
        histogram: hist,
    })
} // end of run_sketcher

//===============================================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::sketching::hasher::hash;
    use parking_lot::Mutex;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // a sink the test keeps a handle on
    #[derive(Clone)]
    struct VecSink(Arc<Mutex<Vec<u8>>>);

    impl VecSink {
        fn new() -> Self {
            VecSink(Arc::new(Mutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn edge(src: u64, dst: u64, src_type: u64, dst_type: u64, edge_type: u64, timestamp: u64) -> EdgeRecord {
        EdgeRecord {
            src,
            dst,
            src_type,
            dst_type,
            edge_type,
            timestamp,
        }
    }

    #[test]
    fn base_then_one_batch() {
        log_init_test();
        // A(1) --7--> B(2) as base, then C(3) --9--> B streamed
        let params = SketchParams::new(4, 1, 0., 0, 1);
        let base = vec![edge(100, 200, 1, 2, 7, 0)];
        let batches = vec![vec![edge(300, 200, 3, 2, 9, 1)]];
        let sink = VecSink::new();
        let run = run_sketcher(params, &base, batches, Box::new(sink.clone())).unwrap();
        // one line for the base pass, one for the stream pass
        let text = sink.contents();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            assert_eq!(line.split(' ').count(), 4);
        }
        //
        assert_eq!(run.histogram.nb_labels(), 7);
        assert_eq!(run.histogram.get_count(hash(b"2 7 1 9 3")), Some(1.));
        assert_eq!(run.engine.node_state(300).unwrap().lb, vec![3, hash(b"3")]);
    }

    #[test]
    fn runs_are_reproducible() {
        log_init_test();
        //
        let base = vec![edge(1, 2, 10, 20, 5, 0), edge(3, 2, 11, 20, 5, 1), edge(2, 4, 20, 30, 6, 2)];
        let batches = vec![
            vec![edge(5, 2, 12, 20, 5, 3), edge(4, 6, 30, 40, 6, 4)],
            vec![edge(6, 2, 40, 20, 5, 5)],
        ];
        let run = || {
            let params = SketchParams::new(8, 2, 0., 0, 1);
            let sink = VecSink::new();
            let res = run_sketcher(params, &base, batches.clone(), Box::new(sink.clone())).unwrap();
            (sink.contents(), res.histogram.nb_labels())
        };
        let (first_out, first_labels) = run();
        let (second_out, second_labels) = run();
        assert!(!first_out.is_empty());
        assert_eq!(first_out, second_out);
        assert_eq!(first_labels, second_labels);
    }

    #[test]
    fn window_gates_the_emissions() {
        log_init_test();
        // nine passes (base + 8 batches) with a window of 3 give 3 lines
        let params = SketchParams::new(4, 1, 0., 0, 3);
        let base = vec![edge(100, 200, 1, 2, 7, 0)];
        let batches: Vec<Vec<EdgeRecord>> = (0..8)
            .map(|i| vec![edge(300 + i, 200, 30 + i, 2, 9, 1 + i)])
            .collect();
        let sink = VecSink::new();
        run_sketcher(params, &base, batches, Box::new(sink.clone())).unwrap();
        assert_eq!(sink.contents().lines().count(), 3);
    }

    #[test]
    fn empty_stream_still_sketches_the_base() {
        log_init_test();
        //
        let params = SketchParams::new(4, 1, 0., 0, 1);
        let base = vec![edge(100, 200, 1, 2, 7, 0)];
        let sink = VecSink::new();
        let run = run_sketcher(params, &base, Vec::new(), Box::new(sink.clone())).unwrap();
        assert_eq!(sink.contents().lines().count(), 1);
        assert_eq!(run.histogram.nb_labels(), 4);
    }

    #[test]
    fn lambda_decays_once_per_pass() {
        log_init_test();
        //
        let mut params = SketchParams::new(4, 1, 0., 0, 1);
        params.lambda = std::f64::consts::LN_2;
        params.decay = 1;
        let base = vec![edge(100, 200, 1, 2, 7, 0)];
        let sink = VecSink::new();
        let run = run_sketcher(params, &base, Vec::new(), Box::new(sink)).unwrap();
        // a single pass halved every counter exactly once
        assert_eq!(run.histogram.get_count(1), Some(0.5));
        assert_eq!(run.histogram.get_count(hash(b"2 7 1")), Some(0.5));
    }
} // end of mod tests
