//! The decaying label histogram and the min-hash slots maintained over it.
//!
//! The histogram maps every label seen so far to a real valued counter. The
//! sketch is S slots; slot i keeps the label realizing the minimum of the
//! per-slot hash over the whole histogram, and the minimum itself. Counter
//! updates, sketch maintenance, decay and emission all serialize behind one
//! mutex: the histogram is shared by every vertex callback of the engine.

use std::collections::BTreeMap;
use std::io::Write;

use ndarray::Array1;
use parking_lot::Mutex;

use crate::sketching::icws::{IcwsSampler, LabelParams};
use crate::sketching::params::{ParamMode, SketchParams};
use crate::sketching::Label;

struct HistoState {
    /// label -> counter. Ordered so scans (and argmin ties) are deterministic.
    counts: BTreeMap<Label, f64>,
    /// per slot, the label realizing the current minimum
    sketch: Array1<Label>,
    /// per slot, the minimum hash witnessed so far
    hash: Array1<f64>,
    /// passes since the last decay
    t: usize,
    /// passes since the last emission
    w: usize,
    ///
    sampler: IcwsSampler,
} // end of HistoState

/// The histogram singleton. Owned by the driver and shared by reference with
/// the relabeler, one per process run.
pub struct Histogram {
    sketch_size: usize,
    lambda: f64,
    /// number of passes between two decays
    decay_every: usize,
    /// number of passes between two emissions
    window: usize,
    /// e^(-lambda)
    damp: f64,
    param_mode: ParamMode,
    state: Mutex<HistoState>,
} // end of Histogram

impl Histogram {
    pub fn new(params: &SketchParams) -> Self {
        let sketch_size = params.get_sketch_size();
        let state = HistoState {
            counts: BTreeMap::new(),
            sketch: Array1::zeros(sketch_size),
            hash: Array1::from_elem(sketch_size, f64::INFINITY),
            t: 0,
            w: 0,
            sampler: IcwsSampler::new(sketch_size, params.param_mode),
        };
        Histogram {
            sketch_size,
            lambda: params.lambda,
            decay_every: params.decay,
            window: params.window,
            damp: (-params.lambda).exp(),
            param_mode: params.param_mode,
            state: Mutex::new(state),
        }
    } // end of new

    /// Inserts the label at 1 or increments its counter. During streaming
    /// (`is_base == false`) the slots are re-evaluated against the label's new
    /// counter: the counter only grows, its hash only shrinks, so a min update
    /// suffices.
    pub fn update(&self, label: Label, is_base: bool) {
        let mut state = self.state.lock();
        let count = {
            let c = state.counts.entry(label).and_modify(|v| *v += 1.).or_insert(1.);
            *c
        };
        if is_base {
            return;
        }
        let params = state.sampler.label_params(label);
        for i in 0..self.sketch_size {
            let a = params.hash_value(i, count);
            if a < state.hash[i] {
                state.hash[i] = a;
                state.sketch[i] = label;
            }
        }
    } // end of update

    /// One-shot initialization of the slots, called at the transition from
    /// base graph to streaming, before the first streaming update. Scans the
    /// whole histogram and keeps the per-slot argmin. O(|histogram| * S).
    pub fn create_sketch(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.sampler.pregenerate();
        // in on-the-fly mode the parameters of each label are materialized
        // once in a local map before the scan
        let base_map: Option<BTreeMap<Label, LabelParams>> = match self.param_mode {
            ParamMode::OnTheFly => Some(
                state
                    .counts
                    .keys()
                    .map(|&label| (label, state.sampler.label_params(label)))
                    .collect(),
            ),
            ParamMode::Pregen(_) => None,
        };
        let mut sketch = Array1::<Label>::zeros(self.sketch_size);
        let mut hash = Array1::from_elem(self.sketch_size, f64::INFINITY);
        for (&label, &count) in state.counts.iter() {
            let params = match base_map.as_ref() {
                Some(map) => match map.get(&label) {
                    Some(p) => p.clone(),
                    None => {
                        log::error!("label {} should exist in the local base map, but it does not", label);
                        std::process::exit(1);
                    }
                },
                None => state.sampler.label_params(label),
            };
            for i in 0..self.sketch_size {
                let a = params.hash_value(i, count);
                if a < hash[i] {
                    hash[i] = a;
                    sketch[i] = label;
                }
            }
        }
        state.sketch = sketch;
        state.hash = hash;
        log::info!("sketch created over {} labels", state.counts.len());
    } // end of create_sketch

    /// Advances the decay tick; every `decay_every` passes all counters and
    /// all slot hashes are multiplied by e^(-lambda). A no-op when lambda is 0.
    /// Damping the minima alongside the counters keeps the slot ordering of
    /// surviving labels, the per-label (r, β, c) being fixed; labels first
    /// seen after a decay compete against already damped minima.
    pub fn decay(&self) {
        if self.lambda == 0. {
            return;
        }
        let mut state = self.state.lock();
        state.t += 1;
        if state.t >= self.decay_every {
            for v in state.counts.values_mut() {
                *v *= self.damp;
            }
            let damp = self.damp;
            state.hash.mapv_inplace(|h| h * damp);
            state.t = 0;
            log::debug!("histogram decayed by {:.3e}", self.damp);
        }
    } // end of decay

    /// Advances the window tick; every `window` passes the current sketch
    /// line goes out to the sink.
    pub fn emit(&self, sink: &mut dyn Write) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.w += 1;
        if state.w >= self.window {
            Self::write_line(&state, sink)?;
            state.w = 0;
        }
        Ok(())
    } // end of emit

    /// Unconditionally writes the current sketch line: the S slot labels
    /// separated by single spaces, one trailing newline.
    pub fn record_sketch(&self, sink: &mut dyn Write) -> anyhow::Result<()> {
        let state = self.state.lock();
        Self::write_line(&state, sink)
    } // end of record_sketch

    fn write_line(state: &HistoState, sink: &mut dyn Write) -> anyhow::Result<()> {
        let line = state
            .sketch
            .iter()
            .map(|label| label.to_string())
            .collect::<Vec<String>>()
            .join(" ");
        writeln!(sink, "{}", line)?;
        Ok(())
    } // end of write_line

    /// number of distinct labels currently in the histogram
    pub fn nb_labels(&self) -> usize {
        self.state.lock().counts.len()
    }

    /// the counter of a label if present
    pub fn get_count(&self, label: Label) -> Option<f64> {
        self.state.lock().counts.get(&label).copied()
    }

    /// sum of all counters
    pub fn total_mass(&self) -> f64 {
        self.state.lock().counts.values().sum()
    }

    /// a copy of the current slot labels
    pub fn get_sketch(&self) -> Vec<Label> {
        self.state.lock().sketch.to_vec()
    }

    /// a copy of the current slot minima
    pub fn get_hash_values(&self) -> Vec<f64> {
        self.state.lock().hash.to_vec()
    }
} // end of impl Histogram

//===============================================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::sketching::icws::IcwsSampler;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn small_params(sketch_size: usize) -> SketchParams {
        // window of 1 : a line per pass
        SketchParams::new(sketch_size, 1, 0., 0, 1)
    }

    #[test]
    fn update_inserts_then_increments() {
        log_init_test();
        //
        let hist = Histogram::new(&small_params(4));
        hist.update(17, true);
        hist.update(17, true);
        hist.update(23, true);
        assert_eq!(hist.nb_labels(), 2);
        assert_eq!(hist.get_count(17), Some(2.));
        assert_eq!(hist.get_count(23), Some(1.));
        assert_eq!(hist.get_count(99), None);
    }

    #[test]
    fn create_sketch_realizes_slot_minima() {
        log_init_test();
        //
        let sketch_size = 8;
        let hist = Histogram::new(&small_params(sketch_size));
        let labels: Vec<u64> = vec![3, 1416, 926_535, 8_979_323, 84, 62_643];
        for (rank, &label) in labels.iter().enumerate() {
            for _ in 0..=rank {
                hist.update(label, true);
            }
        }
        hist.create_sketch();
        let hash = hist.get_hash_values();
        let sketch = hist.get_sketch();
        // every slot minimum bounds the hash of every label at its current counter
        let sampler = IcwsSampler::new(sketch_size, ParamMode::OnTheFly);
        for (rank, &label) in labels.iter().enumerate() {
            let params = sampler.label_params(label);
            for i in 0..sketch_size {
                let a = params.hash_value(i, (rank + 1) as f64);
                assert!(hash[i] <= a + 1.0e-12);
            }
        }
        // and the argmin label actually realizes it
        for i in 0..sketch_size {
            assert!(labels.contains(&sketch[i]));
            let rank = labels.iter().position(|&l| l == sketch[i]).unwrap();
            let a = sampler.label_params(sketch[i]).hash_value(i, (rank + 1) as f64);
            assert!((hash[i] - a).abs() < 1.0e-12);
        }
    }

    #[test]
    fn streaming_updates_match_from_scratch_sketch() {
        log_init_test();
        //
        let sketch_size = 16;
        // incremental : base counts, sketch creation, then streamed increments
        let incremental = Histogram::new(&small_params(sketch_size));
        for label in [5u64, 11, 400, 12_345] {
            incremental.update(label, true);
        }
        incremental.create_sketch();
        for label in [400u64, 400, 11, 77_777] {
            incremental.update(label, false);
        }
        // from scratch : the same final multiset entirely at sketch creation
        let from_scratch = Histogram::new(&small_params(sketch_size));
        for label in [5u64, 11, 11, 400, 400, 400, 12_345, 77_777] {
            from_scratch.update(label, true);
        }
        from_scratch.create_sketch();
        //
        assert_eq!(incremental.get_sketch(), from_scratch.get_sketch());
        let h1 = incremental.get_hash_values();
        let h2 = from_scratch.get_hash_values();
        for i in 0..sketch_size {
            assert!((h1[i] - h2[i]).abs() < 1.0e-12);
        }
    }

    #[test]
    fn streaming_order_does_not_matter() {
        log_init_test();
        //
        let sketch_size = 8;
        let forward = Histogram::new(&small_params(sketch_size));
        forward.create_sketch();
        for label in [1u64, 2, 3, 2, 1, 1] {
            forward.update(label, false);
        }
        let backward = Histogram::new(&small_params(sketch_size));
        backward.create_sketch();
        for label in [1u64, 1, 2, 3, 1, 2] {
            backward.update(label, false);
        }
        assert_eq!(forward.get_sketch(), backward.get_sketch());
        assert_eq!(forward.get_hash_values(), backward.get_hash_values());
    }

    #[test]
    fn decay_halves_counters_and_minima() {
        log_init_test();
        //
        let mut params = small_params(4);
        params.lambda = std::f64::consts::LN_2;
        params.decay = 1;
        let hist = Histogram::new(&params);
        for _ in 0..4 {
            hist.update(42, true);
        }
        hist.create_sketch();
        let sketch_before = hist.get_sketch();
        let hash_before = hist.get_hash_values();
        let mass_before = hist.total_mass();
        hist.decay();
        assert!((hist.get_count(42).unwrap() - 2.).abs() < 1.0e-12);
        assert!((hist.total_mass() - mass_before * 0.5).abs() < 1.0e-12);
        let hash_after = hist.get_hash_values();
        for i in 0..4 {
            assert!((hash_after[i] - hash_before[i] * 0.5).abs() < 1.0e-12);
        }
        // argmin labels unchanged
        assert_eq!(hist.get_sketch(), sketch_before);
    }

    #[test]
    fn decay_is_a_noop_without_lambda() {
        log_init_test();
        //
        let hist = Histogram::new(&small_params(4));
        hist.update(7, true);
        hist.create_sketch();
        let before = hist.get_hash_values();
        hist.decay();
        assert_eq!(hist.get_count(7), Some(1.));
        assert_eq!(hist.get_hash_values(), before);
    }

    #[test]
    fn emission_respects_the_window() {
        log_init_test();
        //
        let mut params = small_params(4);
        params.window = 3;
        let hist = Histogram::new(&params);
        hist.update(3, true);
        hist.create_sketch();
        let mut sink = Vec::<u8>::new();
        hist.emit(&mut sink).unwrap();
        hist.emit(&mut sink).unwrap();
        assert!(sink.is_empty());
        hist.emit(&mut sink).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text, "3 3 3 3\n");
    }

    #[test]
    fn record_is_idempotent_without_updates() {
        log_init_test();
        //
        let hist = Histogram::new(&small_params(4));
        hist.update(11, true);
        hist.update(12, true);
        hist.create_sketch();
        let mut first = Vec::<u8>::new();
        let mut second = Vec::<u8>::new();
        hist.record_sketch(&mut first).unwrap();
        hist.record_sketch(&mut second).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"\n"));
    }

    #[test]
    fn pregen_mode_sketches_too() {
        log_init_test();
        //
        let mut params = small_params(4);
        params.set_pregen(50);
        let hist = Histogram::new(&params);
        for label in [10u64, 20, 30] {
            hist.update(label, true);
        }
        hist.create_sketch();
        let sketch = hist.get_sketch();
        for i in 0..4 {
            assert!([10u64, 20, 30].contains(&sketch[i]));
        }
        // streaming keeps working against the pregenerated tables
        hist.update(40, false);
        assert_eq!(hist.nb_labels(), 4);
    }
} // end of mod tests
