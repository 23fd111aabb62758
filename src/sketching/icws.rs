//! Per-label parameters for the consistent weighted min-hash.
//!
//! Every label L needs, for each of the S slots, a triplet (r, β, c) with
//! r, c ~ Gamma(2,1) and β ~ Uniform[0,1). The per-slot hash of a histogram
//! counter cnt is `a = c / (exp(ln cnt − r·β) · exp(r))`; the sketch keeps the
//! argmin label per slot. Whatever the generation mode, the triplets are a
//! pure function of the label for the lifetime of the process, otherwise the
//! min-hash invariant breaks.

use ndarray::Array2;

use rand::distributions::{Distribution, Uniform};
use rand::{RngCore, SeedableRng};
use rand_distr::Gamma;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::sketching::params::ParamMode;
use crate::sketching::Label;

/// seed of the master engine generating the pregenerated rows
const PREGEN_MASTER_SEED: u64 = 36;

/// The (r, β, c) triplets of one label, one entry per slot.
#[derive(Debug, Clone)]
pub struct LabelParams {
    r: Vec<f64>,
    beta: Vec<f64>,
    c: Vec<f64>,
} // end of LabelParams

impl LabelParams {
    /// the per-slot hash of a positive histogram counter
    pub fn hash_value(&self, slot: usize, count: f64) -> f64 {
        let y = (count.ln() - self.r[slot] * self.beta[slot]).exp();
        self.c[slot] / (y * self.r[slot].exp())
    } // end of hash_value
} // end of impl LabelParams

/// Draws the per-label parameters, either on the fly or from tables
/// pregenerated at sketch creation.
pub struct IcwsSampler {
    sketch_size: usize,
    mode: ParamMode,
    gamma: Gamma<f64>,
    unif: Uniform<f64>,
    /// pregenerated Gamma rows, dimension (rows, sketch_size)
    gamma_param: Option<Array2<f64>>,
    /// pregenerated Uniform rows, dimension (rows, sketch_size)
    uniform_param: Option<Array2<f64>>,
} // end of IcwsSampler

impl IcwsSampler {
    pub fn new(sketch_size: usize, mode: ParamMode) -> Self {
        IcwsSampler {
            sketch_size,
            mode,
            gamma: Gamma::new(2., 1.).unwrap(),
            unif: Uniform::new(0., 1.),
            gamma_param: None,
            uniform_param: None,
        }
    } // end of new

    ///
    pub fn get_sketch_size(&self) -> usize {
        self.sketch_size
    }

    /// Fills the parameter tables. Must run once, before any label request,
    /// when the sampler is in pregenerated mode; does nothing otherwise.
    /// Each row gets its own engine seeded from the master engine so the
    /// tables only depend on the master seed.
    pub fn pregenerate(&mut self) {
        let rows = match self.mode {
            ParamMode::OnTheFly => {
                return;
            }
            ParamMode::Pregen(rows) => rows,
        };
        let mut master = Xoshiro256PlusPlus::seed_from_u64(PREGEN_MASTER_SEED);
        let mut gamma_param = Array2::<f64>::zeros((rows, self.sketch_size));
        let mut uniform_param = Array2::<f64>::zeros((rows, self.sketch_size));
        for i in 0..rows {
            let row_seed = master.next_u64();
            let mut r_engine = Xoshiro256PlusPlus::seed_from_u64(row_seed);
            let mut beta_engine = Xoshiro256PlusPlus::seed_from_u64(row_seed);
            for j in 0..self.sketch_size {
                gamma_param[[i, j]] = self.gamma.sample(&mut r_engine);
                uniform_param[[i, j]] = self.unif.sample(&mut beta_engine);
            }
        }
        self.gamma_param = Some(gamma_param);
        self.uniform_param = Some(uniform_param);
        log::debug!("pregenerated {} parameter rows of width {}", rows, self.sketch_size);
    } // end of pregenerate

    /// the parameters of a label, a pure function of the label
    pub fn label_params(&self, label: Label) -> LabelParams {
        match self.mode {
            ParamMode::OnTheFly => self.construct_params(label),
            ParamMode::Pregen(rows) => self.lookup_params(label, rows),
        }
    } // end of label_params

    // Three engines are rebuilt from the label at every request so the drawn
    // values do not depend on which labels were requested before.
    fn construct_params(&self, label: Label) -> LabelParams {
        let mut r_engine = Xoshiro256PlusPlus::seed_from_u64(label);
        let mut c_engine = Xoshiro256PlusPlus::seed_from_u64(label / 2);
        let mut beta_engine = Xoshiro256PlusPlus::seed_from_u64(label);
        let mut r = Vec::with_capacity(self.sketch_size);
        let mut beta = Vec::with_capacity(self.sketch_size);
        let mut c = Vec::with_capacity(self.sketch_size);
        for _ in 0..self.sketch_size {
            r.push(self.gamma.sample(&mut r_engine));
            beta.push(self.unif.sample(&mut beta_engine));
            c.push(self.gamma.sample(&mut c_engine));
        }
        LabelParams { r, beta, c }
    } // end of construct_params

    // Row indices are drawn from a label-seeded engine; r and β come from one
    // row, c from the gamma part of the other.
    fn lookup_params(&self, label: Label, rows: usize) -> LabelParams {
        let gamma_param = self
            .gamma_param
            .as_ref()
            .expect("parameter tables requested before pregeneration");
        let uniform_param = self.uniform_param.as_ref().unwrap();
        let mut pos_engine = Xoshiro256PlusPlus::seed_from_u64(label);
        let pos1 = (pos_engine.next_u64() % rows as u64) as usize;
        let pos2 = (pos_engine.next_u64() % rows as u64) as usize;
        let r: Vec<f64> = (0..self.sketch_size).map(|j| gamma_param[[pos1, j]]).collect();
        let beta: Vec<f64> = (0..self.sketch_size).map(|j| uniform_param[[pos1, j]]).collect();
        let c: Vec<f64> = (0..self.sketch_size).map(|j| gamma_param[[pos2, j]]).collect();
        LabelParams { r, beta, c }
    } // end of lookup_params
} // end of impl IcwsSampler

//===============================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn on_the_fly_params_depend_only_on_label() {
        log_init_test();
        //
        let sampler = IcwsSampler::new(16, ParamMode::OnTheFly);
        let first = sampler.label_params(0xdead_beef);
        // interleave other labels, then ask again
        let _ = sampler.label_params(1);
        let _ = sampler.label_params(42);
        let again = sampler.label_params(0xdead_beef);
        assert_eq!(first.r, again.r);
        assert_eq!(first.beta, again.beta);
        assert_eq!(first.c, again.c);
        // a different label gives different draws
        let other = sampler.label_params(0xdead_beee);
        assert_ne!(first.r, other.r);
    }

    #[test]
    fn pregen_params_depend_only_on_label() {
        log_init_test();
        //
        let mut sampler = IcwsSampler::new(8, ParamMode::Pregen(100));
        sampler.pregenerate();
        let first = sampler.label_params(12345);
        let _ = sampler.label_params(999);
        let again = sampler.label_params(12345);
        assert_eq!(first.r, again.r);
        assert_eq!(first.beta, again.beta);
        assert_eq!(first.c, again.c);
    }

    #[test]
    fn hash_values_are_positive_and_decrease_with_count() {
        log_init_test();
        //
        let sampler = IcwsSampler::new(8, ParamMode::OnTheFly);
        let params = sampler.label_params(7);
        for slot in 0..8 {
            let a1 = params.hash_value(slot, 1.);
            let a4 = params.hash_value(slot, 4.);
            assert!(a1 > 0.);
            assert!(a4 > 0.);
            // Gamma and Uniform draws are positive, so a larger counter hashes lower
            assert!(a4 < a1);
        }
    }

    #[test]
    fn betas_stay_in_unit_interval() {
        log_init_test();
        //
        let sampler = IcwsSampler::new(32, ParamMode::OnTheFly);
        let params = sampler.label_params(0);
        for slot in 0..32 {
            assert!(params.beta[slot] >= 0. && params.beta[slot] < 1.);
            assert!(params.r[slot] > 0.);
            assert!(params.c[slot] > 0.);
        }
    }

    #[test]
    #[should_panic]
    fn pregen_lookup_without_tables_is_fatal() {
        let sampler = IcwsSampler::new(4, ParamMode::Pregen(10));
        let _ = sampler.label_params(3);
    }
} // end of mod tests
