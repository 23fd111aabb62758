//! This module gathers the sketching machinery: the label hasher, the
//! decaying label histogram and the consistent weighted min-hash slots
//! maintained over it.
//!
//! The min-hash scheme belongs to the ICWS family, see
//! *Improved Consistent Weighted Sampling Revisited*
//! Wu, Li, Chen, Zhang, Yu 2017 <https://arxiv.org/abs/1706.01172>

pub mod params;

pub mod hasher;

pub mod icws;

pub mod histogram;

/// Labels are 64 bit hash outputs. Collisions are accepted.
pub type Label = u64;
