//! Weisfeiler-Lehman relabeling over a streamed directed typed graph.
//!
//! The relabeling scheme follows the label refinement of
//! *Weisfeiler-Lehman Graph Kernels*, Shervashidze-Borgwardt 2011: at each
//! hop a vertex hashes its previous label concatenated with the sorted labels
//! published on its inbound edges. Here sorting is by edge timestamp, the
//! graph is processed once as a base snapshot and then extended edge by edge,
//! each new edge resuming the refinement of the vertices it reaches.

pub mod labels;

pub mod relabel;
