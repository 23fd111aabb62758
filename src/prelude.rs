//! usual re-exports

pub use crate::sketching::params::{ParamMode, SketchParams};

pub use crate::sketching::hasher::{hash, chunkify};

pub use crate::sketching::histogram::Histogram;

pub use crate::wl::labels::{NodeState, EdgeState};
pub use crate::wl::relabel::WlSketcher;

pub use crate::graph::engine::{DynGraph, GraphProgram, IterContext, VertexView, EdgeView};

pub use crate::io::edgelist::{EdgeRecord, read_edgelist, split_batches};

pub use crate::driver::{run_sketcher, CoordFlags, SketchRun, StreamCoordinator};
