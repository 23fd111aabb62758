//! The dynamic graph host: an in-memory directed graph over petgraph with a
//! bulk-synchronous scheduler driving vertex programs. Vertex and edge state
//! live behind per-item locks so a sweep can run in parallel; the graph
//! itself sits behind an outer lock so the ingest thread can grow it between
//! passes.

pub mod engine;

/// dense vertex identifier inside the engine
pub type VertexId = usize;
