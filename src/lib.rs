//! Streaming graph sketching.
//!
//! Consumes a base graph and a stream of edge insertions, maintains
//! Weisfeiler-Lehman style relabelings of every affected vertex up to a fixed
//! number of hops, accumulates the labels in a decaying histogram and keeps a
//! fixed-size consistent weighted min-hash of that histogram up to date as it
//! mutates. See the [sketching](crate::sketching) and [wl](crate::wl) modules.

use env_logger::Builder;

#[macro_use]
extern crate lazy_static;

lazy_static! {
    static ref LOG: u64 = init_log();
}

// install a logger facility
fn init_log() -> u64 {
    Builder::from_default_env().init();
    println!("\n ************** initializing logger *****************\n");
    1
}

pub mod sketching;

pub mod wl;

pub mod graph;

pub mod io;

pub mod driver;

pub mod prelude;
