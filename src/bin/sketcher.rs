//! an executable sketching a streamed graph
//! example usage:
//! sketcher --base base.txt --stream stream.txt --output sketch.txt --sketch-size 2000 --khops 3 --batch 500
//! sketcher --base base.txt --stream stream.txt --lambda 0.02 --decay 10 --window 10
//! sketcher --base base.txt --stream stream.txt --chunkify --chunk-size 5 --memory --pregen 2000
//!
//! The base file is processed as a snapshot, the stream file is folded in
//! batch by batch, and one sketch line is written per emission window.

use anyhow::anyhow;
use clap::{Arg, ArgMatches, Command};

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use streamsketch::prelude::*;

fn parse_usize(matches: &ArgMatches, name: &str, default: usize) -> Result<usize, anyhow::Error> {
    match matches.value_of(name) {
        Some(str) => str.parse::<usize>().map_err(|_| anyhow!("error parsing {}", name)),
        None => Ok(default),
    }
} // end of parse_usize

fn parse_f64(matches: &ArgMatches, name: &str, default: f64) -> Result<f64, anyhow::Error> {
    match matches.value_of(name) {
        Some(str) => str.parse::<f64>().map_err(|_| anyhow!("error parsing {}", name)),
        None => Ok(default),
    }
} // end of parse_f64

fn parse_params(matches: &ArgMatches) -> Result<SketchParams, anyhow::Error> {
    let sketch_size = parse_usize(matches, "sketch_size", 2000)?;
    let k_hops = parse_usize(matches, "khops", 3)?;
    let lambda = parse_f64(matches, "lambda", 0.)?;
    let decay = parse_usize(matches, "decay", 1)?;
    let window = parse_usize(matches, "window", 1)?;
    if sketch_size == 0 || window == 0 {
        return Err(anyhow!("sketch-size and window must be positive"));
    }
    let mut params = SketchParams::new(sketch_size, k_hops, lambda, decay, window);
    if matches.is_present("chunkify") {
        params.set_chunkify(parse_usize(matches, "chunk_size", 5)?);
    }
    if matches.is_present("memory") {
        params.set_pregen(parse_usize(matches, "pregen", 2000)?);
    }
    params.set_parallel(matches.is_present("parallel"));
    Ok(params)
} // end of parse_params

pub fn main() {
    let _ = env_logger::builder().is_test(true).try_init();
    log::info!("logger initialized");
    //
    let matches = Command::new("sketcher")
        .arg_required_else_help(true)
        .arg(
            Arg::new("base")
                .long("base")
                .takes_value(true)
                .required(true)
                .help("edge list of the base graph"),
        )
        .arg(
            Arg::new("stream")
                .long("stream")
                .takes_value(true)
                .help("edge list streamed in after the base graph"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("sketch output file, default sketch.txt"),
        )
        .arg(
            Arg::new("sketch_size")
                .long("sketch-size")
                .short('s')
                .takes_value(true)
                .help("number of min-hash slots, default 2000"),
        )
        .arg(
            Arg::new("khops")
                .long("khops")
                .short('k')
                .takes_value(true)
                .help("number of hops explored around a vertex, default 3"),
        )
        .arg(
            Arg::new("lambda")
                .long("lambda")
                .takes_value(true)
                .help("decay coefficient, 0 disables decay"),
        )
        .arg(
            Arg::new("decay")
                .long("decay")
                .takes_value(true)
                .help("passes between two decays, default 1"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .takes_value(true)
                .help("passes between two sketch emissions, default 1"),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .takes_value(true)
                .help("streamed edges per batch, default 500"),
        )
        .arg(
            Arg::new("chunkify")
                .long("chunkify")
                .help("insert relabel strings chunk by chunk"),
        )
        .arg(
            Arg::new("chunk_size")
                .long("chunk-size")
                .takes_value(true)
                .help("tokens per chunk, default 5"),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .help("use pregenerated min-hash parameter tables"),
        )
        .arg(
            Arg::new("pregen")
                .long("pregen")
                .takes_value(true)
                .help("rows of the pregenerated tables, default 2000"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .help("parallel vertex sweeps, output is then not reproducible"),
        )
        .get_matches();

    // decode args
    let params = match parse_params(&matches) {
        Ok(params) => params,
        Err(e) => {
            log::error!("parameter error : {}", e);
            std::process::exit(1);
        }
    };
    let batch_size = match parse_usize(&matches, "batch", 500) {
        Ok(size) if size > 0 => size,
        _ => {
            log::error!("batch must be a positive integer");
            std::process::exit(1);
        }
    };
    //
    let base_path = matches.value_of("base").unwrap();
    let mut arrival = 0u64;
    let base = match read_edgelist(Path::new(base_path), &mut arrival) {
        Ok(edges) => edges,
        Err(e) => {
            log::error!("could not read base graph {} : {}", base_path, e);
            std::process::exit(1);
        }
    };
    let batches = match matches.value_of("stream") {
        Some(stream_path) => {
            let stream = match read_edgelist(Path::new(stream_path), &mut arrival) {
                Ok(edges) => edges,
                Err(e) => {
                    log::error!("could not read stream {} : {}", stream_path, e);
                    std::process::exit(1);
                }
            };
            split_batches(stream, batch_size)
        }
        None => Vec::new(),
    };
    //
    let output = matches.value_of("output").unwrap_or("sketch.txt");
    let file = match File::create(output) {
        Ok(file) => file,
        Err(e) => {
            log::error!("could not create output file {} : {}", output, e);
            std::process::exit(1);
        }
    };
    let sink = Box::new(BufWriter::new(file));
    //
    match run_sketcher(params, &base, batches, sink) {
        Ok(run) => {
            log::info!(
                "sketching done : {} vertices, {} edges, {} distinct labels, output in {}",
                run.engine.nb_nodes(),
                run.engine.nb_edges(),
                run.histogram.nb_labels(),
                output
            );
        }
        Err(e) => {
            log::error!("sketching failed : {}", e);
            std::process::exit(1);
        }
    }
} // end of main
