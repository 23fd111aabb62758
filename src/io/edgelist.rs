//! Parse edge-list files.
//!
//! One edge per line, space separated:
//! `src dst src_type:dst_type:edge_type[:timestamp]`
//! with `#` starting comment lines. Vertex identifiers are integers; type
//! tokens are either integer labels used as is, or arbitrary strings hashed
//! down to labels. Edges without a timestamp get one from a running arrival
//! counter, which also makes the timestamps of two files consecutive when
//! the counter is carried from one call to the next.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::anyhow;
use csv::ReaderBuilder;

use crate::sketching::hasher::hash;
use crate::sketching::Label;

/// one parsed edge, ready for the engine
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub src: u64,
    pub dst: u64,
    pub src_type: Label,
    pub dst_type: Label,
    pub edge_type: Label,
    pub timestamp: u64,
} // end of EdgeRecord

// a type token is a literal integer label or gets hashed to one
fn type_label(token: &str) -> Label {
    token.parse::<u64>().unwrap_or_else(|_| hash(token.as_bytes()))
} // end of type_label

/// Reads a whole edge-list file. `arrival` is the running counter stamping
/// edges without an explicit timestamp.
pub fn read_edgelist(filepath: &Path, arrival: &mut u64) -> anyhow::Result<Vec<EdgeRecord>> {
    let fileres = OpenOptions::new().read(true).open(filepath);
    if fileres.is_err() {
        log::error!("read_edgelist : could not open file {:?}", filepath.as_os_str());
        return Err(anyhow!("read_edgelist could not open file {:?}", filepath.as_os_str()));
    }
    let file = fileres.unwrap();
    let mut rdr = ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(file);
    //
    let mut records = Vec::<EdgeRecord>::new();
    for result in rdr.records() {
        let record = result?;
        if record.len() != 3 {
            return Err(anyhow!(
                "edge line {} has {} fields, expected: src dst attributes",
                records.len() + 1,
                record.len()
            ));
        }
        let src = record[0].parse::<u64>()?;
        let dst = record[1].parse::<u64>()?;
        let attributes: Vec<&str> = record[2].split(':').collect();
        if attributes.len() < 3 || attributes.len() > 4 {
            return Err(anyhow!(
                "edge line {} attributes \"{}\" are not src_type:dst_type:edge_type[:timestamp]",
                records.len() + 1,
                &record[2]
            ));
        }
        let timestamp = match attributes.get(3) {
            Some(token) => token.parse::<u64>()?,
            None => *arrival,
        };
        *arrival += 1;
        records.push(EdgeRecord {
            src,
            dst,
            src_type: type_label(attributes[0]),
            dst_type: type_label(attributes[1]),
            edge_type: type_label(attributes[2]),
            timestamp,
        });
    }
    log::info!("read_edgelist : {} edges from {:?}", records.len(), filepath.as_os_str());
    Ok(records)
} // end of read_edgelist

/// cut the streamed edges into fixed size batches, the last one may be short
pub fn split_batches(edges: Vec<EdgeRecord>, batch_size: usize) -> Vec<Vec<EdgeRecord>> {
    assert!(batch_size > 0, "batch size must be positive");
    edges.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
} // end of split_batches

//===============================================================

// end of mod tests
