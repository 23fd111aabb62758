//! Label hashing.
//!
//! Relabeling strings are folded to 64 bit labels with a djb2 style
//! multiply-add hash. The hash is not cryptographic and the choice is fixed:
//! two sketches are only comparable when produced by the same hasher.

use crate::sketching::Label;

/// deterministic 64 bit hash of a byte string (djb2, wrapping arithmetic)
pub fn hash(bytes: &[u8]) -> Label {
    let mut h: u64 = 5381;
    for &b in bytes {
        h = h.wrapping_mul(33).wrapping_add(b as u64);
    }
    h
} // end of hash

/// Splits `text` on whitespace, groups the tokens into consecutive runs of
/// `chunk_size` and returns the hash of each run (tokens of a run rejoined by
/// a single space). The last run may be short. If `chunk_size` is at least
/// the token count the result has a single element.
pub fn chunkify(text: &str, chunk_size: usize) -> Vec<Label> {
    assert!(chunk_size > 0, "chunkify needs a positive chunk size");
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .chunks(chunk_size)
        .map(|chunk| hash(chunk.join(" ").as_bytes()))
        .collect()
} // end of chunkify

//===============================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn hash_is_deterministic() {
        log_init_test();
        //
        assert_eq!(hash(b"2 7 1"), hash(b"2 7 1"));
        assert_ne!(hash(b"2 7 1"), hash(b"1 7 2"));
        // djb2 of the empty string is the seed
        assert_eq!(hash(b""), 5381);
    }

    #[test]
    fn chunkify_groups_tokens() {
        log_init_test();
        //
        let chunks = chunkify("a b c d e", 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], hash(b"a b"));
        assert_eq!(chunks[1], hash(b"c d"));
        assert_eq!(chunks[2], hash(b"e"));
    }

    #[test]
    fn chunkify_degenerate_sizes() {
        log_init_test();
        // chunk larger than the token count gives one chunk equal to the whole string hash
        let chunks = chunkify("12 34", 5);
        assert_eq!(chunks, vec![hash(b"12 34")]);
        // chunk of one token hashes every token separately
        let chunks = chunkify("12 34", 1);
        assert_eq!(chunks, vec![hash(b"12"), hash(b"34")]);
    }

    #[test]
    fn chunkify_round_trips_tokenization() {
        log_init_test();
        // rejoining the chunks of the tokenization with single spaces gives back
        // the hashes of the original token runs whatever the spacing of the input
        let ragged = chunkify("  a\tb   c d\te ", 2);
        let clean = chunkify("a b c d e", 2);
        assert_eq!(ragged, clean);
    }
} // end of mod tests
