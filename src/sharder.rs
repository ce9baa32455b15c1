//! Sharder implementation.
use md5;

/// Maps an input deterministically into `[0, total_shards)`.
pub trait Sharder {
    /// Map `input` to a shard in `0..total_shards`.
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default (and only) sharder: the first four bytes of the md5 digest, big-endian.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (value as u64) % total_shards
    }
}
