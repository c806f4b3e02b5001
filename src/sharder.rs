//! Sharder implementation.
use sha1::{Digest, Sha1};

pub trait Sharder {
    fn get_bucket(&self, input: impl AsRef<[u8]>, total_buckets: u64) -> u64;
}

/// The default (and only) sharder.
///
/// The 20-byte SHA1 digest is interpreted as a big-endian unsigned integer before the modulo.
/// This must stay bit-for-bit stable: existing bucket assignments depend on it. SHA1 is not a
/// security boundary here; it is used purely for its uniform-distribution property.
pub struct Sha1Sharder;

impl Sharder for Sha1Sharder {
    fn get_bucket(&self, input: impl AsRef<[u8]>, total_buckets: u64) -> u64 {
        let digest = Sha1::digest(input.as_ref());
        // Fold-mod is equivalent to taking the whole digest as one big-endian integer mod n.
        digest.iter().fold(0u64, |acc, &byte| {
            ((acc as u128 * 256 + byte as u128) % total_buckets as u128) as u64
        })
    }
}
