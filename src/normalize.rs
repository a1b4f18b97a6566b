//! Consistent hashing of identifiers into buckets.
//!
//! The hash (MurmurHash3, x86 32-bit, seed 0) and the `"{group_id}:{identifier}"` template are
//! part of the contract: other SDKs evaluating the same definitions must put the same identifier
//! in the same bucket.
use std::io::Cursor;

use murmur3::murmur3_32;

/// Number of buckets used by percentage-based rollouts.
pub const PERCENTAGE_BUCKETS: u32 = 100;

/// Map `identifier` within `group_id` to a bucket in `[1, buckets]`.
///
/// For a fixed `(identifier, group_id)` the result does not depend on anything else, so a
/// rollout of `p` percent (`normalize(..) <= p`) only ever grows as `p` grows.
///
/// `buckets` of zero is treated as one.
pub fn normalize(identifier: &str, group_id: &str, buckets: u32) -> u32 {
    let buckets = buckets.max(1);
    let input = format!("{group_id}:{identifier}");
    // Reading from an in-memory cursor cannot fail.
    let hash = murmur3_32(&mut Cursor::new(input.as_bytes()), 0).unwrap_or(0);
    hash % buckets + 1
}

/// Shorthand for [`normalize`] with [`PERCENTAGE_BUCKETS`].
pub fn normalize_percentage(identifier: &str, group_id: &str) -> u32 {
    normalize(identifier, group_id, PERCENTAGE_BUCKETS)
}
