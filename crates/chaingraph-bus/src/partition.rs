//! Partition-key derivation (spec §4.D): all messages for one execution
//! land on one partition, guaranteeing single-writer semantics per
//! execution without a distributed lock.

/// Stable partition index for a key within `partition_count` partitions.
/// Uses the same FNV-1a scheme a teacher bus binding would reach for when
/// it needs a dependency-free, deterministic hash rather than pulling in a
/// hashing crate for one function.
pub fn partition_for(key: &str, partition_count: u32) -> u32 {
    if partition_count == 0 {
        return 0;
    }
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % partition_count as u64) as u32
}
