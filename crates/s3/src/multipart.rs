//! Multipart commit planning
//!
//! Blocks are staged locally in whatever size the transfer engine uses, which
//! is usually far below the S3 minimum part size. At commit time consecutive
//! blocks are coalesced into parts that satisfy the S3 limits.

use std::ops::Range;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Part size to aim for when committing `total_size` bytes
pub fn calculate_part_size(total_size: u64) -> u64 {
    if total_size <= MIN_PART_SIZE {
        return MIN_PART_SIZE;
    }
    total_size
        .div_ceil(MAX_PARTS as u64)
        .clamp(MIN_PART_SIZE, MAX_PART_SIZE)
}

/// Group consecutive blocks into parts of at least `part_size` bytes
///
/// Returns ranges of block indices. Only the last part may be smaller than
/// `part_size`. No blocks means no parts.
pub fn plan_parts(block_lens: &[usize], part_size: u64) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut current = 0u64;

    for (i, len) in block_lens.iter().enumerate() {
        current += *len as u64;
        if current >= part_size {
            parts.push(start..i + 1);
            start = i + 1;
            current = 0;
        }
    }
    if start < block_lens.len() {
        parts.push(start..block_lens.len());
    }
    parts
}
