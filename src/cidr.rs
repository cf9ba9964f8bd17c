//! Address-block size to CIDR netmask conversion
//!
//! The allocation feed reports each range as a starting address plus an
//! address count. A count that is an exact power of two corresponds to a
//! contiguous high-order bit-mask; anything else has no CIDR equivalent
//! and is rejected rather than truncated.

use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CidrError {
    #[error("Block size {0} is not a power of two")]
    InvalidBlockSize(u32),
}

/// Convert an address-block size to its dotted-quad subnet mask and
/// prefix length (`32 - log2(count)`).
pub fn block_mask(count: u32) -> Result<(Ipv4Addr, u8), CidrError> {
    if count == 0 || !count.is_power_of_two() {
        return Err(CidrError::InvalidBlockSize(count));
    }
    // For a power of two, the mask is the complement of (count - 1).
    let mask = Ipv4Addr::from(!(count - 1));
    let prefix_len = 32 - count.trailing_zeros() as u8;
    Ok((mask, prefix_len))
}

/// Inverse of [`block_mask`]: the address-block size covered by a prefix.
pub fn block_size(prefix_len: u8) -> u64 {
    debug_assert!(prefix_len <= 32);
    1u64 << (32 - u32::from(prefix_len))
}

/// Prefix length of a contiguous dotted-quad mask.
pub fn mask_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}
