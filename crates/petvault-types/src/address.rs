//! Address parsing tolerant of hex casing.

use alloy_primitives::Address;

use crate::error::InvalidAddress;

/// Parse a 20-byte hex address, with or without `0x` prefix, any casing.
///
/// Comparisons downstream are on the raw bytes, so two spellings of the same
/// address ("0xABc…" vs "0xabc…") parse to equal values.
pub fn parse_address(s: &str) -> Result<Address, InvalidAddress> {
    s.trim()
        .parse::<Address>()
        .map_err(|_| InvalidAddress(s.to_string()))
}
