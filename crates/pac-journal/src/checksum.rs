//! Journal checksum engine.
//!
//! CRC-32 with the IEEE polynomial 0xEDB88320 (reflected, initial value
//! 0xFFFFFFFF, final XOR 0xFFFFFFFF). The on-disk format is defined in
//! terms of this exact polynomial; `crc32fast` implements it.

/// Compute the CRC-32 of a byte run.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
