//! CRC32 integrity for edit log records
//!
//! Per PERSISTENCE.md §2, every record carries a CRC32 over everything
//! before the checksum field. Validation failures on a complete record are
//! fatal corruption; see PERSISTENCE.md §5 for the torn-tail exception.

/// Computes the CRC32 checksum of the given bytes.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
