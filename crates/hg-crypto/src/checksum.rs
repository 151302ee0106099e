//! CRC32 block checksums.
//!
//! Every block is written as `plaintext || crc32(plaintext)` and only then
//! encrypted. On read, a failed checksum after decryption is the signal that
//! the wrong key (or no key) was used. A keystream cipher never fails on its
//! own, so without this check a wrong key would yield garbage "plaintext".

/// Length of the trailing checksum in bytes.
pub const CHECKSUM_LEN: usize = 4;

/// Append a little-endian CRC32 of `data` to a copy of it.
pub fn append_checksum(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CHECKSUM_LEN);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out
}

/// Validate and strip the trailing checksum.
///
/// Returns `None` if the block is shorter than the checksum or the checksum
/// does not match.
pub fn validate_checksum(block: &[u8]) -> Option<&[u8]> {
    if block.len() < CHECKSUM_LEN {
        return None;
    }
    let (data, tail) = block.split_at(block.len() - CHECKSUM_LEN);
    let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    (crc32fast::hash(data) == expected).then_some(data)
}
