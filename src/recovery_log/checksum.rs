//! CRC32 (IEEE) over each framed record, length prefix included.

use crc32fast::Hasher;

pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_flip_detected() {
        let mut frame = b"\x12\x00\x00\x00\x01status".to_vec();
        let sum = compute_checksum(&frame);
        frame[5] ^= 0x10;
        assert!(!verify_checksum(&frame, sum));
    }

    #[test]
    fn test_matches_known_value() {
        // CRC32 of "123456789" is the standard check value.
        assert_eq!(compute_checksum(b"123456789"), 0xCBF4_3926);
    }
}
