//! Raw weight buffer conversion.

use crate::error::SkillError;

/// Convert a raw byte buffer to f32 values, 4 bytes per float,
/// big-endian. The endianness must match the producer exactly; a
/// mismatch would not fail, it would silently corrupt every weight.
pub fn decode_weights(bytes: &[u8]) -> Result<Vec<f32>, SkillError> {
    if bytes.len() % 4 != 0 {
        return Err(SkillError::MalformedWeights(format!(
            "buffer length {} is not divisible by 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Effective adapter scaling factor: `alpha / rank`.
pub fn scale(alpha: f32, rank: u32) -> Result<f32, SkillError> {
    if rank == 0 {
        return Err(SkillError::InvalidAdapterConfig(
            "rank must be > 0".to_string(),
        ));
    }
    Ok(alpha / rank as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big_endian() {
        // 1.0f32 is 0x3F800000 big-endian; -2.0f32 is 0xC0000000.
        let bytes = [0x3F, 0x80, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00];
        let weights = decode_weights(&bytes).unwrap();
        assert_eq!(weights, vec![1.0, -2.0]);
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert!(decode_weights(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_ragged_buffer_rejected() {
        for len in [1usize, 2, 3, 5, 7, 9] {
            let bytes = vec![0u8; len];
            let err = decode_weights(&bytes).unwrap_err();
            assert!(
                matches!(err, SkillError::MalformedWeights(_)),
                "len {len}: {err}"
            );
        }
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(16.0, 8).unwrap(), 2.0);
        assert_eq!(scale(1.0, 4).unwrap(), 0.25);
    }

    #[test]
    fn test_zero_rank_rejected() {
        let err = scale(16.0, 0).unwrap_err();
        assert!(matches!(err, SkillError::InvalidAdapterConfig(_)));
    }
}
