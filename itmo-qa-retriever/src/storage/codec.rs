//! Packed binary encodings for stored embeddings.
//!
//! Two blobs are written per article, both derived from the same vector:
//!
//! ```text
//! embedding      [f32 LE] * D            ++ [FLOAT_VECTOR_TAG]
//! embedding_bit  ceil(D / 8) bytes        ++ [BIT_VECTOR_TAG]
//! ```
//!
//! The bit vector sets bit `i` (LSB-first within each byte) when component `i`
//! is positive. It is a 1-bit quantization kept for approximate pre-filtering;
//! similarity ranking always decodes the full-precision blob.

/// Trailing format byte of a packed float vector
pub const FLOAT_VECTOR_TAG: u8 = 1;

/// Trailing format byte of a packed bit vector
pub const BIT_VECTOR_TAG: u8 = 10;

/// Reasons a stored blob cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("blob is empty")]
    Empty,
    #[error("unexpected format tag {found} (expected {expected})")]
    WrongTag { expected: u8, found: u8 },
    #[error("payload of {len} bytes is not a whole number of f32 values")]
    Misaligned { len: usize },
    #[error("stored vector has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

/// Packs a float vector as little-endian f32 values plus the format tag.
pub fn pack_float(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4 + 1);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes.push(FLOAT_VECTOR_TAG);
    bytes
}

/// Decodes a blob produced by [`pack_float`].
pub fn unpack_float(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    let (tag, payload) = bytes.split_last().ok_or(CodecError::Empty)?;
    if *tag != FLOAT_VECTOR_TAG {
        return Err(CodecError::WrongTag {
            expected: FLOAT_VECTOR_TAG,
            found: *tag,
        });
    }
    if payload.len() % 4 != 0 {
        return Err(CodecError::Misaligned { len: payload.len() });
    }
    Ok(payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Quantizes a vector to one bit per dimension plus the format tag.
pub fn pack_bits(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; embedding.len().div_ceil(8)];
    for (i, value) in embedding.iter().enumerate() {
        if *value > 0.0 {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes.push(BIT_VECTOR_TAG);
    bytes
}

/// Cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Accumulates in f64. A zero-norm side yields distance 1.0 (similarity 0).
/// Callers guarantee equal lengths.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}
