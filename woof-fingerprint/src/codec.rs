//! Embedding <-> BLOB conversion. Raw little-endian `f32`s, no framing —
//! matches `storage.py`'s `ndarray.tobytes()` / `frombuffer` round trip.
//! Deliberately not pulling in `bytemuck` for this: plain byte-slicing is
//! used everywhere else this workspace touches the wire, not a binary
//! serde crate, and a handful of `to_le_bytes` loops is exactly as much
//! code either way.

use crate::error::StoreError;

pub fn serialize_embedding<const N: usize>(embedding: &[f32; N]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(N * 4);
    for &f in embedding.iter() {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

pub fn deserialize_embedding<const N: usize>(bytes: &[u8]) -> Result<[f32; N], StoreError> {
    if bytes.len() != N * 4 {
        return Err(StoreError::MalformedEmbedding {
            got: bytes.len(),
            expected: N * 4,
        });
    }

    let mut out = [0.0f32; N];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        out[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let embedding = [0.5f32, -1.0, 0.0, 3.25];
        let bytes = serialize_embedding(&embedding);
        let back: [f32; 4] = deserialize_embedding(&bytes).unwrap();
        assert_eq!(embedding, back);
    }

    #[test]
    fn rejects_wrong_length() {
        let bytes = vec![0u8; 3];
        let result: Result<[f32; 4], _> = deserialize_embedding(&bytes);
        assert!(result.is_err());
    }
}
