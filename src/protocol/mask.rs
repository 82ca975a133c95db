//! Client-to-server frame masking (RFC 6455 Section 5.3).

use crate::error::{Error, Result};

/// Byte-by-byte XOR masking: `out[i] = in[i] ^ mask[i % 4]`.
///
/// Masking is its own inverse, so the same call unmasks.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking, processing 4 bytes per step.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_word = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ mask_word).to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Draw a fresh 4-byte masking key from the OS CSPRNG.
///
/// A new key is required for every outbound frame.
///
/// # Errors
///
/// Returns [`Error::Io`] if the system RNG is unavailable.
pub fn random_mask() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key).map_err(|e| Error::Io(format!("rng failure: {e}")))?;
    Ok(key)
}
