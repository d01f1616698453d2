//! Opaque game state blobs.
//!
//! A [`BaseState`] is a fixed-size byte buffer whose interpretation belongs
//! entirely to the game's state machine. The search engine only ever copies
//! states, compares them, and hashes them — optionally under a [`HashMask`]
//! that blanks out bytes which should not participate in identity (step
//! counters, cosmetic markers and the like).

use std::hash::{Hash, Hasher};

/// An opaque game state: a byte buffer owned by whoever reached the state.
///
/// Equality and hashing are over the raw bytes. Masked variants are used by
/// the transposition map and the repeat-state rule, where the transformer
/// decides which bytes carry identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseState {
    bytes: Box<[u8]>,
}

impl BaseState {
    /// Create a zeroed state of the given size.
    pub fn zeroed(byte_count: usize) -> Self {
        Self {
            bytes: vec![0u8; byte_count].into_boxed_slice(),
        }
    }

    /// Create a state from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec().into_boxed_slice(),
        }
    }

    /// Size of the state in bytes.
    #[inline]
    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }

    /// Read access to the raw bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access to the raw bytes (state machines write through this).
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Overwrite this state with another of the same size.
    pub fn assign(&mut self, other: &BaseState) {
        debug_assert_eq!(self.bytes.len(), other.bytes.len());
        self.bytes.copy_from_slice(&other.bytes);
    }

    /// Equality under a mask: only bytes with mask bits set participate.
    pub fn masked_eq(&self, other: &BaseState, mask: &HashMask) -> bool {
        debug_assert_eq!(self.bytes.len(), mask.0.len());
        debug_assert_eq!(other.bytes.len(), mask.0.len());

        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .zip(mask.0.iter())
            .all(|((a, b), m)| a & m == b & m)
    }

    /// The masked bytes, used as a transposition-map key.
    pub fn masked_key(&self, mask: &HashMask) -> Box<[u8]> {
        debug_assert_eq!(self.bytes.len(), mask.0.len());
        self.bytes
            .iter()
            .zip(mask.0.iter())
            .map(|(b, m)| b & m)
            .collect()
    }

    /// Hash of the masked bytes.
    pub fn masked_hash(&self, mask: &HashMask) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (b, m) in self.bytes.iter().zip(mask.0.iter()) {
            (b & m).hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Byte mask selecting which parts of a [`BaseState`] carry identity.
///
/// Produced by the transformer (which knows the game's state encoding); a
/// mask of all ones means full-state identity.
#[derive(Debug, Clone)]
pub struct HashMask(Box<[u8]>);

impl HashMask {
    /// Mask covering every byte of a state of the given size.
    pub fn all(byte_count: usize) -> Self {
        Self(vec![0xff; byte_count].into_boxed_slice())
    }

    /// Mask from explicit bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec().into_boxed_slice())
    }

    /// Size of the mask in bytes; must match the states it is applied to.
    #[inline]
    pub fn byte_count(&self) -> usize {
        self.0.len()
    }
}
