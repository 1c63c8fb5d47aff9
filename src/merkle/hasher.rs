//! Hasher implementations for hash-tree operations

use super::config::DEFAULT_CONFIG;
use super::TreeConfig;
use crate::types::Bytes32;
use crate::utils::sha256;

/// Trait for hash functions used in hash-tree operations
///
/// This trait abstracts over the node hashing rule so the tree shape and
/// proof logic stay independent of the digest. Domain tags come from a
/// [`TreeConfig`] and are prepended to every hashed message.
///
/// # Example
///
/// ```rust
/// use merkle_psbt::merkle::{Sha256Hasher, TreeHasher};
///
/// let hasher = Sha256Hasher;
/// let leaf = hasher.hash_leaf(&[0x00], b"element");
/// let node = hasher.hash_internal(&[0x01], leaf, leaf);
///
/// assert_ne!(leaf, node);
/// ```
pub trait TreeHasher {
    /// Computes the hash of a leaf payload
    ///
    /// # Arguments
    /// * `domain_tag` - Leaf domain separation prefix
    /// * `data` - Raw leaf payload
    fn hash_leaf(&self, domain_tag: &[u8], data: &[u8]) -> Bytes32;

    /// Computes the hash of an internal node from its two children
    ///
    /// # Arguments
    /// * `domain_tag` - Internal node domain separation prefix
    /// * `left` - Hash of the left child
    /// * `right` - Hash of the right child
    fn hash_internal(&self, domain_tag: &[u8], left: Bytes32, right: Bytes32) -> Bytes32;

    /// Root of a tree without leaves
    fn zero_hash(&self) -> Bytes32;
}

/// SHA-256 hasher implementation for hash-tree operations
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl TreeHasher for Sha256Hasher {
    fn hash_leaf(&self, domain_tag: &[u8], data: &[u8]) -> Bytes32 {
        let mut message = Vec::with_capacity(domain_tag.len() + data.len());
        message.extend_from_slice(domain_tag);
        message.extend_from_slice(data);
        sha256(&message)
    }

    fn hash_internal(&self, domain_tag: &[u8], left: Bytes32, right: Bytes32) -> Bytes32 {
        let mut message = Vec::with_capacity(domain_tag.len() + 64);
        message.extend_from_slice(domain_tag);
        message.extend_from_slice(&left);
        message.extend_from_slice(&right);
        sha256(&message)
    }

    fn zero_hash(&self) -> Bytes32 { [0u8; 32] }
}

/// Default hasher instance (SHA-256)
pub(crate) const DEFAULT_HASHER: Sha256Hasher = Sha256Hasher;

/// Computes the leaf hash of `data` with the default hasher and config
///
/// This is the hash the device expects for every element it retrieves
/// through a Merkle proof: `sha256(0x00 ‖ data)`.
#[inline]
pub fn hash_leaf(data: &[u8]) -> Bytes32 {
    DEFAULT_HASHER.hash_leaf(DEFAULT_CONFIG.leaf_domain_tag(), data)
}

/// Computes an internal node hash with the default hasher and config
#[inline]
pub fn hash_internal_node(left: Bytes32, right: Bytes32) -> Bytes32 {
    DEFAULT_HASHER.hash_internal(DEFAULT_CONFIG.internal_domain_tag(), left, right)
}
