//! Hash trees and merkleized maps
//!
//! This module provides the commitment primitives the device relies on:
//! an ordered binary hash tree with per-leaf inclusion proofs, and a
//! key/value map committed through two parallel trees.
//!
//! Trees follow the RFC 6962 shape: a tree over `n > 1` leaves splits into a
//! left subtree holding the largest power of two strictly less than `n`
//! leaves and a right subtree holding the rest.

mod config;
mod hasher;
mod map;
mod tree;

pub use config::MerklePsbtV2Config;
pub use hasher::{hash_internal_node, hash_leaf, Sha256Hasher, TreeHasher};
pub use map::MerkleizedMap;
pub use tree::{MerkleProof, MerkleTree};

/// Trait for hash-tree configuration parameters
///
/// This trait abstracts over the domain separation tags applied when
/// hashing leaves and internal nodes.
pub trait TreeConfig {
    /// Domain separation tag prepended to leaf payloads
    fn leaf_domain_tag(&self) -> &[u8];

    /// Domain separation tag prepended to internal node children
    fn internal_domain_tag(&self) -> &[u8];
}

/// Returns the largest power of two strictly less than `n`
///
/// Used to split a range of `n > 1` leaves into its left and right subtree.
/// Returns 1 for `n <= 2`.
///
/// # Example
///
/// ```rust
/// use merkle_psbt::merkle::largest_power_of_two_less_than;
///
/// assert_eq!(largest_power_of_two_less_than(2), 1);
/// assert_eq!(largest_power_of_two_less_than(5), 4);
/// assert_eq!(largest_power_of_two_less_than(8), 4);
/// ```
pub fn largest_power_of_two_less_than(n: usize) -> usize {
    let mut power = 1;
    while power * 2 < n {
        power *= 2;
    }
    power
}
