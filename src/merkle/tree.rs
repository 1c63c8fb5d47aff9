//! Ordered hash tree with inclusion proofs

use super::config::DEFAULT_CONFIG;
use super::hasher::{hash_leaf, DEFAULT_HASHER};
use super::{largest_power_of_two_less_than, TreeConfig, TreeHasher};
use crate::errors::MerkleError;
use crate::types::Bytes32;
use crate::Result;

/// Inclusion proof for a single leaf
///
/// The path lists sibling hashes ordered from the leaf level up to the
/// child of the root. A single-leaf tree has an empty path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MerkleProof {
    /// Sibling hashes from the leaf level to the root
    pub path: Vec<Bytes32>,
}

impl MerkleProof {
    /// Number of sibling hashes in the proof
    pub fn len(&self) -> usize { self.path.len() }

    /// Whether the proof has no elements (single-leaf tree)
    pub fn is_empty(&self) -> bool { self.path.is_empty() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Node {
    hash: Bytes32,
    children: Option<(usize, usize)>,
}

/// An immutable binary hash tree over an ordered list of leaf hashes
///
/// All node hashes are computed once at construction; roots, leaf lookups
/// and proofs are read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    leaves: Vec<Bytes32>,
    // Post-order arena; the root, if any, is the last node.
    nodes: Vec<Node>,
    root: Bytes32,
}

impl MerkleTree {
    /// Builds a tree over `leaves` with the default SHA-256 hasher
    ///
    /// # Arguments
    /// * `leaves` - Leaf hashes, already domain separated
    ///
    /// # Example
    ///
    /// ```rust
    /// use merkle_psbt::merkle::{hash_leaf, MerkleTree};
    ///
    /// let tree = MerkleTree::new(vec![hash_leaf(b"a"), hash_leaf(b"b"), hash_leaf(b"c")]);
    ///
    /// assert_eq!(tree.size(), 3);
    /// assert_eq!(tree.proof(2)?.len(), 1);
    /// # Ok::<(), merkle_psbt::errors::Error>(())
    /// ```
    pub fn new(leaves: Vec<Bytes32>) -> Self {
        Self::new_with(leaves, &DEFAULT_HASHER, &DEFAULT_CONFIG)
    }

    /// Builds a tree over `leaves` with an explicit hasher and config
    pub fn new_with<H: TreeHasher, C: TreeConfig>(
        leaves: Vec<Bytes32>,
        hasher: &H,
        config: &C,
    ) -> Self {
        let mut nodes = Vec::with_capacity(leaves.len().saturating_mul(2));
        let root = if leaves.is_empty() {
            hasher.zero_hash()
        } else {
            let index = build_node(&leaves, &mut nodes, hasher, config);
            nodes[index].hash
        };
        Self { leaves, nodes, root }
    }

    /// Builds a tree whose leaves are the leaf hashes of `elements`
    pub fn from_elements<I, T>(elements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::new(elements.into_iter().map(|e| hash_leaf(e.as_ref())).collect())
    }

    /// Gets the root hash
    pub fn root(&self) -> Bytes32 { self.root }

    /// Gets the number of leaves
    pub fn size(&self) -> usize { self.leaves.len() }

    /// Gets all leaf hashes in order
    pub fn leaves(&self) -> &[Bytes32] { &self.leaves }

    /// Gets the hash of the leaf at `index`
    ///
    /// # Errors
    /// Returns [`MerkleError::LeafIndexOutOfRange`] if `index >= size()`
    pub fn leaf_hash(&self, index: usize) -> Result<Bytes32> {
        self.leaves.get(index).copied().ok_or_else(|| self.out_of_range(index))
    }

    /// Generates the inclusion proof for the leaf at `index`
    ///
    /// # Returns
    /// Sibling hashes ordered from the leaf level to the root
    ///
    /// # Errors
    /// Returns [`MerkleError::LeafIndexOutOfRange`] if `index >= size()`
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        if index >= self.leaves.len() {
            return Err(self.out_of_range(index));
        }

        let mut path = Vec::new();
        let mut node = self.nodes.len() - 1;
        let mut size = self.leaves.len();
        let mut offset = index;
        while let Some((left, right)) = self.nodes[node].children {
            let split = largest_power_of_two_less_than(size);
            if offset < split {
                path.push(self.nodes[right].hash);
                node = left;
                size = split;
            } else {
                path.push(self.nodes[left].hash);
                node = right;
                size -= split;
                offset -= split;
            }
        }
        path.reverse();

        Ok(MerkleProof { path })
    }

    /// Finds the index of the first leaf equal to `leaf_hash`
    pub fn find_leaf(&self, leaf_hash: &Bytes32) -> Option<usize> {
        self.leaves.iter().position(|leaf| leaf == leaf_hash)
    }

    fn out_of_range(&self, index: usize) -> crate::errors::Error {
        MerkleError::LeafIndexOutOfRange { index, size: self.leaves.len() }.into()
    }
}

fn build_node<H: TreeHasher, C: TreeConfig>(
    leaves: &[Bytes32],
    nodes: &mut Vec<Node>,
    hasher: &H,
    config: &C,
) -> usize {
    let (hash, children) = if leaves.len() == 1 {
        (leaves[0], None)
    } else {
        let split = largest_power_of_two_less_than(leaves.len());
        let left = build_node(&leaves[..split], nodes, hasher, config);
        let right = build_node(&leaves[split..], nodes, hasher, config);
        let hash =
            hasher.hash_internal(config.internal_domain_tag(), nodes[left].hash, nodes[right].hash);
        (hash, Some((left, right)))
    };
    nodes.push(Node { hash, children });
    nodes.len() - 1
}
