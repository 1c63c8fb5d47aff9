//! Key/value maps committed through two parallel hash trees

use super::tree::MerkleTree;
use crate::errors::MapError;
use crate::types::Bytes32;
use crate::utils::encode_varint;
use crate::Result;

/// A key/value map committed as a pair of hash trees
///
/// Keys are strictly increasing in byte-lexicographic order and each value
/// sits at the same position as its key. The commitment binds the entry
/// count, the key tree root and the value tree root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleizedMap {
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
    keys_tree: MerkleTree,
    values_tree: MerkleTree,
}

impl MerkleizedMap {
    /// Builds a merkleized map from sorted keys and their values
    ///
    /// # Arguments
    /// * `keys` - Strictly increasing, duplicate-free keys
    /// * `values` - Values positionally paired with `keys`
    ///
    /// # Errors
    /// * [`MapError::LengthMismatch`] if the counts differ
    /// * [`MapError::KeysNotStrictlyIncreasing`] if a key is not greater than its predecessor
    ///
    /// # Example
    ///
    /// ```rust
    /// use merkle_psbt::merkle::MerkleizedMap;
    ///
    /// let map = MerkleizedMap::new(vec![vec![0x00], vec![0x01]], vec![vec![0xaa], vec![0xbb]])?;
    ///
    /// assert_eq!(map.commitment().len(), 65);
    /// # Ok::<(), merkle_psbt::errors::Error>(())
    /// ```
    pub fn new(keys: Vec<Vec<u8>>, values: Vec<Vec<u8>>) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(MapError::LengthMismatch { keys: keys.len(), values: values.len() }.into());
        }
        if let Some(index) = keys.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(MapError::KeysNotStrictlyIncreasing { index: index + 1 }.into());
        }

        let keys_tree = MerkleTree::from_elements(&keys);
        let values_tree = MerkleTree::from_elements(&values);
        Ok(Self { keys, values, keys_tree, values_tree })
    }

    /// Serializes the commitment: `varint(n) ‖ keys_root ‖ values_root`
    pub fn commitment(&self) -> Vec<u8> {
        let mut out = encode_varint(self.keys.len() as u64);
        out.extend_from_slice(&self.keys_tree.root());
        out.extend_from_slice(&self.values_tree.root());
        out
    }

    /// Gets the number of entries
    pub fn len(&self) -> usize { self.keys.len() }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Gets the sorted keys
    pub fn keys(&self) -> &[Vec<u8>] { &self.keys }

    /// Gets the values in key order
    pub fn values(&self) -> &[Vec<u8>] { &self.values }

    /// Gets the root of the key tree
    pub fn keys_root(&self) -> Bytes32 { self.keys_tree.root() }

    /// Gets the root of the value tree
    pub fn values_root(&self) -> Bytes32 { self.values_tree.root() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::merkle::hash_leaf;

    fn key(byte: u8) -> Vec<u8> { vec![byte] }

    #[test]
    fn test_three_entry_commitment() {
        let keys = vec![key(0x00), key(0x01), key(0x02)];
        let values = vec![vec![0x11; 32], vec![0x22; 32], vec![0x33; 32]];

        let map = MerkleizedMap::new(keys.clone(), values.clone()).expect("should build map");
        let commitment = map.commitment();

        assert_eq!(commitment.len(), 65);
        assert_eq!(commitment[0], 3);
        assert_eq!(&commitment[1..33], &MerkleTree::from_elements(&keys).root());
        assert_eq!(&commitment[33..], &MerkleTree::from_elements(&values).root());
        let rebuilt = MerkleizedMap::new(keys, values).expect("should rebuild");
        assert_eq!(commitment, rebuilt.commitment());
    }

    #[test]
    fn test_rejects_unsorted_keys() {
        let keys = vec![key(0x01), key(0x00), key(0x02)];
        let values = vec![vec![0u8; 32]; 3];

        let result = MerkleizedMap::new(keys, values);

        assert_eq!(result, Err(Error::Map(MapError::KeysNotStrictlyIncreasing { index: 1 })));
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let keys = vec![key(0x00), key(0x05), key(0x05)];

        let result = MerkleizedMap::new(keys, vec![Vec::new(); 3]);

        assert_eq!(result, Err(Error::Map(MapError::KeysNotStrictlyIncreasing { index: 2 })));
    }

    #[test]
    fn test_prefix_key_orders_first() {
        let keys = vec![vec![0x02], vec![0x02, 0x00]];

        let map = MerkleizedMap::new(keys, vec![vec![1], vec![2]]);

        assert!(map.is_ok());
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let result = MerkleizedMap::new(vec![key(0x00)], Vec::new());

        assert_eq!(result, Err(Error::Map(MapError::LengthMismatch { keys: 1, values: 0 })));
    }

    #[test]
    fn test_empty_map_commitment() {
        let map = MerkleizedMap::new(Vec::new(), Vec::new()).expect("should build empty map");

        assert!(map.is_empty());
        assert_eq!(map.commitment(), [vec![0u8], vec![0u8; 64]].concat());
    }

    #[test]
    fn test_key_tree_leaves_are_leaf_hashes() {
        let map =
            MerkleizedMap::new(vec![key(0x07)], vec![b"v".to_vec()]).expect("should build map");

        assert_eq!(map.keys_root(), hash_leaf(&[0x07]));
        assert_eq!(map.values_root(), hash_leaf(b"v"));
    }
}
