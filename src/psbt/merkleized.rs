//! Merkleized view of a PSBT
//!
//! Each record group becomes a [`MerkleizedMap`]. The per-input and
//! per-output map commitments are themselves committed by hash trees whose
//! roots, together with the global map commitment, anchor a signing session
//! on the device.

use tracing::debug;

use super::model::{KeyMap, PsbtV2};
use crate::merkle::{MerkleTree, MerkleizedMap};
use crate::types::MerkleRoot;
use crate::Result;

/// A PSBT snapshot together with its merkleized maps and commitments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleizedPsbt {
    psbt: PsbtV2,
    global_map: MerkleizedMap,
    input_maps: Vec<MerkleizedMap>,
    output_maps: Vec<MerkleizedMap>,
    input_commitments: Vec<Vec<u8>>,
    output_commitments: Vec<Vec<u8>>,
    inputs_root: MerkleRoot,
    outputs_root: MerkleRoot,
}

impl MerkleizedPsbt {
    /// Merkleizes a snapshot of `psbt`
    ///
    /// Builds one map per declared input and output; inputs or outputs with
    /// no records produce empty maps.
    ///
    /// # Errors
    /// Returns an error if the global input or output count is missing
    pub fn new(psbt: &PsbtV2) -> Result<Self> {
        let empty = KeyMap::new();
        let global_map = merkleize(&psbt.global)?;
        let input_maps = (0..psbt.global_input_count()?)
            .map(|i| merkleize(psbt.input_map(i).unwrap_or(&empty)))
            .collect::<Result<Vec<_>>>()?;
        let output_maps = (0..psbt.global_output_count()?)
            .map(|i| merkleize(psbt.output_map(i).unwrap_or(&empty)))
            .collect::<Result<Vec<_>>>()?;

        let input_commitments: Vec<Vec<u8>> =
            input_maps.iter().map(MerkleizedMap::commitment).collect();
        let output_commitments: Vec<Vec<u8>> =
            output_maps.iter().map(MerkleizedMap::commitment).collect();
        let inputs_root = MerkleTree::from_elements(&input_commitments).root();
        let outputs_root = MerkleTree::from_elements(&output_commitments).root();

        debug!(
            inputs = input_maps.len(),
            outputs = output_maps.len(),
            inputs_root = %hex::encode(inputs_root),
            outputs_root = %hex::encode(outputs_root),
            "merkleized psbt"
        );

        Ok(Self {
            psbt: psbt.clone(),
            global_map,
            input_maps,
            output_maps,
            input_commitments,
            output_commitments,
            inputs_root,
            outputs_root,
        })
    }

    /// Gets the PSBT snapshot this view was built from
    pub fn psbt(&self) -> &PsbtV2 { &self.psbt }

    /// Gets the merkleized global map
    pub fn global_map(&self) -> &MerkleizedMap { &self.global_map }

    /// Gets the merkleized input maps in input order
    pub fn input_maps(&self) -> &[MerkleizedMap] { &self.input_maps }

    /// Gets the merkleized output maps in output order
    pub fn output_maps(&self) -> &[MerkleizedMap] { &self.output_maps }

    /// Gets the commitment of the global map
    pub fn global_commitment(&self) -> Vec<u8> { self.global_map.commitment() }

    /// Gets the commitments of the input maps in input order
    pub fn input_commitments(&self) -> &[Vec<u8>] { &self.input_commitments }

    /// Gets the commitments of the output maps in output order
    pub fn output_commitments(&self) -> &[Vec<u8>] { &self.output_commitments }

    /// Gets the root of the tree over the input map commitments
    pub fn inputs_root(&self) -> MerkleRoot { self.inputs_root }

    /// Gets the root of the tree over the output map commitments
    pub fn outputs_root(&self) -> MerkleRoot { self.outputs_root }

    /// Gets the number of inputs
    pub fn input_count(&self) -> usize { self.input_maps.len() }

    /// Gets the number of outputs
    pub fn output_count(&self) -> usize { self.output_maps.len() }
}

fn merkleize(map: &KeyMap) -> Result<MerkleizedMap> {
    MerkleizedMap::new(map.keys().cloned().collect(), map.values().cloned().collect())
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, ScriptBuf, Txid};

    use super::*;
    use crate::errors::{Error, PsbtError};
    use crate::merkle::hash_leaf;

    fn two_in_one_out() -> PsbtV2 {
        let mut psbt = PsbtV2::new();
        psbt.set_global_psbt_version(2);
        psbt.set_global_tx_version(2);
        psbt.set_global_input_count(2);
        psbt.set_global_output_count(1);
        for i in 0..2 {
            psbt.set_input_previous_txid(i, Txid::from_byte_array([i as u8; 32]));
            psbt.set_input_output_index(i, i as u32);
        }
        psbt.set_output_amount(0, Amount::from_sat(5_000));
        psbt.set_output_script(0, &ScriptBuf::from_bytes(vec![0x51]));
        psbt
    }

    #[test]
    fn test_maps_follow_sorted_keys() {
        let psbt = two_in_one_out();

        let merkleized = MerkleizedPsbt::new(&psbt).expect("should merkleize");

        let keys = merkleized.input_maps()[0].keys();
        assert_eq!(keys, &[vec![0x0e], vec![0x0f]]);
        assert_eq!(merkleized.global_map().len(), 4);
    }

    #[test]
    fn test_roots_commit_to_map_commitments() {
        let psbt = two_in_one_out();

        let merkleized = MerkleizedPsbt::new(&psbt).expect("should merkleize");

        let expected_outputs_root = hash_leaf(&merkleized.output_maps()[0].commitment());
        assert_eq!(merkleized.outputs_root(), expected_outputs_root);
        assert_eq!(merkleized.input_commitments().len(), 2);
        assert_eq!(
            merkleized.inputs_root(),
            MerkleTree::from_elements(merkleized.input_commitments()).root()
        );
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut psbt = two_in_one_out();
        let merkleized = MerkleizedPsbt::new(&psbt).expect("should merkleize");

        psbt.set_input_sequence(0, 7);

        assert_ne!(merkleized.psbt(), &psbt);
        assert_eq!(merkleized.input_maps()[0].len(), 2);
    }

    #[test]
    fn test_declared_input_without_records() {
        let mut psbt = two_in_one_out();
        psbt.set_global_input_count(3);

        let merkleized = MerkleizedPsbt::new(&psbt).expect("should merkleize");

        assert_eq!(merkleized.input_count(), 3);
        assert!(merkleized.input_maps()[2].is_empty());
    }

    #[test]
    fn test_requires_counts() {
        let psbt = PsbtV2::new();

        let result = MerkleizedPsbt::new(&psbt);

        assert!(matches!(result, Err(Error::Psbt(PsbtError::MissingField { .. }))));
    }
}
