//! Transaction extractor
//!
//! Serializes a finalized PSBT into the network transaction format.

use bitcoin::hashes::Hash;
use tracing::debug;

use super::model::PsbtV2;
use crate::types::SEGWIT_MARKER_FLAG;
use crate::utils::{encode_varint, write_varslice};
use crate::Result;

/// Extracts the raw transaction bytes from a finalized PSBT
///
/// The segwit marker and flag are written when any input carries a witness
/// UTXO; in that case each input contributes its final witness, or an empty
/// witness if it has none. The locktime is the fallback locktime, or 0.
///
/// # Errors
/// Returns an error if a required field (version, counts, previous
/// outpoints, output amounts or scripts) is missing or malformed
pub fn extract(psbt: &PsbtV2) -> Result<Vec<u8>> {
    let input_count = psbt.global_input_count()?;
    let output_count = psbt.global_output_count()?;
    let segwit = (0..input_count).any(|i| psbt.has_input_witness_utxo(i));

    let mut tx = psbt.global_tx_version()?.to_le_bytes().to_vec();
    if segwit {
        tx.extend_from_slice(&SEGWIT_MARKER_FLAG);
    }

    tx.extend_from_slice(&encode_varint(input_count as u64));
    let mut witnesses = Vec::new();
    for index in 0..input_count {
        tx.extend_from_slice(&psbt.input_previous_txid(index)?.to_byte_array());
        tx.extend_from_slice(&psbt.input_output_index(index)?.to_le_bytes());
        let script_sig =
            psbt.input_final_scriptsig(index).map(|s| s.as_bytes()).unwrap_or_default();
        write_varslice(&mut tx, script_sig);
        tx.extend_from_slice(&psbt.input_sequence(index)?.to_le_bytes());
        if segwit {
            match psbt.input_final_scriptwitness(index)? {
                Some(witness) => {
                    witnesses.extend_from_slice(&bitcoin::consensus::serialize(&witness))
                }
                None => witnesses.push(0x00),
            }
        }
    }

    tx.extend_from_slice(&encode_varint(output_count as u64));
    for index in 0..output_count {
        tx.extend_from_slice(&psbt.output_amount(index)?.to_sat().to_le_bytes());
        write_varslice(&mut tx, psbt.output_script(index)?.as_bytes());
    }

    tx.extend_from_slice(&witnesses);
    tx.extend_from_slice(&psbt.global_fallback_locktime()?.unwrap_or(0).to_le_bytes());

    debug!(bytes = tx.len(), segwit, "extracted transaction");
    Ok(tx)
}
