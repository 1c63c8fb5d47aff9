//! Input finalizer
//!
//! Turns the single signature collected for each input into its final
//! scriptSig and/or witness, then removes records that only mattered while
//! signing. Every input is checked before any input is modified, so a
//! failure leaves the PSBT untouched.

use bitcoin::{ScriptBuf, Witness};
use tracing::debug;

use super::keys::InputKey;
use super::model::PsbtV2;
use crate::errors::FinalizeError;
use crate::utils::write_push;
use crate::Result;

/// Records removed from every finalized input
const SIGNING_ONLY_KEYS: [InputKey; 4] = [
    InputKey::Bip32Derivation,
    InputKey::PartialSig,
    InputKey::TapBip32Derivation,
    InputKey::TapKeySig,
];

/// Final fields computed for one input
#[derive(Debug)]
struct FinalInput {
    script_sig: Option<ScriptBuf>,
    witness: Option<Witness>,
}

/// Finalizes every input of `psbt`
///
/// For each input exactly one signature must be present:
/// * a partial signature on a segwit v0 input (witness UTXO present) yields
///   the witness `[signature, pubkey]`, plus a scriptSig pushing the redeem
///   script when the input is wrapped in P2SH
/// * a partial signature on a legacy input yields the scriptSig
///   `push(signature) ‖ push(pubkey)`
/// * a taproot key signature (64 or 65 bytes) yields the witness `[signature]`
///
/// Inputs that already carry a final scriptSig or witness and no signature
/// are left as they are, so finalizing twice is harmless.
///
/// # Errors
/// * [`FinalizeError::NoSignature`] if an input has no signature
/// * [`FinalizeError::MultipleSignatures`] if an input has several partial signatures
/// * [`FinalizeError::ConflictingSignatures`] if both signature kinds are present
/// * [`FinalizeError::EmptyRedeemScript`] for a wrapped input with an empty redeem script
/// * [`FinalizeError::InvalidSchnorrSignature`] for a taproot signature of the wrong size
/// * [`FinalizeError::ScriptPushTooLarge`] if a push cannot be encoded
pub fn finalize(psbt: &mut PsbtV2) -> Result<()> {
    let count = psbt.global_input_count()?;
    let plans = (0..count).map(|index| plan_input(psbt, index)).collect::<Result<Vec<_>>>()?;

    for (index, plan) in plans.into_iter().enumerate() {
        let Some(plan) = plan else {
            debug!(input = index, "input already finalized");
            continue;
        };
        if let Some(script_sig) = &plan.script_sig {
            psbt.set_input_final_scriptsig(index, script_sig);
        }
        if let Some(witness) = &plan.witness {
            psbt.set_input_final_scriptwitness(index, witness);
        }
        clear_finalized_input(psbt, index);
    }
    Ok(())
}

fn plan_input(psbt: &PsbtV2, index: usize) -> Result<Option<FinalInput>> {
    let partial_sigs = psbt.input_partial_sigs(index);
    let tap_key_sig = psbt.input_tap_key_sig(index);

    if partial_sigs.is_empty() && tap_key_sig.is_none() {
        if psbt.input_final_scriptsig(index).is_some()
            || psbt.input_final_scriptwitness(index)?.is_some()
        {
            return Ok(None);
        }
        return Err(FinalizeError::NoSignature(index).into());
    }

    if let Some(signature) = tap_key_sig {
        if !partial_sigs.is_empty() {
            return Err(FinalizeError::ConflictingSignatures(index).into());
        }
        if signature.len() != 64 && signature.len() != 65 {
            return Err(
                FinalizeError::InvalidSchnorrSignature { input: index, len: signature.len() }.into()
            );
        }
        debug!(input = index, "finalizing taproot key path input");
        let witness = Witness::from_slice(&[signature]);
        return Ok(Some(FinalInput { script_sig: None, witness: Some(witness) }));
    }

    if partial_sigs.len() > 1 {
        let count = partial_sigs.len();
        return Err(FinalizeError::MultipleSignatures { input: index, count }.into());
    }
    let (pubkey, signature) = partial_sigs[0];

    if psbt.has_input_witness_utxo(index) {
        let script_sig = match psbt.input_redeem_script(index) {
            Some(redeem) if redeem.is_empty() => {
                return Err(FinalizeError::EmptyRedeemScript(index).into());
            }
            Some(redeem) => {
                let mut bytes = Vec::new();
                write_push(&mut bytes, redeem.as_bytes())?;
                Some(ScriptBuf::from_bytes(bytes))
            }
            None => None,
        };
        debug!(input = index, wrapped = script_sig.is_some(), "finalizing segwit v0 input");
        return Ok(Some(FinalInput {
            script_sig,
            witness: Some(Witness::from_slice(&[signature, pubkey])),
        }));
    }

    let mut bytes = Vec::new();
    write_push(&mut bytes, signature)?;
    write_push(&mut bytes, pubkey)?;
    debug!(input = index, "finalizing legacy input");
    Ok(Some(FinalInput { script_sig: Some(ScriptBuf::from_bytes(bytes)), witness: None }))
}

/// Removes records no longer needed once input `index` is final
///
/// The full previous transaction is dropped as well when the witness UTXO
/// is also present.
fn clear_finalized_input(psbt: &mut PsbtV2, index: usize) {
    let mut key_types = SIGNING_ONLY_KEYS.to_vec();
    let non_witness_key = [InputKey::NonWitnessUtxo as u8];
    let has_non_witness_utxo =
        psbt.input_map(index).is_some_and(|map| map.contains_key(&non_witness_key[..]));
    if psbt.has_input_witness_utxo(index) && has_non_witness_utxo {
        key_types.push(InputKey::NonWitnessUtxo);
    }
    psbt.delete_input_entries(index, &key_types);
}
