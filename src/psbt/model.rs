//! PSBTv2 record groups with typed accessors
//!
//! Every record is stored as raw bytes keyed by `key_type ‖ key_data`.
//! Typed accessors encode and decode fixed-width integers and Bitcoin
//! structures on the way in and out; nothing beyond presence and
//! decodability is validated here.

use std::collections::BTreeMap;

use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, KeySource};
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::{Amount, Script, Transaction, TxOut, Txid, Witness};

use super::keys::{map_key, GlobalKey, InputKey, OutputKey};
use crate::errors::PsbtError;
use crate::types::{Bytes32, DEFAULT_SEQUENCE};
use crate::utils::{encode_varint, ByteReader};
use crate::Result;

/// One PSBT map: full key bytes (`key_type ‖ key_data`) to value bytes
///
/// Iteration order is byte-lexicographic, which is the order the
/// merkleized representation commits to.
pub type KeyMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory PSBTv2
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PsbtV2 {
    pub(crate) global: KeyMap,
    pub(crate) inputs: Vec<KeyMap>,
    pub(crate) outputs: Vec<KeyMap>,
}

impl PsbtV2 {
    /// Creates an empty PSBT
    pub fn new() -> Self { Self::default() }

    /// Gets the global map
    pub fn global_map(&self) -> &KeyMap { &self.global }

    /// Gets the map of input `index`, if any record was ever set on it
    pub fn input_map(&self, index: usize) -> Option<&KeyMap> { self.inputs.get(index) }

    /// Gets the map of output `index`, if any record was ever set on it
    pub fn output_map(&self, index: usize) -> Option<&KeyMap> { self.outputs.get(index) }

    // ===== Global =====

    /// Sets the transaction version
    pub fn set_global_tx_version(&mut self, version: u32) {
        self.set_global(GlobalKey::TxVersion, version.to_le_bytes().to_vec());
    }

    /// Gets the transaction version
    pub fn global_tx_version(&self) -> Result<u32> {
        let value = self.require_global(GlobalKey::TxVersion, "tx version")?;
        read_u32(value, "tx version")
    }

    /// Sets the fallback locktime
    pub fn set_global_fallback_locktime(&mut self, locktime: u32) {
        self.set_global(GlobalKey::FallbackLocktime, locktime.to_le_bytes().to_vec());
    }

    /// Gets the fallback locktime, if set
    pub fn global_fallback_locktime(&self) -> Result<Option<u32>> {
        self.get_global(GlobalKey::FallbackLocktime)
            .map(|value| read_u32(value, "fallback locktime"))
            .transpose()
    }

    /// Sets the number of inputs
    pub fn set_global_input_count(&mut self, count: usize) {
        self.set_global(GlobalKey::InputCount, encode_varint(count as u64));
    }

    /// Gets the number of inputs
    pub fn global_input_count(&self) -> Result<usize> {
        let value = self.require_global(GlobalKey::InputCount, "input count")?;
        read_count(value, "input count")
    }

    /// Sets the number of outputs
    pub fn set_global_output_count(&mut self, count: usize) {
        self.set_global(GlobalKey::OutputCount, encode_varint(count as u64));
    }

    /// Gets the number of outputs
    pub fn global_output_count(&self) -> Result<usize> {
        let value = self.require_global(GlobalKey::OutputCount, "output count")?;
        read_count(value, "output count")
    }

    /// Sets the transaction modifiable flags
    pub fn set_global_tx_modifiable(&mut self, flags: u8) {
        self.set_global(GlobalKey::TxModifiable, vec![flags]);
    }

    /// Gets the transaction modifiable flags, if set
    pub fn global_tx_modifiable(&self) -> Result<Option<u8>> {
        self.get_global(GlobalKey::TxModifiable)
            .map(|value| read_array::<1>(value, "tx modifiable").map(|[flags]| flags))
            .transpose()
    }

    /// Sets the PSBT version number
    pub fn set_global_psbt_version(&mut self, version: u32) {
        self.set_global(GlobalKey::Version, version.to_le_bytes().to_vec());
    }

    /// Gets the PSBT version number
    pub fn global_psbt_version(&self) -> Result<u32> {
        let value = self.require_global(GlobalKey::Version, "psbt version")?;
        read_u32(value, "psbt version")
    }

    // ===== Inputs =====

    /// Sets the full previous transaction of input `index`
    pub fn set_input_non_witness_utxo(&mut self, index: usize, tx: &Transaction) {
        self.set_input(index, InputKey::NonWitnessUtxo, &[], serialize(tx));
    }

    /// Gets the full previous transaction of input `index`, if set
    pub fn input_non_witness_utxo(&self, index: usize) -> Result<Option<Transaction>> {
        self.get_input(index, InputKey::NonWitnessUtxo, &[])
            .map(|value| decode(value, "non-witness utxo"))
            .transpose()
    }

    /// Sets the spent output of input `index`
    ///
    /// Stored as `amount (8 bytes LE) ‖ varslice(script)`.
    pub fn set_input_witness_utxo(&mut self, index: usize, utxo: &TxOut) {
        self.set_input(index, InputKey::WitnessUtxo, &[], serialize(utxo));
    }

    /// Gets the spent output of input `index`, if set
    pub fn input_witness_utxo(&self, index: usize) -> Result<Option<TxOut>> {
        self.get_input(index, InputKey::WitnessUtxo, &[])
            .map(|value| decode(value, "witness utxo"))
            .transpose()
    }

    /// Whether input `index` carries a witness UTXO
    pub fn has_input_witness_utxo(&self, index: usize) -> bool {
        self.get_input(index, InputKey::WitnessUtxo, &[]).is_some()
    }

    /// Sets the signature made by `pubkey` on input `index`
    pub fn set_input_partial_sig(&mut self, index: usize, pubkey: &[u8], signature: &[u8]) {
        self.set_input(index, InputKey::PartialSig, pubkey, signature.to_vec());
    }

    /// Gets the signature made by `pubkey` on input `index`, if set
    pub fn input_partial_sig(&self, index: usize, pubkey: &[u8]) -> Option<&[u8]> {
        self.get_input(index, InputKey::PartialSig, pubkey)
    }

    /// Gets every `(pubkey, signature)` pair on input `index`
    pub fn input_partial_sigs(&self, index: usize) -> Vec<(&[u8], &[u8])> {
        self.input_entries(index, InputKey::PartialSig)
    }

    /// Sets the sighash type of input `index`
    pub fn set_input_sighash_type(&mut self, index: usize, sighash_type: u32) {
        self.set_input(index, InputKey::SighashType, &[], sighash_type.to_le_bytes().to_vec());
    }

    /// Gets the sighash type of input `index`, if set
    pub fn input_sighash_type(&self, index: usize) -> Result<Option<u32>> {
        self.get_input(index, InputKey::SighashType, &[])
            .map(|value| read_u32(value, "sighash type"))
            .transpose()
    }

    /// Sets the redeem script of input `index`
    pub fn set_input_redeem_script(&mut self, index: usize, script: &Script) {
        self.set_input(index, InputKey::RedeemScript, &[], script.to_bytes());
    }

    /// Gets the redeem script of input `index`, if set
    pub fn input_redeem_script(&self, index: usize) -> Option<&Script> {
        self.get_input(index, InputKey::RedeemScript, &[]).map(Script::from_bytes)
    }

    /// Sets the BIP32 origin of `pubkey` on input `index`
    pub fn set_input_bip32_derivation(&mut self, index: usize, pubkey: &[u8], origin: &KeySource) {
        self.set_input(index, InputKey::Bip32Derivation, pubkey, encode_key_source(origin));
    }

    /// Gets the BIP32 origin of `pubkey` on input `index`, if set
    pub fn input_bip32_derivation(&self, index: usize, pubkey: &[u8]) -> Result<Option<KeySource>> {
        self.get_input(index, InputKey::Bip32Derivation, pubkey)
            .map(|value| decode_key_source(value, "bip32 derivation"))
            .transpose()
    }

    /// Sets the finalized scriptSig of input `index`
    pub fn set_input_final_scriptsig(&mut self, index: usize, script_sig: &Script) {
        self.set_input(index, InputKey::FinalScriptSig, &[], script_sig.to_bytes());
    }

    /// Gets the finalized scriptSig of input `index`, if set
    pub fn input_final_scriptsig(&self, index: usize) -> Option<&Script> {
        self.get_input(index, InputKey::FinalScriptSig, &[]).map(Script::from_bytes)
    }

    /// Sets the finalized witness of input `index`
    pub fn set_input_final_scriptwitness(&mut self, index: usize, witness: &Witness) {
        self.set_input(index, InputKey::FinalScriptWitness, &[], serialize(witness));
    }

    /// Gets the finalized witness of input `index`, if set
    pub fn input_final_scriptwitness(&self, index: usize) -> Result<Option<Witness>> {
        self.get_input(index, InputKey::FinalScriptWitness, &[])
            .map(|value| decode(value, "final script witness"))
            .transpose()
    }

    /// Sets the previous transaction id of input `index`
    pub fn set_input_previous_txid(&mut self, index: usize, txid: Txid) {
        self.set_input(index, InputKey::PreviousTxid, &[], txid.to_byte_array().to_vec());
    }

    /// Gets the previous transaction id of input `index`
    pub fn input_previous_txid(&self, index: usize) -> Result<Txid> {
        let value = self.require_input(index, InputKey::PreviousTxid, "previous txid")?;
        read_array::<32>(value, "previous txid").map(Txid::from_byte_array)
    }

    /// Sets the spent output index of input `index`
    pub fn set_input_output_index(&mut self, index: usize, vout: u32) {
        self.set_input(index, InputKey::OutputIndex, &[], vout.to_le_bytes().to_vec());
    }

    /// Gets the spent output index of input `index`
    pub fn input_output_index(&self, index: usize) -> Result<u32> {
        let value = self.require_input(index, InputKey::OutputIndex, "output index")?;
        read_u32(value, "output index")
    }

    /// Sets the sequence number of input `index`
    pub fn set_input_sequence(&mut self, index: usize, sequence: u32) {
        self.set_input(index, InputKey::Sequence, &[], sequence.to_le_bytes().to_vec());
    }

    /// Gets the sequence number of input `index`
    ///
    /// Defaults to `0xffffffff` when absent.
    pub fn input_sequence(&self, index: usize) -> Result<u32> {
        match self.get_input(index, InputKey::Sequence, &[]) {
            Some(value) => read_u32(value, "sequence"),
            None => Ok(DEFAULT_SEQUENCE),
        }
    }

    /// Sets the taproot key path signature of input `index`
    pub fn set_input_tap_key_sig(&mut self, index: usize, signature: &[u8]) {
        self.set_input(index, InputKey::TapKeySig, &[], signature.to_vec());
    }

    /// Gets the taproot key path signature of input `index`, if set
    pub fn input_tap_key_sig(&self, index: usize) -> Option<&[u8]> {
        self.get_input(index, InputKey::TapKeySig, &[])
    }

    /// Sets the taproot BIP32 origin of `xonly_pubkey` on input `index`
    ///
    /// # Arguments
    /// * `leaf_hashes` - Tap leaves the key appears in (empty for key path only)
    /// * `origin` - Master fingerprint and derivation path
    pub fn set_input_tap_bip32_derivation(
        &mut self,
        index: usize,
        xonly_pubkey: &[u8],
        leaf_hashes: &[Bytes32],
        origin: &KeySource,
    ) {
        let value = encode_tap_key_source(leaf_hashes, origin);
        self.set_input(index, InputKey::TapBip32Derivation, xonly_pubkey, value);
    }

    /// Gets the taproot BIP32 origin of `xonly_pubkey` on input `index`, if set
    pub fn input_tap_bip32_derivation(
        &self,
        index: usize,
        xonly_pubkey: &[u8],
    ) -> Result<Option<(Vec<Bytes32>, KeySource)>> {
        self.get_input(index, InputKey::TapBip32Derivation, xonly_pubkey)
            .map(|value| decode_tap_key_source(value, "tap bip32 derivation"))
            .transpose()
    }

    /// Removes every record of the given types from input `index`
    pub fn delete_input_entries(&mut self, index: usize, key_types: &[InputKey]) {
        if let Some(map) = self.inputs.get_mut(index) {
            map.retain(|key, _| !key_types.iter().any(|kt| key.first() == Some(&(*kt as u8))));
        }
    }

    // ===== Outputs =====

    /// Sets the redeem script of output `index`
    pub fn set_output_redeem_script(&mut self, index: usize, script: &Script) {
        self.set_output(index, OutputKey::RedeemScript, &[], script.to_bytes());
    }

    /// Gets the redeem script of output `index`, if set
    pub fn output_redeem_script(&self, index: usize) -> Option<&Script> {
        self.get_output(index, OutputKey::RedeemScript, &[]).map(Script::from_bytes)
    }

    /// Sets the BIP32 origin of `pubkey` on output `index`
    pub fn set_output_bip32_derivation(&mut self, index: usize, pubkey: &[u8], origin: &KeySource) {
        self.set_output(index, OutputKey::Bip32Derivation, pubkey, encode_key_source(origin));
    }

    /// Gets the BIP32 origin of `pubkey` on output `index`, if set
    pub fn output_bip32_derivation(
        &self,
        index: usize,
        pubkey: &[u8],
    ) -> Result<Option<KeySource>> {
        self.get_output(index, OutputKey::Bip32Derivation, pubkey)
            .map(|value| decode_key_source(value, "bip32 derivation"))
            .transpose()
    }

    /// Sets the amount of output `index`
    pub fn set_output_amount(&mut self, index: usize, amount: Amount) {
        self.set_output(index, OutputKey::Amount, &[], amount.to_sat().to_le_bytes().to_vec());
    }

    /// Gets the amount of output `index`
    pub fn output_amount(&self, index: usize) -> Result<Amount> {
        let value = self.require_output(index, OutputKey::Amount, "amount")?;
        read_array::<8>(value, "amount").map(|bytes| Amount::from_sat(u64::from_le_bytes(bytes)))
    }

    /// Sets the script of output `index`
    pub fn set_output_script(&mut self, index: usize, script: &Script) {
        self.set_output(index, OutputKey::Script, &[], script.to_bytes());
    }

    /// Gets the script of output `index`
    pub fn output_script(&self, index: usize) -> Result<&Script> {
        self.require_output(index, OutputKey::Script, "script").map(Script::from_bytes)
    }

    /// Sets the taproot BIP32 origin of `xonly_pubkey` on output `index`
    pub fn set_output_tap_bip32_derivation(
        &mut self,
        index: usize,
        xonly_pubkey: &[u8],
        leaf_hashes: &[Bytes32],
        origin: &KeySource,
    ) {
        let value = encode_tap_key_source(leaf_hashes, origin);
        self.set_output(index, OutputKey::TapBip32Derivation, xonly_pubkey, value);
    }

    /// Gets the taproot BIP32 origin of `xonly_pubkey` on output `index`, if set
    pub fn output_tap_bip32_derivation(
        &self,
        index: usize,
        xonly_pubkey: &[u8],
    ) -> Result<Option<(Vec<Bytes32>, KeySource)>> {
        self.get_output(index, OutputKey::TapBip32Derivation, xonly_pubkey)
            .map(|value| decode_tap_key_source(value, "tap bip32 derivation"))
            .transpose()
    }

    // ===== Derived =====

    /// Computes the fee paid by the transaction
    ///
    /// Each input's spent amount comes from its witness UTXO, or from the
    /// referenced output of its non-witness UTXO.
    ///
    /// # Errors
    /// * [`PsbtError::MissingField`] if an input carries neither UTXO
    /// * [`PsbtError::AmountOverflow`] if input or output amounts overflow
    /// * [`PsbtError::InvalidFee`] if outputs exceed inputs
    pub fn fee(&self) -> Result<Amount> {
        let spent = (0..self.global_input_count()?).map(|index| self.spent_amount(index));
        let inputs = sum_amounts("inputs", spent)?;
        let paid = (0..self.global_output_count()?).map(|index| self.output_amount(index));
        let outputs = sum_amounts("outputs", paid)?;

        inputs.checked_sub(outputs).ok_or_else(|| {
            PsbtError::InvalidFee { inputs: inputs.to_sat(), outputs: outputs.to_sat() }.into()
        })
    }

    fn spent_amount(&self, index: usize) -> Result<Amount> {
        if let Some(utxo) = self.input_witness_utxo(index)? {
            return Ok(utxo.value);
        }
        let tx = self.input_non_witness_utxo(index)?.ok_or_else(|| PsbtError::MissingField {
            field: "witness or non-witness utxo",
            scope: format!("input {index}"),
        })?;
        let vout = self.input_output_index(index)? as usize;
        tx.output.get(vout).map(|out| out.value).ok_or_else(|| {
            let count = tx.output.len();
            PsbtError::IndexOutOfRange { scope: "previous output", index: vout, count }.into()
        })
    }

    // ===== Raw access =====

    pub(crate) fn set_global(&mut self, key_type: GlobalKey, value: Vec<u8>) {
        self.global.insert(map_key(key_type, &[]), value);
    }

    pub(crate) fn get_global(&self, key_type: GlobalKey) -> Option<&[u8]> {
        self.global.get(&map_key(key_type, &[])).map(Vec::as_slice)
    }

    fn require_global(&self, key_type: GlobalKey, field: &'static str) -> Result<&[u8]> {
        self.get_global(key_type)
            .ok_or_else(|| PsbtError::MissingField { field, scope: "global".to_string() }.into())
    }

    pub(crate) fn set_input(
        &mut self,
        index: usize,
        key_type: InputKey,
        key_data: &[u8],
        value: Vec<u8>,
    ) {
        grow(&mut self.inputs, index).insert(map_key(key_type, key_data), value);
    }

    fn get_input(&self, index: usize, key_type: InputKey, key_data: &[u8]) -> Option<&[u8]> {
        self.inputs.get(index)?.get(&map_key(key_type, key_data)).map(Vec::as_slice)
    }

    fn require_input(
        &self,
        index: usize,
        key_type: InputKey,
        field: &'static str,
    ) -> Result<&[u8]> {
        self.get_input(index, key_type, &[]).ok_or_else(|| {
            PsbtError::MissingField { field, scope: format!("input {index}") }.into()
        })
    }

    fn input_entries(&self, index: usize, key_type: InputKey) -> Vec<(&[u8], &[u8])> {
        let Some(map) = self.inputs.get(index) else {
            return Vec::new();
        };
        let tag = key_type as u8;
        map.range(vec![tag]..)
            .take_while(|(key, _)| key.first() == Some(&tag))
            .map(|(key, value)| (&key[1..], value.as_slice()))
            .collect()
    }

    pub(crate) fn set_output(
        &mut self,
        index: usize,
        key_type: OutputKey,
        key_data: &[u8],
        value: Vec<u8>,
    ) {
        grow(&mut self.outputs, index).insert(map_key(key_type, key_data), value);
    }

    fn get_output(&self, index: usize, key_type: OutputKey, key_data: &[u8]) -> Option<&[u8]> {
        self.outputs.get(index)?.get(&map_key(key_type, key_data)).map(Vec::as_slice)
    }

    fn require_output(
        &self,
        index: usize,
        key_type: OutputKey,
        field: &'static str,
    ) -> Result<&[u8]> {
        self.get_output(index, key_type, &[]).ok_or_else(|| {
            PsbtError::MissingField { field, scope: format!("output {index}") }.into()
        })
    }
}

fn sum_amounts(
    scope: &'static str,
    amounts: impl Iterator<Item = Result<Amount>>,
) -> Result<Amount> {
    let mut total = Amount::ZERO;
    for amount in amounts {
        let amount = amount?;
        total = total.checked_add(amount).ok_or(PsbtError::AmountOverflow {
            scope,
            total: total.to_sat(),
            amount: amount.to_sat(),
        })?;
    }
    Ok(total)
}

fn grow(maps: &mut Vec<KeyMap>, index: usize) -> &mut KeyMap {
    if maps.len() <= index {
        maps.resize_with(index + 1, KeyMap::new);
    }
    &mut maps[index]
}

fn read_array<const N: usize>(value: &[u8], field: &'static str) -> Result<[u8; N]> {
    <[u8; N]>::try_from(value).map_err(|_| {
        PsbtError::InvalidFieldLength { field, expected: N, actual: value.len() }.into()
    })
}

fn read_u32(value: &[u8], field: &'static str) -> Result<u32> {
    read_array::<4>(value, field).map(u32::from_le_bytes)
}

fn read_count(value: &[u8], field: &'static str) -> Result<usize> {
    let mut reader = ByteReader::new(value);
    let count = reader.read_varint()?;
    usize::try_from(count).map_err(|_| {
        PsbtError::InvalidFieldValue { field, reason: format!("{count} too large") }.into()
    })
}

fn decode<T: bitcoin::consensus::Decodable>(value: &[u8], field: &'static str) -> Result<T> {
    deserialize(value)
        .map_err(|e| PsbtError::InvalidFieldValue { field, reason: e.to_string() }.into())
}

fn encode_key_source((fingerprint, path): &KeySource) -> Vec<u8> {
    let mut out = fingerprint.as_bytes().to_vec();
    for child in path.as_ref() {
        out.extend_from_slice(&u32::from(*child).to_le_bytes());
    }
    out
}

fn decode_key_source(value: &[u8], field: &'static str) -> Result<KeySource> {
    if value.len() < 4 || value.len() % 4 != 0 {
        return Err(PsbtError::InvalidFieldValue {
            field,
            reason: format!("key origin of {} bytes", value.len()),
        }
        .into());
    }
    let fingerprint = Fingerprint::from(read_array::<4>(&value[..4], field)?);
    let path: Vec<ChildNumber> = value[4..]
        .chunks_exact(4)
        .map(|chunk| {
            ChildNumber::from(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        })
        .collect();
    Ok((fingerprint, DerivationPath::from(path)))
}

fn encode_tap_key_source(leaf_hashes: &[Bytes32], origin: &KeySource) -> Vec<u8> {
    let mut out = encode_varint(leaf_hashes.len() as u64);
    for hash in leaf_hashes {
        out.extend_from_slice(hash);
    }
    out.extend_from_slice(&encode_key_source(origin));
    out
}

fn decode_tap_key_source(value: &[u8], field: &'static str) -> Result<(Vec<Bytes32>, KeySource)> {
    let mut reader = ByteReader::new(value);
    let count = reader.read_varint()?;
    let mut leaf_hashes = Vec::new();
    for _ in 0..count {
        leaf_hashes.push(read_array::<32>(reader.read_slice(32)?, field)?);
    }
    let origin = decode_key_source(&value[reader.position()..], field)?;
    Ok((leaf_hashes, origin))
}
