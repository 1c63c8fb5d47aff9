//! Binary and base64 encoding of PSBTs
//!
//! A serialized PSBT is the magic `psbt\xff`, the global map, then one map
//! per input and one per output. Each map is a run of
//! `varint(key_len) ‖ key ‖ varint(value_len) ‖ value` records closed by a
//! zero byte.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bitcoin::consensus::encode::deserialize;
use bitcoin::Transaction;
use tracing::debug;

use super::keys::{map_key, GlobalKey};
use super::model::{KeyMap, PsbtV2};
use crate::errors::PsbtError;
use crate::types::{PSBT_MAGIC, PSBT_MAP_SEPARATOR, PSBT_VERSION_2};
use crate::utils::{write_varslice, ByteReader};
use crate::Result;

impl PsbtV2 {
    /// Serializes the PSBT to its binary form
    ///
    /// Writes one map per declared input and output; missing maps are
    /// written empty.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = PSBT_MAGIC.to_vec();
        write_map(&mut out, &self.global);
        let empty = KeyMap::new();
        for index in 0..self.input_len() {
            write_map(&mut out, self.inputs.get(index).unwrap_or(&empty));
        }
        for index in 0..self.output_len() {
            write_map(&mut out, self.outputs.get(index).unwrap_or(&empty));
        }
        out
    }

    /// Parses a binary PSBTv2
    ///
    /// # Errors
    /// * [`PsbtError::InvalidMagic`] if the magic bytes are wrong
    /// * [`PsbtError::UnsupportedVersion`] if the global version is not 2
    /// * [`PsbtError::MissingField`] if input or output counts are absent
    /// * [`PsbtError::UnexpectedEof`], [`PsbtError::DuplicateKey`] or
    ///   [`PsbtError::TrailingData`] for structurally invalid input
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = open(bytes)?;
        let global = read_map(&mut reader, "global")?;
        let mut psbt = Self { global, inputs: Vec::new(), outputs: Vec::new() };

        let version = match psbt.get_global(GlobalKey::Version) {
            Some(_) => psbt.global_psbt_version()?,
            None => 0,
        };
        if version != PSBT_VERSION_2 {
            return Err(PsbtError::UnsupportedVersion(version).into());
        }

        for index in 0..psbt.global_input_count()? {
            psbt.inputs.push(read_map(&mut reader, &format!("input {index}"))?);
        }
        for index in 0..psbt.global_output_count()? {
            psbt.outputs.push(read_map(&mut reader, &format!("output {index}"))?);
        }
        finish(&reader, bytes)?;

        debug!(inputs = psbt.inputs.len(), outputs = psbt.outputs.len(), "deserialized psbt");
        Ok(psbt)
    }

    /// Encodes the binary form as standard base64
    pub fn to_base64(&self) -> String { STANDARD.encode(self.serialize()) }

    /// Parses a base64 encoded PSBTv2
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes =
            STANDARD.decode(text.trim()).map_err(|e| PsbtError::InvalidBase64(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    /// Converts a binary PSBTv0 into a PSBTv2
    ///
    /// The unsigned transaction is dropped from the global map and its
    /// fields are distributed into the v2 records: version, locktime and
    /// counts globally, previous outpoint and sequence per input, amount and
    /// script per output. All other records are carried over unchanged.
    pub fn from_v0(bytes: &[u8]) -> Result<Self> {
        let mut reader = open(bytes)?;
        let mut global = read_map(&mut reader, "global")?;
        let unsigned = global.remove(&map_key(GlobalKey::UnsignedTx, &[])).ok_or_else(|| {
            PsbtError::MissingField { field: "unsigned tx", scope: "global".to_string() }
        })?;
        let tx: Transaction = deserialize(&unsigned).map_err(|e| PsbtError::InvalidFieldValue {
            field: "unsigned tx",
            reason: e.to_string(),
        })?;
        global.remove(&map_key(GlobalKey::Version, &[]));

        let mut psbt = Self { global, inputs: Vec::new(), outputs: Vec::new() };
        psbt.set_global_tx_version(tx.version.0 as u32);
        psbt.set_global_fallback_locktime(tx.lock_time.to_consensus_u32());
        psbt.set_global_input_count(tx.input.len());
        psbt.set_global_output_count(tx.output.len());
        psbt.set_global_psbt_version(PSBT_VERSION_2);

        for (index, txin) in tx.input.iter().enumerate() {
            psbt.inputs.push(read_map(&mut reader, &format!("input {index}"))?);
            psbt.set_input_previous_txid(index, txin.previous_output.txid);
            psbt.set_input_output_index(index, txin.previous_output.vout);
            psbt.set_input_sequence(index, txin.sequence.to_consensus_u32());
        }
        for (index, txout) in tx.output.iter().enumerate() {
            psbt.outputs.push(read_map(&mut reader, &format!("output {index}"))?);
            psbt.set_output_amount(index, txout.value);
            psbt.set_output_script(index, &txout.script_pubkey);
        }
        finish(&reader, bytes)?;

        debug!(txid = %tx.compute_txid(), "converted psbt v0 to v2");
        Ok(psbt)
    }

    /// Number of input maps to write: the declared count, else the stored maps
    fn input_len(&self) -> usize { self.global_input_count().unwrap_or(self.inputs.len()) }

    /// Number of output maps to write: the declared count, else the stored maps
    fn output_len(&self) -> usize { self.global_output_count().unwrap_or(self.outputs.len()) }
}

impl TryFrom<&bitcoin::Psbt> for PsbtV2 {
    type Error = crate::errors::Error;

    fn try_from(psbt: &bitcoin::Psbt) -> Result<Self> { Self::from_v0(&psbt.serialize()) }
}

fn open(bytes: &[u8]) -> Result<ByteReader<'_>> {
    let mut reader = ByteReader::new(bytes);
    let magic = reader.read_slice(PSBT_MAGIC.len()).map_err(|_| PsbtError::InvalidMagic)?;
    if magic != PSBT_MAGIC {
        return Err(PsbtError::InvalidMagic.into());
    }
    Ok(reader)
}

fn finish(reader: &ByteReader<'_>, bytes: &[u8]) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(PsbtError::TrailingData { count: bytes.len() - reader.position() }.into())
    }
}

fn write_map(out: &mut Vec<u8>, map: &KeyMap) {
    for (key, value) in map {
        write_varslice(out, key);
        write_varslice(out, value);
    }
    out.push(PSBT_MAP_SEPARATOR);
}

fn read_map(reader: &mut ByteReader<'_>, scope: &str) -> Result<KeyMap> {
    let mut map = KeyMap::new();
    loop {
        let key = reader.read_varslice()?;
        if key.is_empty() {
            return Ok(map);
        }
        let value = reader.read_varslice()?;
        if map.insert(key.to_vec(), value.to_vec()).is_some() {
            return Err(PsbtError::DuplicateKey { key: hex::encode(key), scope: scope.to_string() }
                .into());
        }
    }
}
