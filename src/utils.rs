//! Hashing and byte encoding helpers shared across modules

use bitcoin::consensus::encode::{deserialize_partial, serialize, VarInt};
use sha2::{Digest, Sha256};

use crate::errors::{FinalizeError, PsbtError};
use crate::types::{
    Bytes32, MAX_DIRECT_PUSH, MAX_PUSHDATA1, MAX_PUSHDATA2, OP_PUSHDATA1, OP_PUSHDATA2,
};
use crate::Result;

/// Computes the SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encodes `n` as a Bitcoin compact-size integer
pub fn encode_varint(n: u64) -> Vec<u8> { serialize(&VarInt(n)) }

/// Number of bytes `encode_varint(n)` produces
pub fn varint_len(n: u64) -> usize { VarInt(n).size() }

/// Decodes a compact-size integer from the front of `bytes`
///
/// # Returns
/// The decoded value and the number of bytes consumed, or `None` if `bytes`
/// does not start with a complete, minimally encoded varint
pub fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    deserialize_partial::<VarInt>(bytes).ok().map(|(v, used)| (v.0, used))
}

/// Appends `varint(data.len()) ‖ data` to `out`
pub fn write_varslice(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&encode_varint(data.len() as u64));
    out.extend_from_slice(data);
}

/// Appends a script push of `data` to `out`
///
/// Payloads of up to 75 bytes use a bare length byte, up to 256 bytes use
/// `OP_PUSHDATA1` and up to 65536 bytes use `OP_PUSHDATA2`. A length that
/// falls in a branch but does not fit its length field (exactly 256 or
/// 65536) is rejected rather than truncated.
///
/// # Errors
/// Returns [`FinalizeError::ScriptPushTooLarge`] when the length cannot be encoded
pub fn write_push(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = data.len();
    let too_large = || FinalizeError::ScriptPushTooLarge { len };
    if len <= MAX_DIRECT_PUSH {
        out.push(len as u8);
    } else if len <= MAX_PUSHDATA1 {
        let len = u8::try_from(len).map_err(|_| too_large())?;
        out.push(OP_PUSHDATA1);
        out.push(len);
    } else if len <= MAX_PUSHDATA2 {
        let len = u16::try_from(len).map_err(|_| too_large())?;
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&len.to_le_bytes());
    } else {
        return Err(too_large().into());
    }
    out.extend_from_slice(data);
    Ok(())
}

/// Sequential reader over a byte slice
///
/// Every read fails with [`PsbtError::UnexpectedEof`] instead of panicking
/// when the buffer runs short.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self { Self { bytes, pos: 0 } }

    pub(crate) fn position(&self) -> usize { self.pos }

    pub(crate) fn is_empty(&self) -> bool { self.pos >= self.bytes.len() }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(PsbtError::UnexpectedEof { offset: self.pos }.into()),
        }
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        if self.is_empty() {
            return Err(PsbtError::UnexpectedEof { offset: self.pos }.into());
        }
        let (value, used) = decode_varint(&self.bytes[self.pos..])
            .ok_or(PsbtError::InvalidVarInt { offset: self.pos })?;
        self.pos += used;
        Ok(value)
    }

    pub(crate) fn read_varslice(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| PsbtError::UnexpectedEof { offset: self.pos })?;
        self.read_slice(len)
    }
}
