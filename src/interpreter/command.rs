//! Client command codes and the dispatch table

use std::collections::HashMap;

use crate::errors::InterpreterError;
use crate::Result;

/// Requests the device may send while a host command is interrupted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientCommandCode {
    /// Hand a result (e.g. a signature) back to the host
    Yield = 0x10,
    /// Fetch the preimage of a SHA-256 hash
    GetPreimage = 0x40,
    /// Fetch a leaf hash and its inclusion proof
    GetMerkleLeafProof = 0x41,
    /// Look up the position of a leaf hash
    GetMerkleLeafIndex = 0x42,
    /// Drain queued elements of a multi-part response
    GetMoreElements = 0xa0,
}

impl ClientCommandCode {
    /// Every command the interpreter serves
    pub const ALL: [ClientCommandCode; 5] = [
        ClientCommandCode::Yield,
        ClientCommandCode::GetPreimage,
        ClientCommandCode::GetMerkleLeafProof,
        ClientCommandCode::GetMerkleLeafIndex,
        ClientCommandCode::GetMoreElements,
    ];

    /// Gets the command name used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            ClientCommandCode::Yield => "yield",
            ClientCommandCode::GetPreimage => "get preimage",
            ClientCommandCode::GetMerkleLeafProof => "get merkle leaf proof",
            ClientCommandCode::GetMerkleLeafIndex => "get merkle leaf index",
            ClientCommandCode::GetMoreElements => "get more elements",
        }
    }
}

impl From<ClientCommandCode> for u8 {
    fn from(code: ClientCommandCode) -> u8 { code as u8 }
}

impl TryFrom<u8> for ClientCommandCode {
    type Error = InterpreterError;

    fn try_from(byte: u8) -> std::result::Result<Self, Self::Error> {
        ClientCommandCode::ALL
            .into_iter()
            .find(|code| u8::from(*code) == byte)
            .ok_or(InterpreterError::UnknownCommand(byte))
    }
}

/// Builds an opcode lookup table from `(code, handler)` pairs
///
/// # Errors
/// Returns [`InterpreterError::DuplicateCommand`] if two entries share a code
pub(crate) fn build_dispatch_table<H>(
    entries: impl IntoIterator<Item = (ClientCommandCode, H)>,
) -> Result<HashMap<u8, H>> {
    let mut table = HashMap::new();
    for (code, handler) in entries {
        if table.insert(u8::from(code), handler).is_some() {
            return Err(InterpreterError::DuplicateCommand(code.into()).into());
        }
    }
    Ok(table)
}
