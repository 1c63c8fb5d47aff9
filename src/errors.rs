//! Error types for the Merkle PSBT library
//!
//! This module defines all error types used throughout the library,
//! providing detailed error information for debugging and handling.

use thiserror::Error;

/// The main error type for the Merkle PSBT library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Hash-tree errors
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    /// Merkleized map errors
    #[error(transparent)]
    Map(#[from] MapError),

    /// PSBT model and codec errors
    #[error(transparent)]
    Psbt(#[from] PsbtError),

    /// Client command interpreter errors
    #[error(transparent)]
    Interpreter(#[from] InterpreterError),

    /// Finalization and extraction errors
    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    /// Wallet policy errors
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Device exchange errors
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Errors that can occur when querying a hash tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MerkleError {
    /// Leaf index is outside the tree
    #[error("Leaf index {index} out of range for tree of size {size}")]
    LeafIndexOutOfRange {
        /// The requested leaf index
        index: usize,
        /// The number of leaves in the tree
        size: usize,
    },
}

/// Errors that can occur when building a merkleized map
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MapError {
    /// Keys and values have different cardinality
    #[error("Key count {keys} does not match value count {values}")]
    LengthMismatch {
        /// Number of keys supplied
        keys: usize,
        /// Number of values supplied
        values: usize,
    },

    /// Keys are not in strictly increasing byte order
    #[error("Keys must be strictly increasing: key {index} is not greater than its predecessor")]
    KeysNotStrictlyIncreasing {
        /// Index of the first offending key
        index: usize,
    },
}

/// Errors that can occur while reading, writing or decoding a PSBT
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PsbtError {
    /// A required field is absent
    #[error("Missing {field} in {scope}")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
        /// Map the field was looked up in (`global`, `input 3`, ...)
        scope: String,
    },

    /// A fixed-width field has the wrong length
    #[error("Invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidFieldLength {
        /// Name of the field
        field: &'static str,
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// A field value could not be decoded
    #[error("Invalid value for {field}: {reason}")]
    InvalidFieldValue {
        /// Name of the field
        field: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Input or output index beyond the declared count
    #[error("{scope} index {index} out of range (count {count})")]
    IndexOutOfRange {
        /// `input` or `output`
        scope: &'static str,
        /// The requested index
        index: usize,
        /// The declared count
        count: usize,
    },

    /// Serialized PSBT does not start with the `psbt\xff` magic
    #[error("Invalid PSBT magic bytes")]
    InvalidMagic,

    /// Serialized PSBT ends before a complete structure was read
    #[error("Unexpected end of data at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where more data was expected
        offset: usize,
    },

    /// A compact-size integer is malformed or non-minimal
    #[error("Invalid varint at offset {offset}")]
    InvalidVarInt {
        /// Byte offset of the varint
        offset: usize,
    },

    /// The same key appears twice in one map
    #[error("Duplicate key {key} in {scope}")]
    DuplicateKey {
        /// Hex encoding of the key
        key: String,
        /// Map containing the duplicate
        scope: String,
    },

    /// Bytes left after the last output map
    #[error("Trailing data after PSBT: {count} bytes")]
    TrailingData {
        /// Number of unread bytes
        count: usize,
    },

    /// PSBT version field is not the one this operation expects
    #[error("Unsupported PSBT version {0}")]
    UnsupportedVersion(u32),

    /// Base64 text could not be decoded
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    /// Summing input or output amounts overflows
    #[error("Amount overflow summing {scope}: {total} sat + {amount} sat")]
    AmountOverflow {
        /// `inputs` or `outputs`
        scope: &'static str,
        /// Running total before the overflowing amount
        total: u64,
        /// Amount that overflowed the total
        amount: u64,
    },

    /// Outputs exceed inputs
    #[error("Invalid fee: inputs {inputs} sat, outputs {outputs} sat")]
    InvalidFee {
        /// Sum of spent amounts
        inputs: u64,
        /// Sum of output amounts
        outputs: u64,
    },
}

/// Errors raised while serving device requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InterpreterError {
    /// Two handlers were registered under the same opcode
    #[error("Duplicate command code 0x{0:02x}")]
    DuplicateCommand(u8),

    /// A message limit is too small to carry the responses it must hold
    #[error("Invalid interpreter config: {field} is {value}, minimum is {minimum}")]
    InvalidConfig {
        /// Name of the limit
        field: &'static str,
        /// Configured value, after capping at 255
        value: usize,
        /// Smallest accepted value
        minimum: usize,
    },

    /// The request had no opcode byte
    #[error("empty command")]
    EmptyCommand,

    /// No handler is registered for the opcode
    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    /// The request body does not match the opcode's format
    #[error("Malformed {command} request: {reason}")]
    MalformedRequest {
        /// Command name
        command: &'static str,
        /// What was wrong with the body
        reason: String,
    },

    /// No preimage registered for the requested hash
    #[error("unknown preimage for hash {0}")]
    UnknownPreimage(String),

    /// No tree registered under the requested root
    #[error("unknown Merkle tree with root {0}")]
    UnknownTree(String),

    /// The requested tree size differs from the registered tree
    #[error("Tree size mismatch: requested {requested}, registered {actual}")]
    TreeSizeMismatch {
        /// Size supplied in the request
        requested: u64,
        /// Size of the registered tree
        actual: u64,
    },

    /// Leaf index is not below the requested tree size
    #[error("Leaf index {index} out of range for tree size {size}")]
    LeafIndexOutOfRange {
        /// Index supplied in the request
        index: u64,
        /// Tree size supplied in the request
        size: u64,
    },

    /// A multi-part response is still waiting to be drained
    #[error("Queue must be empty before starting a new multi-part response ({pending} pending)")]
    QueueNotEmpty {
        /// Number of queued elements
        pending: usize,
    },

    /// Continuation requested with nothing queued
    #[error("No elements to get")]
    QueueEmpty,

    /// Queued elements do not share one byte length
    #[error("The queue contains elements with different byte length")]
    MixedElementLengths,
}

/// Errors raised while finalizing inputs or extracting a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FinalizeError {
    /// Input carries neither a partial nor a taproot key signature
    #[error("No signature for input {0} present")]
    NoSignature(usize),

    /// Input carries more than one partial signature
    #[error("Expected exactly one signature for input {input}, got {count}")]
    MultipleSignatures {
        /// Input index
        input: usize,
        /// Number of partial signatures present
        count: usize,
    },

    /// Input carries both signature kinds
    #[error("Both taproot and non-taproot signatures present for input {0}")]
    ConflictingSignatures(usize),

    /// Wrapped segwit input with an empty redeem script
    #[error("Empty redeem script for input {0}")]
    EmptyRedeemScript(usize),

    /// Taproot key signature is neither 64 nor 65 bytes
    #[error("Unexpected Schnorr signature length {len} for input {input}")]
    InvalidSchnorrSignature {
        /// Input index
        input: usize,
        /// Signature length in bytes
        len: usize,
    },

    /// Payload cannot be expressed as a single script push
    #[error("Script push of {len} bytes is not supported")]
    ScriptPushTooLarge {
        /// Payload length in bytes
        len: usize,
    },
}

/// Errors raised while building a wallet policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    /// Name, template or key contains non-ASCII characters
    #[error("Wallet policy {field} must be ASCII")]
    NonAscii {
        /// Offending field
        field: &'static str,
    },
}

/// Errors raised by the host side of a device exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientError {
    /// Transport failed to deliver a message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device reply shorter than a status word
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Device returned an error status word
    #[error("Device returned status word 0x{0:04x}")]
    StatusWord(u16),

    /// Device interrupted execution but no interpreter was supplied
    #[error("Unexpected SW_INTERRUPTED_EXECUTION")]
    UnexpectedInterrupt,

    /// Device response has an unexpected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request parameter outside the accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for the Merkle PSBT library
pub type Result<T> = std::result::Result<T, Error>;
