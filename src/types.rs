//! Core type definitions for the Merkle PSBT library
//!
//! This module defines fundamental types and wire constants used across
//! multiple modules, providing a common location for shared definitions.

// ============================================================================
// Fundamental Types
// ============================================================================

/// Type alias for 32-byte arrays used across cryptographic operations
pub type Bytes32 = [u8; 32];

/// Type alias for Merkle tree roots
pub type MerkleRoot = Bytes32;

/// Type alias for wallet policy identifiers
pub type WalletId = Bytes32;

/// Type alias for the HMAC a device returns when registering a wallet policy
pub type WalletHmac = Bytes32;

// ============================================================================
// Hash-Tree Domain
// ============================================================================

/// Domain separation prefix for leaf hashes
///
/// Prepended to the leaf payload so that a leaf can never be reinterpreted
/// as an internal node.
pub const LEAF_DOMAIN_TAG: &[u8] = &[0x00];

/// Domain separation prefix for internal node hashes
pub const INTERNAL_DOMAIN_TAG: &[u8] = &[0x01];

/// Size of a hash (and of every Merkle proof element) in bytes
pub const HASH_LEN: usize = 32;

// ============================================================================
// PSBT Domain
// ============================================================================

/// Magic bytes opening every serialized PSBT (`"psbt"` followed by `0xff`)
pub const PSBT_MAGIC: &[u8] = b"psbt\xff";

/// Separator terminating each key/value map in a serialized PSBT
pub const PSBT_MAP_SEPARATOR: u8 = 0x00;

/// PSBT version written into the global map of every model
pub const PSBT_VERSION_2: u32 = 2;

/// Sequence number used when an input does not carry one
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Segwit marker and flag bytes emitted after the transaction version
pub const SEGWIT_MARKER_FLAG: [u8; 2] = [0x00, 0x01];

// ============================================================================
// Script Push Limits
// ============================================================================

/// Largest payload encoded with a bare length byte
pub const MAX_DIRECT_PUSH: usize = 75;

/// Largest payload encoded with `OP_PUSHDATA1`
pub const MAX_PUSHDATA1: usize = 256;

/// Largest payload encoded with `OP_PUSHDATA2`
pub const MAX_PUSHDATA2: usize = 65_536;

/// `OP_PUSHDATA1` opcode
pub const OP_PUSHDATA1: u8 = 0x4c;

/// `OP_PUSHDATA2` opcode
pub const OP_PUSHDATA2: u8 = 0x4d;

// ============================================================================
// Wallet Policy Domain
// ============================================================================

/// Type byte identifying a wallet policy map in its serialization
pub const POLICY_MAP_TYPE: u8 = 0x01;

/// Maximum number of derivation steps accepted by the device
pub const MAX_DERIVATION_DEPTH: usize = 6;
