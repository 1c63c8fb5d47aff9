#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Merkle PSBT
//!
//! A Rust library for streaming partially signed Bitcoin transactions to
//! memory-constrained hardware signers through Merkle commitments.

// Device exchange loop and Bitcoin application requests
pub mod client;

// Error types
pub mod errors;

// Client command interpreter serving the device's data requests
pub mod interpreter;

// Hash trees and merkleized maps
pub mod merkle;

// PSBTv2 model, codec, merkleization, finalization and extraction
pub mod psbt;

// Shared type aliases and wire constants
pub mod types;

// Hashing and Bitcoin wire encoding helpers
pub mod utils;

// Wallet policies
pub mod wallet;

// Re-export commonly used types and functions
pub use client::{BitcoinClient, Transport};
pub use errors::{Error, Result};
pub use interpreter::ClientCommandInterpreter;
pub use merkle::{MerkleTree, MerkleizedMap};
pub use psbt::{extract, finalize, MerkleizedPsbt, PsbtV2};
pub use types::{Bytes32, WalletId};
pub use wallet::WalletPolicy;
