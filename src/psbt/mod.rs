//! PSBTv2 model, codec and finalization
//!
//! # Structure
//!
//! The module is organized into functional domains:
//! - `keys`: Record type identifiers for the global, input and output groups
//! - `model`: In-memory record groups with typed accessors (PsbtV2)
//! - `codec`: Binary and base64 encoding, and PSBTv0 conversion
//! - `merkleized`: Merkleized maps and commitment roots (MerkleizedPsbt)
//! - `finalize`: Final scriptSig / witness construction (finalize)
//! - `extract`: Network transaction serialization (extract)

mod codec;
mod extract;
mod finalize;
mod keys;
mod merkleized;
mod model;

pub use extract::extract;
pub use finalize::finalize;
pub use keys::{GlobalKey, InputKey, OutputKey};
pub use merkleized::MerkleizedPsbt;
pub use model::{KeyMap, PsbtV2};
