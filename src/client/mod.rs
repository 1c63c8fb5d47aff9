//! Host side of the device exchange
//!
//! # Structure
//!
//! - `apdu`: Command framing, class bytes and status words
//! - `transport`: Boundary to the physical link (Transport)
//! - `app`: Bitcoin application requests and the interrupted-execution loop (BitcoinClient)

pub mod apdu;
mod app;
mod transport;

pub use apdu::{split_status_word, ApduCommand, BitcoinCommandCode};
pub use app::{sign_psbt_payload, BitcoinClient};
pub use transport::Transport;
