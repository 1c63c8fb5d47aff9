//! Wallet policies
//!
//! A wallet policy tells the device which scripts belong to the wallet.
//! Its serialization and identifier are what the device registers and
//! signs against; the device fetches the serialization and the keys
//! through the client command interpreter.

mod policy;

pub use policy::{key_expression, DefaultDescriptorTemplate, WalletPolicy};
