//! PSBT record type identifiers (BIP174 / BIP370)

/// Global record types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GlobalKey {
    /// Unsigned transaction (PSBTv0 only)
    UnsignedTx = 0x00,
    /// Transaction version
    TxVersion = 0x02,
    /// Fallback locktime
    FallbackLocktime = 0x03,
    /// Number of inputs
    InputCount = 0x04,
    /// Number of outputs
    OutputCount = 0x05,
    /// Transaction modifiable flags
    TxModifiable = 0x06,
    /// PSBT version number
    Version = 0xfb,
}

/// Per-input record types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InputKey {
    /// Full previous transaction
    NonWitnessUtxo = 0x00,
    /// Spent output (amount and script)
    WitnessUtxo = 0x01,
    /// ECDSA signature keyed by public key
    PartialSig = 0x02,
    /// Sighash type
    SighashType = 0x03,
    /// P2SH redeem script
    RedeemScript = 0x04,
    /// BIP32 derivation keyed by public key
    Bip32Derivation = 0x06,
    /// Finalized scriptSig
    FinalScriptSig = 0x07,
    /// Finalized script witness
    FinalScriptWitness = 0x08,
    /// Previous transaction id
    PreviousTxid = 0x0e,
    /// Spent output index
    OutputIndex = 0x0f,
    /// Sequence number
    Sequence = 0x10,
    /// Taproot key path signature
    TapKeySig = 0x13,
    /// Taproot BIP32 derivation keyed by x-only public key
    TapBip32Derivation = 0x16,
}

/// Per-output record types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutputKey {
    /// P2SH redeem script
    RedeemScript = 0x00,
    /// BIP32 derivation keyed by public key
    Bip32Derivation = 0x02,
    /// Output amount
    Amount = 0x03,
    /// Output script
    Script = 0x04,
    /// Taproot BIP32 derivation keyed by x-only public key
    TapBip32Derivation = 0x07,
}

macro_rules! impl_key_byte {
    ($($ty:ty),*) => {$(
        impl From<$ty> for u8 {
            fn from(key: $ty) -> u8 { key as u8 }
        }
    )*};
}

impl_key_byte!(GlobalKey, InputKey, OutputKey);

/// Builds a map key from a record type and its key data
pub(crate) fn map_key(key_type: impl Into<u8>, key_data: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + key_data.len());
    key.push(key_type.into());
    key.extend_from_slice(key_data);
    key
}
