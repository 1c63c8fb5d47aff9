//! APDU framing for the device's Bitcoin application

use crate::errors::ClientError;
use crate::Result;

/// Class byte of Bitcoin application commands
pub const CLA_BITCOIN: u8 = 0xe1;

/// Class byte of framework commands
pub const CLA_FRAMEWORK: u8 = 0xf8;

/// Framework instruction resuming an interrupted command
pub const INS_CONTINUE_INTERRUPTED: u8 = 0x01;

/// Status word of a completed command
pub const SW_OK: u16 = 0x9000;

/// Status word of a command paused on a client command request
pub const SW_INTERRUPTED_EXECUTION: u16 = 0xe000;

/// Instructions of the Bitcoin application
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BitcoinCommandCode {
    /// Derive and return an extended public key
    GetExtendedPubkey = 0x00,
    /// Register a wallet policy
    RegisterWallet = 0x02,
    /// Derive an address of a wallet policy
    GetWalletAddress = 0x03,
    /// Sign the inputs of a PSBT
    SignPsbt = 0x04,
    /// Return the master key fingerprint
    GetMasterFingerprint = 0x05,
    /// Sign a message with a derived key
    SignMessage = 0x10,
}

/// One command sent to the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApduCommand {
    /// Instruction class
    pub cla: u8,
    /// Instruction code
    pub ins: u8,
    /// First parameter
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    /// Command payload
    pub data: Vec<u8>,
}

impl ApduCommand {
    /// Creates a Bitcoin application command
    pub fn bitcoin(ins: BitcoinCommandCode, data: Vec<u8>) -> Self {
        Self { cla: CLA_BITCOIN, ins: ins as u8, p1: 0, p2: 0, data }
    }

    /// Creates the framework command carrying a client command response
    pub fn continue_interrupted(response: Vec<u8>) -> Self {
        Self { cla: CLA_FRAMEWORK, ins: INS_CONTINUE_INTERRUPTED, p1: 0, p2: 0, data: response }
    }

    /// Encodes the command as `cla ‖ ins ‖ p1 ‖ p2 ‖ len ‖ data`
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidParameter`] if the payload exceeds 255 bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u8::try_from(self.data.len()).map_err(|_| {
            let len = self.data.len();
            ClientError::InvalidParameter(format!("payload of {len} bytes exceeds 255"))
        })?;
        let mut out = vec![self.cla, self.ins, self.p1, self.p2, len];
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

/// Splits a raw device reply into its data and trailing status word
///
/// # Errors
/// Returns [`ClientError::ResponseTooShort`] if `reply` has fewer than two bytes
pub fn split_status_word(reply: &[u8]) -> Result<(Vec<u8>, u16)> {
    if reply.len() < 2 {
        return Err(ClientError::ResponseTooShort(reply.len()).into());
    }
    let (data, sw) = reply.split_at(reply.len() - 2);
    Ok((data.to_vec(), u16::from_be_bytes([sw[0], sw[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn test_encode_bitcoin_command() {
        let command = ApduCommand::bitcoin(BitcoinCommandCode::SignPsbt, vec![0xaa, 0xbb]);

        let encoded = command.encode().expect("should encode");

        assert_eq!(encoded, vec![0xe1, 0x04, 0x00, 0x00, 0x02, 0xaa, 0xbb]);
    }

    #[test]
    fn test_encode_rejects_long_payload() {
        let command = ApduCommand::continue_interrupted(vec![0u8; 256]);

        assert!(matches!(command.encode(), Err(Error::Client(ClientError::InvalidParameter(_)))));
    }

    #[test]
    fn test_split_status_word() {
        let (data, sw) = split_status_word(&[0x01, 0x02, 0xe0, 0x00]).expect("should split");

        assert_eq!(data, vec![0x01, 0x02]);
        assert_eq!(sw, SW_INTERRUPTED_EXECUTION);
        assert_eq!(
            split_status_word(&[0x90]),
            Err(Error::Client(ClientError::ResponseTooShort(1)))
        );
    }
}
