//! Host client of the device's Bitcoin application

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bitcoin::bip32::{DerivationPath, Fingerprint, Xpub};
use tracing::{debug, trace};

use super::apdu::{ApduCommand, BitcoinCommandCode, SW_INTERRUPTED_EXECUTION, SW_OK};
use super::transport::Transport;
use crate::errors::ClientError;
use crate::interpreter::{ClientCommandInterpreter, ProgressCallback};
use crate::psbt::{MerkleizedPsbt, PsbtV2};
use crate::types::{WalletHmac, WalletId, HASH_LEN, MAX_DERIVATION_DEPTH};
use crate::utils::encode_varint;
use crate::wallet::WalletPolicy;
use crate::Result;

/// Message chunk size used when streaming a message to sign
const MESSAGE_CHUNK_LEN: usize = 64;

/// Client for the device's Bitcoin application
///
/// Each request runs the interrupted-execution loop: while the device
/// answers with [`SW_INTERRUPTED_EXECUTION`], its reply is a client command
/// served by a [`ClientCommandInterpreter`] loaded with the request's data.
#[derive(Debug)]
pub struct BitcoinClient<T> {
    transport: T,
}

impl<T: Transport> BitcoinClient<T> {
    /// Creates a client over `transport`
    pub fn new(transport: T) -> Self { Self { transport } }

    /// Gets the underlying transport
    pub fn transport(&self) -> &T { &self.transport }

    /// Consumes the client and returns the transport
    pub fn into_transport(self) -> T { self.transport }

    /// Sends `command` and serves client commands until the device completes
    ///
    /// # Errors
    /// * [`ClientError::UnexpectedInterrupt`] if the device interrupts and
    ///   no interpreter was supplied
    /// * [`ClientError::StatusWord`] for any status other than OK or interrupted
    /// * any transport or interpreter error
    pub fn make_request(
        &mut self,
        command: ApduCommand,
        mut interpreter: Option<&mut ClientCommandInterpreter>,
    ) -> Result<Vec<u8>> {
        debug!(ins = command.ins, len = command.data.len(), "sending device request");
        let (mut data, mut sw) = self.transport.exchange(&command)?;
        let mut interruptions = 0usize;

        while sw == SW_INTERRUPTED_EXECUTION {
            let interpreter = interpreter.as_deref_mut().ok_or(ClientError::UnexpectedInterrupt)?;
            interruptions += 1;
            trace!(request_len = data.len(), "serving client command");
            let response = interpreter.dispatch(&data)?;
            (data, sw) = self.transport.exchange(&ApduCommand::continue_interrupted(response))?;
        }

        if sw != SW_OK {
            return Err(ClientError::StatusWord(sw).into());
        }
        debug!(
            ins = command.ins,
            interruptions,
            response_len = data.len(),
            "device request completed"
        );
        Ok(data)
    }

    /// Gets the extended public key at `path`
    ///
    /// # Errors
    /// * [`ClientError::InvalidParameter`] if `path` has more than 6 steps
    /// * [`ClientError::InvalidResponse`] if the reply is not an extended key
    pub fn get_extended_pubkey(&mut self, path: &DerivationPath, display: bool) -> Result<Xpub> {
        let mut data = vec![u8::from(display)];
        data.extend_from_slice(&path_to_bytes(path)?);
        let command = ApduCommand::bitcoin(BitcoinCommandCode::GetExtendedPubkey, data);
        let response = self.make_request(command, None)?;
        let text = ascii_response(response)?;
        Xpub::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()).into())
    }

    /// Registers `policy` on the device
    ///
    /// # Returns
    /// The wallet identifier and the HMAC the device computed over it
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidResponse`] unless the reply is 64 bytes
    pub fn register_wallet(&mut self, policy: &WalletPolicy) -> Result<(WalletId, WalletHmac)> {
        let serialized = policy.serialize();
        let mut interpreter = ClientCommandInterpreter::new()?;
        interpreter.register_preimage(&serialized);
        interpreter.register_list(policy.keys());

        let mut data = encode_varint(serialized.len() as u64);
        data.extend_from_slice(&serialized);
        let response = self.make_request(
            ApduCommand::bitcoin(BitcoinCommandCode::RegisterWallet, data),
            Some(&mut interpreter),
        )?;

        if response.len() != 2 * HASH_LEN {
            return Err(ClientError::InvalidResponse(format!(
                "expected 64 bytes, got {}",
                response.len()
            ))
            .into());
        }
        let (id, hmac) = response.split_at(HASH_LEN);
        Ok((to_hash(id), to_hash(hmac)))
    }

    /// Gets the address at `address_index` of `policy`
    ///
    /// # Errors
    /// * [`ClientError::InvalidParameter`] if `change` is neither 0 nor 1
    /// * [`ClientError::InvalidResponse`] if the reply is not ASCII
    pub fn get_wallet_address(
        &mut self,
        policy: &WalletPolicy,
        hmac: Option<&WalletHmac>,
        change: u8,
        address_index: u32,
        display: bool,
    ) -> Result<String> {
        if change > 1 {
            let reason = format!("change must be 0 or 1, got {change}");
            return Err(ClientError::InvalidParameter(reason).into());
        }
        let mut interpreter = ClientCommandInterpreter::new()?;
        interpreter.register_wallet_policy(policy);

        let mut data = vec![u8::from(display)];
        data.extend_from_slice(&policy.id());
        data.extend_from_slice(hmac.unwrap_or(&[0u8; HASH_LEN]));
        data.push(change);
        data.extend_from_slice(&address_index.to_be_bytes());
        let response = self.make_request(
            ApduCommand::bitcoin(BitcoinCommandCode::GetWalletAddress, data),
            Some(&mut interpreter),
        )?;
        ascii_response(response)
    }

    /// Signs `psbt` with the keys of `policy`
    ///
    /// The device walks the merkleized PSBT through client commands and
    /// yields one result per signature.
    ///
    /// # Returns
    /// Signatures keyed by input index
    ///
    /// # Errors
    /// Returns an error if the PSBT cannot be merkleized or the exchange fails
    pub fn sign_psbt(
        &mut self,
        psbt: &PsbtV2,
        policy: &WalletPolicy,
        hmac: Option<&WalletHmac>,
        progress: Option<ProgressCallback>,
    ) -> Result<BTreeMap<u8, Vec<u8>>> {
        let merkleized = MerkleizedPsbt::new(psbt)?;
        let mut interpreter = ClientCommandInterpreter::new()?;
        if let Some(callback) = progress {
            interpreter = interpreter.with_progress_callback(callback);
        }
        interpreter.register_wallet_policy(policy);
        interpreter.register_psbt(&merkleized);

        let data = sign_psbt_payload(&merkleized, policy, hmac);
        let command = ApduCommand::bitcoin(BitcoinCommandCode::SignPsbt, data);
        self.make_request(command, Some(&mut interpreter))?;
        Ok(interpreter.yielded_signatures())
    }

    /// Gets the fingerprint of the master key
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidResponse`] unless the reply is 4 bytes
    pub fn get_master_fingerprint(&mut self) -> Result<Fingerprint> {
        let command = ApduCommand::bitcoin(BitcoinCommandCode::GetMasterFingerprint, Vec::new());
        let response = self.make_request(command, None)?;
        let bytes: [u8; 4] = response.as_slice().try_into().map_err(|_| {
            ClientError::InvalidResponse(format!("expected 4 bytes, got {}", response.len()))
        })?;
        Ok(Fingerprint::from(bytes))
    }

    /// Signs `message` with the key at `path`
    ///
    /// The message is served to the device as a list of 64-byte chunks.
    ///
    /// # Returns
    /// The base64 encoded signature
    pub fn sign_message(&mut self, message: &[u8], path: &DerivationPath) -> Result<String> {
        let chunks: Vec<&[u8]> = message.chunks(MESSAGE_CHUNK_LEN).collect();
        let mut interpreter = ClientCommandInterpreter::new()?;
        let chunks_root = interpreter.register_list(&chunks);

        let mut data = path_to_bytes(path)?;
        data.extend_from_slice(&encode_varint(message.len() as u64));
        data.extend_from_slice(&chunks_root);
        let response = self.make_request(
            ApduCommand::bitcoin(BitcoinCommandCode::SignMessage, data),
            Some(&mut interpreter),
        )?;
        Ok(STANDARD.encode(response))
    }
}

/// Builds the `SignPsbt` payload
///
/// Layout: `global commitment ‖ varint(inputs) ‖ inputs root ‖
/// varint(outputs) ‖ outputs root ‖ wallet id ‖ hmac (zeros if absent)`.
pub fn sign_psbt_payload(
    psbt: &MerkleizedPsbt,
    policy: &WalletPolicy,
    hmac: Option<&WalletHmac>,
) -> Vec<u8> {
    let mut data = psbt.global_commitment();
    data.extend_from_slice(&encode_varint(psbt.input_count() as u64));
    data.extend_from_slice(&psbt.inputs_root());
    data.extend_from_slice(&encode_varint(psbt.output_count() as u64));
    data.extend_from_slice(&psbt.outputs_root());
    data.extend_from_slice(&policy.id());
    data.extend_from_slice(hmac.unwrap_or(&[0u8; HASH_LEN]));
    data
}

/// Encodes a derivation path as `len ‖ u32 BE steps`
fn path_to_bytes(path: &DerivationPath) -> Result<Vec<u8>> {
    let steps = path.as_ref();
    if steps.len() > MAX_DERIVATION_DEPTH {
        return Err(ClientError::InvalidParameter(format!(
            "path has {} levels, at most {MAX_DERIVATION_DEPTH} allowed",
            steps.len()
        ))
        .into());
    }
    let mut out = vec![steps.len() as u8];
    for step in steps {
        out.extend_from_slice(&u32::from(*step).to_be_bytes());
    }
    Ok(out)
}

fn ascii_response(response: Vec<u8>) -> Result<String> {
    if !response.is_ascii() {
        return Err(ClientError::InvalidResponse("expected ASCII text".to_string()).into());
    }
    String::from_utf8(response).map_err(|e| ClientError::InvalidResponse(e.to_string()).into())
}

fn to_hash(bytes: &[u8]) -> [u8; HASH_LEN] {
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(bytes);
    hash
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::client::apdu::{CLA_BITCOIN, CLA_FRAMEWORK};
    use crate::errors::Error;
    use crate::utils::sha256;
    use crate::wallet::DefaultDescriptorTemplate;

    const KEY: &str = "[f5acc2fd/84'/1'/0']tpubDCtKfsNyRhULjZ9XMS4VKKtVcPdVDi8MKUbcSD9MJDyjRu1A2ND5MiipozyyspBT9bg8upEp7a8EAgFxNxXn1d7QkdbL52Ty5jiSLcxPt1P";

    /// Replays scripted replies and records every command sent
    #[derive(Default)]
    struct ScriptedTransport {
        replies: VecDeque<(Vec<u8>, u16)>,
        sent: Vec<ApduCommand>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(Vec<u8>, u16)>) -> Self {
            Self { replies: replies.into(), sent: Vec::new() }
        }
    }

    impl Transport for ScriptedTransport {
        fn exchange(&mut self, command: &ApduCommand) -> Result<(Vec<u8>, u16)> {
            self.sent.push(command.clone());
            self.replies
                .pop_front()
                .ok_or_else(|| ClientError::Transport("no scripted reply".to_string()).into())
        }
    }

    fn policy() -> WalletPolicy {
        WalletPolicy::default_policy(DefaultDescriptorTemplate::Wpkh, KEY)
            .expect("should build policy")
    }

    fn preimage_request(data: &[u8]) -> Vec<u8> {
        let mut request = vec![0x40, 0x00];
        request.extend_from_slice(&sha256(data));
        request
    }

    #[test]
    fn test_request_without_interruption() {
        let transport = ScriptedTransport::new(vec![(vec![0xf5, 0xac, 0xc2, 0xfd], SW_OK)]);
        let mut client = BitcoinClient::new(transport);

        let fingerprint = client.get_master_fingerprint().expect("should get fingerprint");

        assert_eq!(fingerprint, Fingerprint::from([0xf5, 0xac, 0xc2, 0xfd]));
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].cla, sent[0].ins), (CLA_BITCOIN, 0x05));
    }

    #[test]
    fn test_interrupted_request_is_served() {
        let policy = policy();
        let serialized = policy.serialize();
        let mut reply = policy.id().to_vec();
        reply.extend_from_slice(&[0x77; 32]);
        let transport = ScriptedTransport::new(vec![
            (preimage_request(&serialized), SW_INTERRUPTED_EXECUTION),
            (reply, SW_OK),
        ]);
        let mut client = BitcoinClient::new(transport);

        let (id, hmac) = client.register_wallet(&policy).expect("should register");

        assert_eq!(id, policy.id());
        assert_eq!(hmac, [0x77; 32]);
        let sent = &client.transport().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data[0] as usize, serialized.len());
        assert_eq!(&sent[0].data[1..], serialized.as_slice());
        assert_eq!((sent[1].cla, sent[1].ins), (CLA_FRAMEWORK, 0x01));
        assert_eq!(sent[1].data[0] as usize, serialized.len());
        assert_eq!(&sent[1].data[2..], serialized.as_slice());
    }

    #[test]
    fn test_interrupt_without_interpreter() {
        let transport = ScriptedTransport::new(vec![(vec![0x10], SW_INTERRUPTED_EXECUTION)]);
        let mut client = BitcoinClient::new(transport);

        let result = client.get_master_fingerprint();

        assert_eq!(result, Err(Error::Client(ClientError::UnexpectedInterrupt)));
    }

    #[test]
    fn test_error_status_word() {
        let transport = ScriptedTransport::new(vec![(Vec::new(), 0x6985)]);
        let mut client = BitcoinClient::new(transport);

        let result = client.get_master_fingerprint();

        assert_eq!(result, Err(Error::Client(ClientError::StatusWord(0x6985))));
    }

    #[test]
    fn test_wallet_address_payload() {
        let policy = policy();
        let transport = ScriptedTransport::new(vec![(b"bcrt1qexample".to_vec(), SW_OK)]);
        let mut client = BitcoinClient::new(transport);

        let address =
            client.get_wallet_address(&policy, None, 1, 7, false).expect("should get address");

        assert_eq!(address, "bcrt1qexample");
        let data = &client.transport().sent[0].data;
        assert_eq!(data.len(), 1 + 32 + 32 + 1 + 4);
        assert_eq!(&data[1..33], &policy.id());
        assert_eq!(&data[33..65], &[0u8; 32]);
        assert_eq!(&data[65..], &[1, 0, 0, 0, 7]);
    }

    #[test]
    fn test_wallet_address_rejects_bad_change() {
        let mut client = BitcoinClient::new(ScriptedTransport::default());

        let result = client.get_wallet_address(&policy(), None, 2, 0, false);

        assert!(matches!(result, Err(Error::Client(ClientError::InvalidParameter(_)))));
        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_extended_pubkey_path_limit() {
        let path = DerivationPath::from_str("m/1/2/3/4/5/6/7").expect("should parse path");
        let mut client = BitcoinClient::new(ScriptedTransport::default());

        let result = client.get_extended_pubkey(&path, false);

        assert!(matches!(result, Err(Error::Client(ClientError::InvalidParameter(_)))));
    }

    #[test]
    fn test_path_encoding() {
        let path = DerivationPath::from_str("m/84'/1").expect("should parse path");

        let bytes = path_to_bytes(&path).expect("should encode");

        assert_eq!(bytes, vec![2, 0x80, 0x00, 0x00, 0x54, 0x00, 0x00, 0x00, 0x01]);
    }
}
