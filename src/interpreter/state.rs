//! Interpreter state, registration and dispatch

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use tracing::{debug, trace, warn};

use super::command::{build_dispatch_table, ClientCommandCode};
use super::config::InterpreterConfig;
use crate::errors::InterpreterError;
use crate::merkle::{MerkleTree, MerkleizedMap};
use crate::psbt::MerkleizedPsbt;
use crate::types::{Bytes32, MerkleRoot, HASH_LEN, LEAF_DOMAIN_TAG};
use crate::utils::sha256;
use crate::wallet::WalletPolicy;
use crate::Result;

/// Leaf proof header (leaf hash, proof length, inline count) plus one element
const MIN_RESPONSE_LEN: usize = 2 + 2 * HASH_LEN;

/// Callback invoked every time the device yields a result
pub type ProgressCallback = Box<dyn FnMut() + Send>;

/// Handler serving one client command; receives the request without its opcode
pub(crate) type CommandHandler = fn(&mut ClientCommandInterpreter, &[u8]) -> Result<Vec<u8>>;

/// Host-side server for the device's data requests
///
/// The interpreter is loaded with everything the device may ask for
/// (preimages, hash trees, merkleized maps) and then answers each request
/// passed to [`dispatch`](Self::dispatch). It knows nothing about the
/// meaning of the data it serves. Results the device yields are collected
/// in arrival order.
pub struct ClientCommandInterpreter {
    pub(crate) preimages: HashMap<Bytes32, Vec<u8>>,
    pub(crate) trees: HashMap<MerkleRoot, MerkleTree>,
    pub(crate) yielded: Vec<Vec<u8>>,
    pub(crate) queue: VecDeque<Vec<u8>>,
    pub(crate) max_response_len: usize,
    pub(crate) continuation_budget: usize,
    pub(crate) inline_proof_elements: usize,
    commands: HashMap<u8, CommandHandler>,
    progress: Option<ProgressCallback>,
}

impl ClientCommandInterpreter {
    /// Creates an interpreter with the v2 device limits
    ///
    /// # Errors
    /// Returns [`InterpreterError::DuplicateCommand`] if the command table
    /// maps two handlers to one opcode
    pub fn new() -> Result<Self> { Self::with_config(&crate::merkle::MerklePsbtV2Config) }

    /// Creates an interpreter with custom message limits
    ///
    /// The maximum response length is capped at 255 bytes. The continuation
    /// budget and the inline proof count are clamped so that no response
    /// exceeds that maximum.
    ///
    /// # Errors
    /// * [`InterpreterError::InvalidConfig`] if the maximum response cannot
    ///   hold a leaf hash with one proof element, or the continuation budget
    ///   cannot hold one proof element
    /// * [`InterpreterError::DuplicateCommand`] if the command table maps
    ///   two handlers to one opcode
    pub fn with_config<C: InterpreterConfig>(config: &C) -> Result<Self> {
        let max_response_len = config.max_response_len().min(usize::from(u8::MAX));
        if max_response_len < MIN_RESPONSE_LEN {
            return Err(InterpreterError::InvalidConfig {
                field: "max_response_len",
                value: max_response_len,
                minimum: MIN_RESPONSE_LEN,
            }
            .into());
        }
        let continuation_budget = config.continuation_budget().min(max_response_len - 2);
        if continuation_budget < HASH_LEN {
            return Err(InterpreterError::InvalidConfig {
                field: "continuation_budget",
                value: continuation_budget,
                minimum: HASH_LEN,
            }
            .into());
        }
        let inline_proof_elements =
            config.inline_proof_elements().min((max_response_len - HASH_LEN - 2) / HASH_LEN);

        let commands = build_dispatch_table(
            ClientCommandCode::ALL.map(|code| (code, Self::handler_for(code))),
        )?;
        Ok(Self {
            preimages: HashMap::new(),
            trees: HashMap::new(),
            yielded: Vec::new(),
            queue: VecDeque::new(),
            max_response_len,
            continuation_budget,
            inline_proof_elements,
            commands,
            progress: None,
        })
    }

    /// Installs a callback run after each yielded result
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn handler_for(code: ClientCommandCode) -> CommandHandler {
        match code {
            ClientCommandCode::Yield => Self::handle_yield,
            ClientCommandCode::GetPreimage => Self::handle_get_preimage,
            ClientCommandCode::GetMerkleLeafProof => Self::handle_get_merkle_leaf_proof,
            ClientCommandCode::GetMerkleLeafIndex => Self::handle_get_merkle_leaf_index,
            ClientCommandCode::GetMoreElements => Self::handle_get_more_elements,
        }
    }

    // ===== Registration =====

    /// Makes `data` available under its SHA-256 hash
    pub fn register_preimage(&mut self, data: &[u8]) {
        let hash = sha256(data);
        trace!(hash = %hex::encode(hash), len = data.len(), "registered preimage");
        self.preimages.insert(hash, data.to_vec());
    }

    /// Makes a list of elements available as a hash tree
    ///
    /// Each element is stored as the preimage `0x00 ‖ element`, so it can be
    /// fetched by its leaf hash. The tree over the leaf hashes is stored by
    /// its root, replacing any tree registered under the same root.
    ///
    /// # Returns
    /// The root of the registered tree
    pub fn register_list<T: AsRef<[u8]>>(&mut self, elements: &[T]) -> MerkleRoot {
        for element in elements {
            let mut preimage = LEAF_DOMAIN_TAG.to_vec();
            preimage.extend_from_slice(element.as_ref());
            self.register_preimage(&preimage);
        }
        let tree = MerkleTree::from_elements(elements);
        let root = tree.root();
        debug!(root = %hex::encode(root), size = tree.size(), "registered list");
        self.trees.insert(root, tree);
        root
    }

    /// Makes a merkleized map available: its keys, then its values
    pub fn register_mapping(&mut self, map: &MerkleizedMap) {
        self.register_list(map.keys());
        self.register_list(map.values());
    }

    /// Makes every map of a merkleized PSBT available, followed by the
    /// input and output commitment lists
    pub fn register_psbt(&mut self, psbt: &MerkleizedPsbt) {
        self.register_mapping(psbt.global_map());
        for map in psbt.input_maps().iter().chain(psbt.output_maps()) {
            self.register_mapping(map);
        }
        self.register_list(psbt.input_commitments());
        self.register_list(psbt.output_commitments());
    }

    /// Makes a wallet policy available: its key list and its serialization
    pub fn register_wallet_policy(&mut self, policy: &WalletPolicy) {
        self.register_list(policy.keys());
        self.register_preimage(&policy.serialize());
    }

    // ===== Results =====

    /// Gets every yielded result in arrival order
    pub fn yielded(&self) -> &[Vec<u8>] { &self.yielded }

    /// Gets the yielded results as `input index → signature`
    ///
    /// Each result is read as one input index byte followed by the
    /// signature; empty results are skipped and later results for the same
    /// input replace earlier ones.
    pub fn yielded_signatures(&self) -> BTreeMap<u8, Vec<u8>> {
        self.yielded
            .iter()
            .filter_map(|result| result.split_first())
            .map(|(index, signature)| (*index, signature.to_vec()))
            .collect()
    }

    /// Gets the number of elements waiting for a continuation request
    pub fn queued(&self) -> usize { self.queue.len() }

    // ===== Dispatch =====

    /// Answers one device request
    ///
    /// The first byte selects the command; the rest is its body.
    ///
    /// # Errors
    /// * [`InterpreterError::EmptyCommand`] if `request` is empty
    /// * [`InterpreterError::UnknownCommand`] if no handler serves the opcode
    /// * any error the selected command raises
    pub fn dispatch(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let (&opcode, body) = request.split_first().ok_or(InterpreterError::EmptyCommand)?;
        let handler =
            *self.commands.get(&opcode).ok_or(InterpreterError::UnknownCommand(opcode))?;

        debug!(
            opcode = format_args!("0x{opcode:02x}"),
            body_len = body.len(),
            "dispatching client command"
        );
        let response = handler(self, body);
        match &response {
            Ok(bytes) => {
                let queued = self.queue.len();
                trace!(response_len = bytes.len(), queued, "client command served")
            }
            Err(error) => {
                warn!(opcode = format_args!("0x{opcode:02x}"), %error, "client command failed")
            }
        }
        response
    }

    pub(crate) fn notify_progress(&mut self) {
        if let Some(callback) = self.progress.as_mut() {
            callback();
        }
    }
}

impl fmt::Debug for ClientCommandInterpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCommandInterpreter")
            .field("preimages", &self.preimages.len())
            .field("trees", &self.trees.len())
            .field("yielded", &self.yielded.len())
            .field("queued", &self.queue.len())
            .field("has_progress_callback", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    struct Limits {
        max: usize,
        budget: Option<usize>,
        inline: Option<usize>,
    }

    impl InterpreterConfig for Limits {
        fn max_response_len(&self) -> usize { self.max }

        fn continuation_budget(&self) -> usize {
            self.budget.unwrap_or(self.max.saturating_sub(2))
        }

        fn inline_proof_elements(&self) -> usize {
            self.inline.unwrap_or(self.max.saturating_sub(HASH_LEN + 2) / HASH_LEN)
        }
    }

    fn limits(max: usize) -> Limits { Limits { max, budget: None, inline: None } }

    #[test]
    fn test_rejects_response_too_small_for_a_proof() {
        let result = ClientCommandInterpreter::with_config(&limits(20));

        assert_eq!(
            result.map(|_| ()),
            Err(Error::Interpreter(InterpreterError::InvalidConfig {
                field: "max_response_len",
                value: 20,
                minimum: 66,
            }))
        );
        assert!(ClientCommandInterpreter::with_config(&limits(65)).is_err());
    }

    #[test]
    fn test_rejects_budget_below_one_element() {
        let config = Limits { max: 255, budget: Some(31), inline: None };

        let result = ClientCommandInterpreter::with_config(&config);

        assert_eq!(
            result.map(|_| ()),
            Err(Error::Interpreter(InterpreterError::InvalidConfig {
                field: "continuation_budget",
                value: 31,
                minimum: 32,
            }))
        );
    }

    #[test]
    fn test_clamps_limits_to_the_response_size() {
        let config = Limits { max: 300, budget: Some(1_000), inline: Some(10) };

        let interpreter = ClientCommandInterpreter::with_config(&config).expect("should build");

        assert_eq!(interpreter.max_response_len, 255);
        assert_eq!(interpreter.continuation_budget, 253);
        assert_eq!(interpreter.inline_proof_elements, 6);
    }

    #[test]
    fn test_smallest_limits_keep_responses_bounded() {
        let mut interpreter =
            ClientCommandInterpreter::with_config(&limits(66)).expect("should build");
        let items: Vec<Vec<u8>> = (0..200u8).map(|i| vec![i]).collect();
        let root = interpreter.register_list(&items);
        let mut request = vec![0x41];
        request.extend_from_slice(&root);
        request.extend_from_slice(&[200, 0]);

        let response = interpreter.dispatch(&request).expect("should serve proof");

        assert_eq!(response.len(), 66);
        assert_eq!(response[33], 1);
        let mut continuations = 0;
        while interpreter.queued() > 0 {
            let more = interpreter.dispatch(&[0xa0]).expect("should serve continuation");
            assert!(more.len() <= 66);
            assert!(more[0] > 0);
            continuations += 1;
        }
        assert_eq!(continuations, 4);
    }
}
