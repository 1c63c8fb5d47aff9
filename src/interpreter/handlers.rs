//! Client command implementations
//!
//! Every handler receives the request body (the opcode already stripped)
//! and returns the response body. Responses never exceed the configured
//! maximum length; anything that does not fit is queued for
//! `GetMoreElements`.

use super::command::ClientCommandCode;
use super::state::ClientCommandInterpreter;
use crate::errors::InterpreterError;
use crate::types::{Bytes32, HASH_LEN};
use crate::utils::{encode_varint, varint_len, ByteReader};
use crate::Result;

fn malformed(code: ClientCommandCode, reason: &str) -> InterpreterError {
    InterpreterError::MalformedRequest { command: code.name(), reason: reason.to_string() }
}

fn read_hash(bytes: &[u8]) -> Bytes32 {
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&bytes[..HASH_LEN]);
    hash
}

impl ClientCommandInterpreter {
    pub(crate) fn handle_yield(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        self.yielded.push(body.to_vec());
        self.notify_progress();
        Ok(Vec::new())
    }

    /// Body: `0x00 ‖ hash`; response: `varint(len) ‖ payload_size ‖ payload`
    pub(crate) fn handle_get_preimage(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let code = ClientCommandCode::GetPreimage;
        if body.len() != 1 + HASH_LEN {
            return Err(malformed(code, "unexpected trailing data").into());
        }
        if body[0] != 0 {
            return Err(malformed(code, "the first byte should be 0").into());
        }
        let hash = read_hash(&body[1..]);
        let preimage = self
            .preimages
            .get(&hash)
            .ok_or_else(|| InterpreterError::UnknownPreimage(hex::encode(hash)))?;

        let len = preimage.len() as u64;
        let max_payload = self.max_response_len.saturating_sub(varint_len(len) + 1);
        let payload_size = preimage.len().min(max_payload);

        let mut response = encode_varint(len);
        // max_response_len is capped at 255, so payload_size fits
        response.push(payload_size as u8);
        response.extend_from_slice(&preimage[..payload_size]);

        let remainder = preimage[payload_size..].iter().map(|byte| vec![*byte]);
        self.queue.extend(remainder);
        Ok(response)
    }

    /// Body: `root ‖ varint(tree_size) ‖ varint(leaf_index)`; response:
    /// `leaf_hash ‖ proof_len ‖ inline_count ‖ inline proof elements`
    pub(crate) fn handle_get_merkle_leaf_proof(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let code = ClientCommandCode::GetMerkleLeafProof;
        if body.len() < HASH_LEN + 2 {
            return Err(malformed(code, "expected at least 34 bytes").into());
        }
        let root = read_hash(body);
        let mut reader = ByteReader::new(&body[HASH_LEN..]);
        let reason = "couldn't parse tree size or leaf index";
        let mut read = || reader.read_varint().map_err(|_| malformed(code, reason));
        let tree_size = read()?;
        let leaf_index = read()?;

        let tree =
            self.trees.get(&root).ok_or_else(|| InterpreterError::UnknownTree(hex::encode(root)))?;
        if leaf_index >= tree_size {
            let (index, size) = (leaf_index, tree_size);
            return Err(InterpreterError::LeafIndexOutOfRange { index, size }.into());
        }
        if tree.size() as u64 != tree_size {
            let actual = tree.size() as u64;
            return Err(InterpreterError::TreeSizeMismatch { requested: tree_size, actual }.into());
        }
        if !self.queue.is_empty() {
            return Err(InterpreterError::QueueNotEmpty { pending: self.queue.len() }.into());
        }

        // leaf_index < tree.size(), so it fits in usize
        let index = leaf_index as usize;
        let leaf_hash = tree.leaf_hash(index)?;
        let proof = tree.proof(index)?;
        let inline = self.inline_proof_elements.min(proof.len());

        let mut response = leaf_hash.to_vec();
        response.push(proof.len() as u8);
        response.push(inline as u8);
        for element in &proof.path[..inline] {
            response.extend_from_slice(element);
        }
        self.queue.extend(proof.path[inline..].iter().map(|element| element.to_vec()));
        Ok(response)
    }

    /// Body: `root ‖ leaf_hash`; response: `found ‖ varint(index)`
    pub(crate) fn handle_get_merkle_leaf_index(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        if body.len() != 2 * HASH_LEN {
            return Err(
                malformed(ClientCommandCode::GetMerkleLeafIndex, "unexpected trailing data").into()
            );
        }
        let root = read_hash(body);
        let leaf_hash = read_hash(&body[HASH_LEN..]);
        let tree =
            self.trees.get(&root).ok_or_else(|| InterpreterError::UnknownTree(hex::encode(root)))?;

        let (found, index) = match tree.find_leaf(&leaf_hash) {
            Some(index) => (1u8, index as u64),
            None => (0u8, 0),
        };
        let mut response = vec![found];
        response.extend_from_slice(&encode_varint(index));
        Ok(response)
    }

    /// Body: empty; response: `count ‖ element_len ‖ elements`
    pub(crate) fn handle_get_more_elements(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        if !body.is_empty() {
            return Err(
                malformed(ClientCommandCode::GetMoreElements, "unexpected trailing data").into()
            );
        }
        let element_len = self.queue.front().map(Vec::len).ok_or(InterpreterError::QueueEmpty)?;
        if self.queue.iter().any(|element| element.len() != element_len) {
            return Err(InterpreterError::MixedElementLengths.into());
        }

        let count = (self.continuation_budget / element_len.max(1)).min(self.queue.len());
        let mut response = vec![count as u8, element_len as u8];
        for element in self.queue.drain(..count) {
            response.extend_from_slice(&element);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::errors::{Error, InterpreterError};
    use crate::interpreter::ClientCommandInterpreter;
    use crate::merkle::{hash_leaf, MerkleTree};
    use crate::utils::sha256;

    const GET_PREIMAGE: u8 = 0x40;
    const GET_LEAF_PROOF: u8 = 0x41;
    const GET_LEAF_INDEX: u8 = 0x42;
    const GET_MORE: u8 = 0xa0;

    fn interpreter() -> ClientCommandInterpreter {
        ClientCommandInterpreter::new().expect("should build interpreter")
    }

    fn preimage_request(hash: [u8; 32]) -> Vec<u8> {
        let mut request = vec![GET_PREIMAGE, 0x00];
        request.extend_from_slice(&hash);
        request
    }

    fn proof_request(root: [u8; 32], size: u8, index: u8) -> Vec<u8> {
        let mut request = vec![GET_LEAF_PROOF];
        request.extend_from_slice(&root);
        request.extend_from_slice(&[size, index]);
        request
    }

    fn elements(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("element {i}").into_bytes()).collect()
    }

    /// Drains the queue with continuation requests and returns the elements
    fn drain(interpreter: &mut ClientCommandInterpreter) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while interpreter.queued() > 0 {
            let response = interpreter.dispatch(&[GET_MORE]).expect("should get more elements");
            let (count, len) = (response[0] as usize, response[1] as usize);
            assert_eq!(response.len(), 2 + count * len);
            out.extend(response[2..].chunks(len).map(<[u8]>::to_vec));
        }
        out
    }

    #[test]
    fn test_empty_and_unknown_commands() {
        let mut interpreter = interpreter();

        assert_eq!(
            interpreter.dispatch(&[]),
            Err(Error::Interpreter(InterpreterError::EmptyCommand))
        );
        assert_eq!(
            interpreter.dispatch(&[0x77]),
            Err(Error::Interpreter(InterpreterError::UnknownCommand(0x77)))
        );
    }

    #[test]
    fn test_yield_collects_results_and_reports_progress() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut interpreter = interpreter()
            .with_progress_callback(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        let first = interpreter.dispatch(&[0x10, 0x00, 0xaa]).expect("should yield");
        interpreter.dispatch(&[0x10, 0x01, 0xbb, 0xcc]).expect("should yield");

        assert!(first.is_empty());
        assert_eq!(interpreter.yielded(), &[vec![0x00, 0xaa], vec![0x01, 0xbb, 0xcc]]);
        assert_eq!(interpreter.yielded_signatures()[&1], vec![0xbb, 0xcc]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_short_preimage() {
        let mut interpreter = interpreter();
        interpreter.register_preimage(b"abc");

        let response =
            interpreter.dispatch(&preimage_request(sha256(b"abc"))).expect("should serve");

        assert_eq!(response, vec![3, 3, b'a', b'b', b'c']);
        assert_eq!(interpreter.queued(), 0);
    }

    #[test]
    fn test_long_preimage_is_split_without_loss() {
        let mut interpreter = interpreter();
        let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        interpreter.register_preimage(&data);

        let response =
            interpreter.dispatch(&preimage_request(sha256(&data))).expect("should serve");

        // varint(300) takes 3 bytes, leaving 255 - 3 - 1 payload bytes
        assert_eq!(&response[..3], &[0xfd, 0x2c, 0x01]);
        assert_eq!(response[3], 251);
        assert_eq!(response.len(), 255);
        assert_eq!(interpreter.queued(), 49);
        let rest: Vec<u8> = drain(&mut interpreter).concat();
        assert_eq!([&response[4..], rest.as_slice()].concat(), data);
    }

    #[test]
    fn test_preimage_continuation_count() {
        for (len, expected) in [(253, 0), (254, 1), (506, 2), (507, 2), (1_000, 3), (5_000, 19)] {
            let mut interpreter = interpreter();
            let data = vec![0x5a; len];
            interpreter.register_preimage(&data);
            interpreter.dispatch(&preimage_request(sha256(&data))).expect("should serve");

            let mut continuations = 0;
            while interpreter.queued() > 0 {
                interpreter.dispatch(&[GET_MORE]).expect("should get more elements");
                continuations += 1;
            }

            let max_payload = 255 - crate::utils::varint_len(len as u64) - 1;
            let expected_from_budget = len.saturating_sub(max_payload).div_ceil(253);
            assert_eq!(continuations, expected_from_budget, "length {len}");
            assert_eq!(continuations, expected, "length {len}");
        }
    }

    #[test]
    fn test_preimage_request_validation() {
        let mut interpreter = interpreter();
        let mut bad_prefix = preimage_request([0u8; 32]);
        bad_prefix[1] = 0x01;
        let mut trailing = preimage_request([0u8; 32]);
        trailing.push(0x00);

        assert!(matches!(
            interpreter.dispatch(&bad_prefix),
            Err(Error::Interpreter(InterpreterError::MalformedRequest { .. }))
        ));
        assert!(matches!(
            interpreter.dispatch(&trailing),
            Err(Error::Interpreter(InterpreterError::MalformedRequest { .. }))
        ));
        assert!(matches!(
            interpreter.dispatch(&preimage_request([0u8; 32])),
            Err(Error::Interpreter(InterpreterError::UnknownPreimage(_)))
        ));
    }

    #[test]
    fn test_list_elements_served_by_leaf_hash() {
        let mut interpreter = interpreter();
        interpreter.register_list(&[b"key".to_vec()]);

        let response =
            interpreter.dispatch(&preimage_request(hash_leaf(b"key"))).expect("should serve");

        assert_eq!(response, vec![4, 4, 0x00, b'k', b'e', b'y']);
    }

    #[test]
    fn test_leaf_proof_inline() {
        let mut interpreter = interpreter();
        let items = elements(5);
        let root = interpreter.register_list(&items);
        let tree = MerkleTree::from_elements(&items);

        let response = interpreter.dispatch(&proof_request(root, 5, 2)).expect("should serve");

        let proof = tree.proof(2).expect("should prove");
        assert_eq!(&response[..32], &hash_leaf(b"element 2"));
        assert_eq!(response[32], 3);
        assert_eq!(response[33], 3);
        assert_eq!(&response[34..], proof.path.concat().as_slice());
        assert_eq!(interpreter.queued(), 0);
    }

    #[test]
    fn test_leaf_proof_queues_leftovers() {
        let mut interpreter = interpreter();
        let items = elements(200);
        let root = interpreter.register_list(&items);
        let tree = MerkleTree::from_elements(&items);
        let mut request = vec![GET_LEAF_PROOF];
        request.extend_from_slice(&root);
        request.extend_from_slice(&[200, 0]);

        let response = interpreter.dispatch(&request).expect("should serve");

        let proof = tree.proof(0).expect("should prove");
        assert_eq!(proof.len(), 8);
        assert_eq!(response[32], 8);
        assert_eq!(response[33], 6);
        assert_eq!(response.len(), 34 + 6 * 32);
        let leftovers = drain(&mut interpreter);
        assert_eq!(leftovers, vec![proof.path[6].to_vec(), proof.path[7].to_vec()]);
    }

    #[test]
    fn test_second_proof_requires_drained_queue() {
        let mut interpreter = interpreter();
        let items = elements(200);
        let root = interpreter.register_list(&items);
        let mut request = vec![GET_LEAF_PROOF];
        request.extend_from_slice(&root);
        request.extend_from_slice(&[200, 0]);
        interpreter.dispatch(&request).expect("should serve");

        let result = interpreter.dispatch(&request);

        assert_eq!(result, Err(Error::Interpreter(InterpreterError::QueueNotEmpty { pending: 2 })));
    }

    #[test]
    fn test_leaf_proof_preconditions() {
        let mut interpreter = interpreter();
        let root = interpreter.register_list(&elements(3));

        assert_eq!(
            interpreter.dispatch(&proof_request(root, 3, 3)),
            Err(Error::Interpreter(InterpreterError::LeafIndexOutOfRange { index: 3, size: 3 }))
        );
        assert_eq!(
            interpreter.dispatch(&proof_request(root, 4, 1)),
            Err(Error::Interpreter(InterpreterError::TreeSizeMismatch { requested: 4, actual: 3 }))
        );
        assert!(matches!(
            interpreter.dispatch(&proof_request([9u8; 32], 3, 1)),
            Err(Error::Interpreter(InterpreterError::UnknownTree(_)))
        ));
        assert!(matches!(
            interpreter.dispatch(&[GET_LEAF_PROOF, 0x00]),
            Err(Error::Interpreter(InterpreterError::MalformedRequest { .. }))
        ));
    }

    #[test]
    fn test_leaf_index_lookup() {
        let mut interpreter = interpreter();
        let root = interpreter.register_list(&elements(4));
        let mut request = vec![GET_LEAF_INDEX];
        request.extend_from_slice(&root);
        request.extend_from_slice(&hash_leaf(b"element 3"));
        let mut missing = vec![GET_LEAF_INDEX];
        missing.extend_from_slice(&root);
        missing.extend_from_slice(&hash_leaf(b"absent"));

        assert_eq!(interpreter.dispatch(&request).expect("should serve"), vec![1, 3]);
        assert_eq!(interpreter.dispatch(&missing).expect("should serve"), vec![0, 0]);
        assert!(matches!(
            interpreter.dispatch(&request[..64]),
            Err(Error::Interpreter(InterpreterError::MalformedRequest { .. }))
        ));
    }

    #[test]
    fn test_get_more_elements_errors() {
        let mut interpreter = interpreter();

        assert_eq!(
            interpreter.dispatch(&[GET_MORE]),
            Err(Error::Interpreter(InterpreterError::QueueEmpty))
        );
        assert!(matches!(
            interpreter.dispatch(&[GET_MORE, 0x00]),
            Err(Error::Interpreter(InterpreterError::MalformedRequest { .. }))
        ));

        interpreter.queue.push_back(vec![1]);
        interpreter.queue.push_back(vec![2, 3]);
        assert_eq!(
            interpreter.dispatch(&[GET_MORE]),
            Err(Error::Interpreter(InterpreterError::MixedElementLengths))
        );
    }

    #[test]
    fn test_get_more_elements_budget() {
        let mut interpreter = interpreter();
        interpreter.queue.extend((0..10u8).map(|i| vec![i; 32]));

        let response = interpreter.dispatch(&[GET_MORE]).expect("should serve");

        assert_eq!(response[0], 7);
        assert_eq!(response[1], 32);
        assert_eq!(response.len(), 2 + 7 * 32);
        assert_eq!(interpreter.queued(), 3);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut interpreter = interpreter();
        let items = elements(2);

        let first = interpreter.register_list(&items);
        let second = interpreter.register_list(&items);

        assert_eq!(first, second);
        assert_eq!(interpreter.trees.len(), 1);
    }
}
