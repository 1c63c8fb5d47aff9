//! Configuration for client command responses

use crate::merkle::MerklePsbtV2Config;
use crate::types::HASH_LEN;

/// Trait for device message limits
///
/// Every response handed back to the device must fit in a single message.
/// Counts and lengths inside responses are encoded on one byte, so
/// implementations must not exceed 255 bytes. A response must also hold a
/// leaf hash with at least one proof element, which takes 66 bytes.
pub trait InterpreterConfig {
    /// Maximum size of a single response in bytes
    fn max_response_len(&self) -> usize;

    /// Bytes available for queued elements in a continuation response
    ///
    /// Two bytes are taken by the element count and the element length.
    fn continuation_budget(&self) -> usize { self.max_response_len().saturating_sub(2) }

    /// Number of proof elements sent inline with a leaf proof response
    ///
    /// The response opens with the leaf hash, the proof length and the
    /// inline element count.
    fn inline_proof_elements(&self) -> usize {
        self.max_response_len().saturating_sub(HASH_LEN + 2) / HASH_LEN
    }
}

impl InterpreterConfig for MerklePsbtV2Config {
    fn max_response_len(&self) -> usize { 255 }
}
