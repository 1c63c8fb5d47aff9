//! Configuration implementations for hash-tree operations

use super::TreeConfig;
use crate::types::{INTERNAL_DOMAIN_TAG, LEAF_DOMAIN_TAG};

/// Merkle PSBT v2 protocol configuration
///
/// This struct implements [`TreeConfig`] (and
/// [`crate::interpreter::InterpreterConfig`]) with the domain tags and
/// message limits of the v2 device protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct MerklePsbtV2Config;

impl TreeConfig for MerklePsbtV2Config {
    fn leaf_domain_tag(&self) -> &[u8] { LEAF_DOMAIN_TAG }

    fn internal_domain_tag(&self) -> &[u8] { INTERNAL_DOMAIN_TAG }
}

/// Default config instance (Merkle PSBT v2)
pub(crate) const DEFAULT_CONFIG: MerklePsbtV2Config = MerklePsbtV2Config;
