//! Wallet policy representation
//!
//! A wallet policy describes how the device derives output scripts: a
//! descriptor template with key placeholders (`@0`, `@1`, ...) and the
//! ordered list of key expressions those placeholders refer to.
//!
//! # Invariants
//!
//! - Name, template and keys are ASCII
//! - The key list is non-empty
//! - The identifier is the SHA-256 of the serialization, so any change to
//!   the name, template or keys yields a different identifier

use std::fmt;

use bitcoin::bip32::{ChildNumber, Fingerprint};

use crate::errors::PolicyError;
use crate::merkle::MerkleTree;
use crate::types::{MerkleRoot, WalletId, POLICY_MAP_TYPE};
use crate::utils::{encode_varint, sha256, write_varslice};
use crate::Result;

/// Descriptor templates of the single-key policies the device accepts
/// without registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefaultDescriptorTemplate {
    /// Legacy pay-to-pubkey-hash
    Pkh,
    /// Segwit v0 nested in pay-to-script-hash
    ShWpkh,
    /// Native segwit v0
    Wpkh,
    /// Taproot key path
    Tr,
}

impl DefaultDescriptorTemplate {
    /// Gets the descriptor template text
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultDescriptorTemplate::Pkh => "pkh(@0)",
            DefaultDescriptorTemplate::ShWpkh => "sh(wpkh(@0))",
            DefaultDescriptorTemplate::Wpkh => "wpkh(@0)",
            DefaultDescriptorTemplate::Tr => "tr(@0)",
        }
    }
}

impl fmt::Display for DefaultDescriptorTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Wallet policy: name, descriptor template and ordered key list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletPolicy {
    name: String,
    descriptor_template: String,
    keys: Vec<String>,
}

impl WalletPolicy {
    /// Creates a wallet policy
    ///
    /// # Arguments
    /// * `name` - Display name; empty for default policies
    /// * `descriptor_template` - Template with `@i` key placeholders
    /// * `keys` - Key expressions, e.g. `[f5acc2fd/84'/1'/0']tpub.../**`
    ///
    /// # Errors
    /// Returns [`PolicyError::NonAscii`] if a field contains non-ASCII characters
    ///
    /// # Example
    ///
    /// ```rust
    /// use merkle_psbt::wallet::WalletPolicy;
    ///
    /// let policy = WalletPolicy::new("Cold storage", "wsh(sortedmulti(2,@0/**,@1/**))", vec![
    ///     "[76223a6e/48'/1'/0'/2']tpubDE7NQymr4AFtewpAsWtnreyq9ghkzQBXpCZjWLFVRAvnbf7vya2eMTvT2fPapNqL8SuVvLQdbUbMfWLVDCZKnsEBqp6UK93QEzL8Ck23AwF".to_string(),
    ///     "[f5acc2fd/48'/1'/0'/2']tpubDFAqEGNyad35aBCKUAXbQGDjdVhNueno5ZZVEn3sQbW5ci457gLR7HyTmHBg93oourBssgUxuWz1jX5uhc1qaqFo9VsybY1J5FuedLfm4dK".to_string(),
    /// ])?;
    ///
    /// assert_eq!(policy.keys().len(), 2);
    /// assert_eq!(policy.id().len(), 32);
    /// # Ok::<(), merkle_psbt::errors::Error>(())
    /// ```
    pub fn new(
        name: impl Into<String>,
        descriptor_template: impl Into<String>,
        keys: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let descriptor_template = descriptor_template.into();
        if !name.is_ascii() {
            return Err(PolicyError::NonAscii { field: "name" }.into());
        }
        if !descriptor_template.is_ascii() {
            return Err(PolicyError::NonAscii { field: "descriptor template" }.into());
        }
        if keys.iter().any(|key| !key.is_ascii()) {
            return Err(PolicyError::NonAscii { field: "key" }.into());
        }
        Ok(Self { name, descriptor_template, keys })
    }

    /// Creates an unnamed single-key policy from a default template
    ///
    /// # Errors
    /// Returns [`PolicyError::NonAscii`] if `key` contains non-ASCII characters
    pub fn default_policy(
        template: DefaultDescriptorTemplate,
        key: impl Into<String>,
    ) -> Result<Self> {
        Self::new("", template.as_str(), vec![key.into()])
    }

    /// Gets the policy name
    pub fn name(&self) -> &str { &self.name }

    /// Gets the descriptor template
    pub fn descriptor_template(&self) -> &str { &self.descriptor_template }

    /// Gets the key expressions in placeholder order
    pub fn keys(&self) -> &[String] { &self.keys }

    /// Gets the root of the hash tree over the key expressions
    pub fn keys_root(&self) -> MerkleRoot { MerkleTree::from_elements(&self.keys).root() }

    /// Serializes the policy
    ///
    /// Layout: `0x01 ‖ varslice(name) ‖ varslice(template) ‖ varint(key
    /// count) ‖ keys root`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![POLICY_MAP_TYPE];
        write_varslice(&mut out, self.name.as_bytes());
        write_varslice(&mut out, self.descriptor_template.as_bytes());
        out.extend_from_slice(&encode_varint(self.keys.len() as u64));
        out.extend_from_slice(&self.keys_root());
        out
    }

    /// Gets the wallet identifier: SHA-256 of the serialization
    pub fn id(&self) -> WalletId { sha256(&self.serialize()) }
}

/// Formats a key expression with its origin
///
/// Produces `[fingerprint/path]xpub`, with hardened steps marked by `'`.
///
/// # Example
///
/// ```rust
/// use bitcoin::bip32::{ChildNumber, Fingerprint};
/// use merkle_psbt::wallet::key_expression;
///
/// let path = [
///     ChildNumber::from_hardened_idx(84)?,
///     ChildNumber::from_hardened_idx(1)?,
///     ChildNumber::from_hardened_idx(0)?,
/// ];
/// let key = key_expression(Fingerprint::from([0xf5, 0xac, 0xc2, 0xfd]), &path, "tpubXYZ");
///
/// assert_eq!(key, "[f5acc2fd/84'/1'/0']tpubXYZ");
/// # Ok::<(), bitcoin::bip32::Error>(())
/// ```
pub fn key_expression(fingerprint: Fingerprint, path: &[ChildNumber], xpub: &str) -> String {
    let mut origin = fingerprint.to_string();
    for child in path {
        origin.push_str(&format!("/{child}"));
    }
    format!("[{origin}]{xpub}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::merkle::hash_leaf;

    const KEY: &str = "[f5acc2fd/84'/1'/0']tpubDCtKfsNyRhULjZ9XMS4VKKtVcPdVDi8MKUbcSD9MJDyjRu1A2ND5MiipozyyspBT9bg8upEp7a8EAgFxNxXn1d7QkdbL52Ty5jiSLcxPt1P";

    #[test]
    fn test_serialize_layout() {
        let policy = WalletPolicy::new("ab", "wpkh(@0)", vec![KEY.to_string()])
            .expect("should build policy");

        let serialized = policy.serialize();

        let mut expected = vec![0x01, 0x02, b'a', b'b', 0x08];
        expected.extend_from_slice(b"wpkh(@0)");
        expected.push(0x01);
        expected.extend_from_slice(&hash_leaf(KEY.as_bytes()));
        assert_eq!(serialized, expected);
        assert_eq!(policy.id(), sha256(&expected));
    }

    #[test]
    fn test_keys_root_over_two_keys() {
        let keys = vec!["key0".to_string(), "key1".to_string()];
        let policy = WalletPolicy::new("multi", "wsh(multi(1,@0/**,@1/**))", keys)
            .expect("should build policy");

        let root = policy.keys_root();

        assert_eq!(root, crate::merkle::hash_internal_node(hash_leaf(b"key0"), hash_leaf(b"key1")));
    }

    #[test]
    fn test_default_policy() {
        let policy = WalletPolicy::default_policy(DefaultDescriptorTemplate::ShWpkh, KEY)
            .expect("should build policy");

        assert_eq!(policy.name(), "");
        assert_eq!(policy.descriptor_template(), "sh(wpkh(@0))");
        assert_eq!(policy.keys(), &[KEY.to_string()]);
        assert_eq!(&policy.serialize()[..2], &[0x01, 0x00]);
    }

    #[test]
    fn test_id_changes_with_name() {
        let a = WalletPolicy::new("a", "tr(@0)", vec![KEY.to_string()]);
        let b = WalletPolicy::new("b", "tr(@0)", vec![KEY.to_string()]);
        let a = a.expect("should build policy");
        let b = b.expect("should build policy");

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_non_ascii() {
        assert_eq!(
            WalletPolicy::new("wället", "tr(@0)", vec![KEY.to_string()]),
            Err(Error::Policy(PolicyError::NonAscii { field: "name" }))
        );
        assert_eq!(
            WalletPolicy::new("w", "tr(@0)", vec!["kéy".to_string()]),
            Err(Error::Policy(PolicyError::NonAscii { field: "key" }))
        );
    }

    #[test]
    fn test_empty_key_list() {
        let policy = WalletPolicy::new("w", "tr(@0)", Vec::new()).expect("should accept no keys");

        let serialized = policy.serialize();

        let expected =
            [&[0x01, 0x01, b'w', 0x06][..], &b"tr(@0)"[..], &[0x00][..], &[0u8; 32][..]].concat();
        assert_eq!(serialized, expected);
        assert_eq!(policy.keys_root(), [0u8; 32]);
    }

    #[test]
    fn test_template_strings() {
        let templates = [
            (DefaultDescriptorTemplate::Pkh, "pkh(@0)"),
            (DefaultDescriptorTemplate::ShWpkh, "sh(wpkh(@0))"),
            (DefaultDescriptorTemplate::Wpkh, "wpkh(@0)"),
            (DefaultDescriptorTemplate::Tr, "tr(@0)"),
        ];

        for (template, text) in templates {
            assert_eq!(template.to_string(), text);
        }
    }
}
