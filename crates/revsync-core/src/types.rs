//! Strong type definitions for revsync.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Length of a [`Digest`] in bytes.
pub const DIGEST_LEN: usize = 20;

/// A 20-byte content digest identifying a commit or a revision.
///
/// Commits and revisions live in the same address space: a commit digest
/// hashes the commit body, a revision digest hashes the canonical encoding of
/// a document snapshot. The all-zero value is [`Digest::NULL`] and means
/// "no commit".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The null digest (no commit).
    pub const NULL: Self = Self([0u8; DIGEST_LEN]);

    /// Create a new Digest from raw bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Whether this is the null digest.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// Hash `data` under a domain separator.
    ///
    /// The digest is the first 20 bytes of the BLAKE3 extendable output over
    /// `domain || data`.
    pub fn hash(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(data);
        let mut out = [0u8; DIGEST_LEN];
        hasher.finalize_xof().fill(&mut out);
        Self(out)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != DIGEST_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; DIGEST_LEN] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Branch name to tip commit mapping.
///
/// Ordered so that iteration (and therefore anything serialized from it) is
/// deterministic.
pub type References = BTreeMap<String, Digest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = Digest::from_bytes([0x42; DIGEST_LEN]);
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(Digest::from_hex(&hex).unwrap(), digest);
    }

    #[test]
    fn test_digest_from_hex_wrong_length() {
        assert!(Digest::from_hex("abcd").is_err());
    }

    #[test]
    fn test_digest_null() {
        assert!(Digest::NULL.is_null());
        assert!(Digest::default().is_null());
        assert!(!Digest::from_bytes([1; DIGEST_LEN]).is_null());
    }

    #[test]
    fn test_digest_hash_domain_separated() {
        let a = Digest::hash(b"a:", b"payload");
        let b = Digest::hash(b"b:", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, Digest::hash(b"a:", b"payload"));
    }

    #[test]
    fn test_digest_display() {
        let digest = Digest::from_bytes([0xab; DIGEST_LEN]);
        assert_eq!(format!("{}", digest), "abababababababab");
        assert!(format!("{:?}", digest).starts_with("Digest("));
    }
}
