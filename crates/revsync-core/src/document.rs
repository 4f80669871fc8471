//! The versioned document.
//!
//! The host application's drawing database is opaque to revsync. What gets
//! committed is a snapshot of it: an ordered map from entity key to the
//! entity's serialized bytes. Ordering makes the canonical encoding, and so
//! the revision digest, independent of insertion order.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::types::Digest;

/// Domain separator for revision digests.
pub const REVISION_DOMAIN: &[u8] = b"revsync-revision-v0:";

/// A document snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    entities: BTreeMap<String, Bytes>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Option<Bytes> {
        self.entities.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entities.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entities.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entities.contains_key(key)
    }

    /// Iterate entities in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.entities.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Canonical byte encoding.
    pub fn canonical_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        codec::encode_document(&mut buf, self);
        buf.freeze()
    }

    /// Digest identifying this snapshot as a revision.
    pub fn revision_digest(&self) -> Digest {
        Digest::hash(REVISION_DOMAIN, &self.canonical_bytes())
    }
}

impl<K: Into<String>, V: Into<Bytes>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut document = Document::new();
        for (k, v) in iter {
            document.insert(k, v);
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_digest_ignores_insertion_order() {
        let mut a = Document::new();
        a.insert("line/1", Bytes::from_static(b"0,0-1,1"));
        a.insert("circle/1", Bytes::from_static(b"r=5"));

        let mut b = Document::new();
        b.insert("circle/1", Bytes::from_static(b"r=5"));
        b.insert("line/1", Bytes::from_static(b"0,0-1,1"));

        assert_eq!(a.revision_digest(), b.revision_digest());
    }

    #[test]
    fn test_revision_digest_tracks_content() {
        let a: Document = [("circle/1", Bytes::from_static(b"r=5"))].into_iter().collect();
        let b: Document = [("circle/1", Bytes::from_static(b"r=6"))].into_iter().collect();
        assert_ne!(a.revision_digest(), b.revision_digest());
        assert_ne!(Document::new().revision_digest(), a.revision_digest());
    }
}
