//! Binary codec for commit records and documents.
//!
//! Commit records travel outside of patches during clone (a revision-only
//! patch carries no commit metadata), so they have their own flat,
//! little-endian record format:
//!
//! ```text
//! hash[20] revision[20] parent_count:u32 parents[20 * parent_count]
//! author:str date:i64 message:str user_data_len:u32 user_data
//!
//! str = len:u32 utf8[len]
//! ```
//!
//! The same primitives produce the bytes hashed into commit and revision
//! digests, so the encoding must stay stable.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::commit::{Annotation, CommitInfo};
use crate::document::Document;
use crate::error::{CoreError, Result};
use crate::types::{Digest, DIGEST_LEN};

/// Upper bound on parents per commit accepted by the decoder.
pub const MAX_PARENTS: usize = 1000;

fn ensure(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(CoreError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Write a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Read a length-prefixed UTF-8 string.
pub fn get_string(buf: &mut impl Buf) -> Result<String> {
    let bytes = get_blob(buf)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CoreError::InvalidUtf8)
}

/// Write a length-prefixed byte blob.
pub fn put_blob(buf: &mut impl BufMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

/// Read a length-prefixed byte blob.
pub fn get_blob(buf: &mut impl Buf) -> Result<Bytes> {
    ensure(buf, 4)?;
    let len = buf.get_u32_le() as usize;
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Write a raw digest.
pub fn put_digest(buf: &mut impl BufMut, digest: &Digest) {
    buf.put_slice(digest.as_bytes());
}

/// Read a raw digest.
pub fn get_digest(buf: &mut impl Buf) -> Result<Digest> {
    ensure(buf, DIGEST_LEN)?;
    let mut arr = [0u8; DIGEST_LEN];
    buf.copy_to_slice(&mut arr);
    Ok(Digest(arr))
}

/// Encode everything a commit hash covers: revision, parents, annotation.
pub fn encode_commit_body(
    buf: &mut impl BufMut,
    revision: &Digest,
    parents: &[Digest],
    annotation: &Annotation,
) {
    put_digest(buf, revision);
    buf.put_u32_le(parents.len() as u32);
    for parent in parents {
        put_digest(buf, parent);
    }
    put_string(buf, &annotation.author);
    buf.put_i64_le(annotation.date);
    put_string(buf, &annotation.message);
    put_blob(buf, &annotation.user_data);
}

/// Encode a full commit record (hash followed by body).
pub fn encode_commit_info(buf: &mut impl BufMut, info: &CommitInfo) {
    put_digest(buf, &info.hash);
    encode_commit_body(buf, &info.revision, &info.parents, &info.annotation);
}

/// Decode one commit record.
pub fn decode_commit_info(buf: &mut impl Buf) -> Result<CommitInfo> {
    let hash = get_digest(buf)?;
    let revision = get_digest(buf)?;

    ensure(buf, 4)?;
    let count = buf.get_u32_le() as usize;
    if count > MAX_PARENTS {
        return Err(CoreError::InvalidCommit(format!(
            "{} parents exceeds the limit of {}",
            count, MAX_PARENTS
        )));
    }
    let mut parents = Vec::with_capacity(count);
    for _ in 0..count {
        parents.push(get_digest(buf)?);
    }

    let author = get_string(buf)?;
    ensure(buf, 8)?;
    let date = buf.get_i64_le();
    let message = get_string(buf)?;
    let user_data = get_blob(buf)?;

    Ok(CommitInfo {
        hash,
        revision,
        parents,
        annotation: Annotation {
            author,
            message,
            date,
            user_data,
        },
    })
}

/// Encode a sequence of commit records back to back.
pub fn encode_commit_stream<'a>(commits: impl IntoIterator<Item = &'a CommitInfo>) -> Bytes {
    let mut buf = BytesMut::new();
    for info in commits {
        encode_commit_info(&mut buf, info);
    }
    buf.freeze()
}

/// Decode commit records until the buffer is exhausted.
///
/// A record with a null hash is rejected.
pub fn decode_commit_stream(mut buf: &[u8]) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    while buf.has_remaining() {
        let info = decode_commit_info(&mut buf)?;
        if info.hash.is_null() {
            return Err(CoreError::InvalidCommit("null commit hash".into()));
        }
        commits.push(info);
    }
    Ok(commits)
}

/// Canonical encoding of a document: entry count, then key/value pairs in
/// key order.
pub fn encode_document(buf: &mut impl BufMut, document: &Document) {
    buf.put_u32_le(document.len() as u32);
    for (key, value) in document.iter() {
        put_string(buf, key);
        put_blob(buf, value);
    }
}

/// Decode a document produced by [`encode_document`].
pub fn decode_document(buf: &mut impl Buf) -> Result<Document> {
    ensure(buf, 4)?;
    let count = buf.get_u32_le() as usize;
    let mut document = Document::new();
    let mut previous: Option<String> = None;
    for _ in 0..count {
        let key = get_string(buf)?;
        if previous.as_ref().is_some_and(|p| p >= &key) {
            return Err(CoreError::DecodingError(format!(
                "document keys out of order at {:?}",
                key
            )));
        }
        let value = get_blob(buf)?;
        document.insert(key.clone(), value);
        previous = Some(key);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_commit(parents: usize) -> CommitInfo {
        let annotation = Annotation {
            author: "alice".into(),
            message: "add circle".into(),
            date: 1_700_000_000_000,
            user_data: Bytes::from_static(b"\x01\x02"),
        };
        let parents = (0..parents)
            .map(|i| Digest::from_bytes([i as u8 + 1; DIGEST_LEN]))
            .collect();
        CommitInfo::new(Digest::from_bytes([0xee; DIGEST_LEN]), parents, annotation)
    }

    #[test]
    fn test_commit_record_layout() {
        let info = sample_commit(2);
        let mut buf = BytesMut::new();
        encode_commit_info(&mut buf, &info);

        // hash + revision + count + 2 parents + author + date + message + user data
        let expected = 20 + 20 + 4 + 40 + (4 + 5) + 8 + (4 + 10) + (4 + 2);
        assert_eq!(buf.len(), expected);
        assert_eq!(&buf[..20], info.hash.as_bytes());
    }

    #[test]
    fn test_commit_stream_decodes_all_records() {
        let commits = vec![sample_commit(0), sample_commit(1), sample_commit(3)];
        let encoded = encode_commit_stream(&commits);
        let decoded = decode_commit_stream(&encoded).unwrap();
        assert_eq!(decoded, commits);
    }

    #[test]
    fn test_too_many_parents_rejected() {
        let mut buf = BytesMut::new();
        put_digest(&mut buf, &Digest::from_bytes([1; DIGEST_LEN]));
        put_digest(&mut buf, &Digest::from_bytes([2; DIGEST_LEN]));
        buf.put_u32_le(1001);

        let err = decode_commit_info(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommit(_)));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let encoded = encode_commit_stream(&[sample_commit(1)]);
        let cut = &encoded[..encoded.len() - 1];
        assert!(matches!(
            decode_commit_stream(cut),
            Err(CoreError::Truncated { .. })
        ));
    }

    #[test]
    fn test_null_hash_rejected_in_stream() {
        let mut info = sample_commit(0);
        info.hash = Digest::NULL;
        let encoded = encode_commit_stream(&[info]);
        assert!(matches!(
            decode_commit_stream(&encoded),
            Err(CoreError::InvalidCommit(_))
        ));
    }

    #[test]
    fn test_document_keys_must_be_sorted() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(2);
        put_string(&mut buf, "b");
        put_blob(&mut buf, b"1");
        put_string(&mut buf, "a");
        put_blob(&mut buf, b"2");
        assert!(decode_document(&mut &buf[..]).is_err());
    }

    proptest! {
        #[test]
        fn document_encoding_is_lossless(
            entries in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..32), 0..16)
        ) {
            let mut document = Document::new();
            for (k, v) in entries {
                document.insert(k, Bytes::from(v));
            }
            let mut buf = BytesMut::new();
            encode_document(&mut buf, &document);
            let decoded = decode_document(&mut &buf[..]).unwrap();
            prop_assert_eq!(decoded, document);
        }
    }
}
