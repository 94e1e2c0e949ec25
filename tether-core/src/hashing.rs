//! Git-compatible content hashing.
//!
//! `content_hash` yields the same 40-hex digest as `git hash-object` for the
//! normalized text: `SHA1("blob " + len + "\0" + bytes)`. Content is
//! normalized first (leading UTF-8 BOM stripped, CRLF → LF) so the same
//! logical file hashes identically on every platform. Digests are persisted in
//! manifests and worktree configs, so this function must never change.

use std::borrow::Cow;

use sha1::{Digest, Sha1};

/// Digest of the empty blob (`git hash-object /dev/null`).
pub const EMPTY_BLOB_HASH: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

const BOM: char = '\u{feff}';

/// Strip a leading BOM and convert CRLF line endings to LF.
pub fn normalize(content: &str) -> Cow<'_, str> {
    let stripped = content.strip_prefix(BOM).unwrap_or(content);
    if stripped.contains("\r\n") {
        Cow::Owned(stripped.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(stripped)
    }
}

/// Hash text content.
pub fn content_hash(content: &str) -> String {
    blob_hash(normalize(content).as_bytes())
}

/// Hash raw bytes. Valid UTF-8 is normalized like [`content_hash`]; anything
/// else is hashed verbatim.
pub fn bytes_hash(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => content_hash(text),
        Err(_) => blob_hash(bytes),
    }
}

/// First 8 characters of a digest, for messages.
pub fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn blob_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_matches_git_empty_blob() {
        assert_eq!(content_hash(""), EMPTY_BLOB_HASH);
    }

    #[test]
    fn matches_git_hash_object_for_text() {
        // printf 'hello world\n' | git hash-object --stdin
        assert_eq!(
            content_hash("hello world\n"),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
    }

    #[test]
    fn crlf_and_bom_variants_share_hash() {
        let lf = content_hash("a\nb\n");
        assert_eq!(content_hash("a\r\nb\r\n"), lf);
        assert_eq!(content_hash("\u{feff}a\nb\n"), lf);
        assert_eq!(content_hash("\u{feff}a\r\nb\r\n"), lf);
    }

    #[test]
    fn lone_carriage_return_is_preserved() {
        assert_ne!(content_hash("a\rb"), content_hash("a\nb"));
    }

    #[test]
    fn multibyte_length_is_byte_length() {
        // printf 'é' | git hash-object --stdin
        assert_eq!(
            content_hash("é"),
            "4b04fff51468d8ab5201ab02b725dc477bc7cb45"
        );
    }

    #[test]
    fn short_prefix() {
        assert_eq!(short(EMPTY_BLOB_HASH), "e69de29b");
        assert_eq!(short("abc"), "abc");
    }
}
