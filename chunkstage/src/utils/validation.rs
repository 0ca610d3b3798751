use regex::Regex;
use std::sync::LazyLock;

static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("hash pattern is valid"));

/// A content hash must be usable as a single path component.
pub fn is_valid_hash(hash: &str) -> bool {
    HASH_RE.is_match(hash)
}

/// Temporary entries in a staging area are dot-prefixed and never reported.
pub fn is_hidden_entry(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hashes() {
        assert!(is_valid_hash("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(is_valid_hash("file_hash-v2"));
    }

    #[test]
    fn test_invalid_hashes() {
        assert!(!is_valid_hash(""));
        assert!(!is_valid_hash("."));
        assert!(!is_valid_hash("a/b"));
        assert!(!is_valid_hash("a b"));
        assert!(!is_valid_hash(&"f".repeat(129)));
    }

    #[test]
    fn test_hidden_entries() {
        assert!(is_hidden_entry(".h-0.1234.part"));
        assert!(!is_hidden_entry("h-0"));
    }
}
