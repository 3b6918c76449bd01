//! Content-addressed store key generation.

use sha2::{Digest, Sha256};

/// Compute the row key for a `(method, url)` pair.
pub fn compute_store_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_store_key("GET", "https://app.example/app/shell.js");
        let hash2 = compute_store_key("GET", "https://app.example/app/shell.js");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_store_key("GET", "https://app.example/");
        let head = compute_store_key("HEAD", "https://app.example/");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_separator_prevents_collisions() {
        assert_ne!(compute_store_key("GE", "Thttps://a"), compute_store_key("GET", "https://a"));
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_store_key("GET", "https://app.example/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
