//! Key Codec Module
//!
//! Maps arbitrary cache keys (usually URLs) to filesystem-safe file names.

use sha2::{Digest, Sha256};

/// Length of every cache file name (hex-encoded SHA-256).
pub const CACHE_FILE_NAME_LEN: usize = 64;

// == Cache File Name ==
/// Returns the file name that stores `key` on disk.
///
/// Deterministic and fixed-length; any string is accepted, including the
/// empty string.
pub fn cache_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_name() {
        let url = "https://example.com/images/cat.png";
        assert_eq!(cache_file_name(url), cache_file_name(url));
    }

    #[test]
    fn test_distinct_keys_distinct_names() {
        assert_ne!(
            cache_file_name("https://example.com/a.png"),
            cache_file_name("https://example.com/b.png")
        );
    }

    #[test]
    fn test_name_is_fixed_length_hex() {
        let long_key = "x".repeat(10_000);
        for key in ["", "a", "https://example.com/?q=1&r=2#frag", long_key.as_str()] {
            let name = cache_file_name(key);
            assert_eq!(name.len(), CACHE_FILE_NAME_LEN);
            assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            cache_file_name(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
