use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// First `len` characters of a hex digest, for log lines and banners
pub fn short_hash(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("ba7816bf8f01", 8), "ba7816bf");
        assert_eq!(short_hash("ba78", 8), "ba78");
    }
}
