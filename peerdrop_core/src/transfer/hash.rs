use blake3::Hasher;

/// BLAKE3 digest of a payload as a 64-character hex string
pub fn payload_digest(payload: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_hex_and_content_sensitive() {
        let a = payload_digest(b"report");
        let b = payload_digest(b"report!");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(payload_digest(b""), blake3::hash(b"").to_hex().to_string());
    }
}
