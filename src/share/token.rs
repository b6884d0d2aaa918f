use rand::RngCore;

/// Raw token length in bytes; hex encoding doubles it on the wire.
pub const TOKEN_BYTES: usize = 24;

/// Generate an opaque share token: 24 bytes (192 bits) from the OS-seeded
/// CSPRNG, lowercase hex. Secure randomness is assumed available; if it is
/// not, the process has no business issuing links at all.
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_share_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token, token.to_lowercase());
    }

    #[test]
    fn test_consecutive_tokens_differ() {
        assert_ne!(generate_share_token(), generate_share_token());
    }
}
