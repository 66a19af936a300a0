// Copyright (C) Microsoft Corporation. All rights reserved.

//! Random number generation support.

use crate::CryptoError;

/// Fills a freshly allocated buffer of `len` bytes with cryptographically
/// strong pseudo-random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; len];
    openssl::rand::rand_bytes(&mut bytes).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::RngError
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_len_and_variation() {
        let first = random_bytes(32).unwrap();
        let second = random_bytes(32).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(second.len(), 32);
        assert_ne!(first, second);
        assert!(random_bytes(0).unwrap().is_empty());
    }
}
