// Copyright (C) Microsoft Corporation. All rights reserved.

//! One-shot cryptographic hash functions.

use openssl::hash::MessageDigest;
use openssl::md::Md;
use openssl::md::MdRef;

use super::CryptoError;

/// Supported hash algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1. Cryptographically broken; kept for legacy device compatibility.
    Sha1,

    /// SHA-224.
    Sha224,

    /// SHA-256.
    Sha256,

    /// SHA-384.
    Sha384,

    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// OpenSSL `MessageDigest` for this algorithm.
    pub fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha1 => MessageDigest::sha1(),
            HashAlgorithm::Sha224 => MessageDigest::sha224(),
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// OpenSSL `MdRef` for this algorithm, as `PkeyCtx` configuration wants it.
    pub fn md(self) -> &'static MdRef {
        match self {
            HashAlgorithm::Sha1 => Md::sha1(),
            HashAlgorithm::Sha224 => Md::sha224(),
            HashAlgorithm::Sha256 => Md::sha256(),
            HashAlgorithm::Sha384 => Md::sha384(),
            HashAlgorithm::Sha512 => Md::sha512(),
        }
    }

    /// Digest output size in bytes.
    pub fn size(self) -> usize {
        self.message_digest().size()
    }
}

/// Computes the digest of `data` in one shot.
///
/// # Arguments
/// * `algo` - The hash algorithm to apply.
/// * `data` - The message to digest.
///
/// # Returns
/// * `Vec<u8>` - The digest bytes, `algo.size()` long.
///
/// # Errors
/// * `CryptoError::HashError` - If the OpenSSL hash operation fails.
pub fn hash(algo: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let digest = openssl::hash::hash(algo.message_digest(), data).map_err(
        |openssl_error_stack| {
            tracing::error!(?openssl_error_stack);
            CryptoError::HashError
        },
    )?;
    Ok(digest.to_vec())
}
