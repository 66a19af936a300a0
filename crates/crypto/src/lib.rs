// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! OpenSSL-backed cryptographic helpers.
//!
//! This crate wraps the handful of primitives the adapter needs behind small
//! free functions:
//!
//! - **Key generation**: RSA and NIST-curve EC key pairs
//! - **Hash**: one-shot digests (SHA-1 through SHA-512)
//! - **Signing**: RSA PKCS#1 v1.5 / PSS and ECDSA over pre-computed digests
//! - **Rand**: cryptographically strong random bytes
//!
//! Everything operates on `openssl` key handles directly; no key storage or
//! format abstraction lives here.

mod hash;
mod keys;
mod rand;
mod sign;

pub use hash::*;
pub use keys::*;
pub use rand::*;
pub use sign::*;
use thiserror::Error;

/// Error type for the cryptographic helpers.
///
/// OpenSSL error stacks are logged at the failure site via `tracing` and
/// collapsed into these semantic variants.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// RSA key generation failed.
    #[error("RSA key generation failed")]
    RsaKeyGenError,

    /// EC key generation failed.
    #[error("EC key generation failed")]
    EccKeyGenError,

    /// Key import from DER failed.
    #[error("key import failed")]
    KeyImportError,

    /// Key export to DER failed.
    #[error("key export failed")]
    KeyExportError,

    /// Hashing operation failed.
    #[error("hashing operation failed")]
    HashError,

    /// Configuring the signing context failed.
    #[error("signer property setup failed")]
    SignSetPropertyError,

    /// Signing operation failed.
    #[error("signing failed")]
    SignError,

    /// Signature verification failed to run.
    #[error("verification failed")]
    VerifyError,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RngError,

    /// The key type cannot perform the requested operation.
    #[error("unsupported key type")]
    UnsupportedKeyType,
}
