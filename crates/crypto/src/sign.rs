// Copyright (C) Microsoft Corporation. All rights reserved.

//! Signing and verification of pre-computed digests.
//!
//! The caller hashes the message first; these functions wrap the raw
//! public-key operation. RSA keys sign with PKCS#1 v1.5 or PSS padding,
//! EC keys sign ECDSA with the signature in ASN.1 DER form.

use openssl::pkey::HasPrivate;
use openssl::pkey::HasPublic;
use openssl::pkey::Id;
use openssl::pkey::PKeyRef;
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::Padding;
use openssl::sign::RsaPssSaltlen;

use super::CryptoError;
use super::HashAlgorithm;

/// RSA signature padding scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RsaPadding {
    /// Deterministic PKCS#1 v1.5 padding.
    Pkcs1_5,

    /// Probabilistic PSS padding with salt length equal to the digest size.
    Pss,
}

fn configure_rsa<T>(
    pkey_ctx: &mut PkeyCtx<T>,
    hash: HashAlgorithm,
    padding: RsaPadding,
) -> Result<(), CryptoError> {
    let ossl_padding = match padding {
        RsaPadding::Pkcs1_5 => Padding::PKCS1,
        RsaPadding::Pss => Padding::PKCS1_PSS,
    };
    pkey_ctx
        .set_rsa_padding(ossl_padding)
        .map_err(|openssl_error_stack| {
            tracing::error!(?openssl_error_stack);
            CryptoError::SignSetPropertyError
        })?;
    pkey_ctx
        .set_signature_md(hash.md())
        .map_err(|openssl_error_stack| {
            tracing::error!(?openssl_error_stack);
            CryptoError::SignSetPropertyError
        })?;
    if padding == RsaPadding::Pss {
        pkey_ctx
            .set_rsa_pss_saltlen(RsaPssSaltlen::custom(hash.size() as i32))
            .map_err(|openssl_error_stack| {
                tracing::error!(?openssl_error_stack);
                CryptoError::SignSetPropertyError
            })?;
        pkey_ctx
            .set_rsa_mgf1_md(hash.md())
            .map_err(|openssl_error_stack| {
                tracing::error!(?openssl_error_stack);
                CryptoError::SignSetPropertyError
            })?;
    }
    Ok(())
}

/// Signs a pre-computed digest.
///
/// # Arguments
/// * `key` - The private key to sign with.
/// * `hash` - The algorithm that produced `digest`; also selects the RSA
///   DigestInfo / MGF1 digest.
/// * `digest` - The digest to sign, `hash.size()` bytes.
/// * `padding` - RSA padding scheme; ignored for EC keys, defaults to
///   PKCS#1 v1.5 when absent.
///
/// # Returns
/// * `Vec<u8>` - The signature: raw for RSA, ASN.1 DER for ECDSA.
///
/// # Errors
/// * `CryptoError::UnsupportedKeyType` - The key is neither RSA nor EC.
/// * `CryptoError::SignError` - The OpenSSL signing operation fails.
pub fn sign_digest<T: HasPrivate>(
    key: &PKeyRef<T>,
    hash: HashAlgorithm,
    digest: &[u8],
    padding: Option<RsaPadding>,
) -> Result<Vec<u8>, CryptoError> {
    let mut pkey_ctx = PkeyCtx::new(key).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::SignError
    })?;
    pkey_ctx.sign_init().map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::SignError
    })?;
    match key.id() {
        Id::RSA => configure_rsa(
            &mut pkey_ctx,
            hash,
            padding.unwrap_or(RsaPadding::Pkcs1_5),
        )?,
        Id::EC => {}
        _ => return Err(CryptoError::UnsupportedKeyType),
    }

    let buffer_len = pkey_ctx.sign(digest, None).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::SignError
    })?;
    let mut buffer = vec![0u8; buffer_len];
    let signature_len = pkey_ctx
        .sign(digest, Some(&mut buffer))
        .map_err(|openssl_error_stack| {
            tracing::error!(?openssl_error_stack);
            CryptoError::SignError
        })?;
    buffer.truncate(signature_len);
    Ok(buffer)
}

/// Verifies a signature against a pre-computed digest.
///
/// Invalid signatures return `Ok(false)`; `Err` means the verification could
/// not be carried out at all.
pub fn verify_digest<T: HasPublic>(
    key: &PKeyRef<T>,
    hash: HashAlgorithm,
    digest: &[u8],
    signature: &[u8],
    padding: Option<RsaPadding>,
) -> Result<bool, CryptoError> {
    let mut pkey_ctx = PkeyCtx::new(key).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::VerifyError
    })?;
    pkey_ctx.verify_init().map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::VerifyError
    })?;
    match key.id() {
        Id::RSA => configure_rsa(
            &mut pkey_ctx,
            hash,
            padding.unwrap_or(RsaPadding::Pkcs1_5),
        )?,
        Id::EC => {}
        _ => return Err(CryptoError::UnsupportedKeyType),
    }

    pkey_ctx
        .verify(digest, signature)
        .map_err(|openssl_error_stack| {
            tracing::error!(?openssl_error_stack);
            CryptoError::VerifyError
        })
}
