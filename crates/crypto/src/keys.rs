// Copyright (C) Microsoft Corporation. All rights reserved.

//! RSA and EC key pair generation, import and export.

use openssl::bn::BigNum;
use openssl::ec::EcGroup;
use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::pkey::HasPublic;
use openssl::pkey::PKey;
use openssl::pkey::PKeyRef;
use openssl::pkey::Private;
use openssl::rsa::Rsa;

use super::CryptoError;

/// Supported NIST curve.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EccCurve {
    /// P-224 (secp224r1).
    P224,

    /// P-256 (secp256r1, prime256v1).
    P256,

    /// P-384 (secp384r1).
    P384,

    /// P-521 (secp521r1).
    P521,
}

impl EccCurve {
    fn nid(self) -> Nid {
        match self {
            EccCurve::P224 => Nid::SECP224R1,
            EccCurve::P256 => Nid::X9_62_PRIME256V1,
            EccCurve::P384 => Nid::SECP384R1,
            EccCurve::P521 => Nid::SECP521R1,
        }
    }
}

/// Generates an RSA key pair.
///
/// # Arguments
/// * `bits` - Modulus size in bits.
/// * `exponent` - Public exponent, usually 65537.
///
/// # Returns
/// * `PKey<Private>` - The generated key pair.
///
/// # Errors
/// * `CryptoError::RsaKeyGenError` - If generation fails, including for
///   modulus sizes or exponents OpenSSL rejects.
pub fn generate_rsa(bits: u32, exponent: u64) -> Result<PKey<Private>, CryptoError> {
    let e = BigNum::from_slice(&exponent.to_be_bytes()).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::RsaKeyGenError
    })?;
    let rsa = Rsa::generate_with_e(bits, &e).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::RsaKeyGenError
    })?;
    PKey::from_rsa(rsa).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::RsaKeyGenError
    })
}

/// Generates an EC key pair on the given curve.
///
/// # Errors
/// * `CryptoError::EccKeyGenError` - If curve setup or generation fails.
pub fn generate_ecc(curve: EccCurve) -> Result<PKey<Private>, CryptoError> {
    let group = EcGroup::from_curve_name(curve.nid()).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::EccKeyGenError
    })?;
    let ec_key = EcKey::generate(&group).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::EccKeyGenError
    })?;
    PKey::from_ec_key(ec_key).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::EccKeyGenError
    })
}

/// Generates a P-256 key pair.
pub fn generate_ecc_p256() -> Result<PKey<Private>, CryptoError> {
    generate_ecc(EccCurve::P256)
}

/// Imports a private key from DER-encoded PKCS#8 bytes.
///
/// # Errors
/// * `CryptoError::KeyImportError` - If the bytes do not parse as PKCS#8.
pub fn private_key_from_pkcs8(der: &[u8]) -> Result<PKey<Private>, CryptoError> {
    PKey::private_key_from_pkcs8(der).map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::KeyImportError
    })
}

/// Exports a private key to DER-encoded PKCS#8 bytes.
///
/// # Errors
/// * `CryptoError::KeyExportError` - If the encoding fails.
pub fn private_key_to_pkcs8(key: &PKeyRef<Private>) -> Result<Vec<u8>, CryptoError> {
    key.private_key_to_pkcs8().map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::KeyExportError
    })
}

/// Exports the public half of a key as a DER-encoded SubjectPublicKeyInfo.
///
/// # Errors
/// * `CryptoError::KeyExportError` - If the encoding fails.
pub fn public_key_der<T: HasPublic>(key: &PKeyRef<T>) -> Result<Vec<u8>, CryptoError> {
    key.public_key_to_der().map_err(|openssl_error_stack| {
        tracing::error!(?openssl_error_stack);
        CryptoError::KeyExportError
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_rsa_2048() {
        let key = generate_rsa(2048, 65537).unwrap();
        assert_eq!(key.bits(), 2048);
        let rsa = key.rsa().unwrap();
        assert_eq!(rsa.e().to_vec(), vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_generate_ecc_curves() {
        for (curve, bits) in [
            (EccCurve::P224, 224),
            (EccCurve::P256, 256),
            (EccCurve::P384, 384),
            (EccCurve::P521, 521),
        ] {
            let key = generate_ecc(curve).unwrap();
            assert_eq!(key.bits(), bits, "{curve:?}");
        }
    }

    #[test]
    fn test_pkcs8_round_trip() {
        let key = generate_ecc_p256().unwrap();
        let der = private_key_to_pkcs8(&key).unwrap();
        let restored = private_key_from_pkcs8(&der).unwrap();
        assert_eq!(
            public_key_der(&key).unwrap(),
            public_key_der(&restored).unwrap()
        );
    }

    #[test]
    fn test_import_rejects_garbage() {
        assert_eq!(
            private_key_from_pkcs8(&[0u8; 16]).unwrap_err(),
            CryptoError::KeyImportError
        );
    }
}
