// Copyright (C) Microsoft Corporation. All rights reserved.

//! Enumerations of the modern key-management surface.
//!
//! Discriminants match the legacy HAL twins wherever a twin exists, so
//! translation never rewrites numeric values on the wire.

use open_enum::open_enum;

/// Where key material lives and where operations on it execute.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, strum_macros::FromRepr)]
pub enum SecurityLevel {
    /// Keys handled entirely by the host OS.
    #[default]
    Software = 0,
    /// Keys confined to a trusted execution environment.
    TrustedEnvironment = 1,
    /// Keys confined to a dedicated secure element.
    Strongbox = 2,
}

/// Cryptographic algorithm of a key.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum Algorithm {
    /// RSA asymmetric keys.
    Rsa = 1,
    /// Elliptic-curve asymmetric keys.
    Ec = 3,
    /// AES symmetric keys.
    Aes = 32,
    /// Triple-DES symmetric keys.
    TripleDes = 33,
    /// HMAC secret keys.
    Hmac = 128,
}

impl Algorithm {
    /// True for key types that carry a public half.
    pub fn is_asymmetric(self) -> bool {
        matches!(self, Algorithm::Rsa | Algorithm::Ec)
    }
}

/// Operation a key may be used for.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum KeyPurpose {
    /// Encryption.
    Encrypt = 0,
    /// Decryption.
    Decrypt = 1,
    /// Signing.
    Sign = 2,
    /// Signature verification.
    Verify = 3,
    /// Key derivation.
    DeriveKey = 4,
    /// Wrapping other keys for secure export.
    WrapKey = 5,
    /// Key agreement. No legacy equivalent exists.
    AgreeKey = 6,
    /// Certifying other keys. No legacy equivalent exists.
    AttestKey = 7,
}

/// Block cipher chaining mode.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum BlockMode {
    /// Electronic codebook.
    Ecb = 1,
    /// Cipher block chaining.
    Cbc = 2,
    /// Counter mode.
    Ctr = 3,
    /// Galois/counter mode.
    Gcm = 32,
}

/// Digest selection for an operation or a key authorization.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum Digest {
    /// No digest; raw data is processed directly.
    None = 0,
    /// MD5.
    Md5 = 1,
    /// SHA-1.
    Sha1 = 2,
    /// SHA-224.
    Sha224 = 3,
    /// SHA-256.
    Sha256 = 4,
    /// SHA-384.
    Sha384 = 5,
    /// SHA-512.
    Sha512 = 6,
}

/// Padding mode for an operation or a key authorization.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum PaddingMode {
    /// No padding.
    None = 1,
    /// RSA OAEP for encryption.
    RsaOaep = 2,
    /// RSA PSS for signatures.
    RsaPss = 3,
    /// RSA PKCS#1 v1.5 for encryption.
    RsaPkcs115Encrypt = 4,
    /// RSA PKCS#1 v1.5 for signatures.
    RsaPkcs115Sign = 5,
    /// PKCS#7 block padding.
    Pkcs7 = 64,
}

/// NIST curve of an EC key.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum EcCurve {
    /// P-224.
    P224 = 0,
    /// P-256.
    P256 = 1,
    /// P-384.
    P384 = 2,
    /// P-521.
    P521 = 3,
}

/// Serialization format of key material crossing the API.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum KeyFormat {
    /// X.509 SubjectPublicKeyInfo (public keys, export).
    X509 = 0,
    /// PKCS#8 private key info (asymmetric import).
    Pkcs8 = 1,
    /// Raw bytes (symmetric import).
    Raw = 3,
}

/// Provenance of key material, reported in key characteristics.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum KeyOrigin {
    /// Generated inside the device.
    Generated = 0,
    /// Derived inside the device.
    Derived = 1,
    /// Imported in the clear.
    Imported = 2,
    /// Provenance unknown to the device.
    Unknown = 3,
    /// Imported under a wrapping key.
    SecurelyImported = 4,
}

/// Kind of authenticator that minted a hardware auth token.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, strum_macros::FromRepr)]
pub enum HardwareAuthenticatorType {
    /// No authenticator.
    #[default]
    None = 0,
    /// Lock-screen credential.
    Password = 1,
    /// Fingerprint sensor.
    Fingerprint = 2,
    /// Any authenticator.
    Any = 0xFFFF_FFFF,
}

/// Service-specific error code surfaced to modern callers.
///
/// Numerically identical to the legacy `HalErrorCode` space and open like
/// it: codes without a named constant pass through untouched in both
/// directions.
#[open_enum]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    RootOfTrustAlreadySet = -1,
    UnsupportedPurpose = -2,
    IncompatiblePurpose = -3,
    UnsupportedAlgorithm = -4,
    IncompatibleAlgorithm = -5,
    UnsupportedKeySize = -6,
    UnsupportedBlockMode = -7,
    IncompatibleBlockMode = -8,
    UnsupportedMacLength = -9,
    UnsupportedPaddingMode = -10,
    IncompatiblePaddingMode = -11,
    UnsupportedDigest = -12,
    IncompatibleDigest = -13,
    InvalidExpirationTime = -14,
    InvalidUserId = -15,
    InvalidAuthorizationTimeout = -16,
    UnsupportedKeyFormat = -17,
    IncompatibleKeyFormat = -18,
    UnsupportedKeyEncryptionAlgorithm = -19,
    UnsupportedKeyVerificationAlgorithm = -20,
    InvalidInputLength = -21,
    KeyExportOptionsInvalid = -22,
    DelegationViolation = -23,
    KeyMaxOpsExceeded = -24,
    InvalidTag = -25,
    KeyUserNotAuthenticated = -26,
    OutputParameterNull = -27,
    InvalidOperationHandle = -28,
    BufferTooSmall = -29,
    VerificationFailed = -30,
    TooManyOperations = -31,
    UnexpectedNullPointer = -32,
    InvalidKeyBlob = -33,
    ImportedKeyNotEncrypted = -34,
    ImportedKeyDecryptionFailed = -35,
    ImportedKeyNotSigned = -36,
    ImportedKeyVerificationFailed = -37,
    InvalidArgument = -38,
    UnsupportedTag = -39,
    MemoryAllocationFailed = -41,
    ImportParameterMismatch = -44,
    SecureHwAccessDenied = -45,
    OperationCancelled = -46,
    ConcurrentAccessConflict = -47,
    SecureHwBusy = -48,
    SecureHwCommunicationFailed = -49,
    UnsupportedEcField = -50,
    MissingNonce = -51,
    InvalidNonce = -52,
    AttestationChallengeMissing = -63,
    AttestationApplicationIdMissing = -65,
    CannotAttestIds = -66,
    HardwareTypeUnavailable = -68,
    Unimplemented = -100,
    VersionMismatch = -101,
    UnknownError = -1000,
}

impl ErrorCode {
    /// True when the code names success.
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asymmetric_split() {
        assert!(Algorithm::Rsa.is_asymmetric());
        assert!(Algorithm::Ec.is_asymmetric());
        assert!(!Algorithm::Aes.is_asymmetric());
        assert!(!Algorithm::Hmac.is_asymmetric());
    }

    #[test]
    fn test_error_code_open_values() {
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::TooManyOperations.is_ok());
        let novel = ErrorCode(-509);
        assert_eq!(novel.0, -509);
    }
}
