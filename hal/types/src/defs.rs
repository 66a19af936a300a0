// Copyright (C) Microsoft Corporation. All rights reserved.

//! Closed enumerations and the open error-code space of the legacy HAL.

use open_enum::open_enum;

/// Where key material lives and where operations on it execute.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, strum_macros::FromRepr)]
pub enum HalSecurityLevel {
    /// Keys handled entirely by the host OS.
    #[default]
    Software = 0,

    /// Keys bound to an isolated execution environment on the main SoC.
    TrustedEnvironment = 1,

    /// Keys bound to a dedicated secure element.
    Strongbox = 2,
}

/// Cryptographic algorithm of a key.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalAlgorithm {
    /// RSA asymmetric keys.
    Rsa = 1,

    /// NIST-curve EC asymmetric keys.
    Ec = 3,

    /// AES symmetric keys.
    Aes = 32,

    /// Triple-DES symmetric keys.
    TripleDes = 33,

    /// HMAC keys.
    Hmac = 128,
}

impl HalAlgorithm {
    /// Asymmetric algorithms can carry certificates; symmetric ones cannot.
    pub fn is_asymmetric(self) -> bool {
        matches!(self, HalAlgorithm::Rsa | HalAlgorithm::Ec)
    }
}

/// Operation a key may be used for.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalKeyPurpose {
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

    /// Wrapping other keys for secure import.
    WrapKey = 5,
}

/// Digest selection for an operation or a key authorization.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalDigest {
    /// No digest; raw data is processed directly.
    None = 0,

    /// MD5. Present for wire compatibility only.
    Md5 = 1,

    /// SHA-1.
    Sha1 = 2,

    /// SHA2-224.
    Sha224 = 3,

    /// SHA2-256.
    Sha256 = 4,

    /// SHA2-384.
    Sha384 = 5,

    /// SHA2-512.
    Sha512 = 6,
}

/// Padding mode for an operation or a key authorization.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalPadding {
    /// No padding.
    None = 1,

    /// RSAES-OAEP.
    RsaOaep = 2,

    /// RSASSA-PSS.
    RsaPss = 3,

    /// RSAES-PKCS#1 v1.5 (encryption).
    RsaPkcs115Encrypt = 4,

    /// RSASSA-PKCS#1 v1.5 (signing).
    RsaPkcs115Sign = 5,

    /// PKCS#7 block padding.
    Pkcs7 = 64,
}

/// NIST curve of an EC key.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalEcCurve {
    /// P-224.
    P224 = 0,

    /// P-256.
    P256 = 1,

    /// P-384.
    P384 = 2,

    /// P-521.
    P521 = 3,
}

/// Serialization format of key material crossing the HAL boundary.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalKeyFormat {
    /// X.509 SubjectPublicKeyInfo (public keys, export).
    X509 = 0,

    /// PKCS#8 (asymmetric private keys, import).
    Pkcs8 = 1,

    /// Raw bytes (symmetric keys).
    Raw = 3,
}

/// Provenance of key material, reported in key characteristics.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalKeyOrigin {
    /// Generated inside the device.
    Generated = 0,

    /// Derived inside the device.
    Derived = 1,

    /// Imported from the host.
    Imported = 2,

    /// Provenance unknown to the device.
    Unknown = 3,

    /// Imported through the wrapped-key path.
    SecurelyImported = 4,
}

/// Operation-level verdict of a legacy device call.
///
/// The numeric space is an ABI shared across device generations, so the type
/// is open: codes without a named constant still round-trip untouched.
/// Negative values are failures; `Ok` is the only success.
#[open_enum]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HalErrorCode {
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

impl HalErrorCode {
    /// True when the device reported success.
    pub fn is_ok(self) -> bool {
        self == HalErrorCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_repr_round_trip() {
        for level in [
            HalSecurityLevel::Software,
            HalSecurityLevel::TrustedEnvironment,
            HalSecurityLevel::Strongbox,
        ] {
            assert_eq!(HalSecurityLevel::from_repr(level as u32), Some(level));
        }
        assert_eq!(HalSecurityLevel::from_repr(3), None);
    }

    #[test]
    fn test_algorithm_symmetry_split() {
        assert!(HalAlgorithm::Rsa.is_asymmetric());
        assert!(HalAlgorithm::Ec.is_asymmetric());
        assert!(!HalAlgorithm::Aes.is_asymmetric());
        assert!(!HalAlgorithm::TripleDes.is_asymmetric());
        assert!(!HalAlgorithm::Hmac.is_asymmetric());
    }

    #[test]
    fn test_error_code_open_values() {
        assert!(HalErrorCode::Ok.is_ok());
        assert!(!HalErrorCode::UnknownError.is_ok());
        // Codes without a named constant stay representable.
        let novel = HalErrorCode(-773);
        assert!(!novel.is_ok());
        assert_eq!(novel.0, -773);
    }
}
