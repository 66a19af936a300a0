// Copyright (C) Microsoft Corporation. All rights reserved.

//! Key parameters and the request/result payloads of the modern surface.
//!
//! The modern side replaces the legacy tag-plus-value-union encoding with a
//! closed sum type: one variant per tag, payload typed per tag. Lookups over
//! parameter lists go through the `get_tag_value!` family of macros.

use kmbridge_hal_types::HalTag;

use crate::types::Algorithm;
use crate::types::BlockMode;
use crate::types::Digest;
use crate::types::EcCurve;
use crate::types::HardwareAuthenticatorType;
use crate::types::KeyOrigin;
use crate::types::KeyPurpose;
use crate::types::PaddingMode;
use crate::types::SecurityLevel;

/// Tag identifying one kind of key parameter.
///
/// The numeric space is shared with the legacy HAL, so each discriminant is
/// defined in terms of its legacy twin.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum Tag {
    /// A purpose the key may serve. Repeatable.
    Purpose = HalTag::Purpose as u32,
    /// The key's algorithm.
    Algorithm = HalTag::Algorithm as u32,
    /// Key size in bits.
    KeySize = HalTag::KeySize as u32,
    /// A permitted block mode. Repeatable.
    BlockMode = HalTag::BlockMode as u32,
    /// A permitted digest. Repeatable.
    Digest = HalTag::Digest as u32,
    /// A permitted padding mode. Repeatable.
    Padding = HalTag::Padding as u32,
    /// Curve of an EC key.
    EcCurve = HalTag::EcCurve as u32,
    /// RSA public exponent.
    RsaPublicExponent = HalTag::RsaPublicExponent as u32,
    /// Instant the key becomes usable, in ms since the epoch.
    ActiveDatetime = HalTag::ActiveDatetime as u32,
    /// Instant after which new ciphertext must not be produced.
    OriginationExpireDatetime = HalTag::OriginationExpireDatetime as u32,
    /// Instant after which the key must not be used at all.
    UsageExpireDatetime = HalTag::UsageExpireDatetime as u32,
    /// The key needs no user authentication.
    NoAuthRequired = HalTag::NoAuthRequired as u32,
    /// Caller-supplied binding blob gating use of the key.
    ApplicationId = HalTag::ApplicationId as u32,
    /// Second caller-supplied binding blob.
    ApplicationData = HalTag::ApplicationData as u32,
    /// Creation instant recorded in the key's characteristics.
    CreationDatetime = HalTag::CreationDatetime as u32,
    /// Provenance of the key material.
    Origin = HalTag::Origin as u32,
    /// Challenge to embed in an attestation certificate.
    AttestationChallenge = HalTag::AttestationChallenge as u32,
    /// Caller-supplied nonce or IV.
    Nonce = HalTag::Nonce as u32,
    /// MAC or GCM tag length in bits.
    MacLength = HalTag::MacLength as u32,
}

/// One typed key parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParam {
    /// A purpose the key may serve.
    Purpose(KeyPurpose),
    /// The key's algorithm.
    Algorithm(Algorithm),
    /// Key size in bits.
    KeySize(u32),
    /// A permitted block mode.
    BlockMode(BlockMode),
    /// A permitted digest.
    Digest(Digest),
    /// A permitted padding mode.
    Padding(PaddingMode),
    /// Curve of an EC key.
    EcCurve(EcCurve),
    /// RSA public exponent.
    RsaPublicExponent(u64),
    /// Instant the key becomes usable, in ms since the epoch.
    ActiveDatetime(u64),
    /// Instant after which new ciphertext must not be produced.
    OriginationExpireDatetime(u64),
    /// Instant after which the key must not be used at all.
    UsageExpireDatetime(u64),
    /// The key needs no user authentication.
    NoAuthRequired,
    /// Caller-supplied binding blob gating use of the key.
    ApplicationId(Vec<u8>),
    /// Second caller-supplied binding blob.
    ApplicationData(Vec<u8>),
    /// Creation instant recorded in the key's characteristics.
    CreationDatetime(u64),
    /// Provenance of the key material.
    Origin(KeyOrigin),
    /// Challenge to embed in an attestation certificate.
    AttestationChallenge(Vec<u8>),
    /// Caller-supplied nonce or IV.
    Nonce(Vec<u8>),
    /// MAC or GCM tag length in bits.
    MacLength(u32),
}

impl KeyParam {
    /// The tag this parameter answers to.
    pub fn tag(&self) -> Tag {
        match self {
            KeyParam::Purpose(_) => Tag::Purpose,
            KeyParam::Algorithm(_) => Tag::Algorithm,
            KeyParam::KeySize(_) => Tag::KeySize,
            KeyParam::BlockMode(_) => Tag::BlockMode,
            KeyParam::Digest(_) => Tag::Digest,
            KeyParam::Padding(_) => Tag::Padding,
            KeyParam::EcCurve(_) => Tag::EcCurve,
            KeyParam::RsaPublicExponent(_) => Tag::RsaPublicExponent,
            KeyParam::ActiveDatetime(_) => Tag::ActiveDatetime,
            KeyParam::OriginationExpireDatetime(_) => Tag::OriginationExpireDatetime,
            KeyParam::UsageExpireDatetime(_) => Tag::UsageExpireDatetime,
            KeyParam::NoAuthRequired => Tag::NoAuthRequired,
            KeyParam::ApplicationId(_) => Tag::ApplicationId,
            KeyParam::ApplicationData(_) => Tag::ApplicationData,
            KeyParam::CreationDatetime(_) => Tag::CreationDatetime,
            KeyParam::Origin(_) => Tag::Origin,
            KeyParam::AttestationChallenge(_) => Tag::AttestationChallenge,
            KeyParam::Nonce(_) => Tag::Nonce,
            KeyParam::MacLength(_) => Tag::MacLength,
        }
    }
}

/// First value carried by the named `KeyParam` variant in a parameter list,
/// cloned out of the list; `None` when the tag is absent.
#[macro_export]
macro_rules! get_tag_value {
    ($params:expr, $variant:ident) => {
        $params.iter().find_map(|param| match param {
            $crate::KeyParam::$variant(value) => Some(value.clone()),
            _ => None,
        })
    };
}

/// Presence of the named payload-free `KeyParam` variant in a parameter list.
#[macro_export]
macro_rules! get_bool_tag_value {
    ($params:expr, $variant:ident) => {
        $params
            .iter()
            .any(|param| matches!(param, $crate::KeyParam::$variant))
    };
}

/// Presence of the named payload-carrying `KeyParam` variant, regardless of
/// its value.
#[macro_export]
macro_rules! contains_tag_value {
    ($params:expr, $variant:ident) => {
        $params
            .iter()
            .any(|param| matches!(param, $crate::KeyParam::$variant(..)))
    };
}

/// Milliseconds since the epoch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// The instant, in ms.
    pub milliseconds: i64,
}

/// Token minted by a hardware authenticator, passed through to the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HardwareAuthToken {
    /// Challenge the token answers.
    pub challenge: i64,
    /// Secure user identifier.
    pub user_id: i64,
    /// Identifier of the authenticator instance.
    pub authenticator_id: i64,
    /// Kind of authenticator that minted the token.
    pub authenticator_type: HardwareAuthenticatorType,
    /// Minting instant.
    pub timestamp: Timestamp,
    /// MAC over the token body.
    pub mac: Vec<u8>,
}

/// Timestamp attestation produced by a device, passed through on update and
/// finish.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationToken {
    /// Challenge the token answers.
    pub challenge: i64,
    /// Attested instant.
    pub timestamp: Timestamp,
    /// Level of the attesting device.
    pub security_level: SecurityLevel,
    /// MAC over the token body.
    pub mac: Vec<u8>,
}

/// Authorizations of a key, split by the level that enforces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCharacteristics {
    /// Level enforcing this slice of the authorization list.
    pub security_level: SecurityLevel,
    /// The authorizations themselves.
    pub authorizations: Vec<KeyParam>,
}

/// One DER-encoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The encoded certificate.
    pub encoded_certificate: Vec<u8>,
}

/// Everything a successful key creation returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCreationResult {
    /// Opaque handle to the new key.
    pub key_blob: Vec<u8>,
    /// Authorizations, split by enforcing level.
    pub key_characteristics: Vec<KeyCharacteristics>,
    /// Certificate chain, leaf first; empty for symmetric keys.
    pub certificate_chain: Vec<Certificate>,
}

/// Identity of the device behind an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    /// Level the device executes at.
    pub security_level: SecurityLevel,
    /// Implementation name.
    pub name: String,
    /// Implementation author.
    pub author: String,
}

/// Outcome of one update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutput {
    /// Input bytes the device consumed; callers resubmit the remainder.
    pub consumed: usize,
    /// Parameters the device emitted.
    pub params: Vec<KeyParam>,
    /// Output bytes produced so far.
    pub output: Vec<u8>,
}

/// Outcome of a successful finish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOutput {
    /// Parameters the device emitted.
    pub params: Vec<KeyParam>,
    /// Final output bytes.
    pub output: Vec<u8>,
}
