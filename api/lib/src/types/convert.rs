// Copyright (C) Microsoft Corporation. All rights reserved.

//! Pure translation between the modern surface and the legacy HAL types.
//!
//! Enum discriminants are numerically identical across the two generations,
//! so modern-to-legacy conversion is a raw-value passthrough. The reverse
//! direction validates discriminants and drops parameters the modern surface
//! cannot represent.

use kmbridge_hal_types::HalAuthToken;
use kmbridge_hal_types::HalErrorCode;
use kmbridge_hal_types::HalKeyCharacteristics;
use kmbridge_hal_types::HalKeyFormat;
use kmbridge_hal_types::HalKeyOrigin;
use kmbridge_hal_types::HalKeyParam;
use kmbridge_hal_types::HalKeyPurpose;
use kmbridge_hal_types::HalParamValue;
use kmbridge_hal_types::HalSecurityLevel;
use kmbridge_hal_types::HalTag;
use kmbridge_hal_types::HalVerificationToken;

use crate::types::Algorithm;
use crate::types::BlockMode;
use crate::types::Digest;
use crate::types::EcCurve;
use crate::types::ErrorCode;
use crate::types::HardwareAuthToken;
use crate::types::KeyCharacteristics;
use crate::types::KeyFormat;
use crate::types::KeyOrigin;
use crate::types::KeyParam;
use crate::types::KeyPurpose;
use crate::types::PaddingMode;
use crate::types::SecurityLevel;
use crate::types::VerificationToken;

/// Maps a modern security level onto its legacy twin.
pub fn security_level_to_hal(level: SecurityLevel) -> HalSecurityLevel {
    match level {
        SecurityLevel::Software => HalSecurityLevel::Software,
        SecurityLevel::TrustedEnvironment => HalSecurityLevel::TrustedEnvironment,
        SecurityLevel::Strongbox => HalSecurityLevel::Strongbox,
    }
}

/// Maps a legacy security level onto its modern twin.
pub fn security_level_from_hal(level: HalSecurityLevel) -> SecurityLevel {
    match level {
        HalSecurityLevel::Software => SecurityLevel::Software,
        HalSecurityLevel::TrustedEnvironment => SecurityLevel::TrustedEnvironment,
        HalSecurityLevel::Strongbox => SecurityLevel::Strongbox,
    }
}

/// Maps a modern purpose onto the legacy purpose enum.
///
/// `AgreeKey` and `AttestKey` postdate the legacy generation and have no
/// rendition there.
pub fn purpose_to_hal(purpose: KeyPurpose) -> Option<HalKeyPurpose> {
    match purpose {
        KeyPurpose::Encrypt => Some(HalKeyPurpose::Encrypt),
        KeyPurpose::Decrypt => Some(HalKeyPurpose::Decrypt),
        KeyPurpose::Sign => Some(HalKeyPurpose::Sign),
        KeyPurpose::Verify => Some(HalKeyPurpose::Verify),
        KeyPurpose::DeriveKey => Some(HalKeyPurpose::DeriveKey),
        KeyPurpose::WrapKey => Some(HalKeyPurpose::WrapKey),
        KeyPurpose::AgreeKey | KeyPurpose::AttestKey => None,
    }
}

/// Maps a modern key format onto its legacy twin.
pub fn format_to_hal(format: KeyFormat) -> HalKeyFormat {
    match format {
        KeyFormat::X509 => HalKeyFormat::X509,
        KeyFormat::Pkcs8 => HalKeyFormat::Pkcs8,
        KeyFormat::Raw => HalKeyFormat::Raw,
    }
}

/// Carries a legacy error code into the modern space, value unchanged.
pub fn error_code_from_hal(code: HalErrorCode) -> ErrorCode {
    ErrorCode(code.0)
}

/// Carries a modern error code into the legacy space, value unchanged.
pub fn error_code_to_hal(code: ErrorCode) -> HalErrorCode {
    HalErrorCode(code.0)
}

/// Renders one modern parameter in the legacy tag-plus-value encoding.
///
/// Enum payloads travel as their raw discriminant; a value the legacy device
/// does not know (such as an `AgreeKey` purpose) arrives there numerically
/// intact and is the device's to reject.
pub fn key_param_to_hal(param: &KeyParam) -> HalKeyParam {
    let (tag, value) = match param {
        KeyParam::Purpose(purpose) => (HalTag::Purpose, HalParamValue::Int(*purpose as u32)),
        KeyParam::Algorithm(algorithm) => {
            (HalTag::Algorithm, HalParamValue::Int(*algorithm as u32))
        }
        KeyParam::KeySize(bits) => (HalTag::KeySize, HalParamValue::Int(*bits)),
        KeyParam::BlockMode(mode) => (HalTag::BlockMode, HalParamValue::Int(*mode as u32)),
        KeyParam::Digest(digest) => (HalTag::Digest, HalParamValue::Int(*digest as u32)),
        KeyParam::Padding(padding) => (HalTag::Padding, HalParamValue::Int(*padding as u32)),
        KeyParam::EcCurve(curve) => (HalTag::EcCurve, HalParamValue::Int(*curve as u32)),
        KeyParam::RsaPublicExponent(exponent) => {
            (HalTag::RsaPublicExponent, HalParamValue::LongInt(*exponent))
        }
        KeyParam::ActiveDatetime(instant) => {
            (HalTag::ActiveDatetime, HalParamValue::DateTime(*instant))
        }
        KeyParam::OriginationExpireDatetime(instant) => (
            HalTag::OriginationExpireDatetime,
            HalParamValue::DateTime(*instant),
        ),
        KeyParam::UsageExpireDatetime(instant) => (
            HalTag::UsageExpireDatetime,
            HalParamValue::DateTime(*instant),
        ),
        KeyParam::NoAuthRequired => (HalTag::NoAuthRequired, HalParamValue::Bool(true)),
        KeyParam::ApplicationId(blob) => (HalTag::ApplicationId, HalParamValue::Blob(blob.clone())),
        KeyParam::ApplicationData(blob) => {
            (HalTag::ApplicationData, HalParamValue::Blob(blob.clone()))
        }
        KeyParam::CreationDatetime(instant) => {
            (HalTag::CreationDatetime, HalParamValue::DateTime(*instant))
        }
        KeyParam::Origin(origin) => (HalTag::Origin, HalParamValue::Int(*origin as u32)),
        KeyParam::AttestationChallenge(blob) => {
            (HalTag::AttestationChallenge, HalParamValue::Blob(blob.clone()))
        }
        KeyParam::Nonce(blob) => (HalTag::Nonce, HalParamValue::Blob(blob.clone())),
        KeyParam::MacLength(bits) => (HalTag::MacLength, HalParamValue::Int(*bits)),
    };
    HalKeyParam { tag, value }
}

/// Renders a whole modern parameter list for the legacy device.
pub fn key_params_to_hal(params: &[KeyParam]) -> Vec<HalKeyParam> {
    params.iter().map(key_param_to_hal).collect()
}

/// Lifts one legacy parameter into the modern sum type.
///
/// Returns `None` for tags the modern surface does not carry and for
/// payloads whose discriminant or value kind does not validate; such
/// parameters are dropped from converted lists.
pub fn key_param_from_hal(param: &HalKeyParam) -> Option<KeyParam> {
    let converted = match param.tag {
        HalTag::Invalid => None,
        HalTag::Purpose => param
            .as_int()
            .and_then(KeyPurpose::from_repr)
            .map(KeyParam::Purpose),
        HalTag::Algorithm => param
            .as_int()
            .and_then(Algorithm::from_repr)
            .map(KeyParam::Algorithm),
        HalTag::KeySize => param.as_int().map(KeyParam::KeySize),
        HalTag::BlockMode => param
            .as_int()
            .and_then(BlockMode::from_repr)
            .map(KeyParam::BlockMode),
        HalTag::Digest => param
            .as_int()
            .and_then(Digest::from_repr)
            .map(KeyParam::Digest),
        HalTag::Padding => param
            .as_int()
            .and_then(PaddingMode::from_repr)
            .map(KeyParam::Padding),
        HalTag::EcCurve => param
            .as_int()
            .and_then(EcCurve::from_repr)
            .map(KeyParam::EcCurve),
        HalTag::RsaPublicExponent => param.as_long().map(KeyParam::RsaPublicExponent),
        HalTag::ActiveDatetime => param.as_date().map(KeyParam::ActiveDatetime),
        HalTag::OriginationExpireDatetime => {
            param.as_date().map(KeyParam::OriginationExpireDatetime)
        }
        HalTag::UsageExpireDatetime => param.as_date().map(KeyParam::UsageExpireDatetime),
        HalTag::NoAuthRequired => match param.as_bool() {
            Some(true) => Some(KeyParam::NoAuthRequired),
            _ => None,
        },
        HalTag::ApplicationId => param
            .as_blob()
            .map(|blob| KeyParam::ApplicationId(blob.to_vec())),
        HalTag::ApplicationData => param
            .as_blob()
            .map(|blob| KeyParam::ApplicationData(blob.to_vec())),
        HalTag::CreationDatetime => param.as_date().map(KeyParam::CreationDatetime),
        HalTag::Origin => param
            .as_int()
            .and_then(KeyOrigin::from_repr)
            .map(KeyParam::Origin),
        HalTag::AttestationChallenge => param
            .as_blob()
            .map(|blob| KeyParam::AttestationChallenge(blob.to_vec())),
        HalTag::Nonce => param.as_blob().map(|blob| KeyParam::Nonce(blob.to_vec())),
        HalTag::MacLength => param.as_int().map(KeyParam::MacLength),
    };
    if converted.is_none() {
        tracing::warn!(tag = ?param.tag, "dropping legacy parameter with no modern rendition");
    }
    converted
}

/// Lifts a whole legacy parameter list, dropping what does not translate.
pub fn key_params_from_hal(params: &[HalKeyParam]) -> Vec<KeyParam> {
    params.iter().filter_map(key_param_from_hal).collect()
}

/// Splits legacy key characteristics into per-level authorization lists.
///
/// Hardware-enforced entries are attributed to the level of the device that
/// answered; software-enforced entries to `SecurityLevel::Software`. Empty
/// slices are omitted entirely.
pub fn characteristics_from_hal(
    level: SecurityLevel,
    characteristics: &HalKeyCharacteristics,
) -> Vec<KeyCharacteristics> {
    let mut split = Vec::new();
    let hardware = key_params_from_hal(&characteristics.hardware_enforced);
    if !hardware.is_empty() {
        split.push(KeyCharacteristics {
            security_level: level,
            authorizations: hardware,
        });
    }
    let software = key_params_from_hal(&characteristics.software_enforced);
    if !software.is_empty() {
        split.push(KeyCharacteristics {
            security_level: SecurityLevel::Software,
            authorizations: software,
        });
    }
    split
}

/// Renders an optional auth token for the legacy device; absence becomes the
/// all-zero token the legacy interface expects.
pub fn auth_token_to_hal(token: Option<&HardwareAuthToken>) -> HalAuthToken {
    match token {
        None => HalAuthToken::default(),
        Some(token) => HalAuthToken {
            challenge: token.challenge as u64,
            user_id: token.user_id as u64,
            authenticator_id: token.authenticator_id as u64,
            authenticator_type: token.authenticator_type as u32,
            timestamp_ms: token.timestamp.milliseconds as u64,
            mac: token.mac.clone(),
        },
    }
}

/// Renders an optional verification token for the legacy device.
pub fn verification_token_to_hal(token: Option<&VerificationToken>) -> HalVerificationToken {
    match token {
        None => HalVerificationToken::default(),
        Some(token) => HalVerificationToken {
            challenge: token.challenge as u64,
            timestamp_ms: token.timestamp.milliseconds as u64,
            security_level: security_level_to_hal(token.security_level),
            mac: token.mac.clone(),
        },
    }
}

/// Legacy origin lifted into the modern enum.
pub fn origin_from_hal(origin: HalKeyOrigin) -> KeyOrigin {
    match origin {
        HalKeyOrigin::Generated => KeyOrigin::Generated,
        HalKeyOrigin::Derived => KeyOrigin::Derived,
        HalKeyOrigin::Imported => KeyOrigin::Imported,
        HalKeyOrigin::Unknown => KeyOrigin::Unknown,
        HalKeyOrigin::SecurelyImported => KeyOrigin::SecurelyImported,
    }
}
