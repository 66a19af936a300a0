// Copyright (C) Microsoft Corporation. All rights reserved.

//! Legacy key parameters: tags with a type nibble in the high bits and a
//! loosely typed value union, as the wire format defines them.

/// Value kind a tag demands, encoded in bits 28..32 of the tag number.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalTagType {
    /// Reserved zero pattern.
    Invalid = 0,

    /// Single enumerated value.
    Enum = 1 << 28,

    /// Repeatable enumerated value.
    EnumRep = 2 << 28,

    /// Single 32-bit integer.
    Uint = 3 << 28,

    /// Repeatable 32-bit integer.
    UintRep = 4 << 28,

    /// Single 64-bit integer.
    Ulong = 5 << 28,

    /// Date in milliseconds since the epoch.
    Date = 6 << 28,

    /// Value-less flag; present means true.
    Bool = 7 << 28,

    /// Arbitrary-precision integer as a byte string.
    Bignum = 8 << 28,

    /// Opaque byte string.
    Bytes = 9 << 28,

    /// Repeatable 64-bit integer.
    UlongRep = 10 << 28,
}

const TAG_TYPE_MASK: u32 = 0xF << 28;

/// Parameter tags understood by the legacy interface.
///
/// Each discriminant carries its [`HalTagType`] in the high nibble and the
/// tag number in the low bits.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::FromRepr)]
pub enum HalTag {
    /// Reserved zero tag.
    Invalid = 0,

    /// Purposes the key may be used for.
    Purpose = (HalTagType::EnumRep as u32) | 1,

    /// Algorithm of the key.
    Algorithm = (HalTagType::Enum as u32) | 2,

    /// Key size in bits.
    KeySize = (HalTagType::Uint as u32) | 3,

    /// Block cipher modes the key may be used with.
    BlockMode = (HalTagType::EnumRep as u32) | 4,

    /// Digests the key may be used with.
    Digest = (HalTagType::EnumRep as u32) | 5,

    /// Padding modes the key may be used with.
    Padding = (HalTagType::EnumRep as u32) | 6,

    /// NIST curve of an EC key.
    EcCurve = (HalTagType::Enum as u32) | 10,

    /// Public exponent of an RSA key.
    RsaPublicExponent = (HalTagType::Ulong as u32) | 200,

    /// Instant the key becomes usable.
    ActiveDatetime = (HalTagType::Date as u32) | 400,

    /// Instant after which the key may no longer originate ciphertext or
    /// signatures.
    OriginationExpireDatetime = (HalTagType::Date as u32) | 401,

    /// Instant after which the key may no longer be used at all.
    UsageExpireDatetime = (HalTagType::Date as u32) | 402,

    /// Key is usable without user authentication.
    NoAuthRequired = (HalTagType::Bool as u32) | 503,

    /// Caller identity the key is bound to.
    ApplicationId = (HalTagType::Bytes as u32) | 601,

    /// Caller-supplied secret the key is bound to.
    ApplicationData = (HalTagType::Bytes as u32) | 700,

    /// Instant the key was created.
    CreationDatetime = (HalTagType::Date as u32) | 701,

    /// How the key material came to exist.
    Origin = (HalTagType::Enum as u32) | 702,

    /// Challenge to embed in an attestation.
    AttestationChallenge = (HalTagType::Bytes as u32) | 708,

    /// Caller-supplied IV or nonce for an operation.
    Nonce = (HalTagType::Bytes as u32) | 1001,

    /// Requested MAC or AEAD tag length in bits.
    MacLength = (HalTagType::Uint as u32) | 1003,
}

impl HalTag {
    /// Value kind encoded in the high nibble of the tag.
    pub fn tag_type(self) -> HalTagType {
        HalTagType::from_repr(self as u32 & TAG_TYPE_MASK).unwrap_or(HalTagType::Invalid)
    }
}

/// Value payload of a legacy key parameter.
///
/// The wire format is a union discriminated only by the tag, so nothing
/// stops a malformed list from pairing a tag with the wrong kind. Use
/// [`HalKeyParam::validate`] at trust boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalParamValue {
    /// Presence flag.
    Bool(bool),

    /// Enumerated or 32-bit integer value.
    Int(u32),

    /// 64-bit integer value.
    LongInt(u64),

    /// Milliseconds since the epoch.
    DateTime(u64),

    /// Byte string or big integer.
    Blob(Vec<u8>),
}

impl HalParamValue {
    fn kind_name(&self) -> &'static str {
        match self {
            HalParamValue::Bool(_) => "bool",
            HalParamValue::Int(_) => "int",
            HalParamValue::LongInt(_) => "long",
            HalParamValue::DateTime(_) => "date",
            HalParamValue::Blob(_) => "blob",
        }
    }
}

/// Structural defects in legacy parameter lists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HalTypeError {
    /// A parameter carries a value kind its tag does not allow.
    #[error("tag {tag:?} expects a {expected:?} value, got {found}")]
    TagValueMismatch {
        /// Tag whose payload was inspected.
        tag: HalTag,
        /// Kind the tag type nibble demands.
        expected: HalTagType,
        /// Kind the payload actually carries.
        found: &'static str,
    },
}

/// One tag/value pair of a legacy parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalKeyParam {
    /// Parameter tag.
    pub tag: HalTag,

    /// Parameter value.
    pub value: HalParamValue,
}

impl HalKeyParam {
    /// Checks that the value kind matches the kind encoded in the tag.
    pub fn validate(&self) -> Result<(), HalTypeError> {
        let matches = match self.tag.tag_type() {
            HalTagType::Enum | HalTagType::EnumRep | HalTagType::Uint | HalTagType::UintRep => {
                matches!(self.value, HalParamValue::Int(_))
            }
            HalTagType::Ulong | HalTagType::UlongRep => {
                matches!(self.value, HalParamValue::LongInt(_))
            }
            HalTagType::Date => matches!(self.value, HalParamValue::DateTime(_)),
            HalTagType::Bool => matches!(self.value, HalParamValue::Bool(_)),
            HalTagType::Bignum | HalTagType::Bytes => matches!(self.value, HalParamValue::Blob(_)),
            HalTagType::Invalid => false,
        };
        if matches {
            Ok(())
        } else {
            Err(HalTypeError::TagValueMismatch {
                tag: self.tag,
                expected: self.tag.tag_type(),
                found: self.value.kind_name(),
            })
        }
    }

    /// Enumerated or integer payload, if that is what the parameter holds.
    pub fn as_int(&self) -> Option<u32> {
        match self.value {
            HalParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// 64-bit integer payload, if that is what the parameter holds.
    pub fn as_long(&self) -> Option<u64> {
        match self.value {
            HalParamValue::LongInt(v) => Some(v),
            _ => None,
        }
    }

    /// Date payload, if that is what the parameter holds.
    pub fn as_date(&self) -> Option<u64> {
        match self.value {
            HalParamValue::DateTime(v) => Some(v),
            _ => None,
        }
    }

    /// Flag payload, if that is what the parameter holds.
    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            HalParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Byte payload, if that is what the parameter holds.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match &self.value {
            HalParamValue::Blob(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// First value carried for `tag`, if the list names it.
pub fn find_value(params: &[HalKeyParam], tag: HalTag) -> Option<&HalParamValue> {
    params.iter().find(|p| p.tag == tag).map(|p| &p.value)
}

/// First enumerated or integer value carried for `tag`.
pub fn find_int(params: &[HalKeyParam], tag: HalTag) -> Option<u32> {
    match find_value(params, tag) {
        Some(HalParamValue::Int(v)) => Some(*v),
        _ => None,
    }
}

/// First 64-bit integer value carried for `tag`.
pub fn find_long(params: &[HalKeyParam], tag: HalTag) -> Option<u64> {
    match find_value(params, tag) {
        Some(HalParamValue::LongInt(v)) => Some(*v),
        _ => None,
    }
}

/// First date value carried for `tag`.
pub fn find_date(params: &[HalKeyParam], tag: HalTag) -> Option<u64> {
    match find_value(params, tag) {
        Some(HalParamValue::DateTime(v)) => Some(*v),
        _ => None,
    }
}

/// First flag value carried for `tag`.
pub fn find_bool(params: &[HalKeyParam], tag: HalTag) -> Option<bool> {
    match find_value(params, tag) {
        Some(HalParamValue::Bool(v)) => Some(*v),
        _ => None,
    }
}

/// First byte value carried for `tag`.
pub fn find_blob(params: &[HalKeyParam], tag: HalTag) -> Option<&[u8]> {
    match find_value(params, tag) {
        Some(HalParamValue::Blob(v)) => Some(v.as_slice()),
        _ => None,
    }
}
