// Copyright (C) Microsoft Corporation. All rights reserved.

//! Key storage and per-operation state of the mock device.

use kmbridge_hal_types::find_blob;
use kmbridge_hal_types::find_int;
use kmbridge_hal_types::HalAlgorithm;
use kmbridge_hal_types::HalDigest;
use kmbridge_hal_types::HalKeyCharacteristics;
use kmbridge_hal_types::HalKeyOrigin;
use kmbridge_hal_types::HalKeyParam;
use kmbridge_hal_types::HalKeyPurpose;
use kmbridge_hal_types::HalPadding;
use kmbridge_hal_types::HalParamValue;
use kmbridge_hal_types::HalSecurityLevel;
use kmbridge_hal_types::HalTag;

const BLOB_MAGIC: &[u8; 8] = b"KMBMOCK0";

/// Encodes a vault key id as an opaque key blob.
pub(crate) fn encode_blob(key_id: u64) -> Vec<u8> {
    let mut blob = Vec::with_capacity(16);
    blob.extend_from_slice(BLOB_MAGIC);
    blob.extend_from_slice(&key_id.to_le_bytes());
    blob
}

/// Decodes a key blob back into a vault key id. Anything that does not carry
/// the mock magic is rejected.
pub(crate) fn decode_blob(blob: &[u8]) -> Option<u64> {
    let id_bytes = blob.strip_prefix(BLOB_MAGIC)?;
    let id_bytes: [u8; 8] = id_bytes.try_into().ok()?;
    Some(u64::from_le_bytes(id_bytes))
}

/// One key held by the mock vault.
///
/// Asymmetric material is PKCS#8 DER, symmetric material is raw bytes.
#[derive(Debug, Clone)]
pub(crate) struct KeyRecord {
    pub algorithm: HalAlgorithm,
    pub material: Vec<u8>,
    pub params: Vec<HalKeyParam>,
    pub origin: HalKeyOrigin,
    pub app_id: Option<Vec<u8>>,
    pub app_data: Option<Vec<u8>>,
}

impl KeyRecord {
    pub(crate) fn new(
        algorithm: HalAlgorithm,
        material: Vec<u8>,
        params: &[HalKeyParam],
        origin: HalKeyOrigin,
    ) -> Self {
        KeyRecord {
            algorithm,
            material,
            params: params.to_vec(),
            origin,
            app_id: find_blob(params, HalTag::ApplicationId).map(<[u8]>::to_vec),
            app_data: find_blob(params, HalTag::ApplicationData).map(<[u8]>::to_vec),
        }
    }

    /// True when the caller-supplied binding values match the ones the key
    /// was created with. A key created without a binding requires an empty
    /// value.
    pub(crate) fn binding_matches(&self, app_id: &[u8], app_data: &[u8]) -> bool {
        let id_ok = match &self.app_id {
            Some(bound) => bound.as_slice() == app_id,
            None => app_id.is_empty(),
        };
        let data_ok = match &self.app_data {
            Some(bound) => bound.as_slice() == app_data,
            None => app_data.is_empty(),
        };
        id_ok && data_ok
    }

    /// Purposes the key was created for. Empty means unrestricted.
    pub(crate) fn purposes(&self) -> Vec<HalKeyPurpose> {
        self.params
            .iter()
            .filter(|param| param.tag == HalTag::Purpose)
            .filter_map(|param| param.as_int())
            .filter_map(HalKeyPurpose::from_repr)
            .collect()
    }

    pub(crate) fn no_auth_required(&self) -> bool {
        self.params
            .iter()
            .any(|param| param.tag == HalTag::NoAuthRequired)
    }

    /// Splits the creation parameters into the characteristics lists the
    /// device reports back. Binding and attestation inputs are never echoed;
    /// wall-clock provenance stays software-enforced; everything else is
    /// enforced at the device's level, along with the origin.
    pub(crate) fn characteristics(&self, level: HalSecurityLevel) -> HalKeyCharacteristics {
        let mut hardware_enforced = Vec::new();
        let mut software_enforced = Vec::new();
        for param in &self.params {
            match param.tag {
                HalTag::ApplicationId | HalTag::ApplicationData | HalTag::AttestationChallenge => {}
                HalTag::CreationDatetime => software_enforced.push(param.clone()),
                _ => hardware_enforced.push(param.clone()),
            }
        }
        let origin = HalKeyParam {
            tag: HalTag::Origin,
            value: HalParamValue::Int(self.origin as u32),
        };
        if level == HalSecurityLevel::Software {
            software_enforced.append(&mut hardware_enforced);
            software_enforced.push(origin);
        } else {
            hardware_enforced.push(origin);
        }
        HalKeyCharacteristics {
            software_enforced,
            hardware_enforced,
        }
    }
}

/// What an in-flight operation does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    /// Buffers input, signs it at finish.
    Sign,

    /// Buffers input, checks the caller's signature at finish.
    Verify,

    /// Echoes input back, the mock stand-in for a cipher.
    Stream,
}

/// One in-flight operation.
#[derive(Debug, Clone)]
pub(crate) struct OpState {
    pub key_id: u64,
    pub kind: OpKind,
    pub digest: Option<HalDigest>,
    pub padding: Option<HalPadding>,
    pub buffer: Vec<u8>,
}

/// Digest and padding an operation was started with, pulled out of the
/// begin parameter list.
pub(crate) fn operation_selections(
    params: &[HalKeyParam],
) -> (Option<HalDigest>, Option<HalPadding>) {
    let digest = find_int(params, HalTag::Digest).and_then(HalDigest::from_repr);
    let padding = find_int(params, HalTag::Padding).and_then(HalPadding::from_repr);
    (digest, padding)
}
