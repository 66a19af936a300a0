// Copyright (C) Microsoft Corporation. All rights reserved.

//! The mock device and its bookkeeping.

use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use strum::EnumCount;

use kmbridge_crypto::generate_ecc;
use kmbridge_crypto::generate_rsa;
use kmbridge_crypto::hash;
use kmbridge_crypto::private_key_from_pkcs8;
use kmbridge_crypto::private_key_to_pkcs8;
use kmbridge_crypto::public_key_der;
use kmbridge_crypto::random_bytes;
use kmbridge_crypto::sign_digest;
use kmbridge_crypto::verify_digest;
use kmbridge_crypto::EccCurve;
use kmbridge_crypto::HashAlgorithm;
use kmbridge_crypto::RsaPadding;
use kmbridge_hal_interface::HalDevice;
use kmbridge_hal_interface::HalError;
use kmbridge_hal_interface::HalResult;
use kmbridge_hal_types::find_blob;
use kmbridge_hal_types::find_int;
use kmbridge_hal_types::find_long;
use kmbridge_hal_types::HalAlgorithm;
use kmbridge_hal_types::HalAttestResp;
use kmbridge_hal_types::HalAuthToken;
use kmbridge_hal_types::HalBeginResp;
use kmbridge_hal_types::HalDigest;
use kmbridge_hal_types::HalEcCurve;
use kmbridge_hal_types::HalErrorCode;
use kmbridge_hal_types::HalExportResp;
use kmbridge_hal_types::HalFinishResp;
use kmbridge_hal_types::HalHardwareInfo;
use kmbridge_hal_types::HalKeyCreationResp;
use kmbridge_hal_types::HalKeyFormat;
use kmbridge_hal_types::HalKeyOrigin;
use kmbridge_hal_types::HalKeyParam;
use kmbridge_hal_types::HalKeyPurpose;
use kmbridge_hal_types::HalPadding;
use kmbridge_hal_types::HalSecurityLevel;
use kmbridge_hal_types::HalTag;
use kmbridge_hal_types::HalUpdateResp;
use kmbridge_hal_types::HalUpgradeResp;
use kmbridge_hal_types::HalVerificationToken;

use crate::attest::AttestIdentity;
use crate::vault::decode_blob;
use crate::vault::encode_blob;
use crate::vault::operation_selections;
use crate::vault::KeyRecord;
use crate::vault::OpKind;
use crate::vault::OpState;

const MAX_ENTROPY_LEN: usize = 2048;

/// Which device entry point a call hit. Used for call counters and failure
/// injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::EnumCount)]
pub enum MockOp {
    /// `hardware_info`
    HardwareInfo,
    /// `add_rng_entropy`
    AddRngEntropy,
    /// `generate_key`
    GenerateKey,
    /// `import_key`
    ImportKey,
    /// `import_wrapped_key`
    ImportWrappedKey,
    /// `upgrade_key`
    UpgradeKey,
    /// `delete_key`
    DeleteKey,
    /// `delete_all_keys`
    DeleteAllKeys,
    /// `begin`
    Begin,
    /// `update`
    Update,
    /// `finish`
    Finish,
    /// `abort`
    Abort,
    /// `export_key`
    ExportKey,
    /// `attest_key`
    AttestKey,
}

/// A failure queued for an upcoming call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// The call dies on the transport plane.
    Transport,

    /// The call completes transport-wise but the device reports this code.
    Code(HalErrorCode),
}

struct MockState {
    keys: HashMap<u64, KeyRecord>,
    next_key_id: u64,
    ops: HashMap<u64, OpState>,
    next_handle: u64,
    identity: Option<AttestIdentity>,
    calls: [usize; MockOp::COUNT],
    failures: HashMap<MockOp, VecDeque<MockFailure>>,
    update_limit: Option<usize>,
}

impl MockState {
    fn new() -> Self {
        MockState {
            keys: HashMap::new(),
            next_key_id: 1,
            ops: HashMap::new(),
            next_handle: 0x10,
            identity: None,
            calls: [0; MockOp::COUNT],
            failures: HashMap::new(),
            update_limit: None,
        }
    }

    /// Counts the call, then applies any queued failure for this entry
    /// point. A transport failure surfaces as `Err`; a device code comes
    /// back as `Some` for the caller to wrap into its response type.
    fn enter(&mut self, op: MockOp) -> Result<Option<HalErrorCode>, HalError> {
        self.calls[op as usize] += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(MockFailure::Transport) => {
                tracing::debug!(?op, "injected transport failure");
                Err(HalError::Unavailable)
            }
            Some(MockFailure::Code(code)) => {
                tracing::debug!(?op, ?code, "injected device code");
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    fn insert_key(
        &mut self,
        algorithm: HalAlgorithm,
        material: Vec<u8>,
        params: &[HalKeyParam],
        origin: HalKeyOrigin,
        level: HalSecurityLevel,
    ) -> HalKeyCreationResp {
        let record = KeyRecord::new(algorithm, material, params, origin);
        let characteristics = record.characteristics(level);
        let key_id = self.next_key_id;
        self.next_key_id += 1;
        self.keys.insert(key_id, record);
        tracing::debug!(key_id, ?algorithm, ?origin, "key stored");
        HalKeyCreationResp {
            error: HalErrorCode::Ok,
            key_blob: encode_blob(key_id),
            characteristics,
        }
    }
}

/// In-process stand-in for a legacy keymaster-generation device.
///
/// Keys are held in a per-instance vault with real key material, so signing
/// operations produce signatures that verify against exported public keys.
/// Tests steer it through [`HalMock::fail_next`] and inspect it through the
/// call counters.
pub struct HalMock {
    level: HalSecurityLevel,
    state: Mutex<MockState>,
}

impl HalMock {
    /// New empty device reporting the given security level.
    pub fn new(level: HalSecurityLevel) -> Self {
        HalMock {
            level,
            state: Mutex::new(MockState::new()),
        }
    }

    /// Number of calls made to an entry point, including failed ones.
    pub fn calls(&self, op: MockOp) -> usize {
        self.state.lock().calls[op as usize]
    }

    /// Queues a failure for the next call to an entry point. Multiple queued
    /// failures apply in order.
    pub fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Caps how much input the next `update` call consumes.
    pub fn limit_next_update(&self, max_consumed: usize) {
        self.state.lock().update_limit = Some(max_consumed);
    }

    /// Number of operations the device currently tracks.
    pub fn active_operations(&self) -> usize {
        self.state.lock().ops.len()
    }

    /// Number of keys the vault currently holds.
    pub fn key_count(&self) -> usize {
        self.state.lock().keys.len()
    }
}

impl HalDevice for HalMock {
    fn hardware_info(&self) -> HalResult<HalHardwareInfo> {
        let mut state = self.state.lock();
        if state.enter(MockOp::HardwareInfo)?.is_some() {
            return Err(HalError::Unavailable);
        }
        Ok(HalHardwareInfo {
            security_level: self.level,
            name: "kmbridge-mock".to_string(),
            author: "kmbridge".to_string(),
        })
    }

    fn add_rng_entropy(&self, data: &[u8]) -> HalResult<HalErrorCode> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::AddRngEntropy)? {
            return Ok(code);
        }
        if data.len() > MAX_ENTROPY_LEN {
            return Ok(HalErrorCode::InvalidInputLength);
        }
        Ok(HalErrorCode::Ok)
    }

    fn generate_key(&self, params: &[HalKeyParam]) -> HalResult<HalKeyCreationResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::GenerateKey)? {
            return Ok(HalKeyCreationResp::failed(code));
        }
        let Some(algorithm) = find_int(params, HalTag::Algorithm).and_then(HalAlgorithm::from_repr)
        else {
            return Ok(HalKeyCreationResp::failed(HalErrorCode::UnsupportedAlgorithm));
        };
        let material = match generate_material(algorithm, params) {
            Ok(material) => material,
            Err(code) => return Ok(HalKeyCreationResp::failed(code)),
        };
        Ok(state.insert_key(algorithm, material, params, HalKeyOrigin::Generated, self.level))
    }

    fn import_key(
        &self,
        params: &[HalKeyParam],
        format: HalKeyFormat,
        key_data: &[u8],
    ) -> HalResult<HalKeyCreationResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::ImportKey)? {
            return Ok(HalKeyCreationResp::failed(code));
        }
        match imported_material(params, format, key_data) {
            Ok((algorithm, material)) => Ok(state.insert_key(
                algorithm,
                material,
                params,
                HalKeyOrigin::Imported,
                self.level,
            )),
            Err(code) => Ok(HalKeyCreationResp::failed(code)),
        }
    }

    fn import_wrapped_key(
        &self,
        wrapped_data: &[u8],
        wrapping_key_blob: &[u8],
        masking_key: &[u8],
        unwrap_params: &[HalKeyParam],
        _password_sid: i64,
        _biometric_sid: i64,
    ) -> HalResult<HalKeyCreationResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::ImportWrappedKey)? {
            return Ok(HalKeyCreationResp::failed(code));
        }
        let wrapping_present = decode_blob(wrapping_key_blob)
            .map(|id| state.keys.contains_key(&id))
            .unwrap_or(false);
        if !wrapping_present {
            return Ok(HalKeyCreationResp::failed(HalErrorCode::InvalidKeyBlob));
        }
        if masking_key.is_empty() {
            return Ok(HalKeyCreationResp::failed(HalErrorCode::InvalidArgument));
        }
        let unwrapped: Vec<u8> = wrapped_data
            .iter()
            .zip(masking_key.iter().cycle())
            .map(|(wrapped, mask)| wrapped ^ mask)
            .collect();
        let Some(algorithm) =
            find_int(unwrap_params, HalTag::Algorithm).and_then(HalAlgorithm::from_repr)
        else {
            return Ok(HalKeyCreationResp::failed(HalErrorCode::UnsupportedAlgorithm));
        };
        let material = if algorithm.is_asymmetric() {
            let key = match private_key_from_pkcs8(&unwrapped) {
                Ok(key) => key,
                Err(_) => return Ok(HalKeyCreationResp::failed(HalErrorCode::InvalidArgument)),
            };
            match private_key_to_pkcs8(&key) {
                Ok(der) => der,
                Err(_) => return Ok(HalKeyCreationResp::failed(HalErrorCode::UnknownError)),
            }
        } else {
            unwrapped
        };
        Ok(state.insert_key(
            algorithm,
            material,
            unwrap_params,
            HalKeyOrigin::SecurelyImported,
            self.level,
        ))
    }

    fn upgrade_key(&self, key_blob: &[u8], _params: &[HalKeyParam]) -> HalResult<HalUpgradeResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::UpgradeKey)? {
            return Ok(HalUpgradeResp::failed(code));
        }
        let Some(key_id) = decode_blob(key_blob) else {
            return Ok(HalUpgradeResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        let Some(record) = state.keys.remove(&key_id) else {
            return Ok(HalUpgradeResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        let new_id = state.next_key_id;
        state.next_key_id += 1;
        state.keys.insert(new_id, record);
        tracing::debug!(key_id, new_id, "key blob reissued");
        Ok(HalUpgradeResp {
            error: HalErrorCode::Ok,
            key_blob: encode_blob(new_id),
        })
    }

    fn delete_key(&self, key_blob: &[u8]) -> HalResult<HalErrorCode> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::DeleteKey)? {
            return Ok(code);
        }
        let Some(key_id) = decode_blob(key_blob) else {
            return Ok(HalErrorCode::InvalidKeyBlob);
        };
        // Deleting an already-absent key is success, same as real devices.
        state.keys.remove(&key_id);
        Ok(HalErrorCode::Ok)
    }

    fn delete_all_keys(&self) -> HalResult<HalErrorCode> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::DeleteAllKeys)? {
            return Ok(code);
        }
        state.keys.clear();
        Ok(HalErrorCode::Ok)
    }

    fn begin(
        &self,
        purpose: HalKeyPurpose,
        key_blob: &[u8],
        params: &[HalKeyParam],
        auth_token: &HalAuthToken,
    ) -> HalResult<HalBeginResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::Begin)? {
            return Ok(HalBeginResp::failed(code));
        }
        let Some(key_id) = decode_blob(key_blob) else {
            return Ok(HalBeginResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        let (digest, padding) = operation_selections(params);
        let kind = {
            let Some(record) = state.keys.get(&key_id) else {
                return Ok(HalBeginResp::failed(HalErrorCode::InvalidKeyBlob));
            };
            let app_id = find_blob(params, HalTag::ApplicationId).unwrap_or(&[]);
            let app_data = find_blob(params, HalTag::ApplicationData).unwrap_or(&[]);
            if !record.binding_matches(app_id, app_data) {
                return Ok(HalBeginResp::failed(HalErrorCode::InvalidKeyBlob));
            }
            let allowed = record.purposes();
            if !allowed.is_empty() && !allowed.contains(&purpose) {
                return Ok(HalBeginResp::failed(HalErrorCode::IncompatiblePurpose));
            }
            if !record.no_auth_required() && auth_token.mac.is_empty() {
                return Ok(HalBeginResp::failed(HalErrorCode::KeyUserNotAuthenticated));
            }
            match (record.algorithm.is_asymmetric(), purpose) {
                (true, HalKeyPurpose::Sign) | (true, HalKeyPurpose::Verify) => {
                    if digest.and_then(hash_algorithm_for).is_none() {
                        return Ok(HalBeginResp::failed(HalErrorCode::UnsupportedDigest));
                    }
                    if record.algorithm == HalAlgorithm::Rsa
                        && !matches!(
                            padding,
                            Some(HalPadding::RsaPss) | Some(HalPadding::RsaPkcs115Sign)
                        )
                    {
                        return Ok(HalBeginResp::failed(HalErrorCode::UnsupportedPaddingMode));
                    }
                    if purpose == HalKeyPurpose::Sign {
                        OpKind::Sign
                    } else {
                        OpKind::Verify
                    }
                }
                (false, HalKeyPurpose::Encrypt) | (false, HalKeyPurpose::Decrypt) => OpKind::Stream,
                _ => return Ok(HalBeginResp::failed(HalErrorCode::UnsupportedPurpose)),
            }
        };
        let handle = state.next_handle;
        state.next_handle += 1;
        state.ops.insert(
            handle,
            OpState {
                key_id,
                kind,
                digest,
                padding,
                buffer: Vec::new(),
            },
        );
        tracing::debug!(handle, ?purpose, "operation started");
        Ok(HalBeginResp {
            error: HalErrorCode::Ok,
            params: Vec::new(),
            handle,
        })
    }

    fn update(
        &self,
        handle: u64,
        _params: &[HalKeyParam],
        input: &[u8],
        _auth_token: &HalAuthToken,
        _verification_token: &HalVerificationToken,
    ) -> HalResult<HalUpdateResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::Update)? {
            state.ops.remove(&handle);
            return Ok(HalUpdateResp::failed(code));
        }
        if !state.ops.contains_key(&handle) {
            return Ok(HalUpdateResp::failed(HalErrorCode::InvalidOperationHandle));
        }
        let limit = state.update_limit.take();
        let consumed = limit.map_or(input.len(), |max| max.min(input.len()));
        let Some(op) = state.ops.get_mut(&handle) else {
            return Ok(HalUpdateResp::failed(HalErrorCode::InvalidOperationHandle));
        };
        let output = match op.kind {
            OpKind::Sign | OpKind::Verify => {
                op.buffer.extend_from_slice(&input[..consumed]);
                Vec::new()
            }
            OpKind::Stream => input[..consumed].to_vec(),
        };
        Ok(HalUpdateResp {
            error: HalErrorCode::Ok,
            consumed: consumed as u32,
            params: Vec::new(),
            output,
        })
    }

    fn finish(
        &self,
        handle: u64,
        _params: &[HalKeyParam],
        input: &[u8],
        signature: &[u8],
        _auth_token: &HalAuthToken,
        _verification_token: &HalVerificationToken,
    ) -> HalResult<HalFinishResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::Finish)? {
            state.ops.remove(&handle);
            return Ok(HalFinishResp::failed(code));
        }
        // The operation dies with this call no matter how it ends.
        let Some(mut op) = state.ops.remove(&handle) else {
            return Ok(HalFinishResp::failed(HalErrorCode::InvalidOperationHandle));
        };
        let output = match op.kind {
            OpKind::Stream => input.to_vec(),
            OpKind::Sign | OpKind::Verify => {
                op.buffer.extend_from_slice(input);
                let Some(record) = state.keys.get(&op.key_id) else {
                    return Ok(HalFinishResp::failed(HalErrorCode::InvalidKeyBlob));
                };
                match asymmetric_finish(&op, record, signature) {
                    Ok(output) => output,
                    Err(code) => return Ok(HalFinishResp::failed(code)),
                }
            }
        };
        tracing::debug!(handle, "operation finished");
        Ok(HalFinishResp {
            error: HalErrorCode::Ok,
            params: Vec::new(),
            output,
        })
    }

    fn abort(&self, handle: u64) -> HalResult<HalErrorCode> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::Abort)? {
            state.ops.remove(&handle);
            return Ok(code);
        }
        match state.ops.remove(&handle) {
            Some(_) => Ok(HalErrorCode::Ok),
            None => Ok(HalErrorCode::InvalidOperationHandle),
        }
    }

    fn export_key(
        &self,
        format: HalKeyFormat,
        key_blob: &[u8],
        app_id: &[u8],
        app_data: &[u8],
    ) -> HalResult<HalExportResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::ExportKey)? {
            return Ok(HalExportResp::failed(code));
        }
        if format != HalKeyFormat::X509 {
            return Ok(HalExportResp::failed(HalErrorCode::UnsupportedKeyFormat));
        }
        let Some(key_id) = decode_blob(key_blob) else {
            return Ok(HalExportResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        let Some(record) = state.keys.get(&key_id) else {
            return Ok(HalExportResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        if !record.binding_matches(app_id, app_data) {
            return Ok(HalExportResp::failed(HalErrorCode::InvalidKeyBlob));
        }
        if !record.algorithm.is_asymmetric() {
            return Ok(HalExportResp::failed(HalErrorCode::UnsupportedKeyFormat));
        }
        let key = match private_key_from_pkcs8(&record.material) {
            Ok(key) => key,
            Err(_) => return Ok(HalExportResp::failed(HalErrorCode::UnknownError)),
        };
        match public_key_der(&key) {
            Ok(key_material) => Ok(HalExportResp {
                error: HalErrorCode::Ok,
                key_material,
            }),
            Err(_) => Ok(HalExportResp::failed(HalErrorCode::UnknownError)),
        }
    }

    fn attest_key(&self, key_blob: &[u8], params: &[HalKeyParam]) -> HalResult<HalAttestResp> {
        let mut state = self.state.lock();
        if let Some(code) = state.enter(MockOp::AttestKey)? {
            return Ok(HalAttestResp::failed(code));
        }
        let Some(key_id) = decode_blob(key_blob) else {
            return Ok(HalAttestResp::failed(HalErrorCode::InvalidKeyBlob));
        };
        let material = {
            let Some(record) = state.keys.get(&key_id) else {
                return Ok(HalAttestResp::failed(HalErrorCode::InvalidKeyBlob));
            };
            if find_blob(params, HalTag::AttestationChallenge).is_none() {
                return Ok(HalAttestResp::failed(
                    HalErrorCode::AttestationChallengeMissing,
                ));
            }
            if !record.algorithm.is_asymmetric() {
                return Ok(HalAttestResp::failed(HalErrorCode::IncompatibleAlgorithm));
            }
            record.material.clone()
        };
        if state.identity.is_none() {
            match AttestIdentity::generate() {
                Ok(identity) => state.identity = Some(identity),
                Err(attest_error) => {
                    tracing::error!(?attest_error);
                    return Ok(HalAttestResp::failed(HalErrorCode::UnknownError));
                }
            }
        }
        let subject_spki = match private_key_from_pkcs8(&material).and_then(|key| {
            public_key_der(&key)
        }) {
            Ok(spki) => spki,
            Err(_) => return Ok(HalAttestResp::failed(HalErrorCode::UnknownError)),
        };
        let Some(identity) = state.identity.as_ref() else {
            return Ok(HalAttestResp::failed(HalErrorCode::UnknownError));
        };
        match identity.issue_chain(key_id, &subject_spki) {
            Ok(cert_chain) => Ok(HalAttestResp {
                error: HalErrorCode::Ok,
                cert_chain,
            }),
            Err(attest_error) => {
                tracing::error!(?attest_error);
                Ok(HalAttestResp::failed(HalErrorCode::UnknownError))
            }
        }
    }
}

fn generate_material(
    algorithm: HalAlgorithm,
    params: &[HalKeyParam],
) -> Result<Vec<u8>, HalErrorCode> {
    match algorithm {
        HalAlgorithm::Rsa => {
            let bits = find_int(params, HalTag::KeySize).unwrap_or(2048);
            let exponent = find_long(params, HalTag::RsaPublicExponent).unwrap_or(65_537);
            let key = generate_rsa(bits, exponent).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })?;
            private_key_to_pkcs8(&key).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })
        }
        HalAlgorithm::Ec => {
            let curve = ec_curve_for(params)?;
            let key = generate_ecc(curve).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })?;
            private_key_to_pkcs8(&key).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })
        }
        HalAlgorithm::Aes | HalAlgorithm::TripleDes | HalAlgorithm::Hmac => {
            let Some(bits) = find_int(params, HalTag::KeySize) else {
                return Err(HalErrorCode::UnsupportedKeySize);
            };
            if bits == 0 || bits % 8 != 0 {
                return Err(HalErrorCode::UnsupportedKeySize);
            }
            random_bytes((bits / 8) as usize).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })
        }
    }
}

fn ec_curve_for(params: &[HalKeyParam]) -> Result<EccCurve, HalErrorCode> {
    if let Some(curve) = find_int(params, HalTag::EcCurve).and_then(HalEcCurve::from_repr) {
        return Ok(match curve {
            HalEcCurve::P224 => EccCurve::P224,
            HalEcCurve::P256 => EccCurve::P256,
            HalEcCurve::P384 => EccCurve::P384,
            HalEcCurve::P521 => EccCurve::P521,
        });
    }
    match find_int(params, HalTag::KeySize) {
        Some(224) => Ok(EccCurve::P224),
        Some(256) => Ok(EccCurve::P256),
        Some(384) => Ok(EccCurve::P384),
        Some(521) => Ok(EccCurve::P521),
        _ => Err(HalErrorCode::UnsupportedKeySize),
    }
}

fn imported_material(
    params: &[HalKeyParam],
    format: HalKeyFormat,
    key_data: &[u8],
) -> Result<(HalAlgorithm, Vec<u8>), HalErrorCode> {
    let declared = find_int(params, HalTag::Algorithm).and_then(HalAlgorithm::from_repr);
    match format {
        HalKeyFormat::Pkcs8 => {
            let key =
                private_key_from_pkcs8(key_data).map_err(|_| HalErrorCode::InvalidArgument)?;
            let algorithm = match key.id() {
                openssl::pkey::Id::RSA => HalAlgorithm::Rsa,
                openssl::pkey::Id::EC => HalAlgorithm::Ec,
                _ => return Err(HalErrorCode::UnsupportedKeyFormat),
            };
            if let Some(declared) = declared {
                if declared != algorithm {
                    return Err(HalErrorCode::ImportParameterMismatch);
                }
            }
            if let Some(bits) = find_int(params, HalTag::KeySize) {
                if key.bits() != bits {
                    return Err(HalErrorCode::ImportParameterMismatch);
                }
            }
            let material = private_key_to_pkcs8(&key).map_err(|crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            })?;
            Ok((algorithm, material))
        }
        HalKeyFormat::Raw => {
            let Some(algorithm) = declared else {
                return Err(HalErrorCode::UnsupportedAlgorithm);
            };
            if algorithm.is_asymmetric() {
                return Err(HalErrorCode::UnsupportedKeyFormat);
            }
            if let Some(bits) = find_int(params, HalTag::KeySize) {
                if bits as usize != key_data.len() * 8 {
                    return Err(HalErrorCode::ImportParameterMismatch);
                }
            }
            Ok((algorithm, key_data.to_vec()))
        }
        HalKeyFormat::X509 => Err(HalErrorCode::UnsupportedKeyFormat),
    }
}

fn hash_algorithm_for(digest: HalDigest) -> Option<HashAlgorithm> {
    match digest {
        HalDigest::Sha1 => Some(HashAlgorithm::Sha1),
        HalDigest::Sha224 => Some(HashAlgorithm::Sha224),
        HalDigest::Sha256 => Some(HashAlgorithm::Sha256),
        HalDigest::Sha384 => Some(HashAlgorithm::Sha384),
        HalDigest::Sha512 => Some(HashAlgorithm::Sha512),
        HalDigest::None | HalDigest::Md5 => None,
    }
}

fn asymmetric_finish(
    op: &OpState,
    record: &KeyRecord,
    signature: &[u8],
) -> Result<Vec<u8>, HalErrorCode> {
    let key = private_key_from_pkcs8(&record.material).map_err(|crypto_error| {
        tracing::error!(?crypto_error);
        HalErrorCode::UnknownError
    })?;
    let Some(hash_algorithm) = op.digest.and_then(hash_algorithm_for) else {
        return Err(HalErrorCode::UnsupportedDigest);
    };
    let padding = match (record.algorithm, op.padding) {
        (HalAlgorithm::Rsa, Some(HalPadding::RsaPss)) => Some(RsaPadding::Pss),
        (HalAlgorithm::Rsa, Some(HalPadding::RsaPkcs115Sign)) => Some(RsaPadding::Pkcs1_5),
        (HalAlgorithm::Rsa, _) => return Err(HalErrorCode::UnsupportedPaddingMode),
        (HalAlgorithm::Ec, _) => None,
        _ => return Err(HalErrorCode::IncompatibleAlgorithm),
    };
    let digest = hash(hash_algorithm, &op.buffer).map_err(|crypto_error| {
        tracing::error!(?crypto_error);
        HalErrorCode::UnknownError
    })?;
    match op.kind {
        OpKind::Sign => sign_digest(&key, hash_algorithm, &digest, padding).map_err(
            |crypto_error| {
                tracing::error!(?crypto_error);
                HalErrorCode::UnknownError
            },
        ),
        OpKind::Verify => {
            let verdict = verify_digest(&key, hash_algorithm, &digest, signature, padding);
            if matches!(verdict, Ok(true)) {
                Ok(Vec::new())
            } else {
                Err(HalErrorCode::VerificationFailed)
            }
        }
        OpKind::Stream => Err(HalErrorCode::UnknownError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use openssl::pkey::PKey;

    use kmbridge_crypto::generate_ecc_p256;
    use kmbridge_hal_types::HalParamValue;

    fn param_int(tag: HalTag, value: u32) -> HalKeyParam {
        HalKeyParam {
            tag,
            value: HalParamValue::Int(value),
        }
    }

    fn param_bool(tag: HalTag) -> HalKeyParam {
        HalKeyParam {
            tag,
            value: HalParamValue::Bool(true),
        }
    }

    fn param_blob(tag: HalTag, bytes: &[u8]) -> HalKeyParam {
        HalKeyParam {
            tag,
            value: HalParamValue::Blob(bytes.to_vec()),
        }
    }

    fn ec_sign_key_params() -> Vec<HalKeyParam> {
        vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Ec as u32),
            param_int(HalTag::EcCurve, HalEcCurve::P256 as u32),
            param_int(HalTag::Purpose, HalKeyPurpose::Sign as u32),
            param_int(HalTag::Purpose, HalKeyPurpose::Verify as u32),
            param_int(HalTag::Digest, HalDigest::Sha256 as u32),
            param_bool(HalTag::NoAuthRequired),
        ]
    }

    fn sign_op_params() -> Vec<HalKeyParam> {
        vec![param_int(HalTag::Digest, HalDigest::Sha256 as u32)]
    }

    fn no_token() -> HalAuthToken {
        HalAuthToken::default()
    }

    fn mock() -> HalMock {
        HalMock::new(HalSecurityLevel::TrustedEnvironment)
    }

    #[test]
    fn test_generate_sign_export_verify() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        assert!(created.error.is_ok());

        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert!(begun.error.is_ok());
        assert_eq!(device.active_operations(), 1);

        let message = b"the quick brown fox";
        let updated = device
            .update(
                begun.handle,
                &[],
                &message[..7],
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert!(updated.error.is_ok());
        assert_eq!(updated.consumed, 7);

        let finished = device
            .finish(
                begun.handle,
                &[],
                &message[7..],
                &[],
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert!(finished.error.is_ok());
        assert!(!finished.output.is_empty());
        assert_eq!(device.active_operations(), 0);

        let exported = device
            .export_key(HalKeyFormat::X509, &created.key_blob, &[], &[])
            .unwrap();
        assert!(exported.error.is_ok());
        let public = PKey::public_key_from_der(&exported.key_material).unwrap();
        let digest = hash(HashAlgorithm::Sha256, message).unwrap();
        assert!(verify_digest(&public, HashAlgorithm::Sha256, &digest, &finished.output, None)
            .unwrap());
    }

    #[test]
    fn test_verify_purpose_round_trip() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let message = b"verified message";

        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        let signature = device
            .finish(
                begun.handle,
                &[],
                message,
                &[],
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap()
            .output;

        let verifying = device
            .begin(
                HalKeyPurpose::Verify,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        let verified = device
            .finish(
                verifying.handle,
                &[],
                message,
                &signature,
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert!(verified.error.is_ok());

        let failing = device
            .begin(
                HalKeyPurpose::Verify,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        let mismatch = device
            .finish(
                failing.handle,
                &[],
                b"different message",
                &signature,
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(mismatch.error, HalErrorCode::VerificationFailed);
        assert_eq!(device.active_operations(), 0);
    }

    #[test]
    fn test_rsa_sign_requires_sign_padding() {
        let device = mock();
        let params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Rsa as u32),
            param_int(HalTag::KeySize, 2048),
            param_int(HalTag::Purpose, HalKeyPurpose::Sign as u32),
            param_bool(HalTag::NoAuthRequired),
        ];
        let created = device.generate_key(&params).unwrap();
        assert!(created.error.is_ok());

        let no_padding = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert_eq!(no_padding.error, HalErrorCode::UnsupportedPaddingMode);

        let mut op_params = sign_op_params();
        op_params.push(param_int(HalTag::Padding, HalPadding::RsaPss as u32));
        let begun = device
            .begin(HalKeyPurpose::Sign, &created.key_blob, &op_params, &no_token())
            .unwrap();
        assert!(begun.error.is_ok());
        assert_eq!(device.abort(begun.handle).unwrap(), HalErrorCode::Ok);
        assert_eq!(device.active_operations(), 0);
        assert_eq!(
            device.abort(begun.handle).unwrap(),
            HalErrorCode::InvalidOperationHandle
        );
    }

    #[test]
    fn test_injected_transport_failure_counts_the_call() {
        let device = mock();
        device.fail_next(MockOp::Begin, MockFailure::Transport);
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let result = device.begin(
            HalKeyPurpose::Sign,
            &created.key_blob,
            &sign_op_params(),
            &no_token(),
        );
        assert!(result.is_err());
        assert_eq!(device.calls(MockOp::Begin), 1);

        // The queue is drained; the next call goes through.
        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert!(begun.error.is_ok());
        assert_eq!(device.calls(MockOp::Begin), 2);
    }

    #[test]
    fn test_injected_code_on_update_removes_the_operation() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        device.fail_next(MockOp::Update, MockFailure::Code(HalErrorCode::UnknownError));
        let updated = device
            .update(
                begun.handle,
                &[],
                b"data",
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(updated.error, HalErrorCode::UnknownError);
        assert_eq!(device.active_operations(), 0);
    }

    #[test]
    fn test_update_partial_consume() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        device.limit_next_update(3);
        let first = device
            .update(
                begun.handle,
                &[],
                b"abcdefgh",
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(first.consumed, 3);
        let second = device
            .update(
                begun.handle,
                &[],
                b"defgh",
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(second.consumed, 5);
    }

    #[test]
    fn test_app_binding_gates_export_and_begin() {
        let device = mock();
        let mut params = ec_sign_key_params();
        params.push(param_blob(HalTag::ApplicationId, b"owner"));
        let created = device.generate_key(&params).unwrap();

        let denied = device
            .export_key(HalKeyFormat::X509, &created.key_blob, &[], &[])
            .unwrap();
        assert_eq!(denied.error, HalErrorCode::InvalidKeyBlob);

        let granted = device
            .export_key(HalKeyFormat::X509, &created.key_blob, b"owner", &[])
            .unwrap();
        assert!(granted.error.is_ok());

        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert_eq!(begun.error, HalErrorCode::InvalidKeyBlob);
    }

    #[test]
    fn test_entropy_length_limit() {
        let device = mock();
        assert!(device
            .add_rng_entropy(&vec![0u8; MAX_ENTROPY_LEN])
            .unwrap()
            .is_ok());
        assert_eq!(
            device.add_rng_entropy(&vec![0u8; MAX_ENTROPY_LEN + 1]).unwrap(),
            HalErrorCode::InvalidInputLength
        );
    }

    #[test]
    fn test_import_pkcs8_round_trip() {
        let device = mock();
        let key = generate_ecc_p256().unwrap();
        let pkcs8 = private_key_to_pkcs8(&key).unwrap();
        let expected_spki = public_key_der(&key).unwrap();

        let imported = device
            .import_key(&ec_sign_key_params(), HalKeyFormat::Pkcs8, &pkcs8)
            .unwrap();
        assert!(imported.error.is_ok());
        let origin = imported
            .characteristics
            .hardware_enforced
            .iter()
            .find(|param| param.tag == HalTag::Origin)
            .and_then(|param| param.as_int());
        assert_eq!(origin, Some(HalKeyOrigin::Imported as u32));

        let exported = device
            .export_key(HalKeyFormat::X509, &imported.key_blob, &[], &[])
            .unwrap();
        assert_eq!(exported.key_material, expected_spki);
    }

    #[test]
    fn test_import_raw_checks_declared_size() {
        let device = mock();
        let params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Aes as u32),
            param_int(HalTag::KeySize, 256),
            param_bool(HalTag::NoAuthRequired),
        ];
        let mismatch = device
            .import_key(&params, HalKeyFormat::Raw, &[0u8; 16])
            .unwrap();
        assert_eq!(mismatch.error, HalErrorCode::ImportParameterMismatch);

        let imported = device
            .import_key(&params, HalKeyFormat::Raw, &[0u8; 32])
            .unwrap();
        assert!(imported.error.is_ok());
        assert_eq!(device.key_count(), 1);
    }

    #[test]
    fn test_wrapped_import_unmasks_material() {
        let device = mock();
        let wrapping_params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Aes as u32),
            param_int(HalTag::KeySize, 128),
            param_bool(HalTag::NoAuthRequired),
        ];
        let wrapping = device
            .import_key(&wrapping_params, HalKeyFormat::Raw, &[7u8; 16])
            .unwrap();
        assert!(wrapping.error.is_ok());

        let inner = [0x5au8; 32];
        let mask = [0x33u8; 8];
        let wrapped: Vec<u8> = inner
            .iter()
            .zip(mask.iter().cycle())
            .map(|(byte, mask)| byte ^ mask)
            .collect();
        let unwrap_params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Aes as u32),
            param_bool(HalTag::NoAuthRequired),
        ];
        let imported = device
            .import_wrapped_key(&wrapped, &wrapping.key_blob, &mask, &unwrap_params, 0, 0)
            .unwrap();
        assert!(imported.error.is_ok());
        assert_eq!(device.key_count(), 2);
        let origin = imported
            .characteristics
            .hardware_enforced
            .iter()
            .find(|param| param.tag == HalTag::Origin)
            .and_then(|param| param.as_int());
        assert_eq!(origin, Some(HalKeyOrigin::SecurelyImported as u32));
    }

    #[test]
    fn test_attest_chain_shape_and_challenge() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();

        let missing = device.attest_key(&created.key_blob, &[]).unwrap();
        assert_eq!(missing.error, HalErrorCode::AttestationChallengeMissing);

        let attested = device
            .attest_key(
                &created.key_blob,
                &[param_blob(HalTag::AttestationChallenge, b"challenge")],
            )
            .unwrap();
        assert!(attested.error.is_ok());
        assert_eq!(attested.cert_chain.len(), 3);

        let exported = device
            .export_key(HalKeyFormat::X509, &created.key_blob, &[], &[])
            .unwrap();
        let leaf = openssl::x509::X509::from_der(&attested.cert_chain[0]).unwrap();
        let leaf_spki = leaf.public_key().unwrap().public_key_to_der().unwrap();
        assert_eq!(leaf_spki, exported.key_material);
    }

    #[test]
    fn test_upgrade_reissues_blob() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let upgraded = device.upgrade_key(&created.key_blob, &[]).unwrap();
        assert!(upgraded.error.is_ok());
        assert_ne!(upgraded.key_blob, created.key_blob);

        let old = device
            .export_key(HalKeyFormat::X509, &created.key_blob, &[], &[])
            .unwrap();
        assert_eq!(old.error, HalErrorCode::InvalidKeyBlob);
        let new = device
            .export_key(HalKeyFormat::X509, &upgraded.key_blob, &[], &[])
            .unwrap();
        assert!(new.error.is_ok());
    }

    #[test]
    fn test_purpose_and_auth_policy() {
        let device = mock();
        let aes_params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Aes as u32),
            param_int(HalTag::KeySize, 128),
            param_int(HalTag::Purpose, HalKeyPurpose::Encrypt as u32),
            param_bool(HalTag::NoAuthRequired),
        ];
        let aes = device.generate_key(&aes_params).unwrap();
        let wrong_purpose = device
            .begin(HalKeyPurpose::Sign, &aes.key_blob, &[], &no_token())
            .unwrap();
        assert_eq!(wrong_purpose.error, HalErrorCode::IncompatiblePurpose);

        let guarded_params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Ec as u32),
            param_int(HalTag::EcCurve, HalEcCurve::P256 as u32),
            param_int(HalTag::Purpose, HalKeyPurpose::Sign as u32),
            param_int(HalTag::Digest, HalDigest::Sha256 as u32),
        ];
        let guarded = device.generate_key(&guarded_params).unwrap();
        let unauthenticated = device
            .begin(
                HalKeyPurpose::Sign,
                &guarded.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert_eq!(unauthenticated.error, HalErrorCode::KeyUserNotAuthenticated);

        let token = HalAuthToken {
            mac: vec![1, 2, 3],
            ..HalAuthToken::default()
        };
        let authenticated = device
            .begin(
                HalKeyPurpose::Sign,
                &guarded.key_blob,
                &sign_op_params(),
                &token,
            )
            .unwrap();
        assert!(authenticated.error.is_ok());
    }

    #[test]
    fn test_finish_after_delete_still_frees_the_operation() {
        let device = mock();
        let created = device.generate_key(&ec_sign_key_params()).unwrap();
        let begun = device
            .begin(
                HalKeyPurpose::Sign,
                &created.key_blob,
                &sign_op_params(),
                &no_token(),
            )
            .unwrap();
        assert!(device.delete_key(&created.key_blob).unwrap().is_ok());
        let finished = device
            .finish(
                begun.handle,
                &[],
                b"data",
                &[],
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(finished.error, HalErrorCode::InvalidKeyBlob);
        assert_eq!(device.active_operations(), 0);
    }

    #[test]
    fn test_stream_operation_echoes() {
        let device = mock();
        let params = vec![
            param_int(HalTag::Algorithm, HalAlgorithm::Aes as u32),
            param_int(HalTag::KeySize, 128),
            param_bool(HalTag::NoAuthRequired),
        ];
        let created = device.generate_key(&params).unwrap();
        let begun = device
            .begin(HalKeyPurpose::Encrypt, &created.key_blob, &[], &no_token())
            .unwrap();
        assert!(begun.error.is_ok());
        let updated = device
            .update(
                begun.handle,
                &[],
                b"abc",
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(updated.output, b"abc");
        let finished = device
            .finish(
                begun.handle,
                &[],
                b"def",
                &[],
                &no_token(),
                &HalVerificationToken::default(),
            )
            .unwrap();
        assert_eq!(finished.output, b"def");
    }

    #[test]
    fn test_malformed_blob_rejected_everywhere() {
        let device = mock();
        assert_eq!(
            device.delete_key(b"garbage").unwrap(),
            HalErrorCode::InvalidKeyBlob
        );
        let begun = device
            .begin(HalKeyPurpose::Sign, b"garbage", &[], &no_token())
            .unwrap();
        assert_eq!(begun.error, HalErrorCode::InvalidKeyBlob);
        let exported = device
            .export_key(HalKeyFormat::X509, b"garbage", &[], &[])
            .unwrap();
        assert_eq!(exported.error, HalErrorCode::InvalidKeyBlob);
    }
}
