// Copyright (C) Microsoft Corporation. All rights reserved.

//! Per-level device adapter.
//!
//! A [`Device`] wraps one legacy HAL instance and exposes the modern key
//! lifecycle over it. Key creation runs the certificate synthesizer after
//! the legacy call, and operations are gated through a local slot pool so a
//! saturated device is refused here instead of on the wire.

use std::sync::Arc;

use kmbridge_hal_interface::HalDevice;
use kmbridge_hal_types::HalKeyCreationResp;

use crate::cert;
use crate::error::check_hal_code;
use crate::operation::BeginResult;
use crate::operation::Operation;
use crate::slots::SlotPool;
use crate::types::convert::auth_token_to_hal;
use crate::types::convert::characteristics_from_hal;
use crate::types::convert::format_to_hal;
use crate::types::convert::key_params_from_hal;
use crate::types::convert::key_params_to_hal;
use crate::types::convert::purpose_to_hal;
use crate::types::convert::security_level_from_hal;
use crate::types::ErrorCode;
use crate::types::HardwareAuthToken;
use crate::types::HardwareInfo;
use crate::types::KeyCreationResult;
use crate::types::KeyFormat;
use crate::types::KeyParam;
use crate::types::KeyPurpose;
use crate::types::SecurityLevel;
use crate::types::VerificationToken;
use crate::ApiError;
use crate::ApiResult;

/// Operation slots granted to a Strongbox device.
pub const STRONGBOX_OPERATION_SLOTS: usize = 3;

/// Operation slots granted to devices at every other security level.
pub const DEFAULT_OPERATION_SLOTS: usize = 15;

/// Modern face of one legacy device.
pub struct Device {
    hal: Arc<dyn HalDevice>,
    security_level: SecurityLevel,
    slots: Arc<SlotPool>,
}

impl Device {
    /// Wraps a legacy device, sizing the slot pool by security level.
    pub fn new(hal: Arc<dyn HalDevice>, security_level: SecurityLevel) -> Self {
        let capacity = match security_level {
            SecurityLevel::Strongbox => STRONGBOX_OPERATION_SLOTS,
            _ => DEFAULT_OPERATION_SLOTS,
        };
        Self {
            hal,
            security_level,
            slots: SlotPool::new(capacity),
        }
    }

    /// Security level this device serves.
    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Replaces the operation budget. Bring-up and test hook.
    pub fn set_slot_capacity(&self, capacity: usize) {
        self.slots.set_capacity(capacity);
    }

    /// Operation slots currently free.
    pub fn free_slots(&self) -> usize {
        self.slots.free()
    }

    pub(crate) fn hal(&self) -> &Arc<dyn HalDevice> {
        &self.hal
    }

    /// Describes the wrapped device.
    pub fn hardware_info(&self) -> ApiResult<HardwareInfo> {
        let info = self.hal.hardware_info().map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during hardware_info");
            ApiError::SystemError
        })?;
        Ok(HardwareInfo {
            security_level: security_level_from_hal(info.security_level),
            name: info.name,
            author: info.author,
        })
    }

    /// Mixes caller-provided entropy into the device RNG.
    pub fn add_rng_entropy(&self, data: &[u8]) -> ApiResult<()> {
        let code = self.hal.add_rng_entropy(data).map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during add_rng_entropy");
            ApiError::SystemError
        })?;
        check_hal_code(code)
    }

    /// Creates a key and synthesizes its certificate chain.
    #[tracing::instrument(skip_all, fields(level = ?self.security_level))]
    pub fn generate_key(&self, params: &[KeyParam]) -> ApiResult<KeyCreationResult> {
        let resp = self
            .hal
            .generate_key(&key_params_to_hal(params))
            .map_err(|transport_error| {
                tracing::error!(?transport_error, "transport failure during generate_key");
                ApiError::SystemError
            })?;
        check_hal_code(resp.error)?;
        self.certify_creation(params, resp)
    }

    /// Imports caller-provided key material and synthesizes certificates.
    #[tracing::instrument(skip_all, fields(level = ?self.security_level))]
    pub fn import_key(
        &self,
        params: &[KeyParam],
        format: KeyFormat,
        key_data: &[u8],
    ) -> ApiResult<KeyCreationResult> {
        let resp = self
            .hal
            .import_key(&key_params_to_hal(params), format_to_hal(format), key_data)
            .map_err(|transport_error| {
                tracing::error!(?transport_error, "transport failure during import_key");
                ApiError::SystemError
            })?;
        check_hal_code(resp.error)?;
        self.certify_creation(params, resp)
    }

    /// Imports key material wrapped by another key on the device.
    ///
    /// No certificates are synthesized for wrapped imports.
    #[tracing::instrument(skip_all, fields(level = ?self.security_level))]
    pub fn import_wrapped_key(
        &self,
        wrapped_data: &[u8],
        wrapping_key_blob: &[u8],
        masking_key: &[u8],
        unwrap_params: &[KeyParam],
        password_sid: i64,
        biometric_sid: i64,
    ) -> ApiResult<KeyCreationResult> {
        let resp = self
            .hal
            .import_wrapped_key(
                wrapped_data,
                wrapping_key_blob,
                masking_key,
                &key_params_to_hal(unwrap_params),
                password_sid,
                biometric_sid,
            )
            .map_err(|transport_error| {
                tracing::error!(?transport_error, "transport failure during import_wrapped_key");
                ApiError::SystemError
            })?;
        check_hal_code(resp.error)?;
        Ok(KeyCreationResult {
            key_blob: resp.key_blob,
            key_characteristics: characteristics_from_hal(
                self.security_level,
                &resp.characteristics,
            ),
            certificate_chain: Vec::new(),
        })
    }

    /// Re-encrypts a key blob under the current device state.
    pub fn upgrade_key(&self, key_blob: &[u8], params: &[KeyParam]) -> ApiResult<Vec<u8>> {
        let resp = self
            .hal
            .upgrade_key(key_blob, &key_params_to_hal(params))
            .map_err(|transport_error| {
                tracing::error!(?transport_error, "transport failure during upgrade_key");
                ApiError::SystemError
            })?;
        check_hal_code(resp.error)?;
        Ok(resp.key_blob)
    }

    /// Destroys the key named by the blob.
    pub fn delete_key(&self, key_blob: &[u8]) -> ApiResult<()> {
        let code = self.hal.delete_key(key_blob).map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during delete_key");
            ApiError::SystemError
        })?;
        check_hal_code(code)
    }

    /// Destroys every key on the device.
    pub fn delete_all_keys(&self) -> ApiResult<()> {
        let code = self.hal.delete_all_keys().map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during delete_all_keys");
            ApiError::SystemError
        })?;
        check_hal_code(code)
    }

    /// Starts an operation on a key.
    ///
    /// A slot is claimed before the device is asked anything; exhaustion is
    /// answered locally with `TooManyOperations`. The slot travels with the
    /// returned [`Operation`] and is released on every failure path.
    #[tracing::instrument(skip_all, fields(level = ?self.security_level, purpose = ?purpose))]
    pub fn begin(
        &self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        params: &[KeyParam],
        auth_token: Option<&HardwareAuthToken>,
    ) -> ApiResult<BeginResult> {
        let hal_purpose =
            purpose_to_hal(purpose).ok_or(ApiError::Km(ErrorCode::UnsupportedPurpose))?;
        let slot = self
            .slots
            .claim()
            .ok_or(ApiError::Km(ErrorCode::TooManyOperations))?;
        let resp = self
            .hal
            .begin(
                hal_purpose,
                key_blob,
                &key_params_to_hal(params),
                &auth_token_to_hal(auth_token),
            )
            .map_err(|transport_error| {
                tracing::error!(?transport_error, "transport failure during begin");
                ApiError::SystemError
            })?;
        check_hal_code(resp.error)?;
        Ok(BeginResult {
            challenge: resp.handle as i64,
            params: key_params_from_hal(&resp.params),
            operation: Operation::new(Arc::clone(&self.hal), resp.handle, slot),
        })
    }

    /// Not provided by the legacy generation.
    pub fn verify_authorization(
        &self,
        _challenge: i64,
        _auth_token: Option<&HardwareAuthToken>,
    ) -> ApiResult<VerificationToken> {
        Err(ApiError::Km(ErrorCode::Unimplemented))
    }

    /// Not provided by the legacy generation.
    pub fn destroy_attestation_ids(&self) -> ApiResult<()> {
        Err(ApiError::Km(ErrorCode::Unimplemented))
    }

    fn certify_creation(
        &self,
        params: &[KeyParam],
        resp: HalKeyCreationResp,
    ) -> ApiResult<KeyCreationResult> {
        let key_characteristics =
            characteristics_from_hal(self.security_level, &resp.characteristics);
        match cert::certificate_chain_for(self, params, &resp.key_blob) {
            Ok(certificate_chain) => Ok(KeyCreationResult {
                key_blob: resp.key_blob,
                key_characteristics,
                certificate_chain,
            }),
            Err(synthesis_error) => {
                // A key without its certificates is unusable to callers.
                match self.hal.delete_key(&resp.key_blob) {
                    Ok(code) if code.is_ok() => {}
                    Ok(code) => {
                        tracing::warn!(?code, "device kept the uncertified key");
                    }
                    Err(transport_error) => {
                        tracing::warn!(?transport_error, "could not delete the uncertified key");
                    }
                }
                Err(synthesis_error)
            }
        }
    }
}
