// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! Contract of a legacy keymaster-generation device.
//!
//! [`HalDevice`] is the seam between the adapter and whatever actually backs
//! a security level: a hardware driver, a software keymaster, or the mock in
//! `kmbridge_hal_mock`. Every method is synchronous and returns
//! [`HalResult`], which only models transport failure; the device's own
//! verdict on the operation travels inside the response payload. Callers and
//! implementations must keep those two failure planes apart.

mod error;

pub use error::HalError;
pub use error::HalResult;

use kmbridge_hal_types::HalAttestResp;
use kmbridge_hal_types::HalAuthToken;
use kmbridge_hal_types::HalBeginResp;
use kmbridge_hal_types::HalErrorCode;
use kmbridge_hal_types::HalExportResp;
use kmbridge_hal_types::HalFinishResp;
use kmbridge_hal_types::HalHardwareInfo;
use kmbridge_hal_types::HalKeyCreationResp;
use kmbridge_hal_types::HalKeyFormat;
use kmbridge_hal_types::HalKeyParam;
use kmbridge_hal_types::HalKeyPurpose;
use kmbridge_hal_types::HalUpdateResp;
use kmbridge_hal_types::HalUpgradeResp;
use kmbridge_hal_types::HalVerificationToken;

/// One legacy device instance, serving a single security level.
///
/// Implementations are shared across threads behind an `Arc` and must accept
/// concurrent calls; the adapter performs no serialization of its own beyond
/// operation-slot accounting.
pub trait HalDevice: Send + Sync {
    /// Describes the device: its security level, name and author.
    fn hardware_info(&self) -> HalResult<HalHardwareInfo>;

    /// Mixes caller-provided entropy into the device RNG.
    fn add_rng_entropy(&self, data: &[u8]) -> HalResult<HalErrorCode>;

    /// Creates a key from the given parameters.
    fn generate_key(&self, params: &[HalKeyParam]) -> HalResult<HalKeyCreationResp>;

    /// Imports caller-provided key material.
    fn import_key(
        &self,
        params: &[HalKeyParam],
        format: HalKeyFormat,
        key_data: &[u8],
    ) -> HalResult<HalKeyCreationResp>;

    /// Imports key material wrapped by another key held on the device.
    fn import_wrapped_key(
        &self,
        wrapped_data: &[u8],
        wrapping_key_blob: &[u8],
        masking_key: &[u8],
        unwrap_params: &[HalKeyParam],
        password_sid: i64,
        biometric_sid: i64,
    ) -> HalResult<HalKeyCreationResp>;

    /// Reissues a key blob under the device's current versioning.
    ///
    /// An empty blob in the response means the key needed no upgrade.
    fn upgrade_key(&self, key_blob: &[u8], params: &[HalKeyParam]) -> HalResult<HalUpgradeResp>;

    /// Destroys the key named by the blob.
    fn delete_key(&self, key_blob: &[u8]) -> HalResult<HalErrorCode>;

    /// Destroys all keys held by the device.
    fn delete_all_keys(&self) -> HalResult<HalErrorCode>;

    /// Starts a cryptographic operation on a key.
    ///
    /// On success the response handle names the operation in `update`,
    /// `finish` and `abort`. The device tracks its own operation budget; the
    /// adapter additionally gates calls through its slot pool.
    fn begin(
        &self,
        purpose: HalKeyPurpose,
        key_blob: &[u8],
        params: &[HalKeyParam],
        auth_token: &HalAuthToken,
    ) -> HalResult<HalBeginResp>;

    /// Feeds input to an operation.
    ///
    /// The response reports how many input bytes were consumed; the device
    /// may take fewer than offered.
    fn update(
        &self,
        handle: u64,
        params: &[HalKeyParam],
        input: &[u8],
        auth_token: &HalAuthToken,
        verification_token: &HalVerificationToken,
    ) -> HalResult<HalUpdateResp>;

    /// Completes an operation, releasing the device-side state.
    fn finish(
        &self,
        handle: u64,
        params: &[HalKeyParam],
        input: &[u8],
        signature: &[u8],
        auth_token: &HalAuthToken,
        verification_token: &HalVerificationToken,
    ) -> HalResult<HalFinishResp>;

    /// Tears down an operation without completing it.
    fn abort(&self, handle: u64) -> HalResult<HalErrorCode>;

    /// Exports public key material in the requested format.
    ///
    /// `app_id` and `app_data` must match the values the key was bound to at
    /// creation; pass empty slices for keys created without them.
    fn export_key(
        &self,
        format: HalKeyFormat,
        key_blob: &[u8],
        app_id: &[u8],
        app_data: &[u8],
    ) -> HalResult<HalExportResp>;

    /// Produces a device-signed attestation chain over the key.
    fn attest_key(&self, key_blob: &[u8], params: &[HalKeyParam]) -> HalResult<HalAttestResp>;
}
