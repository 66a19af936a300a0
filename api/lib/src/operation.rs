// Copyright (C) Microsoft Corporation. All rights reserved.

//! In-flight operation lifecycle.
//!
//! An [`Operation`] owns the slot it was begun with. The slot is returned to
//! the pool on the first of: an update failure, finish, abort, or drop. A
//! dropped operation that is still live is aborted on the device so the
//! legacy side does not leak its own slot.

use std::sync::Arc;

use kmbridge_hal_interface::HalDevice;

use crate::error::check_hal_code;
use crate::slots::ClaimedSlot;
use crate::types::convert::auth_token_to_hal;
use crate::types::convert::key_params_from_hal;
use crate::types::convert::key_params_to_hal;
use crate::types::convert::verification_token_to_hal;
use crate::types::FinishOutput;
use crate::types::HardwareAuthToken;
use crate::types::KeyParam;
use crate::types::UpdateOutput;
use crate::types::VerificationToken;
use crate::ApiError;
use crate::ApiResult;

/// Everything a successful begin hands back.
pub struct BeginResult {
    /// Challenge to bind auth tokens to. Mirrors the device operation handle.
    pub challenge: i64,
    /// Output parameters from the device, such as a generated nonce.
    pub params: Vec<KeyParam>,
    /// The live operation.
    pub operation: Operation,
}

/// A begun operation on the legacy device.
pub struct Operation {
    hal: Arc<dyn HalDevice>,
    handle: u64,
    slot: ClaimedSlot,
    active: bool,
}

impl Operation {
    pub(crate) fn new(hal: Arc<dyn HalDevice>, handle: u64, slot: ClaimedSlot) -> Self {
        Self {
            hal,
            handle,
            slot,
            active: true,
        }
    }

    /// Feeds input to the operation.
    ///
    /// Any failure ends the operation and returns its slot; the device has
    /// already forgotten the handle by the time an error code comes back.
    pub fn update(
        &mut self,
        params: &[KeyParam],
        input: &[u8],
        auth_token: Option<&HardwareAuthToken>,
        verification_token: Option<&VerificationToken>,
    ) -> ApiResult<UpdateOutput> {
        let result = self.hal.update(
            self.handle,
            &key_params_to_hal(params),
            input,
            &auth_token_to_hal(auth_token),
            &verification_token_to_hal(verification_token),
        );
        let resp = match result {
            Ok(resp) => resp,
            Err(transport_error) => {
                tracing::error!(?transport_error, "transport failure during update");
                self.retire();
                return Err(ApiError::SystemError);
            }
        };
        if !resp.error.is_ok() {
            self.retire();
            return Err(ApiError::from_hal_code(resp.error));
        }
        Ok(UpdateOutput {
            consumed: resp.consumed as usize,
            params: key_params_from_hal(&resp.params),
            output: resp.output,
        })
    }

    /// Completes the operation and returns its final output.
    pub fn finish(
        mut self,
        params: &[KeyParam],
        input: &[u8],
        signature: &[u8],
        auth_token: Option<&HardwareAuthToken>,
        verification_token: Option<&VerificationToken>,
    ) -> ApiResult<FinishOutput> {
        let result = self.hal.finish(
            self.handle,
            &key_params_to_hal(params),
            input,
            signature,
            &auth_token_to_hal(auth_token),
            &verification_token_to_hal(verification_token),
        );
        // The device retires the operation whether or not it succeeded.
        self.retire();
        let resp = result.map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during finish");
            ApiError::SystemError
        })?;
        check_hal_code(resp.error)?;
        Ok(FinishOutput {
            params: key_params_from_hal(&resp.params),
            output: resp.output,
        })
    }

    /// Abandons the operation.
    pub fn abort(mut self) -> ApiResult<()> {
        let result = self.hal.abort(self.handle);
        self.retire();
        let code = result.map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during abort");
            ApiError::SystemError
        })?;
        check_hal_code(code)
    }

    fn retire(&mut self) {
        self.active = false;
        self.slot.release();
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.hal.abort(self.handle) {
            Ok(code) if code.is_ok() => {}
            Ok(code) => {
                tracing::warn!(?code, "device refused abort for dropped operation");
            }
            Err(transport_error) => {
                tracing::warn!(
                    ?transport_error,
                    "abort for dropped operation did not reach the device"
                );
            }
        }
    }
}
