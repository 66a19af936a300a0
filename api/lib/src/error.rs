// Copyright (C) Microsoft Corporation. All rights reserved.

use kmbridge_hal_types::HalErrorCode;
use thiserror::Error;

use crate::types::ErrorCode;
use crate::types::SecurityLevel;

/// Adapter error surface.
///
/// Operation-level verdicts from the legacy device travel in [`ApiError::Km`]
/// with their numeric value intact; the remaining variants are conditions the
/// adapter itself introduces.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ApiError {
    /// The legacy device completed the call and reported a non-OK code.
    #[error("device reported {0:?}")]
    Km(ErrorCode),

    /// The call never completed at the transport layer.
    #[error("transport failure reaching the legacy device")]
    SystemError,

    /// No legacy device serves the requested security level.
    #[error("no device at security level {0:?}")]
    NotFound(SecurityLevel),
}

/// Result alias used throughout the adapter.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Wraps a legacy operation-level code, preserving its numeric value.
    pub fn from_hal_code(code: HalErrorCode) -> Self {
        ApiError::Km(ErrorCode(code.0))
    }
}

/// Maps a code-bearing legacy reply to `Ok(())` or the translated error.
pub(crate) fn check_hal_code(code: HalErrorCode) -> ApiResult<()> {
    if code.is_ok() {
        Ok(())
    } else {
        Err(ApiError::from_hal_code(code))
    }
}
