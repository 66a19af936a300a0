// Copyright (C) Microsoft Corporation. All rights reserved.

/// Transport-level failure while talking to a legacy device.
///
/// This is the "call never happened" class of error: the device process is
/// gone, the channel broke, or the answer did not parse. Operation-level
/// verdicts ride inside the response payloads as
/// [`HalErrorCode`](kmbridge_hal_types::HalErrorCode) and are not errors at
/// this layer.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// The device is not reachable.
    #[error("legacy device unavailable")]
    Unavailable,

    /// The channel to the device failed mid-call.
    #[error("legacy device transport: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered with bytes this side cannot interpret.
    #[error("malformed legacy device response")]
    Malformed,
}

/// Result of one legacy device call.
pub type HalResult<T> = Result<T, HalError>;
