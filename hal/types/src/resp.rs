// Copyright (C) Microsoft Corporation. All rights reserved.

//! Response payloads and token structs of the legacy device interface.
//!
//! Every operation-bearing payload carries its own [`HalErrorCode`] verdict;
//! transport failure is modelled separately by the interface crate.

use crate::HalErrorCode;
use crate::HalKeyParam;
use crate::HalSecurityLevel;

/// Identity of a legacy device implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalHardwareInfo {
    /// Level the implementation executes at.
    pub security_level: HalSecurityLevel,

    /// Implementation name.
    pub name: String,

    /// Implementation author.
    pub author: String,
}

/// Authorization lists attached to a key, split by enforcing side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HalKeyCharacteristics {
    /// Parameters enforced by the host OS.
    pub software_enforced: Vec<HalKeyParam>,

    /// Parameters enforced by the device.
    pub hardware_enforced: Vec<HalKeyParam>,
}

/// Result of key generation or import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalKeyCreationResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Opaque handle to the new key material.
    pub key_blob: Vec<u8>,

    /// Authorizations bound to the key.
    pub characteristics: HalKeyCharacteristics,
}

impl HalKeyCreationResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            key_blob: Vec::new(),
            characteristics: HalKeyCharacteristics::default(),
        }
    }
}

/// Result of a key blob upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalUpgradeResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Reissued blob, empty when no upgrade was necessary.
    pub key_blob: Vec<u8>,
}

impl HalUpgradeResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            key_blob: Vec::new(),
        }
    }
}

/// Result of starting an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalBeginResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Parameters the device wants echoed back to the caller.
    pub params: Vec<HalKeyParam>,

    /// Handle naming the operation in later calls. Zero on failure.
    pub handle: u64,
}

impl HalBeginResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            params: Vec::new(),
            handle: 0,
        }
    }
}

/// Result of feeding data to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalUpdateResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Count of input bytes the device consumed.
    pub consumed: u32,

    /// Parameters produced by this step.
    pub params: Vec<HalKeyParam>,

    /// Output bytes produced by this step.
    pub output: Vec<u8>,
}

impl HalUpdateResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            consumed: 0,
            params: Vec::new(),
            output: Vec::new(),
        }
    }
}

/// Result of completing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalFinishResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Parameters produced by the final step.
    pub params: Vec<HalKeyParam>,

    /// Final output bytes.
    pub output: Vec<u8>,
}

impl HalFinishResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            params: Vec::new(),
            output: Vec::new(),
        }
    }
}

/// Result of exporting public key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalExportResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Exported material in the requested format.
    pub key_material: Vec<u8>,
}

impl HalExportResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            key_material: Vec::new(),
        }
    }
}

/// Result of device-side key attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalAttestResp {
    /// Operation verdict.
    pub error: HalErrorCode,

    /// Certificate chain, leaf first, one DER certificate per entry.
    pub cert_chain: Vec<Vec<u8>>,
}

impl HalAttestResp {
    /// Failure response carrying only the verdict.
    pub fn failed(error: HalErrorCode) -> Self {
        Self {
            error,
            cert_chain: Vec::new(),
        }
    }
}

/// Proof of user authentication minted by an authenticator.
///
/// The all-zero default stands in when the caller holds no token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HalAuthToken {
    /// Challenge the token answers.
    pub challenge: u64,

    /// Authenticated user.
    pub user_id: u64,

    /// Authenticator instance.
    pub authenticator_id: u64,

    /// Authenticator kind, as a raw bitmask.
    pub authenticator_type: u32,

    /// Authentication instant in milliseconds since boot.
    pub timestamp_ms: u64,

    /// MAC over the token fields.
    pub mac: Vec<u8>,
}

/// Statement that another device verified a set of authorizations.
///
/// The all-zero default stands in when the caller holds no token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HalVerificationToken {
    /// Challenge the token answers.
    pub challenge: u64,

    /// Verification instant in milliseconds since boot.
    pub timestamp_ms: u64,

    /// Level of the device that verified.
    pub security_level: HalSecurityLevel,

    /// MAC over the token fields.
    pub mac: Vec<u8>,
}
