// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! Wire types for the legacy keymaster-generation HAL.
//!
//! Everything a legacy device speaks lives here: the tagged key-parameter
//! registry, the closed algorithm/digest/padding enumerations, the open
//! operation-level error-code space, and the per-operation response
//! payloads. The modern-facing vocabulary lives in `kmbridge_api`; the
//! translation between the two generations is deliberately kept out of this
//! crate so that these types stay a faithful description of the device
//! contract.

mod defs;
mod params;
mod resp;

pub use defs::*;
pub use params::*;
pub use resp::*;
