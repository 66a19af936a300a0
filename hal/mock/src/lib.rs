// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! In-process mock of a legacy keymaster-generation device.
//!
//! The mock implements [`kmbridge_hal_interface::HalDevice`] against a
//! per-instance vault holding real key material, so adapter-level tests get
//! signatures that actually verify and attestation chains that actually
//! link. Beyond the device contract it offers test-only controls:
//!
//! - [`HalMock::fail_next`] queues a transport failure or a device error
//!   code for a chosen entry point.
//! - [`HalMock::limit_next_update`] makes the next `update` consume only
//!   part of its input.
//! - Call counters and vault/operation counts expose what the adapter
//!   actually did on the wire.

mod attest;
mod device;
mod vault;

pub use device::HalMock;
pub use device::MockFailure;
pub use device::MockOp;
