// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! Modern key-management surface over a legacy keymaster-generation device.
//!
//! This crate adapts devices speaking the older keymaster interface to the
//! current key-management surface: typed parameters, structured errors, a
//! bounded operation lifecycle, and synthesized certificates for freshly
//! created keys.

mod cert;
mod device;
mod error;
mod operation;
mod registry;
mod slots;
pub mod types;

pub use device::*;
pub use error::*;
pub use operation::*;
pub use registry::*;
pub use slots::*;
pub use types::*;
