// Copyright (C) Microsoft Corporation. All rights reserved.

//! Vocabulary of the modern surface and its legacy translation.

pub mod convert;
pub mod defs;
pub mod params;

pub use defs::*;
pub use params::*;
