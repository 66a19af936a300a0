// Copyright (C) Microsoft Corporation. All rights reserved.

//! Lazy per-level device registry.

use std::collections::HashMap;
use std::sync::Arc;

use kmbridge_hal_interface::HalDevice;
use parking_lot::RwLock;

use crate::device::Device;
use crate::types::SecurityLevel;
use crate::ApiError;
use crate::ApiResult;

/// Discovery boundary between the registry and whatever transport hosts the
/// legacy devices.
pub trait HalConnector: Send + Sync {
    /// Connects to the device serving `level`, or `None` when that level is
    /// not populated.
    fn connect(&self, level: SecurityLevel) -> Option<Arc<dyn HalDevice>>;
}

impl<F> HalConnector for F
where
    F: Fn(SecurityLevel) -> Option<Arc<dyn HalDevice>> + Send + Sync,
{
    fn connect(&self, level: SecurityLevel) -> Option<Arc<dyn HalDevice>> {
        self(level)
    }
}

/// Hands out one shared [`Device`] per security level, connecting lazily on
/// first use.
pub struct Registry {
    connector: Box<dyn HalConnector>,
    devices: RwLock<HashMap<SecurityLevel, Arc<Device>>>,
}

impl Registry {
    /// New registry over a connector.
    pub fn new(connector: impl HalConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Device serving `level`.
    ///
    /// The first lookup of a level connects and caches; later lookups reuse
    /// the cached instance. A failed connection is not cached, so a level
    /// that comes up later is found by the lookup after that.
    pub fn device(&self, level: SecurityLevel) -> ApiResult<Arc<Device>> {
        if let Some(device) = self.devices.read().get(&level) {
            return Ok(Arc::clone(device));
        }
        let mut devices = self.devices.write();
        if let Some(device) = devices.get(&level) {
            return Ok(Arc::clone(device));
        }
        let hal = self.connector.connect(level).ok_or_else(|| {
            tracing::error!(?level, "no legacy device serves this security level");
            ApiError::NotFound(level)
        })?;
        let device = Arc::new(Device::new(hal, level));
        devices.insert(level, Arc::clone(&device));
        Ok(device)
    }
}
