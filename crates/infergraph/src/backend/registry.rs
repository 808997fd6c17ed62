//! Explicit registry mapping devices to workload factories.
//!
//! The registry is an instance handed to `optimize`, not process-global
//! state: callers decide which backends a compilation can see, and two
//! optimizations with different registries never observe each other.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{Compute, WorkloadFactory};

#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<Compute, Arc<dyn WorkloadFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under the device it reports; replaces any factory
    /// previously registered for that device.
    pub fn register(&mut self, factory: Arc<dyn WorkloadFactory>) {
        self.factories.insert(factory.compute(), factory);
    }

    pub fn factory(&self, device: Compute) -> Option<Arc<dyn WorkloadFactory>> {
        self.factories.get(&device).cloned()
    }

    pub fn has_backend(&self, device: Compute) -> bool {
        self.factories.contains_key(&device)
    }

    /// Registered devices in a stable order.
    pub fn registered_devices(&self) -> Vec<Compute> {
        let mut devices: Vec<Compute> = self.factories.keys().copied().collect();
        devices.sort();
        devices
    }
}
