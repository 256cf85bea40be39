//! Space and device lookup.
//!
//! The directory is the read side of the device platform: it tells the
//! orchestrator which spaces exist and which devices live in them, with their
//! current property values.

use async_trait::async_trait;
use parking_lot::RwLock;
use spaces_core::{Device, DeviceId, Space, SpaceId};
use std::collections::HashMap;

use crate::error::{OrchestratorError, Result};
use crate::platform::PropertyCommand;

/// Trait for resolving spaces and their devices.
#[async_trait]
pub trait SpaceDirectory: Send + Sync {
    /// Get a space by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    async fn get_space(&self, space_id: &SpaceId) -> Result<Option<Space>>;

    /// All devices placed in a space, in discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn devices_in_space(&self, space_id: &SpaceId) -> Result<Vec<Device>>;

    /// Devices by ID. Unknown IDs are left out of the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn devices_by_ids(&self, device_ids: &[DeviceId]) -> Result<Vec<Device>>;
}

/// In-process directory backed by `parking_lot` maps.
///
/// Used when no device bridge is configured, and by tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    spaces: RwLock<HashMap<SpaceId, Space>>,
    devices: RwLock<Vec<Device>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a space.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the space breaks the room/zone hierarchy.
    pub fn insert_space(&self, space: Space) -> Result<()> {
        let mut spaces = self.spaces.write();
        let parent = space.parent_id.and_then(|id| spaces.get(&id));
        space.validate_parent(parent)?;
        spaces.insert(space.id, space);
        Ok(())
    }

    /// Insert or replace a device, keeping its discovery position.
    pub fn insert_device(&self, device: Device) {
        let mut devices = self.devices.write();
        if let Some(existing) = devices.iter_mut().find(|d| d.id == device.id) {
            *existing = device;
        } else {
            devices.push(device);
        }
    }

    /// Remove a device.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::DeviceNotFound` if the device is unknown.
    pub fn remove_device(&self, device_id: &DeviceId) -> Result<Device> {
        let mut devices = self.devices.write();
        let index = devices
            .iter()
            .position(|d| d.id == *device_id)
            .ok_or(OrchestratorError::DeviceNotFound(*device_id))?;
        Ok(devices.remove(index))
    }

    /// Get a device by ID.
    #[must_use]
    pub fn device(&self, device_id: &DeviceId) -> Option<Device> {
        self.devices.read().iter().find(|d| d.id == *device_id).cloned()
    }

    /// Store the value written by a command. Returns false if the property is unknown.
    pub fn apply(&self, command: &PropertyCommand) -> bool {
        let mut devices = self.devices.write();
        let property = devices
            .iter_mut()
            .find(|d| d.id == command.device_id)
            .and_then(|d| d.channels.iter_mut().find(|c| c.id == command.channel_id))
            .and_then(|c| {
                c.properties
                    .iter_mut()
                    .find(|p| p.id == command.property_id)
            });

        match property {
            Some(property) => {
                property.value = Some(command.value.clone());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SpaceDirectory for InMemoryDirectory {
    async fn get_space(&self, space_id: &SpaceId) -> Result<Option<Space>> {
        Ok(self.spaces.read().get(space_id).cloned())
    }

    async fn devices_in_space(&self, space_id: &SpaceId) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .read()
            .iter()
            .filter(|d| d.space_id == Some(*space_id))
            .cloned()
            .collect())
    }

    async fn devices_by_ids(&self, device_ids: &[DeviceId]) -> Result<Vec<Device>> {
        Ok(self
            .devices
            .read()
            .iter()
            .filter(|d| device_ids.contains(&d.id))
            .cloned()
            .collect())
    }
}
