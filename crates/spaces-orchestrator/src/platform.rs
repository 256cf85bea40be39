//! Device platform boundary.
//!
//! The orchestrator never talks to physical devices itself. It hands batches of
//! property writes to a `DevicePlatform` and only looks at the overall verdict.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spaces_core::{ChannelId, DeviceId, PropertyId, PropertyValue};

use crate::error::Result;

/// A single property write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCommand {
    /// Target device.
    pub device_id: DeviceId,
    /// Target channel.
    pub channel_id: ChannelId,
    /// Target property.
    pub property_id: PropertyId,
    /// Value to write.
    pub value: PropertyValue,
}

impl PropertyCommand {
    /// Create a new property write.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        channel_id: ChannelId,
        property_id: PropertyId,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self {
            device_id,
            channel_id,
            property_id,
            value: value.into(),
        }
    }
}

/// Trait for dispatching property writes to devices.
///
/// This trait abstracts the plugin/device layer, allowing for
/// mock implementations in tests.
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// Write a batch of properties.
    ///
    /// Returns `true` only if every command in the batch succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform could not be reached.
    async fn process_batch(&self, commands: &[PropertyCommand]) -> Result<bool>;
}

/// A no-op platform for when no device bridge is configured.
///
/// This platform logs batches without delivering them anywhere.
#[derive(Debug, Clone, Default)]
pub struct NoopDevicePlatform;

impl NoopDevicePlatform {
    /// Create a new no-op platform.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DevicePlatform for NoopDevicePlatform {
    async fn process_batch(&self, commands: &[PropertyCommand]) -> Result<bool> {
        tracing::warn!(
            commands = commands.len(),
            "NoopDevicePlatform: process_batch called but no device bridge configured"
        );
        Ok(true)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockDevicePlatform;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::{async_trait, DevicePlatform, PropertyCommand, Result};
    use crate::directory::InMemoryDirectory;
    use crate::error::OrchestratorError;
    use spaces_core::DeviceId;

    /// Recording platform for tests.
    ///
    /// Every batch is recorded. Devices can be told to reject batches or to
    /// raise errors, and accepted writes can be mirrored into an
    /// [`InMemoryDirectory`] so later reads observe them.
    #[derive(Default)]
    pub struct MockDevicePlatform {
        batches: RwLock<Vec<Vec<PropertyCommand>>>,
        rejecting: RwLock<HashSet<DeviceId>>,
        erroring: RwLock<HashSet<DeviceId>>,
        mirror: Option<Arc<InMemoryDirectory>>,
    }

    impl MockDevicePlatform {
        /// Create a platform that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a platform that applies accepted writes to `directory`.
        #[must_use]
        pub fn mirroring(directory: Arc<InMemoryDirectory>) -> Self {
            Self {
                mirror: Some(directory),
                ..Self::default()
            }
        }

        /// Make batches touching `device_id` return `false`.
        pub fn reject_device(&self, device_id: DeviceId) {
            self.rejecting.write().insert(device_id);
        }

        /// Make batches touching `device_id` return an error.
        pub fn fail_device(&self, device_id: DeviceId) {
            self.erroring.write().insert(device_id);
        }

        /// All recorded batches, in dispatch order.
        #[must_use]
        pub fn batches(&self) -> Vec<Vec<PropertyCommand>> {
            self.batches.read().clone()
        }

        /// All recorded commands, flattened.
        #[must_use]
        pub fn commands(&self) -> Vec<PropertyCommand> {
            self.batches.read().iter().flatten().cloned().collect()
        }

        /// Recorded commands for one device.
        #[must_use]
        pub fn commands_for(&self, device_id: &DeviceId) -> Vec<PropertyCommand> {
            self.commands()
                .into_iter()
                .filter(|c| c.device_id == *device_id)
                .collect()
        }

        /// Forget recorded batches.
        pub fn clear(&self) {
            self.batches.write().clear();
        }
    }

    #[async_trait]
    impl DevicePlatform for MockDevicePlatform {
        async fn process_batch(&self, commands: &[PropertyCommand]) -> Result<bool> {
            self.batches.write().push(commands.to_vec());

            if commands
                .iter()
                .any(|c| self.erroring.read().contains(&c.device_id))
            {
                return Err(OrchestratorError::Platform("simulated failure".into()));
            }
            if commands
                .iter()
                .any(|c| self.rejecting.read().contains(&c.device_id))
            {
                return Ok(false);
            }

            if let Some(directory) = &self.mirror {
                for command in commands {
                    directory.apply(command);
                }
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(device_id: DeviceId) -> PropertyCommand {
        PropertyCommand::new(device_id, ChannelId::generate(), PropertyId::generate(), true)
    }

    #[tokio::test]
    async fn noop_platform_accepts_everything() {
        let platform = NoopDevicePlatform::new();
        assert!(platform
            .process_batch(&[command(DeviceId::generate())])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mock_platform_records_and_fails_per_device() {
        let platform = MockDevicePlatform::new();
        let good = DeviceId::generate();
        let rejected = DeviceId::generate();
        let broken = DeviceId::generate();
        platform.reject_device(rejected);
        platform.fail_device(broken);

        assert!(platform.process_batch(&[command(good)]).await.unwrap());
        assert!(!platform.process_batch(&[command(rejected)]).await.unwrap());
        assert!(platform.process_batch(&[command(broken)]).await.is_err());

        assert_eq!(platform.batches().len(), 3);
        assert_eq!(platform.commands_for(&good).len(), 1);
    }
}
