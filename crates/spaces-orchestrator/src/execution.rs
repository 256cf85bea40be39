//! Execution engine.
//!
//! Dispatches one batch per target, sequentially and in target order, and
//! aggregates the outcome. Per-target problems never abort the run; they end
//! up in the result counters.

use std::sync::Arc;

use serde::Serialize;
use spaces_core::{ChannelId, Device, DeviceId, SpaceId};

use crate::intent::Resolution;
use crate::platform::{DevicePlatform, PropertyCommand};

/// A target with its resolved commands.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTarget {
    /// Target device.
    pub device_id: DeviceId,
    /// Target channel; `None` for device-level targets.
    pub channel_id: Option<ChannelId>,
    /// Whether the device was offline when planned.
    pub offline: bool,
    /// What to do.
    pub resolution: Resolution,
}

impl PlannedTarget {
    /// Plan a resolution for a device, taking its connection state.
    #[must_use]
    pub fn new(device: &Device, channel_id: Option<ChannelId>, resolution: Resolution) -> Self {
        Self {
            device_id: device.id,
            channel_id,
            offline: device.connection.is_offline(),
            resolution,
        }
    }
}

/// Outcome of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Commands were accepted.
    Affected,
    /// Resolution or dispatch failed.
    Failed,
    /// The device was offline.
    SkippedOffline,
    /// The intent did not concern the target.
    Untouched,
}

/// A target that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
    /// Device of the target.
    pub device_id: DeviceId,
    /// Channel of the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    /// Why it failed.
    pub reason: String,
}

/// Aggregated outcome of an intent execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Overall verdict.
    pub success: bool,
    /// Targets whose commands were accepted.
    pub affected_devices: usize,
    /// Targets that failed.
    pub failed_devices: usize,
    /// Targets skipped because their device was offline.
    pub skipped_offline_devices: usize,
    /// Offline devices, without duplicates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offline_device_ids: Vec<DeviceId>,
    /// Failures with reasons.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_targets: Vec<FailedTarget>,
}

impl ExecutionResult {
    /// Result of an intent with nothing to act on.
    #[must_use]
    pub fn vacuous() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// Overall success of a run.
///
/// Nothing to do is a success. A run that only skipped offline targets is not.
/// Otherwise any affected target, or no failures at all, makes it a success.
#[must_use]
pub const fn overall_success(affected: usize, failed: usize, skipped: usize, targets: usize) -> bool {
    if targets == 0 {
        return true;
    }
    if affected == 0 && failed == 0 && skipped > 0 {
        return false;
    }
    failed == 0 || affected > 0
}

/// Result plus the status of every target, in target order.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Aggregated result.
    pub result: ExecutionResult,
    /// Per-target status.
    pub statuses: Vec<TargetStatus>,
}

/// Dispatches resolved targets through the device platform.
#[derive(Clone)]
pub struct ExecutionEngine {
    platform: Arc<dyn DevicePlatform>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine").finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine over a platform.
    #[must_use]
    pub fn new(platform: Arc<dyn DevicePlatform>) -> Self {
        Self { platform }
    }

    /// Send one batch. `Err` carries the failure reason.
    ///
    /// # Errors
    ///
    /// Returns the reason when the platform rejects the batch or cannot be reached.
    pub async fn dispatch(&self, commands: &[PropertyCommand]) -> Result<(), String> {
        match self.platform.process_batch(commands).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("platform rejected batch".to_string()),
            Err(e) => {
                tracing::error!(error = %e, commands = commands.len(), "Batch dispatch failed");
                Err(e.to_string())
            }
        }
    }

    /// Execute every target in order.
    pub async fn execute(&self, space_id: &SpaceId, targets: &[PlannedTarget]) -> Execution {
        let mut result = ExecutionResult::default();
        let mut statuses = Vec::with_capacity(targets.len());

        for target in targets {
            let status = match &target.resolution {
                Resolution::Untouched => TargetStatus::Untouched,
                _ if target.offline => {
                    if !result.offline_device_ids.contains(&target.device_id) {
                        result.offline_device_ids.push(target.device_id);
                    }
                    tracing::debug!(device_id = %target.device_id, "Skipping offline device");
                    TargetStatus::SkippedOffline
                }
                Resolution::Failed(error) => {
                    result.failed_targets.push(FailedTarget {
                        device_id: target.device_id,
                        channel_id: target.channel_id,
                        reason: error.to_string(),
                    });
                    TargetStatus::Failed
                }
                Resolution::Commands(commands) if commands.is_empty() => TargetStatus::Affected,
                Resolution::Commands(commands) => match self.dispatch(commands).await {
                    Ok(()) => TargetStatus::Affected,
                    Err(reason) => {
                        tracing::warn!(
                            space_id = %space_id,
                            device_id = %target.device_id,
                            reason = %reason,
                            "Target failed"
                        );
                        result.failed_targets.push(FailedTarget {
                            device_id: target.device_id,
                            channel_id: target.channel_id,
                            reason,
                        });
                        TargetStatus::Failed
                    }
                },
            };

            match status {
                TargetStatus::Affected => result.affected_devices += 1,
                TargetStatus::Failed => result.failed_devices += 1,
                TargetStatus::SkippedOffline => result.skipped_offline_devices += 1,
                TargetStatus::Untouched => {}
            }
            statuses.push(status);
        }

        result.success = overall_success(
            result.affected_devices,
            result.failed_devices,
            result.skipped_offline_devices,
            targets.len(),
        );

        tracing::debug!(
            space_id = %space_id,
            affected = result.affected_devices,
            failed = result.failed_devices,
            skipped = result.skipped_offline_devices,
            success = result.success,
            "Execution finished"
        );

        Execution { result, statuses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentError;
    use crate::platform::MockDevicePlatform;
    use spaces_core::PropertyId;

    fn commands(device_id: DeviceId) -> Resolution {
        Resolution::Commands(vec![PropertyCommand::new(
            device_id,
            ChannelId::generate(),
            PropertyId::generate(),
            true,
        )])
    }

    fn target(device_id: DeviceId, resolution: Resolution) -> PlannedTarget {
        PlannedTarget {
            device_id,
            channel_id: None,
            offline: false,
            resolution,
        }
    }

    #[test]
    fn success_rule_boundaries() {
        assert!(overall_success(0, 0, 0, 0));
        assert!(overall_success(0, 0, 0, 3));
        assert!(!overall_success(0, 0, 2, 2));
        assert!(!overall_success(0, 1, 0, 1));
        assert!(overall_success(1, 1, 0, 2));
        assert!(overall_success(1, 0, 1, 2));
    }

    #[tokio::test]
    async fn zero_targets_is_vacuous_success() {
        let engine = ExecutionEngine::new(Arc::new(MockDevicePlatform::new()));
        let run = engine.execute(&SpaceId::generate(), &[]).await;
        assert_eq!(run.result, ExecutionResult::vacuous());
    }

    #[tokio::test]
    async fn one_bad_device_does_not_block_others() {
        let platform = Arc::new(MockDevicePlatform::new());
        let good = DeviceId::generate();
        let rejected = DeviceId::generate();
        let erroring = DeviceId::generate();
        platform.reject_device(rejected);
        platform.fail_device(erroring);

        let engine = ExecutionEngine::new(platform.clone());
        let run = engine
            .execute(
                &SpaceId::generate(),
                &[
                    target(rejected, commands(rejected)),
                    target(erroring, commands(erroring)),
                    target(good, commands(good)),
                ],
            )
            .await;

        assert!(run.result.success);
        assert_eq!(run.result.affected_devices, 1);
        assert_eq!(run.result.failed_devices, 2);
        assert_eq!(run.result.failed_targets[0].reason, "platform rejected batch");
        assert_eq!(
            run.statuses,
            vec![TargetStatus::Failed, TargetStatus::Failed, TargetStatus::Affected]
        );
        assert_eq!(platform.batches().len(), 3);
    }

    #[tokio::test]
    async fn offline_only_run_fails_and_lists_devices_once() {
        let platform = Arc::new(MockDevicePlatform::new());
        let device = DeviceId::generate();
        let engine = ExecutionEngine::new(platform.clone());

        let offline = |resolution| PlannedTarget {
            offline: true,
            ..target(device, resolution)
        };
        let run = engine
            .execute(
                &SpaceId::generate(),
                &[offline(commands(device)), offline(commands(device)), offline(Resolution::Untouched)],
            )
            .await;

        assert!(!run.result.success);
        assert_eq!(run.result.skipped_offline_devices, 2);
        assert_eq!(run.result.offline_device_ids, vec![device]);
        assert!(platform.batches().is_empty());
    }

    #[tokio::test]
    async fn resolution_failures_are_counted_not_dispatched() {
        let platform = Arc::new(MockDevicePlatform::new());
        let engine = ExecutionEngine::new(platform.clone());
        let device = DeviceId::generate();

        let run = engine
            .execute(
                &SpaceId::generate(),
                &[target(device, Resolution::Failed(IntentError::MissingField("mode")))],
            )
            .await;

        assert!(!run.result.success);
        assert_eq!(run.result.failed_devices, 1);
        assert!(run.result.failed_targets[0].reason.contains("mode"));
        assert!(platform.batches().is_empty());
    }

    #[tokio::test]
    async fn offline_targets_skip_before_resolution_failures() {
        let engine = ExecutionEngine::new(Arc::new(MockDevicePlatform::new()));
        let offline = DeviceId::generate();
        let online = DeviceId::generate();

        let run = engine
            .execute(
                &SpaceId::generate(),
                &[
                    PlannedTarget {
                        offline: true,
                        ..target(offline, Resolution::Failed(IntentError::MissingField("mode")))
                    },
                    target(online, Resolution::Failed(IntentError::MissingField("mode"))),
                ],
            )
            .await;

        assert_eq!(run.result.skipped_offline_devices, 1);
        assert_eq!(run.result.failed_devices, 1);
        assert_eq!(run.result.offline_device_ids, vec![offline]);
        assert_eq!(run.result.failed_targets.len(), 1);
        assert_eq!(run.result.failed_targets[0].device_id, online);
        assert_eq!(run.statuses, vec![TargetStatus::SkippedOffline, TargetStatus::Failed]);
    }

    #[tokio::test]
    async fn untouched_targets_count_as_nothing() {
        let engine = ExecutionEngine::new(Arc::new(MockDevicePlatform::new()));
        let run = engine
            .execute(
                &SpaceId::generate(),
                &[target(DeviceId::generate(), Resolution::Untouched)],
            )
            .await;

        assert!(run.result.success);
        assert_eq!(run.result.affected_devices, 0);
        assert_eq!(run.result.failed_devices, 0);
    }
}
