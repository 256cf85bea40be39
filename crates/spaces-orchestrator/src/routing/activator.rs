//! Routing activation.
//!
//! Steps run strictly in plan order. Offline devices are skipped, unless the
//! routing fails critical steps on offline devices or waits for them to come
//! back. A failed critical step aborts the remaining plan.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use spaces_core::{Channel, Device, DeviceCategory, DeviceId, Property, RoutingId, SpaceId};
use spaces_store::{
    ActivationState, ActiveRouting, ConflictPolicy, InputPolicy, MediaEndpoint, OfflinePolicy,
    RoutingDefinition, RoutingType, Store,
};

use super::lifecycle;
use super::plan::{self, ActivationPlan, PlanStep, StepKind};
use crate::directory::SpaceDirectory;
use crate::error::{OrchestratorError, Result};
use crate::execution::ExecutionEngine;
use crate::platform::PropertyCommand;

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The write was accepted.
    Success,
    /// The step failed.
    Failed,
    /// The step was not needed or its device was offline.
    Skipped,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// Position in the plan.
    pub order: usize,
    /// Device of the step.
    pub device_id: DeviceId,
    /// What the step changes.
    pub kind: StepKind,
    /// Outcome.
    pub status: StepStatus,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of activating (or deactivating) media in a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationResult {
    /// Overall verdict.
    pub success: bool,
    /// Routing that was activated.
    pub routing_id: Option<RoutingId>,
    /// Type of that routing.
    pub routing_type: Option<RoutingType>,
    /// Steps whose write was accepted.
    pub steps_executed: u32,
    /// Steps that failed.
    pub steps_failed: u32,
    /// Steps skipped.
    pub steps_skipped: u32,
    /// Per-step results, in plan order. Steps after an abort are absent.
    pub step_results: Vec<StepResult>,
    /// Offline devices met during the run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offline_device_ids: Vec<DeviceId>,
}

impl ActivationResult {
    fn cleared() -> Self {
        Self {
            success: true,
            routing_id: None,
            routing_type: Some(RoutingType::Off),
            steps_executed: 0,
            steps_failed: 0,
            steps_skipped: 0,
            step_results: Vec::new(),
            offline_device_ids: Vec::new(),
        }
    }

    fn first_error(&self) -> Option<String> {
        self.step_results.iter().find_map(|r| r.error.clone())
    }
}

/// Channel and property a step writes; the channel is searched for when the step names none.
fn locate<'a>(device: &'a Device, step: &PlanStep) -> Option<(&'a Channel, &'a Property)> {
    match step.channel_id {
        Some(channel_id) => {
            let channel = device.channel(&channel_id)?;
            Some((channel, channel.property_by_id(&step.property_id)?))
        }
        None => device
            .channels
            .iter()
            .find_map(|c| c.property_by_id(&step.property_id).map(|p| (c, p))),
    }
}

/// How long a routing with the WAIT offline policy waits for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfflineWait {
    /// Give up after this long.
    pub timeout: Duration,
    /// Time between directory polls.
    pub poll_interval: Duration,
}

impl Default for OfflineWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Activates routings and keeps the active-routing slot of each space.
pub struct MediaRouter<'a, S: Store> {
    store: &'a S,
    directory: &'a dyn SpaceDirectory,
    engine: &'a ExecutionEngine,
    wait: OfflineWait,
}

impl<'a, S: Store> MediaRouter<'a, S> {
    /// Create a router over borrowed collaborators.
    #[must_use]
    pub fn new(store: &'a S, directory: &'a dyn SpaceDirectory, engine: &'a ExecutionEngine) -> Self {
        Self {
            store,
            directory,
            engine,
            wait: OfflineWait::default(),
        }
    }

    /// Use different WAIT policy timings.
    #[must_use]
    pub const fn with_offline_wait(mut self, wait: OfflineWait) -> Self {
        self.wait = wait;
        self
    }

    fn routing(&self, routing_id: &RoutingId) -> Result<RoutingDefinition> {
        self.store
            .get_routing(routing_id)?
            .ok_or(OrchestratorError::RoutingNotFound(*routing_id))
    }

    fn slot(&self, space_id: &SpaceId) -> Result<ActiveRouting> {
        Ok(self
            .store
            .get_active_routing(space_id)?
            .unwrap_or_else(|| ActiveRouting::deactivated(*space_id)))
    }

    /// Plan a routing's activation without running it.
    ///
    /// # Errors
    ///
    /// Returns `RoutingNotFound` or `EndpointNotFound`.
    pub fn build_plan(&self, routing_id: &RoutingId) -> Result<ActivationPlan> {
        plan::build_plan(self.store, &self.routing(routing_id)?)
    }

    /// Activate a routing, honouring its conflict policy.
    ///
    /// # Errors
    ///
    /// Returns `RoutingNotFound`, `RoutingConflict` under `FailIfActive`, or
    /// the planning error that failed the activation.
    pub async fn activate(&self, routing_id: &RoutingId) -> Result<ActivationResult> {
        let routing = self.routing(routing_id)?;
        let current = self.slot(&routing.space_id)?;

        let occupied_by = match current.state {
            ActivationState::Active => current.routing_id,
            ActivationState::Activating => current.pending_routing_id,
            ActivationState::Deactivated | ActivationState::Failed => None,
        }
        .filter(|active| active != routing_id);

        if let Some(active) = occupied_by {
            match routing.conflict_policy {
                ConflictPolicy::Replace => {}
                ConflictPolicy::FailIfActive => {
                    return Err(OrchestratorError::RoutingConflict {
                        space_id: routing.space_id,
                        active,
                    });
                }
                ConflictPolicy::DeactivateFirst => {
                    tracing::debug!(
                        space_id = %routing.space_id,
                        active = %active,
                        "Deactivating current routing first"
                    );
                    self.deactivate(&routing.space_id).await?;
                }
            }
        }

        self.run(&routing).await
    }

    /// Deactivate media: activate the space's OFF routing, or clear the slot.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn deactivate(&self, space_id: &SpaceId) -> Result<ActivationResult> {
        if let Some(off) = self.store.find_routing_by_type(space_id, RoutingType::Off)? {
            return self.run(&off).await;
        }

        let current = self.slot(space_id)?;
        if current.state != ActivationState::Deactivated {
            lifecycle::validate_transition(space_id, current.state, ActivationState::Deactivated)?;
            self.store.put_active_routing(&ActiveRouting::deactivated(*space_id))?;
        }
        tracing::info!(space_id = %space_id, "Media deactivated");

        Ok(ActivationResult::cleared())
    }

    /// Routing shown as active: the settled one when ACTIVE, the pending one when ACTIVATING.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn active_routing(&self, space_id: &SpaceId) -> Result<Option<RoutingDefinition>> {
        let Some(slot) = self.store.get_active_routing(space_id)? else {
            return Ok(None);
        };
        if !lifecycle::exposes_routing(slot.state) {
            return Ok(None);
        }
        let routing_id = match slot.state {
            ActivationState::Activating => slot.pending_routing_id,
            _ => slot.routing_id,
        };
        match routing_id {
            Some(id) => Ok(self.store.get_routing(&id)?),
            None => Ok(None),
        }
    }

    /// Create the missing WATCH, LISTEN and OFF routings of a space.
    ///
    /// # Errors
    ///
    /// Returns a store or directory error.
    pub async fn ensure_defaults(&self, space_id: &SpaceId) -> Result<Vec<RoutingDefinition>> {
        let existing: Vec<RoutingType> = self
            .store
            .list_routings_by_space(space_id)?
            .into_iter()
            .map(|r| r.routing_type)
            .collect();
        let missing: Vec<RoutingType> = RoutingType::DEFAULTS
            .into_iter()
            .filter(|t| !existing.contains(t))
            .collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let endpoints = self.store.list_endpoints_by_space(space_id)?;
        let device_ids: Vec<DeviceId> = endpoints.iter().map(|e| e.device_id).collect();
        let devices = self.directory.devices_by_ids(&device_ids).await?;
        let categorised: Vec<(MediaEndpoint, DeviceCategory)> = endpoints
            .into_iter()
            .filter_map(|e| {
                let category = devices.iter().find(|d| d.id == e.device_id)?.category;
                Some((e, category))
            })
            .collect();

        let mut created = Vec::with_capacity(missing.len());
        for routing_type in missing {
            let routing = plan::default_routing(*space_id, routing_type, &categorised);
            self.store.put_routing(&routing)?;
            created.push(routing);
        }

        tracing::info!(space_id = %space_id, created = created.len(), "Default routings created");
        Ok(created)
    }

    /// Plan and run a routing, moving the slot through ACTIVATING.
    async fn run(&self, routing: &RoutingDefinition) -> Result<ActivationResult> {
        let space_id = routing.space_id;
        let mut slot = self.slot(&space_id)?;

        slot.state = lifecycle::validate_transition(&space_id, slot.state, ActivationState::Activating)?;
        slot.pending_routing_id = Some(routing.routing_id);
        slot.activated_at = Some(Utc::now());
        slot.last_error = None;
        slot.steps_executed = 0;
        slot.steps_failed = 0;
        slot.steps_skipped = 0;
        slot.updated_at = Utc::now();
        self.store.put_active_routing(&slot)?;

        let outcome = match plan::build_plan(self.store, routing) {
            Ok(plan) => {
                let mut device_ids: Vec<DeviceId> = plan.steps.iter().map(|s| s.device_id).collect();
                device_ids.sort_unstable();
                device_ids.dedup();
                self.directory
                    .devices_by_ids(&device_ids)
                    .await
                    .map(|devices| (plan, devices))
            }
            Err(e) => Err(e),
        };

        let (plan, devices) = match outcome {
            Ok(ready) => ready,
            Err(e) => {
                slot.state = lifecycle::validate_transition(&space_id, slot.state, ActivationState::Failed)?;
                slot.pending_routing_id = None;
                slot.last_error = Some(e.to_string());
                slot.updated_at = Utc::now();
                self.store.put_active_routing(&slot)?;
                tracing::warn!(
                    space_id = %space_id,
                    routing_id = %routing.routing_id,
                    error = %e,
                    "Routing activation could not start"
                );
                return Err(e);
            }
        };

        let result = self.execute_plan(&plan, routing, devices).await;

        let settled = if result.success {
            ActivationState::Active
        } else {
            ActivationState::Failed
        };
        slot.state = lifecycle::validate_transition(&space_id, slot.state, settled)?;
        if result.success {
            slot.routing_id = Some(routing.routing_id);
        }
        slot.pending_routing_id = None;
        slot.last_error = if result.success { None } else { result.first_error() };
        slot.steps_executed = result.steps_executed;
        slot.steps_failed = result.steps_failed;
        slot.steps_skipped = result.steps_skipped;
        slot.updated_at = Utc::now();
        self.store.put_active_routing(&slot)?;

        tracing::info!(
            space_id = %space_id,
            routing_id = %routing.routing_id,
            success = result.success,
            executed = result.steps_executed,
            failed = result.steps_failed,
            skipped = result.steps_skipped,
            "Routing activation complete"
        );

        Ok(result)
    }

    /// Run a plan against the given devices.
    pub async fn execute_plan(
        &self,
        plan: &ActivationPlan,
        routing: &RoutingDefinition,
        mut devices: Vec<Device>,
    ) -> ActivationResult {
        let mut result = ActivationResult {
            success: false,
            routing_id: Some(plan.routing_id),
            routing_type: Some(plan.routing_type),
            steps_executed: 0,
            steps_failed: 0,
            steps_skipped: 0,
            step_results: Vec::with_capacity(plan.steps.len()),
            offline_device_ids: Vec::new(),
        };
        let mut critical_failed = false;

        for step in &plan.steps {
            let (status, error) = self
                .run_step(step, routing, &mut devices, &mut result.offline_device_ids)
                .await;

            match status {
                StepStatus::Success => result.steps_executed += 1,
                StepStatus::Failed => result.steps_failed += 1,
                StepStatus::Skipped => result.steps_skipped += 1,
            }
            tracing::debug!(
                routing_id = %plan.routing_id,
                order = step.order,
                status = ?status,
                "Step finished"
            );
            result.step_results.push(StepResult {
                order: step.order,
                device_id: step.device_id,
                kind: step.kind,
                status,
                error,
            });

            if status == StepStatus::Failed && step.critical {
                critical_failed = true;
                tracing::warn!(
                    routing_id = %plan.routing_id,
                    order = step.order,
                    "Critical step failed, aborting activation"
                );
                break;
            }
        }

        result.success = !critical_failed && (result.steps_failed == 0 || result.steps_executed > 0);
        result
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        routing: &RoutingDefinition,
        devices: &mut [Device],
        offline: &mut Vec<DeviceId>,
    ) -> (StepStatus, Option<String>) {
        let Some(slot) = devices.iter().position(|d| d.id == step.device_id) else {
            return (StepStatus::Failed, Some("device not found".into()));
        };

        if devices[slot].connection.is_offline() {
            if !offline.contains(&step.device_id) {
                offline.push(step.device_id);
            }
            match routing.offline_policy {
                OfflinePolicy::Fail if step.critical => {
                    return (StepStatus::Failed, Some("device offline".into()));
                }
                OfflinePolicy::Wait => match self.wait_for_device(&step.device_id).await {
                    Some(device) => devices[slot] = device,
                    None if step.critical => {
                        return (StepStatus::Failed, Some("device offline after waiting".into()));
                    }
                    None => return (StepStatus::Skipped, Some("device offline after waiting".into())),
                },
                OfflinePolicy::Skip | OfflinePolicy::Fail => {
                    return (StepStatus::Skipped, Some("device offline".into()));
                }
            }
        }
        let device = &devices[slot];

        if step.kind.is_input() && routing.input_policy == InputPolicy::Never {
            return (StepStatus::Skipped, Some("input switching disabled".into()));
        }

        let Some((channel, property)) = locate(device, step) else {
            return (StepStatus::Failed, Some("channel or property not found".into()));
        };

        if step.kind.is_input()
            && routing.input_policy == InputPolicy::IfDifferent
            && property.value.as_ref() == Some(&step.value)
        {
            return (StepStatus::Skipped, Some("input already selected".into()));
        }

        let command = PropertyCommand::new(device.id, channel.id, property.id, step.value.clone());
        match self.engine.dispatch(&[command]).await {
            Ok(()) => (StepStatus::Success, None),
            Err(reason) => (StepStatus::Failed, Some(reason)),
        }
    }

    /// Poll the directory until the device is online or the wait times out.
    async fn wait_for_device(&self, device_id: &DeviceId) -> Option<Device> {
        tracing::debug!(
            device_id = %device_id,
            timeout_ms = u64::try_from(self.wait.timeout.as_millis()).unwrap_or(u64::MAX),
            "Waiting for device to come online"
        );
        let deadline = tokio::time::Instant::now() + self.wait.timeout;

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.wait.poll_interval).await;
            match self.directory.devices_by_ids(&[*device_id]).await {
                Ok(found) => {
                    if let Some(device) = found
                        .into_iter()
                        .find(|d| d.id == *device_id && !d.connection.is_offline())
                    {
                        tracing::debug!(device_id = %device_id, "Device came online");
                        return Some(device);
                    }
                }
                Err(e) => tracing::warn!(device_id = %device_id, error = %e, "Device poll failed"),
            }
        }

        tracing::warn!(device_id = %device_id, "Device did not come online in time");
        None
    }
}
