//! Orchestration service.
//!
//! This module provides the `SpacesOrchestrator` trait and the
//! `OrchestratorService` implementation that ties the role registry, the
//! intent resolvers, the execution engine, media routing, undo and
//! suggestions together.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Timelike;
use serde::Serialize;
use spaces_core::{ChannelId, Device, DeviceId, PropertyCategory, PropertyValue, RoutingId, Space, SpaceId};
use spaces_store::{RoleAssignment, RoleDomain, RoutingDefinition, Store};

use crate::config::OrchestratorConfig;
use crate::directory::SpaceDirectory;
use crate::error::{OrchestratorError, Result};
use crate::execution::{Execution, ExecutionEngine, ExecutionResult, PlannedTarget, TargetStatus};
use crate::intent::climate::{self, ClimateIntent, ClimateIntentRequest, ClimateMode};
use crate::intent::covers::{self, CoverTarget, CoversIntent, CoversIntentRequest};
use crate::intent::lighting::{self, LightingIntent, LightingIntentRequest};
use crate::intent::media::{self, MediaIntent, MediaIntentRequest};
use crate::intent::{IntentCategory, IntentError, Resolution};
use crate::platform::DevicePlatform;
use crate::roles::{self, BulkRoleResult, PurgeSummary, RoleMap, SetRoleRequest};
use crate::routing::{ActivationPlan, ActivationResult, MediaRouter};
use crate::state::{self, ClimateState, CoversState, LightingState};
use crate::suggestion::{self, CooldownTracker, Feedback, FeedbackResult, Suggestion, SuggestionContext, SuggestionType};
use crate::undo::{self, TargetSnapshot, UndoEntry, UndoExecutionResult, UndoHistory, UndoPeek};

/// Result of a climate intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateExecutionResult {
    /// Execution counters.
    #[serde(flatten)]
    pub execution: ExecutionResult,
    /// Mode requested by the intent.
    pub mode: Option<ClimateMode>,
    /// Setpoint now in effect for the requested mode.
    pub new_setpoint: Option<f64>,
    /// Heating setpoint written.
    pub heating_setpoint: Option<f64>,
    /// Cooling setpoint written.
    pub cooling_setpoint: Option<f64>,
}

/// Result of a covers intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoversExecutionResult {
    /// Execution counters.
    #[serde(flatten)]
    pub execution: ExecutionResult,
    /// Rounded average position of covers that moved.
    pub new_position: Option<u8>,
}

/// Result of a media intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaExecutionResult {
    /// Execution counters.
    #[serde(flatten)]
    pub execution: ExecutionResult,
    /// Volume now in effect: the requested one, or the rounded average after a delta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_volume: Option<u8>,
    /// Mute state after a mute or unmute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

/// Trait defining the orchestration operations.
///
/// Not-found and validation problems are returned as errors. Per-device
/// problems never are; they show up in the result counters.
#[async_trait]
pub trait SpacesOrchestrator: Send + Sync {
    // =========================================================================
    // Role Registry
    // =========================================================================

    /// Assign a role to a device or channel.
    ///
    /// # Errors
    ///
    /// Returns `SpaceNotFound`, `DeviceNotFound`, or `Validation` when the role
    /// does not fit the device.
    async fn set_role(&self, space_id: &SpaceId, request: SetRoleRequest) -> Result<RoleAssignment>;

    /// Assign several roles, each independently.
    async fn bulk_set_roles(&self, space_id: &SpaceId, requests: Vec<SetRoleRequest>) -> Result<BulkRoleResult>;

    /// Remove a role assignment.
    ///
    /// # Errors
    ///
    /// Returns `RoleNotFound` if there is no such assignment.
    async fn delete_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<ChannelId>,
    ) -> Result<()>;

    /// Role assignments of a domain.
    async fn get_role_map(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<RoleMap>;

    /// Propose default roles for the devices of a space. Nothing is stored.
    async fn infer_default_roles(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<Vec<SetRoleRequest>>;

    /// Remove everything stored for a space.
    async fn purge_space(&self, space_id: &SpaceId) -> Result<PurgeSummary>;

    /// Remove every role referencing a device.
    async fn purge_device(&self, device_id: &DeviceId) -> Result<usize>;

    /// Remove every role referencing a channel.
    async fn purge_channel(&self, device_id: &DeviceId, channel_id: &ChannelId) -> Result<usize>;

    // =========================================================================
    // State
    // =========================================================================

    /// Lighting summary of a space.
    async fn lighting_state(&self, space_id: &SpaceId) -> Result<LightingState>;

    /// Climate summary of a space.
    async fn climate_state(&self, space_id: &SpaceId) -> Result<ClimateState>;

    /// Covers summary of a space.
    async fn covers_state(&self, space_id: &SpaceId) -> Result<CoversState>;

    // =========================================================================
    // Intents
    // =========================================================================

    /// Execute a lighting intent.
    async fn execute_lighting_intent(
        &self,
        space_id: &SpaceId,
        request: LightingIntentRequest,
    ) -> Result<ExecutionResult>;

    /// Execute a climate intent.
    async fn execute_climate_intent(
        &self,
        space_id: &SpaceId,
        request: ClimateIntentRequest,
    ) -> Result<ClimateExecutionResult>;

    /// Execute a covers intent.
    async fn execute_covers_intent(
        &self,
        space_id: &SpaceId,
        request: CoversIntentRequest,
    ) -> Result<CoversExecutionResult>;

    /// Execute a media intent.
    async fn execute_media_intent(
        &self,
        space_id: &SpaceId,
        request: MediaIntentRequest,
    ) -> Result<MediaExecutionResult>;

    // =========================================================================
    // Media
    // =========================================================================

    /// Plan a routing without running it.
    async fn build_plan(&self, routing_id: &RoutingId) -> Result<ActivationPlan>;

    /// Activate a routing.
    async fn activate_routing(&self, routing_id: &RoutingId) -> Result<ActivationResult>;

    /// Turn media off in a space.
    async fn deactivate_media(&self, space_id: &SpaceId) -> Result<ActivationResult>;

    /// The routing shown as active in a space.
    async fn get_active_routing(&self, space_id: &SpaceId) -> Result<Option<RoutingDefinition>>;

    /// Create missing WATCH, LISTEN and OFF routings.
    async fn ensure_default_routings(&self, space_id: &SpaceId) -> Result<Vec<RoutingDefinition>>;

    // =========================================================================
    // Undo
    // =========================================================================

    /// Show the pending undo entry.
    async fn peek_undo_entry(&self, space_id: &SpaceId) -> Result<Option<UndoPeek>>;

    /// Undo the last intent. `None` when there is nothing valid to undo.
    async fn execute_undo(&self, space_id: &SpaceId) -> Result<Option<UndoExecutionResult>>;

    // =========================================================================
    // Suggestions
    // =========================================================================

    /// Current suggestion for a space, using local time.
    async fn get_suggestion(&self, space_id: &SpaceId) -> Result<Option<Suggestion>>;

    /// Record feedback on a suggestion.
    async fn record_feedback(
        &self,
        space_id: &SpaceId,
        suggestion_type: SuggestionType,
        feedback: Feedback,
    ) -> Result<FeedbackResult>;
}

/// Implementation of the orchestrator over a store and device collaborators.
pub struct OrchestratorService<S: Store> {
    store: Arc<S>,
    directory: Arc<dyn SpaceDirectory>,
    engine: ExecutionEngine,
    config: OrchestratorConfig,
    undo: UndoHistory,
    cooldowns: CooldownTracker,
}

impl<S: Store> OrchestratorService<S> {
    /// Create a new orchestration service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        platform: Arc<dyn DevicePlatform>,
        directory: Arc<dyn SpaceDirectory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            directory,
            engine: ExecutionEngine::new(platform),
            undo: UndoHistory::new(config.undo_ttl()),
            cooldowns: CooldownTracker::new(config.suggestion_cooldown()),
            config,
        }
    }

    /// Create a service with default configuration.
    #[must_use]
    pub fn with_defaults(
        store: Arc<S>,
        platform: Arc<dyn DevicePlatform>,
        directory: Arc<dyn SpaceDirectory>,
    ) -> Self {
        Self::new(store, platform, directory, OrchestratorConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn router(&self) -> MediaRouter<'_, S> {
        MediaRouter::new(self.store.as_ref(), self.directory.as_ref(), &self.engine)
            .with_offline_wait(self.config.offline_wait())
    }

    async fn space(&self, space_id: &SpaceId) -> Result<Space> {
        self.directory
            .get_space(space_id)
            .await?
            .ok_or(OrchestratorError::SpaceNotFound(*space_id))
    }

    /// Space with its devices and the role map of one domain.
    async fn load(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<(Space, Vec<Device>, RoleMap)> {
        let space = self.space(space_id).await?;
        let devices = self.directory.devices_in_space(space_id).await?;
        let roles = roles::role_map(self.store.as_ref(), space_id, domain)?;
        Ok((space, devices, roles))
    }

    /// Keep the pre-intent state when the intent changed something and
    /// there is something to restore.
    fn commit_undo(
        &self,
        space_id: &SpaceId,
        category: IntentCategory,
        description: String,
        snapshot: Vec<TargetSnapshot>,
        result: &ExecutionResult,
    ) {
        if result.success && result.affected_devices > 0 && !snapshot.is_empty() {
            self.undo.capture(UndoEntry::new(*space_id, category, description, snapshot));
        }
    }

    async fn run_lighting(
        &self,
        space_id: &SpaceId,
        intent: std::result::Result<LightingIntent, IntentError>,
    ) -> Result<ExecutionResult> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Lighting).await?;
        let lights = lighting::collect_targets(&devices, &roles);

        let resolutions = match &intent {
            Ok(intent) => lighting::resolve(intent, &lights, &self.config),
            Err(error) => vec![Resolution::Failed(error.clone()); lights.len()],
        };

        let changing: Vec<_> = lights
            .iter()
            .zip(&resolutions)
            .filter(|(_, r)| writes(r))
            .map(|(light, _)| *light)
            .collect();
        let snapshot = undo::snapshot_lights(&changing);

        let targets: Vec<PlannedTarget> = lights
            .iter()
            .zip(resolutions)
            .map(|(light, resolution)| PlannedTarget::new(light.device, Some(light.channel.id), resolution))
            .collect();
        let Execution { result, .. } = self.engine.execute(space_id, &targets).await;

        if let Ok(intent) = &intent {
            self.commit_undo(space_id, IntentCategory::Lighting, intent.description(), snapshot, &result);
        }

        tracing::info!(
            space_id = %space_id,
            success = result.success,
            affected = result.affected_devices,
            failed = result.failed_devices,
            skipped = result.skipped_offline_devices,
            "Lighting intent executed"
        );
        Ok(result)
    }

    /// Suggestion for a space at a given local hour.
    ///
    /// # Errors
    ///
    /// Returns `SpaceNotFound` for an unknown space.
    pub async fn get_suggestion_at(&self, space_id: &SpaceId, hour: u32) -> Result<Option<Suggestion>> {
        let (space, devices, roles) = self.load(space_id, RoleDomain::Lighting).await?;
        if !space.suggestions_enabled {
            return Ok(None);
        }

        let lights = lighting::collect_targets(&devices, &roles);
        let context = SuggestionContext {
            space_name: &space.name,
            current_hour: hour,
            lights_on: lights.iter().any(|l| l.is_on()),
            average_brightness: state::on_brightness_average(&lights),
        };

        let Some(suggestion) = suggestion::evaluate(&context, &self.config.bedroom_patterns) else {
            tracing::debug!(space_id = %space_id, "No suggestion applicable");
            return Ok(None);
        };
        if self.cooldowns.is_on_cooldown(*space_id, suggestion.suggestion_type) {
            tracing::debug!(
                space_id = %space_id,
                suggestion = ?suggestion.suggestion_type,
                "Suggestion on cooldown"
            );
            return Ok(None);
        }

        tracing::info!(space_id = %space_id, suggestion = ?suggestion.suggestion_type, "Suggestion generated");
        Ok(Some(suggestion))
    }
}

/// Whether a resolution writes anything.
fn writes(resolution: &Resolution) -> bool {
    resolution.commands().is_some_and(|c| !c.is_empty())
}

/// Position a cover ends up at after its commands.
fn applied_position(cover: &CoverTarget<'_>, resolution: &Resolution) -> Option<f64> {
    let position_id = cover.channel.property(PropertyCategory::Position).map(|p| p.id);
    resolution.commands()?.iter().find_map(|command| {
        if Some(command.property_id) == position_id {
            return state::as_number(&command.value);
        }
        match &command.value {
            PropertyValue::Text(text) if text == "open" => Some(100.0),
            PropertyValue::Text(text) if text == "close" => Some(0.0),
            _ => None,
        }
    })
}

#[async_trait]
impl<S: Store + 'static> SpacesOrchestrator for OrchestratorService<S> {
    // =========================================================================
    // Role Registry
    // =========================================================================

    async fn set_role(&self, space_id: &SpaceId, request: SetRoleRequest) -> Result<RoleAssignment> {
        self.space(space_id).await?;
        let device = self
            .directory
            .devices_by_ids(&[request.device_id])
            .await?
            .into_iter()
            .next()
            .ok_or(OrchestratorError::DeviceNotFound(request.device_id))?;

        roles::set_role(self.store.as_ref(), space_id, &device, &request)
    }

    async fn bulk_set_roles(&self, space_id: &SpaceId, requests: Vec<SetRoleRequest>) -> Result<BulkRoleResult> {
        self.space(space_id).await?;
        let ids: Vec<DeviceId> = requests.iter().map(|r| r.device_id).collect();
        let devices = self.directory.devices_by_ids(&ids).await?;

        let result = roles::bulk_set_roles(self.store.as_ref(), space_id, &devices, &requests);
        tracing::info!(
            space_id = %space_id,
            total = result.total_count,
            succeeded = result.success_count,
            "Bulk role assignment complete"
        );
        Ok(result)
    }

    async fn delete_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<ChannelId>,
    ) -> Result<()> {
        roles::delete_role(self.store.as_ref(), space_id, domain, device_id, channel_id.as_ref())
    }

    async fn get_role_map(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<RoleMap> {
        roles::role_map(self.store.as_ref(), space_id, domain)
    }

    async fn infer_default_roles(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<Vec<SetRoleRequest>> {
        self.space(space_id).await?;
        let devices = self.directory.devices_in_space(space_id).await?;
        Ok(roles::infer_default_roles(domain, &devices))
    }

    async fn purge_space(&self, space_id: &SpaceId) -> Result<PurgeSummary> {
        let summary = roles::purge_space(self.store.as_ref(), space_id)?;
        self.undo.clear(space_id);
        self.cooldowns.clear_space(space_id);
        Ok(summary)
    }

    async fn purge_device(&self, device_id: &DeviceId) -> Result<usize> {
        roles::purge_device(self.store.as_ref(), device_id)
    }

    async fn purge_channel(&self, device_id: &DeviceId, channel_id: &ChannelId) -> Result<usize> {
        roles::purge_channel(self.store.as_ref(), device_id, channel_id)
    }

    // =========================================================================
    // State
    // =========================================================================

    async fn lighting_state(&self, space_id: &SpaceId) -> Result<LightingState> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Lighting).await?;
        Ok(state::lighting_state(&devices, &roles))
    }

    async fn climate_state(&self, space_id: &SpaceId) -> Result<ClimateState> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Climate).await?;
        Ok(state::climate_state(&devices, &roles, &self.config))
    }

    async fn covers_state(&self, space_id: &SpaceId) -> Result<CoversState> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Covers).await?;
        Ok(state::covers_state(&devices, &roles))
    }

    // =========================================================================
    // Intents
    // =========================================================================

    async fn execute_lighting_intent(
        &self,
        space_id: &SpaceId,
        request: LightingIntentRequest,
    ) -> Result<ExecutionResult> {
        self.run_lighting(space_id, LightingIntent::try_from(request)).await
    }

    async fn execute_climate_intent(
        &self,
        space_id: &SpaceId,
        request: ClimateIntentRequest,
    ) -> Result<ClimateExecutionResult> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Climate).await?;
        let climate_targets = climate::collect_targets(&devices, &roles);
        let intent = ClimateIntent::try_from(request);

        let resolutions = match &intent {
            Ok(intent) => climate::resolve(intent, &climate_targets, &self.config),
            Err(error) => climate_targets
                .iter()
                .map(|_| climate::ClimateResolution {
                    resolution: Resolution::Failed(error.clone()),
                    heating: None,
                    cooling: None,
                })
                .collect(),
        };

        let changing: Vec<_> = climate_targets
            .iter()
            .zip(&resolutions)
            .filter(|(_, r)| writes(&r.resolution))
            .map(|(target, _)| *target)
            .collect();
        let snapshot = undo::snapshot_climate(&changing);

        let targets: Vec<PlannedTarget> = climate_targets
            .iter()
            .zip(&resolutions)
            .map(|(target, r)| PlannedTarget::new(target.device, None, r.resolution.clone()))
            .collect();
        let Execution { result, statuses } = self.engine.execute(space_id, &targets).await;

        let applied = || {
            resolutions
                .iter()
                .zip(&statuses)
                .filter(|(_, status)| **status == TargetStatus::Affected)
                .map(|(r, _)| r)
        };
        let heating_setpoint = applied().find_map(|r| r.heating);
        let cooling_setpoint = applied().find_map(|r| r.cooling);

        let mode = intent.as_ref().ok().and_then(ClimateIntent::requested_mode);
        let new_setpoint = if mode == Some(ClimateMode::Cool) {
            cooling_setpoint.or(heating_setpoint)
        } else {
            heating_setpoint.or(cooling_setpoint)
        };

        if let Ok(intent) = &intent {
            self.commit_undo(space_id, IntentCategory::Climate, intent.description(), snapshot, &result);
        }

        tracing::info!(
            space_id = %space_id,
            success = result.success,
            affected = result.affected_devices,
            failed = result.failed_devices,
            skipped = result.skipped_offline_devices,
            "Climate intent executed"
        );

        Ok(ClimateExecutionResult {
            execution: result,
            mode,
            new_setpoint,
            heating_setpoint,
            cooling_setpoint,
        })
    }

    async fn execute_covers_intent(
        &self,
        space_id: &SpaceId,
        request: CoversIntentRequest,
    ) -> Result<CoversExecutionResult> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Covers).await?;
        let covers_targets = covers::collect_targets(&devices, &roles);
        let intent = CoversIntent::try_from(request);

        let resolutions = match &intent {
            Ok(intent) => covers::resolve(intent, &covers_targets, &self.config),
            Err(error) => vec![Resolution::Failed(error.clone()); covers_targets.len()],
        };

        let changing: Vec<_> = covers_targets
            .iter()
            .zip(&resolutions)
            .filter(|(_, r)| writes(r))
            .map(|(cover, _)| *cover)
            .collect();
        let snapshot = undo::snapshot_covers(&changing);

        let targets: Vec<PlannedTarget> = covers_targets
            .iter()
            .zip(&resolutions)
            .map(|(cover, r)| PlannedTarget::new(cover.device, Some(cover.channel.id), r.clone()))
            .collect();
        let Execution { result, statuses } = self.engine.execute(space_id, &targets).await;

        let positions: Vec<f64> = covers_targets
            .iter()
            .zip(&resolutions)
            .zip(&statuses)
            .filter(|(_, status)| **status == TargetStatus::Affected)
            .filter_map(|((cover, r), _)| applied_position(cover, r))
            .collect();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let new_position = (!positions.is_empty())
            .then(|| (positions.iter().sum::<f64>() / positions.len() as f64).round().clamp(0.0, 100.0) as u8);

        if let Ok(intent) = &intent {
            self.commit_undo(space_id, IntentCategory::Covers, intent.description(), snapshot, &result);
        }

        tracing::info!(
            space_id = %space_id,
            success = result.success,
            affected = result.affected_devices,
            failed = result.failed_devices,
            skipped = result.skipped_offline_devices,
            "Covers intent executed"
        );

        Ok(CoversExecutionResult {
            execution: result,
            new_position,
        })
    }

    async fn execute_media_intent(
        &self,
        space_id: &SpaceId,
        request: MediaIntentRequest,
    ) -> Result<MediaExecutionResult> {
        let (_, devices, roles) = self.load(space_id, RoleDomain::Media).await?;
        let media_targets = media::collect_targets(&devices, &roles);
        let intent = MediaIntent::try_from(request);

        let resolutions = match &intent {
            Ok(intent) => media::resolve(intent, &media_targets, &self.config),
            Err(error) => vec![Resolution::Failed(error.clone()); media_targets.len()],
        };

        let targets: Vec<PlannedTarget> = media_targets
            .iter()
            .zip(&resolutions)
            .map(|(target, r)| PlannedTarget::new(target.device, Some(target.channel.id), r.clone()))
            .collect();
        let Execution { result, statuses } = self.engine.execute(space_id, &targets).await;

        let volumes: Vec<f64> = media_targets
            .iter()
            .zip(&resolutions)
            .zip(&statuses)
            .filter(|(_, status)| **status == TargetStatus::Affected)
            .filter_map(|((target, r), _)| target.applied_volume(r))
            .collect();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let average_volume = (!volumes.is_empty())
            .then(|| (volumes.iter().sum::<f64>() / volumes.len() as f64).round().clamp(0.0, 100.0) as u8);
        let new_volume = match &intent {
            Ok(MediaIntent::VolumeSet(volume)) => Some(*volume),
            Ok(MediaIntent::VolumeDelta { .. }) => average_volume,
            _ => None,
        };
        let is_muted = match &intent {
            Ok(MediaIntent::Mute) => Some(true),
            Ok(MediaIntent::Unmute) => Some(false),
            _ => None,
        };

        tracing::info!(
            space_id = %space_id,
            success = result.success,
            affected = result.affected_devices,
            failed = result.failed_devices,
            skipped = result.skipped_offline_devices,
            "Media intent executed"
        );

        Ok(MediaExecutionResult {
            execution: result,
            new_volume,
            is_muted,
        })
    }

    // =========================================================================
    // Media
    // =========================================================================

    async fn build_plan(&self, routing_id: &RoutingId) -> Result<ActivationPlan> {
        self.router().build_plan(routing_id)
    }

    async fn activate_routing(&self, routing_id: &RoutingId) -> Result<ActivationResult> {
        self.router().activate(routing_id).await
    }

    async fn deactivate_media(&self, space_id: &SpaceId) -> Result<ActivationResult> {
        self.router().deactivate(space_id).await
    }

    async fn get_active_routing(&self, space_id: &SpaceId) -> Result<Option<RoutingDefinition>> {
        self.router().active_routing(space_id)
    }

    async fn ensure_default_routings(&self, space_id: &SpaceId) -> Result<Vec<RoutingDefinition>> {
        self.space(space_id).await?;
        self.router().ensure_defaults(space_id).await
    }

    // =========================================================================
    // Undo
    // =========================================================================

    async fn peek_undo_entry(&self, space_id: &SpaceId) -> Result<Option<UndoPeek>> {
        Ok(self.undo.peek(space_id))
    }

    async fn execute_undo(&self, space_id: &SpaceId) -> Result<Option<UndoExecutionResult>> {
        let Some(entry) = self.undo.take(space_id) else {
            tracing::debug!(space_id = %space_id, "No undo entry available");
            return Ok(None);
        };
        Ok(Some(undo::restore(&entry, self.directory.as_ref(), &self.engine).await))
    }

    // =========================================================================
    // Suggestions
    // =========================================================================

    async fn get_suggestion(&self, space_id: &SpaceId) -> Result<Option<Suggestion>> {
        self.get_suggestion_at(space_id, chrono::Local::now().hour()).await
    }

    async fn record_feedback(
        &self,
        space_id: &SpaceId,
        suggestion_type: SuggestionType,
        feedback: Feedback,
    ) -> Result<FeedbackResult> {
        self.space(space_id).await?;
        tracing::info!(
            space_id = %space_id,
            suggestion = ?suggestion_type,
            feedback = ?feedback,
            "Recording suggestion feedback"
        );

        match feedback {
            Feedback::Dismissed => {
                self.cooldowns.set_cooldown(*space_id, suggestion_type);
                Ok(FeedbackResult {
                    success: true,
                    intent_executed: None,
                })
            }
            Feedback::Applied => {
                let executed = match self.run_lighting(space_id, Ok(suggestion_type.intent())).await {
                    Ok(result) => result.success,
                    Err(e) => {
                        tracing::error!(space_id = %space_id, error = %e, "Suggested intent failed");
                        false
                    }
                };
                if executed {
                    self.cooldowns.set_cooldown(*space_id, suggestion_type);
                }
                Ok(FeedbackResult {
                    success: true,
                    intent_executed: Some(executed),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::intent::climate::ClimateIntentType;
    use crate::intent::covers::CoversIntentType;
    use crate::intent::fixtures::{blind, dimmable_light, shutter, switch_light, thermostat};
    use crate::intent::lighting::{LightingIntentType, LightingMode};
    use crate::intent::DeltaSize;
    use crate::platform::MockDevicePlatform;
    use spaces_core::ConnectionState;
    use spaces_store::{LightingRole, RocksStore, Role};
    use tempfile::TempDir;

    struct Harness {
        service: OrchestratorService<RocksStore>,
        directory: Arc<InMemoryDirectory>,
        platform: Arc<MockDevicePlatform>,
        space: Space,
        _dir: TempDir,
    }

    fn setup_named(name: &str) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let directory = Arc::new(InMemoryDirectory::new());
        let platform = Arc::new(MockDevicePlatform::mirroring(directory.clone()));
        let space = Space::room(name);
        directory.insert_space(space.clone()).unwrap();
        let service = OrchestratorService::with_defaults(store, platform.clone(), directory.clone());
        Harness {
            service,
            directory,
            platform,
            space,
            _dir: dir,
        }
    }

    fn setup() -> Harness {
        setup_named("Living room")
    }

    impl Harness {
        fn add(&self, device: Device) -> Device {
            self.directory.insert_device(device.clone());
            device
        }

        fn current(&self, device: &Device) -> Device {
            self.directory.device(&device.id).unwrap()
        }
    }

    fn mode(mode: LightingMode) -> LightingIntentRequest {
        LightingIntent::SetMode { mode }.into()
    }

    fn value(device: &Device, category: PropertyCategory) -> Option<PropertyValue> {
        device
            .channels
            .iter()
            .find_map(|c| c.property(category))
            .and_then(|p| p.value.clone())
    }

    #[tokio::test]
    async fn empty_space_is_vacuous_success() {
        let h = setup();
        let result = h
            .service
            .execute_lighting_intent(&h.space.id, LightingIntent::Off.into())
            .await
            .unwrap();
        assert_eq!(result, ExecutionResult::vacuous());
    }

    #[tokio::test]
    async fn unknown_space_is_not_found() {
        let h = setup();
        let err = h
            .service
            .execute_lighting_intent(&SpaceId::generate(), LightingIntent::On.into())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SpaceNotFound(_)));
    }

    #[tokio::test]
    async fn work_mode_on_mixed_lights() {
        let h = setup();
        let dimmable = h.add(dimmable_light(h.space.id, "Ceiling", false, 50.0));
        let switch = h.add(switch_light(h.space.id, "Lamp", false));

        let result = h
            .service
            .execute_lighting_intent(&h.space.id, mode(LightingMode::Work))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.affected_devices, 2);
        assert_eq!(result.failed_devices, 0);
        assert_eq!(h.platform.commands_for(&dimmable.id).len(), 2);
        assert_eq!(h.platform.commands_for(&switch.id).len(), 1);
        assert_eq!(
            value(&h.current(&dimmable), PropertyCategory::Brightness),
            Some(PropertyValue::Number(100.0))
        );
    }

    #[tokio::test]
    async fn missing_field_fails_every_target() {
        let h = setup();
        h.add(dimmable_light(h.space.id, "Ceiling", true, 50.0));
        h.add(switch_light(h.space.id, "Lamp", true));

        let result = h
            .service
            .execute_lighting_intent(&h.space.id, LightingIntentRequest::new(LightingIntentType::SetMode))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failed_devices, 2);
        assert!(h.platform.batches().is_empty());
        assert!(h.service.peek_undo_entry(&h.space.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_lights_are_skipped() {
        let h = setup();
        let mut light = dimmable_light(h.space.id, "Ceiling", true, 50.0);
        light.connection = ConnectionState::Lost;
        h.add(light.clone());

        let result = h
            .service
            .execute_lighting_intent(&h.space.id, LightingIntent::Off.into())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.skipped_offline_devices, 1);
        assert_eq!(result.offline_device_ids, vec![light.id]);
    }

    #[tokio::test]
    async fn undo_restores_previous_lighting() {
        let h = setup();
        let light = h.add(dimmable_light(h.space.id, "Ceiling", true, 80.0));

        h.service
            .execute_lighting_intent(&h.space.id, LightingIntent::Off.into())
            .await
            .unwrap();
        assert_eq!(value(&h.current(&light), PropertyCategory::On), Some(PropertyValue::Bool(false)));

        let peek = h.service.peek_undo_entry(&h.space.id).await.unwrap().unwrap();
        assert_eq!(peek.action_description, "Turn lights off");
        assert_eq!(peek.intent_category, IntentCategory::Lighting);

        let undo = h.service.execute_undo(&h.space.id).await.unwrap().unwrap();
        assert!(undo.success);
        assert_eq!(undo.restored_devices, 1);

        let restored = h.current(&light);
        assert_eq!(value(&restored, PropertyCategory::On), Some(PropertyValue::Bool(true)));
        assert_eq!(value(&restored, PropertyCategory::Brightness), Some(PropertyValue::Number(80.0)));

        assert!(h.service.execute_undo(&h.space.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn brightness_delta_clamps_at_full() {
        let h = setup();
        let light = h.add(dimmable_light(h.space.id, "Ceiling", true, 90.0));

        let request = LightingIntent::BrightnessDelta {
            delta: DeltaSize::Large,
            increase: true,
        };
        let result = h
            .service
            .execute_lighting_intent(&h.space.id, request.into())
            .await
            .unwrap();

        assert!(result.success);
        let commands = h.platform.commands_for(&light.id);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].value, PropertyValue::Number(100.0));
    }

    #[tokio::test]
    async fn brightness_delta_counts_lights_that_are_off() {
        let h = setup();
        let ceiling = h.add(dimmable_light(h.space.id, "Ceiling", true, 40.0));
        let lamp = h.add(dimmable_light(h.space.id, "Lamp", false, 30.0));
        h.add(switch_light(h.space.id, "Strip", true));

        let request = LightingIntent::BrightnessDelta {
            delta: DeltaSize::Small,
            increase: false,
        };
        let result = h
            .service
            .execute_lighting_intent(&h.space.id, request.into())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.affected_devices, 3);
        assert_eq!(result.failed_devices, 0);
        assert_eq!(h.platform.batches().len(), 1);
        assert_eq!(h.platform.commands_for(&ceiling.id)[0].value, PropertyValue::Number(30.0));
        assert!(h.platform.commands_for(&lamp.id).is_empty());
    }

    #[tokio::test]
    async fn delta_with_every_light_off_keeps_no_undo_entry() {
        let h = setup();
        h.add(dimmable_light(h.space.id, "Lamp", false, 30.0));

        let request = LightingIntent::BrightnessDelta {
            delta: DeltaSize::Small,
            increase: true,
        };
        let result = h
            .service
            .execute_lighting_intent(&h.space.id, request.into())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.affected_devices, 1);
        assert!(h.platform.batches().is_empty());
        assert!(h.service.peek_undo_entry(&h.space.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn climate_setpoint_reports_written_values() {
        let h = setup();
        h.add(thermostat(h.space.id, 20.0, 24.0));

        let mut request = ClimateIntentRequest::new(ClimateIntentType::SetpointSet);
        request.value = Some(21.3);
        let result = h.service.execute_climate_intent(&h.space.id, request).await.unwrap();

        assert!(result.execution.success);
        assert_eq!(result.heating_setpoint, Some(21.5));
        assert_eq!(result.new_setpoint, Some(21.5));
        assert_eq!(result.mode, None);

        let peek = h.service.peek_undo_entry(&h.space.id).await.unwrap().unwrap();
        assert_eq!(peek.intent_category, IntentCategory::Climate);

        let state = h.service.climate_state(&h.space.id).await.unwrap();
        assert_eq!(state.heating_setpoint, Some(21.5));
    }

    #[tokio::test]
    async fn climate_mode_reports_requested_mode() {
        let h = setup();
        h.add(thermostat(h.space.id, 20.0, 24.0));

        let mut request = ClimateIntentRequest::new(ClimateIntentType::SetMode);
        request.mode = Some(ClimateMode::Cool);
        let result = h.service.execute_climate_intent(&h.space.id, request).await.unwrap();

        assert!(result.execution.success);
        assert_eq!(result.mode, Some(ClimateMode::Cool));
        assert_eq!(h.service.climate_state(&h.space.id).await.unwrap().mode, ClimateMode::Cool);
    }

    #[tokio::test]
    async fn covers_report_average_new_position() {
        let h = setup();
        h.add(blind(h.space.id, "Left", 10.0));
        h.add(blind(h.space.id, "Right", 90.0));
        let shutter = h.add(shutter(h.space.id, "Shutter"));

        let mut request = CoversIntentRequest::new(CoversIntentType::SetPosition);
        request.position = Some(40);
        let result = h.service.execute_covers_intent(&h.space.id, request).await.unwrap();

        assert!(result.execution.success);
        assert_eq!(result.execution.affected_devices, 2);
        assert_eq!(result.new_position, Some(40));
        assert!(h.platform.commands_for(&shutter.id).is_empty());

        let opened = h
            .service
            .execute_covers_intent(&h.space.id, CoversIntentRequest::new(CoversIntentType::Open))
            .await
            .unwrap();
        assert_eq!(opened.execution.affected_devices, 3);
        assert_eq!(opened.new_position, Some(100));
    }

    #[tokio::test]
    async fn media_mode_follows_roles() {
        use crate::intent::fixtures::{channel, device, property};
        use crate::intent::media::{MediaIntentType, MediaMode};
        use spaces_core::{ChannelCategory, DeviceCategory};
        use spaces_store::MediaRole;

        let h = setup();
        let tv = h.add(device(
            h.space.id,
            "TV",
            DeviceCategory::Television,
            vec![channel(
                ChannelCategory::Television,
                vec![
                    property(PropertyCategory::On, Some(false.into())),
                    property(PropertyCategory::Volume, Some(10u8.into())),
                ],
            )],
        ));
        let speaker = h.add(device(
            h.space.id,
            "Kitchen speaker",
            DeviceCategory::Speaker,
            vec![channel(
                ChannelCategory::Speaker,
                vec![property(PropertyCategory::Volume, Some(60u8.into()))],
            )],
        ));
        h.service
            .set_role(
                &h.space.id,
                SetRoleRequest {
                    device_id: speaker.id,
                    channel_id: None,
                    role: Role::Media(MediaRole::Background),
                    priority: None,
                },
            )
            .await
            .unwrap();

        let mut request = MediaIntentRequest::new(MediaIntentType::SetMode);
        request.mode = Some(MediaMode::Background);
        let result = h.service.execute_media_intent(&h.space.id, request).await.unwrap();

        assert!(result.execution.success);
        // The unassigned TV takes the secondary rule and is switched off
        assert_eq!(result.execution.affected_devices, 2);
        assert_eq!(value(&h.current(&tv), PropertyCategory::On), Some(PropertyValue::Bool(false)));
        assert_eq!(value(&h.current(&speaker), PropertyCategory::Volume), Some(PropertyValue::Number(30.0)));
    }

    #[tokio::test]
    async fn media_volume_delta_reports_average_and_skips_offline() {
        use crate::intent::fixtures::{channel, device, property};
        use crate::intent::media::MediaIntentType;
        use spaces_core::{ChannelCategory, DeviceCategory};

        let h = setup();
        let speaker = |name: &str, volume: u8| {
            device(
                h.space.id,
                name,
                DeviceCategory::Speaker,
                vec![channel(
                    ChannelCategory::Speaker,
                    vec![property(PropertyCategory::Volume, Some(volume.into()))],
                )],
            )
        };
        h.add(speaker("Left", 20));
        h.add(speaker("Right", 40));
        let mut away = speaker("Away", 50);
        away.connection = ConnectionState::Disconnected;
        let away = h.add(away);

        let mut request = MediaIntentRequest::new(MediaIntentType::VolumeDelta);
        request.delta = Some(DeltaSize::Medium);
        request.increase = Some(true);
        let result = h.service.execute_media_intent(&h.space.id, request).await.unwrap();

        assert!(result.execution.success);
        assert_eq!(result.execution.affected_devices, 2);
        assert_eq!(result.execution.skipped_offline_devices, 1);
        assert_eq!(result.execution.offline_device_ids, vec![away.id]);
        assert_eq!(result.new_volume, Some(40));
        assert!(h.platform.commands_for(&away.id).is_empty());

        let missing = h
            .service
            .execute_media_intent(&h.space.id, MediaIntentRequest::new(MediaIntentType::VolumeSet))
            .await
            .unwrap();
        assert!(!missing.execution.success);
        assert_eq!(missing.execution.failed_devices, 2);
        assert_eq!(missing.new_volume, None);
    }

    #[tokio::test]
    async fn roles_round_trip_through_registry() {
        let h = setup();
        let main = h.add(dimmable_light(h.space.id, "Ceiling", true, 50.0));
        let lamp = h.add(switch_light(h.space.id, "Lamp", true));

        let proposals = h
            .service
            .infer_default_roles(&h.space.id, RoleDomain::Lighting)
            .await
            .unwrap();
        assert_eq!(proposals.len(), 2);

        let bulk = h.service.bulk_set_roles(&h.space.id, proposals).await.unwrap();
        assert!(bulk.success);
        assert_eq!(bulk.success_count, 2);

        let map = h.service.get_role_map(&h.space.id, RoleDomain::Lighting).await.unwrap();
        let main_role = map.get(&main.id, Some(&main.channels[0].id)).unwrap();
        assert_eq!(main_role.role, Role::Lighting(LightingRole::Main));
        assert!(map.get(&lamp.id, Some(&lamp.channels[0].id)).is_some());

        h.service
            .delete_role(&h.space.id, RoleDomain::Lighting, &lamp.id, Some(lamp.channels[0].id))
            .await
            .unwrap();
        let err = h
            .service
            .delete_role(&h.space.id, RoleDomain::Lighting, &lamp.id, Some(lamp.channels[0].id))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(h.service.purge_device(&main.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_role_rejects_unknown_device() {
        let h = setup();
        let request = SetRoleRequest {
            device_id: DeviceId::generate(),
            channel_id: None,
            role: Role::Lighting(LightingRole::Main),
            priority: None,
        };
        let err = h.service.set_role(&h.space.id, request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn purge_space_clears_undo() {
        let h = setup();
        h.add(dimmable_light(h.space.id, "Ceiling", true, 80.0));
        h.service
            .execute_lighting_intent(&h.space.id, LightingIntent::Off.into())
            .await
            .unwrap();

        h.service.purge_space(&h.space.id).await.unwrap();
        assert!(h.service.peek_undo_entry(&h.space.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bedroom_suggestion_and_feedback() {
        let h = setup_named("Master Bedroom");
        h.add(dimmable_light(h.space.id, "Bedside", true, 40.0));

        let suggestion = h.service.get_suggestion_at(&h.space.id, 22).await.unwrap().unwrap();
        assert_eq!(suggestion.suggestion_type, SuggestionType::LightingNight);

        let feedback = h
            .service
            .record_feedback(&h.space.id, SuggestionType::LightingNight, Feedback::Dismissed)
            .await
            .unwrap();
        assert!(feedback.success);
        assert_eq!(feedback.intent_executed, None);
        assert!(h.service.get_suggestion_at(&h.space.id, 22).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn applied_suggestion_runs_intent() {
        let h = setup_named("Kitchen");
        let light = h.add(dimmable_light(h.space.id, "Ceiling", true, 90.0));

        let suggestion = h.service.get_suggestion_at(&h.space.id, 23).await.unwrap().unwrap();
        assert_eq!(suggestion.suggestion_type, SuggestionType::LightingOff);

        let feedback = h
            .service
            .record_feedback(&h.space.id, SuggestionType::LightingOff, Feedback::Applied)
            .await
            .unwrap();
        assert_eq!(feedback.intent_executed, Some(true));
        assert_eq!(value(&h.current(&light), PropertyCategory::On), Some(PropertyValue::Bool(false)));
        assert!(h.service.get_suggestion_at(&h.space.id, 23).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn relax_threshold_uses_exact_average() {
        let h = setup_named("Living room");
        h.add(dimmable_light(h.space.id, "Ceiling", true, 69.0));
        let lamp = h.add(dimmable_light(h.space.id, "Lamp", true, 70.0));

        // 69.5 reads as 70 in the summary but stays below the threshold
        assert_eq!(
            h.service.lighting_state(&h.space.id).await.unwrap().average_brightness,
            Some(70.0)
        );
        assert!(h.service.get_suggestion_at(&h.space.id, 18).await.unwrap().is_none());

        h.add(dimmable_light(h.space.id, "Floor", true, 71.0));
        let suggestion = h.service.get_suggestion_at(&h.space.id, 18).await.unwrap().unwrap();
        assert_eq!(suggestion.suggestion_type, SuggestionType::LightingRelax);
        assert!(h.platform.commands_for(&lamp.id).is_empty());
    }

    #[tokio::test]
    async fn disabled_suggestions_return_none() {
        let h = setup_named("Bedroom");
        let mut space = h.space.clone();
        space.suggestions_enabled = false;
        h.directory.insert_space(space).unwrap();
        h.add(dimmable_light(h.space.id, "Bedside", true, 40.0));

        assert!(h.service.get_suggestion_at(&h.space.id, 22).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn default_routings_need_a_known_space() {
        let h = setup();
        let err = h
            .service
            .ensure_default_routings(&SpaceId::generate())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let created = h.service.ensure_default_routings(&h.space.id).await.unwrap();
        assert_eq!(created.len(), 3);
        assert!(h.service.get_active_routing(&h.space.id).await.unwrap().is_none());
    }
}
