//! Role registry.
//!
//! Roles label devices and channels within a space so intents can be resolved
//! by function ("main light", "primary thermostat") rather than per device.
//! Every write is validated against the device model before it reaches the
//! store.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spaces_core::{ChannelCategory, ChannelId, Device, DeviceCategory, DeviceId, SpaceId};
use spaces_store::{
    ClimateRole, CoversRole, LightingRole, MediaRole, Role, RoleAssignment, RoleDomain, Store,
    StoreError,
};

use crate::error::{OrchestratorError, Result};

/// Role assignments of one space and domain.
///
/// Keeps the order the assignments were given in (the store lists them by
/// role, then priority) next to a lookup index by target.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    ordered: Vec<RoleAssignment>,
    index: HashMap<(DeviceId, Option<ChannelId>), usize>,
}

impl RoleMap {
    /// Build a map from assignments. A later assignment for the same target
    /// replaces the earlier one in place.
    pub fn from_assignments(assignments: impl IntoIterator<Item = RoleAssignment>) -> Self {
        let mut map = Self::default();
        for assignment in assignments {
            let key = (assignment.device_id, assignment.channel_id);
            if let Some(&slot) = map.index.get(&key) {
                map.ordered[slot] = assignment;
            } else {
                map.index.insert(key, map.ordered.len());
                map.ordered.push(assignment);
            }
        }
        map
    }

    /// Role of a channel, falling back to the device-level role.
    #[must_use]
    pub fn get(&self, device_id: &DeviceId, channel_id: Option<&ChannelId>) -> Option<&RoleAssignment> {
        channel_id
            .and_then(|c| self.index.get(&(*device_id, Some(*c))))
            .or_else(|| self.index.get(&(*device_id, None)))
            .map(|&slot| &self.ordered[slot])
    }

    /// Whether no roles are assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Iterate over the assignments in order.
    pub fn assignments(&self) -> impl Iterator<Item = &RoleAssignment> {
        self.ordered.iter()
    }
}

/// Request to assign a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRoleRequest {
    /// Device to label.
    pub device_id: DeviceId,
    /// Channel to label; `None` for a device-level role.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// The role.
    pub role: Role,
    /// Priority; defaults to 0.
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Outcome of one item of a bulk assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkRoleItem {
    /// Device of the item.
    pub device_id: DeviceId,
    /// Channel of the item.
    pub channel_id: Option<ChannelId>,
    /// Whether the assignment was stored.
    pub success: bool,
    /// Stored role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Why the assignment was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a bulk assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkRoleResult {
    /// Overall success: at least one item succeeded, or there were none.
    pub success: bool,
    /// Number of items.
    pub total_count: usize,
    /// Items stored.
    pub success_count: usize,
    /// Items rejected.
    pub failure_count: usize,
    /// Per-item outcomes, in request order.
    pub items: Vec<BulkRoleItem>,
}

/// What a space purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    /// Role assignments removed.
    pub roles: usize,
    /// Media endpoints removed.
    pub endpoints: usize,
    /// Routings removed.
    pub routings: usize,
}

/// Check that `role` can be assigned to the device (or channel) in the space.
///
/// # Errors
///
/// Returns `OrchestratorError::Validation` if the device is in another space,
/// the role does not fit the device, or the channel is missing or wrong for the role.
pub fn validate_role(
    space_id: &SpaceId,
    device: &Device,
    channel_id: Option<&ChannelId>,
    role: Role,
) -> Result<()> {
    if device.space_id != Some(*space_id) {
        return Err(OrchestratorError::Validation(format!(
            "device {} is not in space {space_id}",
            device.id
        )));
    }

    let channel = match channel_id {
        Some(id) => Some(device.channel(id).ok_or(OrchestratorError::ChannelNotFound {
            device_id: device.id,
            channel_id: *id,
        })?),
        None => None,
    };

    match role {
        Role::Lighting(_) => {
            if device.category != DeviceCategory::Lighting {
                return Err(invalid(device, "lighting roles need a lighting device"));
            }
            let has_light = channel.map_or_else(
                || device.first_channel(ChannelCategory::Light).is_some(),
                |c| c.category == ChannelCategory::Light,
            );
            if !has_light {
                return Err(invalid(device, "lighting roles need a light channel"));
            }
        }
        Role::Covers(_) => {
            if device.category != DeviceCategory::WindowCovering {
                return Err(invalid(device, "covers roles need a window covering device"));
            }
        }
        Role::Media(_) => {
            if !device.category.is_media_device() {
                return Err(invalid(device, "media roles need a media device"));
            }
            if channel.is_some_and(|c| !is_media_channel(c.category)) {
                return Err(invalid(device, "media roles need a media channel"));
            }
        }
        Role::Climate(climate) => {
            if !device.category.is_climate_device() {
                return Err(invalid(device, "climate roles need a climate device"));
            }
            match (climate.is_sensor(), channel) {
                (true, None) => {
                    return Err(invalid(device, "sensor roles must name a channel"));
                }
                (false, Some(_)) => {
                    return Err(invalid(device, "climate actuator roles are device-level"));
                }
                (true, Some(_)) | (false, None) => {}
            }
        }
    }

    Ok(())
}

const fn is_media_channel(category: ChannelCategory) -> bool {
    matches!(
        category,
        ChannelCategory::Television
            | ChannelCategory::Speaker
            | ChannelCategory::MediaInput
            | ChannelCategory::MediaPlayback
    )
}

fn invalid(device: &Device, reason: &str) -> OrchestratorError {
    OrchestratorError::Validation(format!("device {}: {reason}", device.id))
}

/// Assign a role, replacing any previous role of the same target in the domain.
///
/// # Errors
///
/// Returns `OrchestratorError::Validation` if the role does not fit the device,
/// or a store error if the write fails.
pub fn set_role<S: Store>(
    store: &S,
    space_id: &SpaceId,
    device: &Device,
    request: &SetRoleRequest,
) -> Result<RoleAssignment> {
    if request.device_id != device.id {
        return Err(OrchestratorError::Validation(format!(
            "request targets device {} but device {} was supplied",
            request.device_id, device.id
        )));
    }
    validate_role(space_id, device, request.channel_id.as_ref(), request.role)?;

    let now = Utc::now();
    let existing = store.get_role(
        space_id,
        request.role.domain(),
        &device.id,
        request.channel_id.as_ref(),
    )?;

    let assignment = RoleAssignment {
        space_id: *space_id,
        device_id: device.id,
        channel_id: request.channel_id,
        role: request.role,
        priority: request.priority.unwrap_or(0),
        created_at: existing.map_or(now, |e| e.created_at),
        updated_at: now,
    };
    store.put_role(&assignment)?;

    tracing::debug!(
        space_id = %space_id,
        device_id = %device.id,
        role = ?assignment.role,
        "Role assigned"
    );

    Ok(assignment)
}

/// Assign many roles, each independently.
///
/// Requests naming a device outside `devices` fail individually.
pub fn bulk_set_roles<S: Store>(
    store: &S,
    space_id: &SpaceId,
    devices: &[Device],
    requests: &[SetRoleRequest],
) -> BulkRoleResult {
    let items: Vec<BulkRoleItem> = requests
        .iter()
        .map(|request| {
            let outcome = devices
                .iter()
                .find(|d| d.id == request.device_id)
                .ok_or(OrchestratorError::DeviceNotFound(request.device_id))
                .and_then(|device| set_role(store, space_id, device, request));

            match outcome {
                Ok(assignment) => BulkRoleItem {
                    device_id: request.device_id,
                    channel_id: request.channel_id,
                    success: true,
                    role: Some(assignment.role),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(
                        space_id = %space_id,
                        device_id = %request.device_id,
                        error = %e,
                        "Role assignment rejected"
                    );
                    BulkRoleItem {
                        device_id: request.device_id,
                        channel_id: request.channel_id,
                        success: false,
                        role: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    let success_count = items.iter().filter(|i| i.success).count();
    let total_count = items.len();

    BulkRoleResult {
        success: success_count > 0 || total_count == 0,
        total_count,
        success_count,
        failure_count: total_count - success_count,
        items,
    }
}

/// Remove a role assignment.
///
/// # Errors
///
/// Returns `OrchestratorError::RoleNotFound` if the target has no role in the domain.
pub fn delete_role<S: Store>(
    store: &S,
    space_id: &SpaceId,
    domain: RoleDomain,
    device_id: &DeviceId,
    channel_id: Option<&ChannelId>,
) -> Result<()> {
    store
        .delete_role(space_id, domain, device_id, channel_id)
        .map_err(|e| match e {
            StoreError::NotFound => OrchestratorError::RoleNotFound {
                space_id: *space_id,
                device_id: *device_id,
            },
            other => other.into(),
        })
}

/// Load the role map of a space in one domain.
///
/// # Errors
///
/// Returns an error if the store read fails.
pub fn role_map<S: Store>(store: &S, space_id: &SpaceId, domain: RoleDomain) -> Result<RoleMap> {
    Ok(RoleMap::from_assignments(store.list_roles(space_id, domain)?))
}

// =============================================================================
// Inference
// =============================================================================

/// Propose default roles for a domain. Nothing is written.
#[must_use]
pub fn infer_default_roles(domain: RoleDomain, devices: &[Device]) -> Vec<SetRoleRequest> {
    match domain {
        RoleDomain::Lighting => infer_lighting_roles(devices),
        RoleDomain::Climate => infer_climate_roles(devices),
        RoleDomain::Covers => infer_covers_roles(devices),
        RoleDomain::Media => infer_media_roles(devices),
    }
}

/// First light channel MAIN, every other AMBIENT.
#[must_use]
pub fn infer_lighting_roles(devices: &[Device]) -> Vec<SetRoleRequest> {
    devices
        .iter()
        .filter(|d| d.category == DeviceCategory::Lighting)
        .flat_map(|d| d.channels_of(ChannelCategory::Light).map(move |c| (d.id, c.id)))
        .zip(0_i32..)
        .map(|((device_id, channel_id), index)| SetRoleRequest {
            device_id,
            channel_id: Some(channel_id),
            role: Role::Lighting(if index == 0 {
                LightingRole::Main
            } else {
                LightingRole::Ambient
            }),
            priority: Some(index),
        })
        .collect()
}

/// Role by device category; categories without a default get none.
#[must_use]
pub fn infer_climate_roles(devices: &[Device]) -> Vec<SetRoleRequest> {
    devices
        .iter()
        .filter_map(|device| {
            let role = match device.category {
                DeviceCategory::Thermostat => ClimateRole::Primary,
                DeviceCategory::HeatingUnit | DeviceCategory::AirConditioner => {
                    ClimateRole::Auxiliary
                }
                DeviceCategory::Fan => ClimateRole::Ventilation,
                DeviceCategory::AirHumidifier | DeviceCategory::AirDehumidifier => {
                    ClimateRole::Humidity
                }
                _ => return None,
            };
            Some(SetRoleRequest {
                device_id: device.id,
                channel_id: None,
                role: Role::Climate(role),
                priority: Some(0),
            })
        })
        .collect()
}

/// Every covering device PRIMARY.
#[must_use]
pub fn infer_covers_roles(devices: &[Device]) -> Vec<SetRoleRequest> {
    devices
        .iter()
        .filter(|d| d.category == DeviceCategory::WindowCovering)
        .map(|d| SetRoleRequest {
            device_id: d.id,
            channel_id: None,
            role: Role::Covers(CoversRole::Primary),
            priority: Some(0),
        })
        .collect()
}

/// First television PRIMARY, speakers BACKGROUND, other media SECONDARY.
#[must_use]
pub fn infer_media_roles(devices: &[Device]) -> Vec<SetRoleRequest> {
    let mut has_primary = false;
    devices
        .iter()
        .filter(|d| d.category.is_media_device())
        .zip(0_i32..)
        .map(|(device, index)| {
            let role = match device.category {
                DeviceCategory::Television if !has_primary => {
                    has_primary = true;
                    MediaRole::Primary
                }
                DeviceCategory::Speaker => MediaRole::Background,
                _ => MediaRole::Secondary,
            };
            SetRoleRequest {
                device_id: device.id,
                channel_id: None,
                role: Role::Media(role),
                priority: Some(index),
            }
        })
        .collect()
}

// =============================================================================
// Cascades
// =============================================================================

/// Remove everything stored for a space: roles, endpoints, routings and the active slot.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub fn purge_space<S: Store>(store: &S, space_id: &SpaceId) -> Result<PurgeSummary> {
    let roles = store.delete_roles_by_space(space_id)?;

    let endpoints = store.list_endpoints_by_space(space_id)?;
    for endpoint in &endpoints {
        store.delete_endpoint(&endpoint.endpoint_id)?;
    }

    let routings = store.list_routings_by_space(space_id)?;
    for routing in &routings {
        store.delete_routing(&routing.routing_id)?;
    }

    store.delete_active_routing(space_id)?;

    let summary = PurgeSummary {
        roles,
        endpoints: endpoints.len(),
        routings: routings.len(),
    };
    tracing::info!(
        space_id = %space_id,
        roles = summary.roles,
        endpoints = summary.endpoints,
        routings = summary.routings,
        "Space purged"
    );
    Ok(summary)
}

/// Remove every role referencing a device. Returns the number removed.
///
/// # Errors
///
/// Returns an error if the store operation fails.
pub fn purge_device<S: Store>(store: &S, device_id: &DeviceId) -> Result<usize> {
    let removed = store.delete_roles_by_device(device_id)?;
    tracing::debug!(device_id = %device_id, removed, "Device roles purged");
    Ok(removed)
}

/// Remove every role referencing a channel. Returns the number removed.
///
/// # Errors
///
/// Returns an error if the store operation fails.
pub fn purge_channel<S: Store>(store: &S, device_id: &DeviceId, channel_id: &ChannelId) -> Result<usize> {
    let removed = store.delete_roles_by_channel(device_id, channel_id)?;
    tracing::debug!(device_id = %device_id, channel_id = %channel_id, removed, "Channel roles purged");
    Ok(removed)
}
