//! Domain types stored in the database.
//!
//! These types represent persisted role assignments and media routing configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spaces_core::{ChannelId, DeviceId, EndpointId, PropertyId, RoutingId, SpaceId};

// =============================================================================
// Roles
// =============================================================================

/// Orchestration domain a role belongs to. Each domain has its own role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RoleDomain {
    /// Lights.
    Lighting = 1,
    /// Heating, cooling, ventilation, humidity.
    Climate = 2,
    /// Window coverings.
    Covers = 3,
    /// Televisions, speakers and other media devices.
    Media = 4,
}

impl RoleDomain {
    /// All domains in key order.
    pub const ALL: [Self; 4] = [Self::Lighting, Self::Climate, Self::Covers, Self::Media];

    /// Convert the domain to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `RoleDomain`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Lighting),
            2 => Some(Self::Climate),
            3 => Some(Self::Covers),
            4 => Some(Self::Media),
            _ => None,
        }
    }
}

/// Functional role of a light within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingRole {
    /// Primary ceiling or room light.
    Main,
    /// Desk, reading, or worktop light.
    Task,
    /// Background light.
    Ambient,
    /// Decorative highlight.
    Accent,
    /// Low-level orientation light.
    Night,
    /// Anything not covered above.
    Other,
    /// Excluded from orchestration.
    Hidden,
}

/// Functional role of a climate device within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateRole {
    /// Main thermostat of the space.
    Primary,
    /// Supplementary heater or air conditioner.
    Auxiliary,
    /// Fan or ventilation.
    Ventilation,
    /// Humidifier or dehumidifier.
    Humidity,
    /// Temperature reading used for the space.
    TemperatureSensor,
    /// Humidity reading used for the space.
    HumiditySensor,
    /// Excluded from orchestration.
    Hidden,
}

impl ClimateRole {
    /// Sensor roles are assigned per channel.
    #[must_use]
    pub const fn is_sensor(self) -> bool {
        matches!(self, Self::TemperatureSensor | Self::HumiditySensor)
    }

    /// Roles whose devices receive mode and setpoint commands.
    #[must_use]
    pub const fn drives_temperature(self) -> bool {
        matches!(self, Self::Primary | Self::Auxiliary)
    }
}

/// Functional role of a window covering within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoversRole {
    /// Main blinds or shutters.
    Primary,
    /// Blackout layer.
    Blackout,
    /// Sheer or light-filtering layer.
    Sheer,
    /// Exterior awning or shutter.
    Outdoor,
    /// Excluded from orchestration.
    Hidden,
}

/// Functional role of a media device within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaRole {
    /// Main screen of the space.
    Primary,
    /// Additional screens and AV equipment.
    Secondary,
    /// Speakers for background audio.
    Background,
    /// Game consoles.
    Gaming,
    /// Excluded from orchestration.
    Hidden,
}

/// A role from any domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "domain", content = "role", rename_all = "snake_case")]
pub enum Role {
    /// Lighting role.
    Lighting(LightingRole),
    /// Climate role.
    Climate(ClimateRole),
    /// Covers role.
    Covers(CoversRole),
    /// Media role.
    Media(MediaRole),
}

impl Role {
    /// Domain the role belongs to.
    #[must_use]
    pub const fn domain(self) -> RoleDomain {
        match self {
            Self::Lighting(_) => RoleDomain::Lighting,
            Self::Climate(_) => RoleDomain::Climate,
            Self::Covers(_) => RoleDomain::Covers,
            Self::Media(_) => RoleDomain::Media,
        }
    }

    /// Whether the role excludes the target from orchestration.
    #[must_use]
    pub const fn is_hidden(self) -> bool {
        matches!(
            self,
            Self::Lighting(LightingRole::Hidden)
                | Self::Climate(ClimateRole::Hidden)
                | Self::Covers(CoversRole::Hidden)
                | Self::Media(MediaRole::Hidden)
        )
    }
}

/// A role assigned to a device (and optionally one of its channels) in a space.
///
/// Unique per `(space, domain, device, channel)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Owning space.
    pub space_id: SpaceId,
    /// Assigned device.
    pub device_id: DeviceId,
    /// Assigned channel; `None` for device-level roles.
    pub channel_id: Option<ChannelId>,
    /// The role.
    pub role: Role,
    /// Tie-breaker, lower is preferred.
    pub priority: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleAssignment {
    /// Domain of the assigned role.
    #[must_use]
    pub const fn domain(&self) -> RoleDomain {
        self.role.domain()
    }
}

// =============================================================================
// Media
// =============================================================================

/// Activity a routing is designed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingType {
    /// Watch video on the display.
    Watch,
    /// Listen to audio.
    Listen,
    /// Gaming.
    Gaming,
    /// Background audio.
    Background,
    /// Everything off.
    Off,
    /// User-defined.
    Custom,
}

impl RoutingType {
    /// Default routings created for every media-capable space.
    pub const DEFAULTS: [Self; 3] = [Self::Watch, Self::Listen, Self::Off];

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Watch => "Watch",
            Self::Listen => "Listen",
            Self::Gaming => "Gaming",
            Self::Background => "Background",
            Self::Off => "Off",
            Self::Custom => "Custom",
        }
    }
}

/// What to do with endpoint power when activating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerPolicy {
    /// Power endpoints on.
    #[default]
    On,
    /// Power endpoints off.
    Off,
    /// Leave power alone.
    Unchanged,
}

/// When to send input-select commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
    /// Always send the input command.
    #[default]
    Always,
    /// Skip the command when the device already reports the target input.
    IfDifferent,
    /// Never switch inputs.
    Never,
}

/// What to do when another routing is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite the active routing.
    #[default]
    Replace,
    /// Refuse to activate.
    FailIfActive,
    /// Deactivate the current routing first.
    DeactivateFirst,
}

/// What to do with steps on offline devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfflinePolicy {
    /// Skip the step.
    #[default]
    Skip,
    /// Fail critical steps.
    Fail,
    /// Wait for the device to come back; fail critical steps and skip the
    /// rest when it does not.
    Wait,
}

/// Where a media capability lives on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMapping {
    /// Channel holding the property; falls back to the endpoint channel.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Property to write.
    pub property_id: PropertyId,
}

/// Capabilities advertised by a media endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilityMap {
    /// Power switch.
    #[serde(default)]
    pub power: Option<CapabilityMapping>,
    /// Input selection.
    #[serde(default)]
    pub input: Option<CapabilityMapping>,
    /// Volume.
    #[serde(default)]
    pub volume: Option<CapabilityMapping>,
}

/// A device acting as a display, audio output, source, or remote target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEndpoint {
    /// Endpoint identifier.
    pub endpoint_id: EndpointId,
    /// Owning space.
    pub space_id: SpaceId,
    /// Backing device.
    pub device_id: DeviceId,
    /// Default channel for capabilities that do not name one.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Display name.
    pub name: String,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: CapabilityMap,
}

/// A named preset of media endpoints and settings activated as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDefinition {
    /// Routing identifier.
    pub routing_id: RoutingId,
    /// Owning space.
    pub space_id: SpaceId,
    /// Activity type.
    pub routing_type: RoutingType,
    /// Display name.
    pub name: String,
    /// Display endpoint.
    #[serde(default)]
    pub display_endpoint_id: Option<EndpointId>,
    /// Audio endpoint.
    #[serde(default)]
    pub audio_endpoint_id: Option<EndpointId>,
    /// Source endpoint.
    #[serde(default)]
    pub source_endpoint_id: Option<EndpointId>,
    /// Remote-control target endpoint.
    #[serde(default)]
    pub remote_target_endpoint_id: Option<EndpointId>,
    /// Input to select on the display.
    #[serde(default)]
    pub display_input: Option<String>,
    /// Input to select on the audio endpoint.
    #[serde(default)]
    pub audio_input: Option<String>,
    /// Volume to set on the audio endpoint (0..=100).
    #[serde(default)]
    pub audio_volume_preset: Option<u8>,
    /// Power handling.
    #[serde(default)]
    pub power_policy: PowerPolicy,
    /// Input handling.
    #[serde(default)]
    pub input_policy: InputPolicy,
    /// Behaviour when another routing is active.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Behaviour for offline devices.
    #[serde(default)]
    pub offline_policy: OfflinePolicy,
    /// Whether the routing was created automatically.
    #[serde(default)]
    pub is_default: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoutingDefinition {
    /// Create a routing of the given type with default policies and no endpoints.
    #[must_use]
    pub fn new(space_id: SpaceId, routing_type: RoutingType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            routing_id: RoutingId::generate(),
            space_id,
            routing_type,
            name: name.into(),
            display_endpoint_id: None,
            audio_endpoint_id: None,
            source_endpoint_id: None,
            remote_target_endpoint_id: None,
            display_input: None,
            audio_input: None,
            audio_volume_preset: None,
            power_policy: PowerPolicy::default(),
            input_policy: InputPolicy::default(),
            conflict_policy: ConflictPolicy::default(),
            offline_policy: OfflinePolicy::default(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Endpoints referenced by the routing, in slot order, without duplicates.
    #[must_use]
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        let mut ids = Vec::with_capacity(4);
        for id in [
            self.display_endpoint_id,
            self.audio_endpoint_id,
            self.source_endpoint_id,
            self.remote_target_endpoint_id,
        ]
        .into_iter()
        .flatten()
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Activation state of a space's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActivationState {
    /// Nothing active.
    Deactivated = 1,
    /// A routing is being activated.
    Activating = 2,
    /// A routing is active.
    Active = 3,
    /// The last activation failed.
    Failed = 4,
}

impl ActivationState {
    /// Convert the state to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to an `ActivationState`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Deactivated),
            2 => Some(Self::Activating),
            3 => Some(Self::Active),
            4 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The single active-routing slot of a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRouting {
    /// Owning space.
    pub space_id: SpaceId,
    /// Routing that was last activated successfully.
    pub routing_id: Option<RoutingId>,
    /// Routing currently being activated.
    #[serde(default)]
    pub pending_routing_id: Option<RoutingId>,
    /// Activation state.
    pub state: ActivationState,
    /// When the last activation started.
    pub activated_at: Option<DateTime<Utc>>,
    /// Error from the last failed activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Steps executed by the last activation.
    pub steps_executed: u32,
    /// Steps failed by the last activation.
    pub steps_failed: u32,
    /// Steps skipped by the last activation.
    pub steps_skipped: u32,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ActiveRouting {
    /// An empty, deactivated slot.
    #[must_use]
    pub fn deactivated(space_id: SpaceId) -> Self {
        Self {
            space_id,
            routing_id: None,
            pending_routing_id: None,
            state: ActivationState::Deactivated,
            activated_at: None,
            last_error: None,
            steps_executed: 0,
            steps_failed: 0,
            steps_skipped: 0,
            updated_at: Utc::now(),
        }
    }
}
