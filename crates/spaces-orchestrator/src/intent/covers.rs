//! Covers intents.
//!
//! Window coverings are driven per channel. A channel with a position property
//! takes any position; a channel that only accepts commands can be fully
//! opened or closed and is left alone for intermediate positions.

use serde::{Deserialize, Serialize};
use spaces_core::{Channel, ChannelCategory, Device, DeviceCategory, PropertyCategory};
use spaces_store::{CoversRole, Role};

use super::{write_if_supported, DeltaSize, IntentError, Resolution};
use crate::config::OrchestratorConfig;
use crate::roles::RoleMap;
use crate::state;

/// Position used when a delta targets a cover that reports none.
const UNKNOWN_POSITION: f64 = 50.0;

/// Covers scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoversMode {
    /// Everything open.
    Open,
    /// Everything closed.
    Closed,
    /// Sheers closed, the rest set for privacy.
    Privacy,
    /// Let daylight in without glare.
    Daylight,
}

impl CoversMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Privacy => "privacy",
            Self::Daylight => "daylight",
        }
    }
}

/// Wire tag of a covers intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoversIntentType {
    /// Open every cover.
    Open,
    /// Close every cover.
    Close,
    /// Move every cover to a position.
    SetPosition,
    /// Move every cover by a step.
    PositionDelta,
    /// Move the covers of one role to a position.
    RolePosition,
    /// Apply a covers mode.
    SetMode,
}

/// Covers intent as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoversIntentRequest {
    /// Intent type.
    #[serde(rename = "type")]
    pub intent_type: CoversIntentType,
    /// Target position (0 closed, 100 open).
    #[serde(default)]
    pub position: Option<u8>,
    /// Step size for `position_delta`.
    #[serde(default)]
    pub delta: Option<DeltaSize>,
    /// Direction for `position_delta`; increasing opens.
    #[serde(default)]
    pub increase: Option<bool>,
    /// Role for `role_position`; defaults to primary.
    #[serde(default)]
    pub role: Option<CoversRole>,
    /// Mode for `set_mode`.
    #[serde(default)]
    pub mode: Option<CoversMode>,
}

impl CoversIntentRequest {
    /// A request of the given type with no fields set.
    #[must_use]
    pub const fn new(intent_type: CoversIntentType) -> Self {
        Self {
            intent_type,
            position: None,
            delta: None,
            increase: None,
            role: None,
            mode: None,
        }
    }
}

/// A validated covers intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoversIntent {
    /// Open every cover.
    Open,
    /// Close every cover.
    Close,
    /// Move every cover to a position.
    SetPosition(u8),
    /// Move every cover by a step.
    PositionDelta {
        /// Step size.
        delta: DeltaSize,
        /// Direction; increasing opens.
        increase: bool,
    },
    /// Move the covers of one role to a position.
    RolePosition {
        /// Role to drive.
        role: CoversRole,
        /// Target position.
        position: u8,
    },
    /// Apply a covers mode.
    SetMode(CoversMode),
}

impl TryFrom<CoversIntentRequest> for CoversIntent {
    type Error = IntentError;

    fn try_from(request: CoversIntentRequest) -> Result<Self, Self::Error> {
        let position = || {
            request
                .position
                .map(|p| p.min(100))
                .ok_or(IntentError::MissingField("position"))
        };

        Ok(match request.intent_type {
            CoversIntentType::Open => Self::Open,
            CoversIntentType::Close => Self::Close,
            CoversIntentType::SetPosition => Self::SetPosition(position()?),
            CoversIntentType::PositionDelta => Self::PositionDelta {
                delta: request.delta.ok_or(IntentError::MissingField("delta"))?,
                increase: request
                    .increase
                    .ok_or(IntentError::MissingField("increase"))?,
            },
            CoversIntentType::RolePosition => Self::RolePosition {
                role: request.role.unwrap_or(CoversRole::Primary),
                position: position()?,
            },
            CoversIntentType::SetMode => {
                Self::SetMode(request.mode.ok_or(IntentError::MissingField("mode"))?)
            }
        })
    }
}

impl CoversIntent {
    /// Human-readable description, used for undo entries.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Open => "Open covers".to_string(),
            Self::Close => "Close covers".to_string(),
            Self::SetPosition(position) => format!("Set covers position to {position}%"),
            Self::PositionDelta { increase: true, .. } => "Open covers further".to_string(),
            Self::PositionDelta { increase: false, .. } => "Close covers further".to_string(),
            Self::RolePosition { role, position } => {
                format!("Set {} covers to {position}%", role_label(*role))
            }
            Self::SetMode(mode) => format!("Set covers mode to {}", mode.as_str()),
        }
    }
}

const fn role_label(role: CoversRole) -> &'static str {
    match role {
        CoversRole::Primary => "primary",
        CoversRole::Blackout => "blackout",
        CoversRole::Sheer => "sheer",
        CoversRole::Outdoor => "outdoor",
        CoversRole::Hidden => "hidden",
    }
}

/// A window covering channel and its role.
#[derive(Debug, Clone, Copy)]
pub struct CoverTarget<'a> {
    /// Owning device.
    pub device: &'a Device,
    /// Window covering channel.
    pub channel: &'a Channel,
    /// Assigned role, if any.
    pub role: Option<CoversRole>,
}

impl CoverTarget<'_> {
    /// Role used for rule lookup; unassigned covers act as primary.
    #[must_use]
    pub fn effective_role(&self) -> CoversRole {
        self.role.unwrap_or(CoversRole::Primary)
    }

    /// Current position, if readable.
    #[must_use]
    pub fn position(&self) -> Option<f64> {
        state::channel_number(self.channel, PropertyCategory::Position)
    }

    /// Whether the cover accepts arbitrary positions.
    #[must_use]
    pub fn is_positionable(&self) -> bool {
        self.channel.property(PropertyCategory::Position).is_some()
    }
}

/// Every window covering channel in `devices`, skipping hidden covers.
#[must_use]
pub fn collect_targets<'a>(devices: &'a [Device], roles: &RoleMap) -> Vec<CoverTarget<'a>> {
    devices
        .iter()
        .filter(|d| d.category == DeviceCategory::WindowCovering)
        .flat_map(|device| {
            device
                .channels_of(ChannelCategory::WindowCovering)
                .map(move |channel| CoverTarget {
                    device,
                    channel,
                    role: roles
                        .get(&device.id, Some(&channel.id))
                        .and_then(|a| match a.role {
                            Role::Covers(role) => Some(role),
                            Role::Lighting(_) | Role::Climate(_) | Role::Media(_) => None,
                        }),
                })
        })
        .filter(|t| t.role != Some(CoversRole::Hidden))
        .collect()
}

/// Resolve a covers intent for every cover, in order.
#[must_use]
pub fn resolve(
    intent: &CoversIntent,
    covers: &[CoverTarget<'_>],
    config: &OrchestratorConfig,
) -> Vec<Resolution> {
    if let CoversIntent::SetMode(mode) = intent {
        let Some(rules) = config.covers_modes.get(mode) else {
            let error = IntentError::UnknownMode(mode.as_str().to_string());
            return vec![Resolution::Failed(error); covers.len()];
        };
        return covers
            .iter()
            .map(|cover| {
                rules
                    .get(&cover.effective_role())
                    .map_or(Resolution::Untouched, |p| move_to(cover, f64::from(*p)))
            })
            .collect();
    }

    covers
        .iter()
        .map(|cover| match *intent {
            CoversIntent::Open => move_to(cover, 100.0),
            CoversIntent::Close => move_to(cover, 0.0),
            CoversIntent::SetPosition(position) => move_to(cover, f64::from(position)),
            CoversIntent::PositionDelta { delta, increase } => {
                if !cover.is_positionable() {
                    return Resolution::Untouched;
                }
                let step = f64::from(config.position_steps.step(delta));
                let current = cover.position().unwrap_or(UNKNOWN_POSITION);
                let signed = if increase { step } else { -step };
                move_to(cover, (current + signed).clamp(0.0, 100.0).round())
            }
            CoversIntent::RolePosition { role, position } if cover.effective_role() == role => {
                move_to(cover, f64::from(position))
            }
            CoversIntent::RolePosition { .. } | CoversIntent::SetMode(_) => Resolution::Untouched,
        })
        .collect()
}

/// Commands moving one cover to `position`.
fn move_to(cover: &CoverTarget<'_>, position: f64) -> Resolution {
    let position = position.clamp(0.0, 100.0);
    let mut commands = Vec::with_capacity(1);

    if !write_if_supported(
        &mut commands,
        cover.device,
        cover.channel,
        PropertyCategory::Position,
        position,
    ) {
        let command = if position <= 0.0 {
            Some("close")
        } else if position >= 100.0 {
            Some("open")
        } else {
            None
        };
        if let Some(command) = command {
            write_if_supported(
                &mut commands,
                cover.device,
                cover.channel,
                PropertyCategory::Command,
                command,
            );
        }
    }

    Resolution::from_commands(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::fixtures::{blind, shutter};
    use spaces_core::{PropertyValue, SpaceId};

    fn targets(devices: &[Device], roles: &[Option<CoversRole>]) -> Vec<CoverTarget<'_>> {
        devices
            .iter()
            .zip(roles)
            .map(|(device, role)| CoverTarget {
                device,
                channel: &device.channels[0],
                role: *role,
            })
            .collect()
    }

    fn value(resolution: &Resolution) -> Option<PropertyValue> {
        resolution
            .commands()
            .and_then(|c| c.first())
            .map(|c| c.value.clone())
    }

    #[test]
    fn command_only_covers_take_extremes_only() {
        let space = SpaceId::generate();
        let devices = vec![shutter(space, "Shutter")];
        let covers = targets(&devices, &[None]);
        let config = OrchestratorConfig::default();

        let open = resolve(&CoversIntent::Open, &covers, &config);
        assert_eq!(value(&open[0]), Some(PropertyValue::Text("open".into())));

        let close = resolve(&CoversIntent::Close, &covers, &config);
        assert_eq!(value(&close[0]), Some(PropertyValue::Text("close".into())));

        let half = resolve(&CoversIntent::SetPosition(40), &covers, &config);
        assert_eq!(half[0], Resolution::Untouched);
    }

    #[test]
    fn positionable_covers_prefer_position() {
        let space = SpaceId::generate();
        let devices = vec![blind(space, "Blind", 10.0)];
        let covers = targets(&devices, &[None]);

        let resolutions = resolve(
            &CoversIntent::SetPosition(40),
            &covers,
            &OrchestratorConfig::default(),
        );
        let commands = resolutions[0].commands().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].value, PropertyValue::Number(40.0));
    }

    #[test]
    fn modes_use_role_positions() {
        let space = SpaceId::generate();
        let devices = vec![
            blind(space, "Main", 0.0),
            blind(space, "Sheer", 100.0),
            blind(space, "Blackout", 0.0),
        ];
        let covers = targets(
            &devices,
            &[None, Some(CoversRole::Sheer), Some(CoversRole::Blackout)],
        );

        let resolutions = resolve(
            &CoversIntent::SetMode(CoversMode::Privacy),
            &covers,
            &OrchestratorConfig::default(),
        );
        assert_eq!(value(&resolutions[0]), Some(PropertyValue::Number(50.0)));
        assert_eq!(value(&resolutions[1]), Some(PropertyValue::Number(0.0)));
        assert_eq!(value(&resolutions[2]), Some(PropertyValue::Number(100.0)));
    }

    #[test]
    fn delta_clamps_and_defaults_unknown_position() {
        let space = SpaceId::generate();
        let devices = vec![blind(space, "Open", 95.0), blind(space, "Unknown", 0.0)];
        let mut devices = devices;
        devices[1].channels[0].properties[0].value = None;
        let covers = targets(&devices, &[None, None]);

        let resolutions = resolve(
            &CoversIntent::PositionDelta {
                delta: DeltaSize::Large,
                increase: true,
            },
            &covers,
            &OrchestratorConfig::default(),
        );
        assert_eq!(value(&resolutions[0]), Some(PropertyValue::Number(100.0)));
        let large = f64::from(OrchestratorConfig::default().position_steps.large);
        assert_eq!(
            value(&resolutions[1]),
            Some(PropertyValue::Number((UNKNOWN_POSITION + large).min(100.0)))
        );
    }

    #[test]
    fn role_position_defaults_to_primary() {
        let request = CoversIntentRequest {
            position: Some(30),
            ..CoversIntentRequest::new(CoversIntentType::RolePosition)
        };
        let intent = CoversIntent::try_from(request).unwrap();
        assert_eq!(
            intent,
            CoversIntent::RolePosition {
                role: CoversRole::Primary,
                position: 30
            }
        );

        let space = SpaceId::generate();
        let devices = vec![blind(space, "Main", 0.0), blind(space, "Outdoor", 0.0)];
        let covers = targets(&devices, &[None, Some(CoversRole::Outdoor)]);
        let resolutions = resolve(&intent, &covers, &OrchestratorConfig::default());
        assert_eq!(value(&resolutions[0]), Some(PropertyValue::Number(30.0)));
        assert_eq!(resolutions[1], Resolution::Untouched);
    }

    #[test]
    fn missing_position_is_reported() {
        let request = CoversIntentRequest::new(CoversIntentType::SetPosition);
        assert_eq!(
            CoversIntent::try_from(request),
            Err(IntentError::MissingField("position"))
        );
    }

    #[test]
    fn description_mentions_position() {
        assert_eq!(
            CoversIntent::SetPosition(40).description(),
            "Set covers position to 40%"
        );
        assert_eq!(CoversIntent::Open.description(), "Open covers");
    }
}
