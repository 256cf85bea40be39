//! Lighting intents.
//!
//! Mode intents are role driven: every light gets the rule of its role from the
//! mode table. A space without any lighting roles gets the simple behaviour
//! (every light on at the mode brightness), and night mode falls back to dimmed
//! main and ambient lights when the space has no night light.

use serde::{Deserialize, Serialize};
use spaces_core::{Channel, ChannelCategory, Device, DeviceCategory, PropertyCategory};
use spaces_store::{LightingRole, Role};

use super::{write_if_supported, DeltaSize, IntentError, Resolution};
use crate::config::{LightingModeConfig, OrchestratorConfig, RoleRule};
use crate::roles::RoleMap;
use crate::state;

/// Lighting scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingMode {
    /// Bright, focused light.
    Work,
    /// Dimmed, warm light.
    Relax,
    /// Orientation light only.
    Night,
}

impl LightingMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Relax => "relax",
            Self::Night => "night",
        }
    }
}

/// Wire tag of a lighting intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingIntentType {
    /// Switch every light off.
    Off,
    /// Switch every light on.
    On,
    /// Apply a lighting mode.
    SetMode,
    /// Change brightness of lights that are on.
    BrightnessDelta,
    /// Switch lights of one role on.
    RoleOn,
    /// Switch lights of one role off.
    RoleOff,
    /// Set brightness of lights of one role.
    RoleBrightness,
}

/// Lighting intent as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightingIntentRequest {
    /// Intent type.
    #[serde(rename = "type")]
    pub intent_type: LightingIntentType,
    /// Mode for `set_mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LightingMode>,
    /// Step size for `brightness_delta`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaSize>,
    /// Direction for `brightness_delta`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increase: Option<bool>,
    /// Role for role intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<LightingRole>,
    /// Brightness for `role_brightness`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl LightingIntentRequest {
    /// A request of the given type with no fields set.
    #[must_use]
    pub const fn new(intent_type: LightingIntentType) -> Self {
        Self {
            intent_type,
            mode: None,
            delta: None,
            increase: None,
            role: None,
            brightness: None,
        }
    }
}

/// A validated lighting intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightingIntent {
    /// Switch every light off.
    Off,
    /// Switch every light on.
    On,
    /// Apply a lighting mode.
    SetMode {
        /// Mode to apply.
        mode: LightingMode,
    },
    /// Change brightness of lights that are on.
    BrightnessDelta {
        /// Step size.
        delta: DeltaSize,
        /// Direction.
        increase: bool,
    },
    /// Switch lights of one role on.
    RoleOn {
        /// Role to switch.
        role: LightingRole,
    },
    /// Switch lights of one role off.
    RoleOff {
        /// Role to switch.
        role: LightingRole,
    },
    /// Set brightness of lights of one role. Zero switches them off.
    RoleBrightness {
        /// Role to adjust.
        role: LightingRole,
        /// Brightness in percent.
        brightness: u8,
    },
}

impl TryFrom<LightingIntentRequest> for LightingIntent {
    type Error = IntentError;

    fn try_from(request: LightingIntentRequest) -> Result<Self, Self::Error> {
        let role = || request.role.ok_or(IntentError::MissingField("role"));

        Ok(match request.intent_type {
            LightingIntentType::Off => Self::Off,
            LightingIntentType::On => Self::On,
            LightingIntentType::SetMode => Self::SetMode {
                mode: request.mode.ok_or(IntentError::MissingField("mode"))?,
            },
            LightingIntentType::BrightnessDelta => Self::BrightnessDelta {
                delta: request.delta.ok_or(IntentError::MissingField("delta"))?,
                increase: request
                    .increase
                    .ok_or(IntentError::MissingField("increase"))?,
            },
            LightingIntentType::RoleOn => Self::RoleOn { role: role()? },
            LightingIntentType::RoleOff => Self::RoleOff { role: role()? },
            LightingIntentType::RoleBrightness => Self::RoleBrightness {
                role: role()?,
                brightness: request
                    .brightness
                    .ok_or(IntentError::MissingField("brightness"))?,
            },
        })
    }
}

impl From<LightingIntent> for LightingIntentRequest {
    fn from(intent: LightingIntent) -> Self {
        match intent {
            LightingIntent::Off => Self::new(LightingIntentType::Off),
            LightingIntent::On => Self::new(LightingIntentType::On),
            LightingIntent::SetMode { mode } => Self {
                mode: Some(mode),
                ..Self::new(LightingIntentType::SetMode)
            },
            LightingIntent::BrightnessDelta { delta, increase } => Self {
                delta: Some(delta),
                increase: Some(increase),
                ..Self::new(LightingIntentType::BrightnessDelta)
            },
            LightingIntent::RoleOn { role } => Self {
                role: Some(role),
                ..Self::new(LightingIntentType::RoleOn)
            },
            LightingIntent::RoleOff { role } => Self {
                role: Some(role),
                ..Self::new(LightingIntentType::RoleOff)
            },
            LightingIntent::RoleBrightness { role, brightness } => Self {
                role: Some(role),
                brightness: Some(brightness),
                ..Self::new(LightingIntentType::RoleBrightness)
            },
        }
    }
}

impl LightingIntent {
    /// Human-readable description, used for undo entries.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Off => "Turn lights off".to_string(),
            Self::On => "Turn lights on".to_string(),
            Self::SetMode { mode } => format!("Set lighting mode to {}", mode.as_str()),
            Self::BrightnessDelta { increase: true, .. } => "Increase brightness".to_string(),
            Self::BrightnessDelta { increase: false, .. } => "Decrease brightness".to_string(),
            Self::RoleOn { role } => format!("Turn {} lights on", role_label(*role)),
            Self::RoleOff { role } => format!("Turn {} lights off", role_label(*role)),
            Self::RoleBrightness { role, brightness } => {
                format!("Set {} lights to {brightness}%", role_label(*role))
            }
        }
    }
}

const fn role_label(role: LightingRole) -> &'static str {
    match role {
        LightingRole::Main => "main",
        LightingRole::Task => "task",
        LightingRole::Ambient => "ambient",
        LightingRole::Accent => "accent",
        LightingRole::Night => "night",
        LightingRole::Other => "other",
        LightingRole::Hidden => "hidden",
    }
}

/// A light channel and its role.
#[derive(Debug, Clone, Copy)]
pub struct LightTarget<'a> {
    /// Owning device.
    pub device: &'a Device,
    /// Light channel.
    pub channel: &'a Channel,
    /// Assigned role, if any.
    pub role: Option<LightingRole>,
}

impl LightTarget<'_> {
    /// Whether the light reports being on. Unreadable counts as off.
    #[must_use]
    pub fn is_on(&self) -> bool {
        state::channel_bool(self.channel, PropertyCategory::On).unwrap_or(false)
    }

    /// Current brightness, if readable.
    #[must_use]
    pub fn brightness(&self) -> Option<f64> {
        state::channel_number(self.channel, PropertyCategory::Brightness)
    }

    /// Whether the light can be dimmed.
    #[must_use]
    pub fn is_dimmable(&self) -> bool {
        self.channel.property(PropertyCategory::Brightness).is_some()
    }
}

/// Every light channel in `devices`, skipping lights with the hidden role.
#[must_use]
pub fn collect_targets<'a>(devices: &'a [Device], roles: &RoleMap) -> Vec<LightTarget<'a>> {
    devices
        .iter()
        .filter(|d| d.category == DeviceCategory::Lighting)
        .flat_map(|device| {
            device
                .channels_of(ChannelCategory::Light)
                .map(move |channel| LightTarget {
                    device,
                    channel,
                    role: roles
                        .get(&device.id, Some(&channel.id))
                        .and_then(|a| match a.role {
                            Role::Lighting(role) => Some(role),
                            Role::Climate(_) | Role::Covers(_) | Role::Media(_) => None,
                        }),
                })
        })
        .filter(|t| t.role != Some(LightingRole::Hidden))
        .collect()
}

/// Pick the rule each light gets in a mode. `None` leaves the light untouched.
#[must_use]
pub fn select_rules_for_mode(
    config: &LightingModeConfig,
    lights: &[LightTarget<'_>],
) -> Vec<Option<RoleRule>> {
    if lights.iter().all(|l| l.role.is_none()) {
        return vec![Some(RoleRule::on(config.mvp_brightness)); lights.len()];
    }

    let use_fallback = !config.fallback_roles.is_empty()
        && !lights.iter().any(|l| l.role == Some(LightingRole::Night));
    let fallback = RoleRule::on(
        config
            .fallback_brightness
            .unwrap_or(config.mvp_brightness),
    );

    lights
        .iter()
        .map(|light| match light.role {
            None => config.roles.get(&LightingRole::Other).copied(),
            Some(role) if use_fallback && config.fallback_roles.contains(&role) => Some(fallback),
            Some(role) => config.roles.get(&role).copied(),
        })
        .collect()
}

/// Resolve a lighting intent for every light, in order.
#[must_use]
pub fn resolve(
    intent: &LightingIntent,
    lights: &[LightTarget<'_>],
    config: &OrchestratorConfig,
) -> Vec<Resolution> {
    if let LightingIntent::SetMode { mode } = intent {
        let Some(mode_config) = config.lighting_modes.get(mode) else {
            let error = IntentError::UnknownMode(mode.as_str().to_string());
            return vec![Resolution::Failed(error); lights.len()];
        };

        return select_rules_for_mode(mode_config, lights)
            .into_iter()
            .zip(lights)
            .map(|(rule, light)| rule.map_or(Resolution::Untouched, |r| apply_rule(light, r)))
            .collect();
    }

    lights
        .iter()
        .map(|light| resolve_light(intent, light, config))
        .collect()
}

fn apply_rule(light: &LightTarget<'_>, rule: RoleRule) -> Resolution {
    let mut commands = Vec::with_capacity(2);
    write_if_supported(
        &mut commands,
        light.device,
        light.channel,
        PropertyCategory::On,
        rule.on,
    );
    if let (true, Some(brightness)) = (rule.on, rule.brightness) {
        write_if_supported(
            &mut commands,
            light.device,
            light.channel,
            PropertyCategory::Brightness,
            f64::from(brightness.min(100)),
        );
    }
    Resolution::from_commands(commands)
}

fn resolve_light(
    intent: &LightingIntent,
    light: &LightTarget<'_>,
    config: &OrchestratorConfig,
) -> Resolution {
    match *intent {
        LightingIntent::Off => apply_rule(light, RoleRule::off()),
        LightingIntent::On => apply_rule(
            light,
            RoleRule {
                on: true,
                brightness: None,
            },
        ),
        // Handled for the whole space in `resolve`.
        LightingIntent::SetMode { .. } => Resolution::Untouched,
        LightingIntent::BrightnessDelta { delta, increase } => {
            // Lights that are off or cannot dim take part with nothing to write.
            if !light.is_on() || !light.is_dimmable() {
                return Resolution::Commands(Vec::new());
            }
            let current = light.brightness().unwrap_or(50.0);
            let step = f64::from(config.brightness_steps.step(delta));
            let target = apply_delta(current, step, increase);

            let mut commands = Vec::with_capacity(1);
            write_if_supported(
                &mut commands,
                light.device,
                light.channel,
                PropertyCategory::Brightness,
                target,
            );
            Resolution::from_commands(commands)
        }
        LightingIntent::RoleOn { role } if light.role == Some(role) => apply_rule(
            light,
            RoleRule {
                on: true,
                brightness: None,
            },
        ),
        LightingIntent::RoleOff { role } if light.role == Some(role) => {
            apply_rule(light, RoleRule::off())
        }
        LightingIntent::RoleBrightness { role, brightness } if light.role == Some(role) => {
            if brightness == 0 {
                apply_rule(light, RoleRule::off())
            } else {
                apply_rule(light, RoleRule::on(brightness))
            }
        }
        LightingIntent::RoleOn { .. }
        | LightingIntent::RoleOff { .. }
        | LightingIntent::RoleBrightness { .. } => Resolution::Untouched,
    }
}

/// Apply a signed step to a brightness and clamp it to 0..=100.
#[must_use]
pub fn apply_delta(current: f64, step: f64, increase: bool) -> f64 {
    let signed = if increase { step } else { -step };
    (current + signed).clamp(0.0, 100.0).round()
}
