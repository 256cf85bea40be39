//! Climate intents.
//!
//! Climate targets are whole devices (thermostats, heating units, air
//! conditioners). A device exposes heater and cooler channels whose `on` and
//! `temperature` properties carry the mode and the setpoints; a thermostat
//! channel carries the reported mode and the active flag.

use serde::{Deserialize, Serialize};
use spaces_core::{Channel, ChannelCategory, Device, Property, PropertyCategory};
use spaces_store::{ClimateRole, Role};

use super::{write_if_supported, DeltaSize, IntentError, Resolution};
use crate::config::OrchestratorConfig;
use crate::platform::PropertyCommand;
use crate::roles::RoleMap;
use crate::state;

/// HVAC mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateMode {
    /// Heating and cooling off.
    Off,
    /// Heating only.
    Heat,
    /// Cooling only.
    Cool,
    /// Heating and cooling as needed.
    Auto,
}

impl ClimateMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Auto => "auto",
        }
    }

    const fn heater_on(self) -> bool {
        matches!(self, Self::Heat | Self::Auto)
    }

    const fn cooler_on(self) -> bool {
        matches!(self, Self::Cool | Self::Auto)
    }
}

/// Wire tag of a climate intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateIntentType {
    /// Change the HVAC mode.
    SetMode,
    /// Set an absolute setpoint.
    SetpointSet,
    /// Change the setpoint by a step.
    SetpointDelta,
    /// Set mode and setpoint together.
    ClimateSet,
}

/// Climate intent as received on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateIntentRequest {
    /// Intent type.
    #[serde(rename = "type")]
    pub intent_type: ClimateIntentType,
    /// Mode for `set_mode` and `climate_set`.
    #[serde(default)]
    pub mode: Option<ClimateMode>,
    /// Single setpoint for `setpoint_set` and `climate_set`.
    #[serde(default)]
    pub value: Option<f64>,
    /// Heating setpoint for `setpoint_set`.
    #[serde(default)]
    pub heating_setpoint: Option<f64>,
    /// Cooling setpoint for `setpoint_set`.
    #[serde(default)]
    pub cooling_setpoint: Option<f64>,
    /// Step size for `setpoint_delta`.
    #[serde(default)]
    pub delta: Option<DeltaSize>,
    /// Direction for `setpoint_delta`.
    #[serde(default)]
    pub increase: Option<bool>,
}

impl ClimateIntentRequest {
    /// A request of the given type with no fields set.
    #[must_use]
    pub const fn new(intent_type: ClimateIntentType) -> Self {
        Self {
            intent_type,
            mode: None,
            value: None,
            heating_setpoint: None,
            cooling_setpoint: None,
            delta: None,
            increase: None,
        }
    }
}

/// Absolute setpoint request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Same value for every setpoint.
    Single(f64),
    /// Separate heating and cooling values.
    Split {
        /// Heating setpoint.
        heating: Option<f64>,
        /// Cooling setpoint.
        cooling: Option<f64>,
    },
}

/// A validated climate intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimateIntent {
    /// Change the HVAC mode.
    SetMode(ClimateMode),
    /// Set an absolute setpoint.
    SetpointSet(Setpoint),
    /// Change every setpoint by a step.
    SetpointDelta {
        /// Step size.
        delta: DeltaSize,
        /// Direction.
        increase: bool,
    },
    /// Set mode and/or a single setpoint.
    ClimateSet {
        /// Mode to apply.
        mode: Option<ClimateMode>,
        /// Setpoint to apply.
        setpoint: Option<f64>,
    },
}

impl TryFrom<ClimateIntentRequest> for ClimateIntent {
    type Error = IntentError;

    fn try_from(request: ClimateIntentRequest) -> Result<Self, Self::Error> {
        Ok(match request.intent_type {
            ClimateIntentType::SetMode => {
                Self::SetMode(request.mode.ok_or(IntentError::MissingField("mode"))?)
            }
            ClimateIntentType::SetpointSet => match request.value {
                Some(value) => Self::SetpointSet(Setpoint::Single(value)),
                None if request.heating_setpoint.is_some() || request.cooling_setpoint.is_some() => {
                    Self::SetpointSet(Setpoint::Split {
                        heating: request.heating_setpoint,
                        cooling: request.cooling_setpoint,
                    })
                }
                None => return Err(IntentError::MissingField("value")),
            },
            ClimateIntentType::SetpointDelta => Self::SetpointDelta {
                delta: request.delta.ok_or(IntentError::MissingField("delta"))?,
                increase: request
                    .increase
                    .ok_or(IntentError::MissingField("increase"))?,
            },
            ClimateIntentType::ClimateSet => {
                if request.mode.is_none() && request.value.is_none() {
                    return Err(IntentError::MissingField("mode"));
                }
                Self::ClimateSet {
                    mode: request.mode,
                    setpoint: request.value,
                }
            }
        })
    }
}

impl ClimateIntent {
    /// Human-readable description, used for undo entries.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::SetMode(mode) => format!("Set climate mode to {}", mode.as_str()),
            Self::SetpointSet(Setpoint::Single(value)) => format!("Set temperature to {value}°C"),
            Self::SetpointSet(Setpoint::Split { heating, cooling }) => match (heating, cooling) {
                (Some(h), Some(c)) => format!("Set temperature to {h}°C heating, {c}°C cooling"),
                (Some(h), None) => format!("Set heating temperature to {h}°C"),
                (None, Some(c)) => format!("Set cooling temperature to {c}°C"),
                (None, None) => "Set temperature".to_string(),
            },
            Self::SetpointDelta { increase: true, .. } => "Increase temperature".to_string(),
            Self::SetpointDelta { increase: false, .. } => "Decrease temperature".to_string(),
            Self::ClimateSet { mode, setpoint } => match (mode, setpoint) {
                (Some(m), Some(v)) => format!("Set climate to {} at {v}°C", m.as_str()),
                (Some(m), None) => format!("Set climate mode to {}", m.as_str()),
                (None, Some(v)) => format!("Set temperature to {v}°C"),
                (None, None) => "Set climate".to_string(),
            },
        }
    }

    /// Mode the intent requests, if any.
    #[must_use]
    pub const fn requested_mode(&self) -> Option<ClimateMode> {
        match self {
            Self::SetMode(mode) | Self::ClimateSet { mode: Some(mode), .. } => Some(*mode),
            Self::SetpointSet(_) | Self::SetpointDelta { .. } | Self::ClimateSet { mode: None, .. } => {
                None
            }
        }
    }
}

/// What a setpoint property controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointKind {
    /// Heater channel setpoint.
    Heating,
    /// Cooler channel setpoint.
    Cooling,
    /// Single thermostat setpoint.
    Target,
}

/// A setpoint property on a climate device.
#[derive(Debug, Clone, Copy)]
pub struct SetpointProperty<'a> {
    /// What the setpoint controls.
    pub kind: SetpointKind,
    /// Owning channel.
    pub channel: &'a Channel,
    /// The temperature property.
    pub property: &'a Property,
}

impl SetpointProperty<'_> {
    /// Current value, if readable.
    #[must_use]
    pub fn current(&self) -> Option<f64> {
        self.property.value.as_ref().and_then(state::as_number)
    }

    /// Device-reported `[min, max]`, if any.
    #[must_use]
    pub fn range(&self) -> Option<(f64, f64)> {
        state::property_range(self.property)
    }
}

/// A climate actuator and its role.
#[derive(Debug, Clone, Copy)]
pub struct ClimateTarget<'a> {
    /// The device.
    pub device: &'a Device,
    /// Assigned role, if any.
    pub role: Option<ClimateRole>,
}

impl<'a> ClimateTarget<'a> {
    /// Heater channel.
    #[must_use]
    pub fn heater(&self) -> Option<&'a Channel> {
        self.device.first_channel(ChannelCategory::Heater)
    }

    /// Cooler channel.
    #[must_use]
    pub fn cooler(&self) -> Option<&'a Channel> {
        self.device.first_channel(ChannelCategory::Cooler)
    }

    /// Thermostat channel.
    #[must_use]
    pub fn thermostat(&self) -> Option<&'a Channel> {
        self.device.first_channel(ChannelCategory::Thermostat)
    }

    /// Setpoint properties. The thermostat setpoint is used only when the
    /// device has no heater or cooler setpoint.
    #[must_use]
    pub fn setpoints(&self) -> Vec<SetpointProperty<'a>> {
        let mut setpoints: Vec<_> = [
            (SetpointKind::Heating, self.heater()),
            (SetpointKind::Cooling, self.cooler()),
        ]
        .into_iter()
        .filter_map(|(kind, channel)| {
            let channel = channel?;
            let property = channel.property(PropertyCategory::Temperature)?;
            Some(SetpointProperty {
                kind,
                channel,
                property,
            })
        })
        .collect();

        if setpoints.is_empty() {
            if let Some(channel) = self.thermostat() {
                if let Some(property) = channel.property(PropertyCategory::Temperature) {
                    setpoints.push(SetpointProperty {
                        kind: SetpointKind::Target,
                        channel,
                        property,
                    });
                }
            }
        }
        setpoints
    }

    /// Channels captured for undo.
    #[must_use]
    pub fn channels(&self) -> Vec<&'a Channel> {
        [self.thermostat(), self.heater(), self.cooler()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Climate actuators in `devices` that orchestration drives: unassigned,
/// primary and auxiliary devices.
#[must_use]
pub fn collect_targets<'a>(devices: &'a [Device], roles: &RoleMap) -> Vec<ClimateTarget<'a>> {
    devices
        .iter()
        .filter(|d| d.category.is_climate_actuator())
        .map(|device| ClimateTarget {
            device,
            role: roles.get(&device.id, None).and_then(|a| match a.role {
                Role::Climate(role) => Some(role),
                Role::Lighting(_) | Role::Covers(_) | Role::Media(_) => None,
            }),
        })
        .filter(|t| t.role.map_or(true, ClimateRole::drives_temperature))
        .collect()
}

/// Resolution of a climate intent for one device, with the setpoints it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateResolution {
    /// What to do.
    pub resolution: Resolution,
    /// Heating setpoint written, if any.
    pub heating: Option<f64>,
    /// Cooling setpoint written, if any.
    pub cooling: Option<f64>,
}

impl ClimateResolution {
    fn failed(error: IntentError) -> Self {
        Self {
            resolution: Resolution::Failed(error),
            heating: None,
            cooling: None,
        }
    }
}

/// Clamp a setpoint to the device range and the configured bounds, then round to 0.5 °C.
#[must_use]
pub fn normalize_setpoint(value: f64, device_range: Option<(f64, f64)>, min: f64, max: f64) -> f64 {
    let (lo, hi) = match device_range {
        Some((device_min, device_max)) if device_min.max(min) <= device_max.min(max) => {
            (device_min.max(min), device_max.min(max))
        }
        _ => (min, max),
    };
    state::round_half(value.clamp(lo, hi)).clamp(lo, hi)
}

/// Resolve a climate intent for every target, in order.
#[must_use]
pub fn resolve(
    intent: &ClimateIntent,
    targets: &[ClimateTarget<'_>],
    config: &OrchestratorConfig,
) -> Vec<ClimateResolution> {
    targets
        .iter()
        .map(|target| resolve_target(intent, target, config))
        .collect()
}

fn resolve_target(
    intent: &ClimateIntent,
    target: &ClimateTarget<'_>,
    config: &OrchestratorConfig,
) -> ClimateResolution {
    let mut writer = SetpointWriter::new(target, config);

    match *intent {
        ClimateIntent::SetMode(mode) => writer.mode(mode),
        ClimateIntent::SetpointSet(Setpoint::Single(value)) => {
            writer.setpoints(|_| Some(value));
        }
        ClimateIntent::SetpointSet(Setpoint::Split { heating, cooling }) => {
            writer.setpoints(|kind| match kind {
                SetpointKind::Heating => heating,
                SetpointKind::Cooling => cooling,
                SetpointKind::Target => heating.or(cooling),
            });
        }
        ClimateIntent::SetpointDelta { delta, increase } => {
            let setpoints = target.setpoints();
            if !setpoints.is_empty() && setpoints.iter().all(|s| s.current().is_none()) {
                return ClimateResolution::failed(IntentError::NoCurrentValue("setpoint"));
            }
            let step = config.setpoint_steps.step(delta);
            let signed = if increase { step } else { -step };
            writer.setpoints(|_| None);
            for setpoint in setpoints {
                if let Some(current) = setpoint.current() {
                    writer.write_setpoint(&setpoint, current + signed);
                }
            }
        }
        ClimateIntent::ClimateSet { mode, setpoint } => {
            if let Some(mode) = mode {
                writer.mode(mode);
            }
            if let Some(value) = setpoint {
                writer.setpoints(|_| Some(value));
            }
        }
    }

    writer.finish()
}

/// Accumulates commands for one climate device.
struct SetpointWriter<'t, 'a> {
    target: &'t ClimateTarget<'a>,
    config: &'t OrchestratorConfig,
    commands: Vec<PropertyCommand>,
    heating: Option<f64>,
    cooling: Option<f64>,
}

impl<'t, 'a> SetpointWriter<'t, 'a> {
    fn new(target: &'t ClimateTarget<'a>, config: &'t OrchestratorConfig) -> Self {
        Self {
            target,
            config,
            commands: Vec::new(),
            heating: None,
            cooling: None,
        }
    }

    fn mode(&mut self, mode: ClimateMode) {
        let device = self.target.device;
        if let Some(heater) = self.target.heater() {
            write_if_supported(&mut self.commands, device, heater, PropertyCategory::On, mode.heater_on());
        }
        if let Some(cooler) = self.target.cooler() {
            write_if_supported(&mut self.commands, device, cooler, PropertyCategory::On, mode.cooler_on());
        }
        if let Some(thermostat) = self.target.thermostat() {
            write_if_supported(
                &mut self.commands,
                device,
                thermostat,
                PropertyCategory::Active,
                mode != ClimateMode::Off,
            );
            write_if_supported(
                &mut self.commands,
                device,
                thermostat,
                PropertyCategory::Mode,
                mode.as_str(),
            );
        }
    }

    fn setpoints(&mut self, value_for: impl Fn(SetpointKind) -> Option<f64>) {
        for setpoint in self.target.setpoints() {
            if let Some(value) = value_for(setpoint.kind) {
                self.write_setpoint(&setpoint, value);
            }
        }
    }

    fn write_setpoint(&mut self, setpoint: &SetpointProperty<'_>, value: f64) {
        let value = normalize_setpoint(
            value,
            setpoint.range(),
            self.config.setpoint_min,
            self.config.setpoint_max,
        );
        self.commands.push(PropertyCommand::new(
            self.target.device.id,
            setpoint.channel.id,
            setpoint.property.id,
            value,
        ));
        match setpoint.kind {
            SetpointKind::Heating => self.heating = Some(value),
            SetpointKind::Cooling => self.cooling = Some(value),
            SetpointKind::Target => {
                self.heating = Some(value);
                self.cooling = Some(value);
            }
        }
    }

    fn finish(self) -> ClimateResolution {
        ClimateResolution {
            resolution: Resolution::from_commands(self.commands),
            heating: self.heating,
            cooling: self.cooling,
        }
    }
}
