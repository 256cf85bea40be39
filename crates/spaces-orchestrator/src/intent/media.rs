//! Media intents.
//!
//! Media devices are driven per channel: television and speaker channels
//! carry power, volume and mute, input and playback channels carry source
//! selection and transport commands. Capabilities a target lacks leave it
//! untouched rather than failed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spaces_core::{Channel, ChannelCategory, Device, Property, PropertyCategory, PropertyValue};
use spaces_store::{MediaRole, Role};

use super::lighting::apply_delta;
use super::{DeltaSize, IntentError, Resolution};
use crate::config::{MediaRoleRule, OrchestratorConfig};
use crate::platform::PropertyCommand;
use crate::roles::RoleMap;
use crate::state;

/// Volume assumed when a delta targets a device that reports none.
const UNKNOWN_VOLUME: f64 = 50.0;

/// Media scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    /// Everything off.
    Off,
    /// Quiet audio from the background speakers only.
    Background,
    /// The primary screen at normal volume, everything else quiet.
    Focused,
    /// Everything on and loud.
    Party,
}

impl MediaMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Background => "background",
            Self::Focused => "focused",
            Self::Party => "party",
        }
    }
}

/// Transport command sent to playback-capable devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackCommand {
    /// Start or resume.
    Play,
    /// Pause.
    Pause,
    /// Stop.
    Stop,
    /// Skip forward.
    Next,
    /// Skip back.
    Previous,
}

impl PlaybackCommand {
    /// Value written to the command or remote key property.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Next => "next",
            Self::Previous => "previous",
        }
    }
}

/// Wire tag of a media intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaIntentType {
    /// Power every device on.
    PowerOn,
    /// Power every device off.
    PowerOff,
    /// Set every volume.
    VolumeSet,
    /// Move every volume by a step.
    VolumeDelta,
    /// Mute everything.
    Mute,
    /// Unmute everything.
    Unmute,
    /// Power the devices of one role.
    RolePower,
    /// Set the volume of one role.
    RoleVolume,
    /// Start playback.
    Play,
    /// Pause playback.
    Pause,
    /// Stop playback.
    Stop,
    /// Skip forward.
    Next,
    /// Skip back.
    Previous,
    /// Select an input source.
    InputSet,
    /// Apply a media mode.
    SetMode,
}

/// Media intent as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIntentRequest {
    /// Intent type.
    #[serde(rename = "type")]
    pub intent_type: MediaIntentType,
    /// Volume for `volume_set` and `role_volume`.
    #[serde(default)]
    pub volume: Option<u8>,
    /// Step size for `volume_delta`.
    #[serde(default)]
    pub delta: Option<DeltaSize>,
    /// Direction for `volume_delta`.
    #[serde(default)]
    pub increase: Option<bool>,
    /// Role for `role_power` and `role_volume`.
    #[serde(default)]
    pub role: Option<MediaRole>,
    /// Power state for `role_power`.
    #[serde(default)]
    pub on: Option<bool>,
    /// Input source for `input_set`.
    #[serde(default)]
    pub source: Option<String>,
    /// Mode for `set_mode`.
    #[serde(default)]
    pub mode: Option<MediaMode>,
}

impl MediaIntentRequest {
    /// A request of the given type with no fields set.
    #[must_use]
    pub const fn new(intent_type: MediaIntentType) -> Self {
        Self {
            intent_type,
            volume: None,
            delta: None,
            increase: None,
            role: None,
            on: None,
            source: None,
            mode: None,
        }
    }
}

/// A validated media intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaIntent {
    /// Power every device on.
    PowerOn,
    /// Power every device off.
    PowerOff,
    /// Set every volume.
    VolumeSet(u8),
    /// Move every volume by a step.
    VolumeDelta {
        /// Step size.
        delta: DeltaSize,
        /// Direction.
        increase: bool,
    },
    /// Mute everything.
    Mute,
    /// Unmute everything.
    Unmute,
    /// Power the devices of one role.
    RolePower {
        /// Role to drive.
        role: MediaRole,
        /// Target power state.
        on: bool,
    },
    /// Set the volume of one role.
    RoleVolume {
        /// Role to drive.
        role: MediaRole,
        /// Target volume.
        volume: u8,
    },
    /// Send a transport command.
    Playback(PlaybackCommand),
    /// Select an input source.
    InputSet(String),
    /// Apply a media mode.
    SetMode(MediaMode),
}

impl TryFrom<MediaIntentRequest> for MediaIntent {
    type Error = IntentError;

    fn try_from(request: MediaIntentRequest) -> Result<Self, Self::Error> {
        let volume = || {
            request
                .volume
                .map(|v| v.min(100))
                .ok_or(IntentError::MissingField("volume"))
        };
        let role = || request.role.ok_or(IntentError::MissingField("role"));

        Ok(match request.intent_type {
            MediaIntentType::PowerOn => Self::PowerOn,
            MediaIntentType::PowerOff => Self::PowerOff,
            MediaIntentType::VolumeSet => Self::VolumeSet(volume()?),
            MediaIntentType::VolumeDelta => Self::VolumeDelta {
                delta: request.delta.ok_or(IntentError::MissingField("delta"))?,
                increase: request
                    .increase
                    .ok_or(IntentError::MissingField("increase"))?,
            },
            MediaIntentType::Mute => Self::Mute,
            MediaIntentType::Unmute => Self::Unmute,
            MediaIntentType::RolePower => Self::RolePower {
                role: role()?,
                on: request.on.ok_or(IntentError::MissingField("on"))?,
            },
            MediaIntentType::RoleVolume => Self::RoleVolume {
                role: role()?,
                volume: volume()?,
            },
            MediaIntentType::Play => Self::Playback(PlaybackCommand::Play),
            MediaIntentType::Pause => Self::Playback(PlaybackCommand::Pause),
            MediaIntentType::Stop => Self::Playback(PlaybackCommand::Stop),
            MediaIntentType::Next => Self::Playback(PlaybackCommand::Next),
            MediaIntentType::Previous => Self::Playback(PlaybackCommand::Previous),
            MediaIntentType::InputSet => Self::InputSet(
                request
                    .source
                    .filter(|s| !s.is_empty())
                    .ok_or(IntentError::MissingField("source"))?,
            ),
            MediaIntentType::SetMode => {
                Self::SetMode(request.mode.ok_or(IntentError::MissingField("mode"))?)
            }
        })
    }
}

/// A media channel and its role.
#[derive(Debug, Clone, Copy)]
pub struct MediaTarget<'a> {
    /// Owning device.
    pub device: &'a Device,
    /// Media channel.
    pub channel: &'a Channel,
    /// Assigned role, if any.
    pub role: Option<MediaRole>,
}

impl<'a> MediaTarget<'a> {
    fn carries_audio(&self) -> bool {
        matches!(
            self.channel.category,
            ChannelCategory::Television | ChannelCategory::Speaker
        )
    }

    /// Power switch of the channel; only television channels have one.
    #[must_use]
    pub fn power_property(&self) -> Option<&'a Property> {
        if self.channel.category != ChannelCategory::Television {
            return None;
        }
        self.channel
            .property(PropertyCategory::On)
            .or_else(|| self.channel.property(PropertyCategory::Active))
    }

    /// Volume property of a television or speaker channel.
    #[must_use]
    pub fn volume_property(&self) -> Option<&'a Property> {
        self.carries_audio()
            .then(|| self.channel.property(PropertyCategory::Volume))
            .flatten()
    }

    /// Mute property of a television or speaker channel.
    #[must_use]
    pub fn mute_property(&self) -> Option<&'a Property> {
        self.carries_audio()
            .then(|| self.channel.property(PropertyCategory::Mute))
            .flatten()
    }

    /// Transport property: a playback command, or a television remote key.
    #[must_use]
    pub fn playback_property(&self) -> Option<&'a Property> {
        match self.channel.category {
            ChannelCategory::MediaPlayback => self.channel.property(PropertyCategory::Command),
            ChannelCategory::Television => self.channel.property(PropertyCategory::RemoteKey),
            _ => None,
        }
    }

    /// Input selector of the device: the television channel's, else the input channel's.
    #[must_use]
    pub fn input_property(&self) -> Option<(&'a Channel, &'a Property)> {
        let on = |category: ChannelCategory| {
            self.device.channels_of(category).find_map(|c| {
                c.property(PropertyCategory::InputSource)
                    .map(|p| (c, p))
            })
        };
        on(ChannelCategory::Television).or_else(|| on(ChannelCategory::MediaInput))
    }

    /// Whether the channel has a power switch that reads off.
    #[must_use]
    pub fn is_switched_off(&self) -> bool {
        self.power_property().is_some_and(|p| {
            !p.value
                .as_ref()
                .and_then(state::as_bool)
                .unwrap_or(false)
        })
    }

    /// Current volume, if readable.
    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        self.volume_property()
            .and_then(|p| p.value.as_ref())
            .and_then(state::as_number)
    }

    /// Volume this target ends up at after `resolution`.
    #[must_use]
    pub fn applied_volume(&self, resolution: &Resolution) -> Option<f64> {
        let volume_id = self.volume_property()?.id;
        resolution
            .commands()?
            .iter()
            .find(|c| c.property_id == volume_id)
            .and_then(|c| state::as_number(&c.value))
    }

    fn is_control_channel(&self) -> bool {
        self.power_property().is_some()
            || self.volume_property().is_some()
            || self.mute_property().is_some()
            || self.playback_property().is_some()
            || matches!(self.channel.category, ChannelCategory::MediaInput)
            || (self.channel.category == ChannelCategory::Television
                && self.channel.property(PropertyCategory::InputSource).is_some())
    }

    fn write(&self, property: &Property, value: impl Into<PropertyValue>) -> PropertyCommand {
        PropertyCommand::new(self.device.id, self.channel.id, property.id, value)
    }
}

/// Every controllable media channel in `devices`, skipping hidden devices.
#[must_use]
pub fn collect_targets<'a>(devices: &'a [Device], roles: &RoleMap) -> Vec<MediaTarget<'a>> {
    devices
        .iter()
        .filter(|d| d.category.is_media_device())
        .flat_map(|device| {
            device.channels.iter().map(move |channel| MediaTarget {
                device,
                channel,
                role: roles
                    .get(&device.id, Some(&channel.id))
                    .and_then(|a| match a.role {
                        Role::Media(role) => Some(role),
                        Role::Lighting(_) | Role::Climate(_) | Role::Covers(_) => None,
                    }),
            })
        })
        .filter(|t| t.role != Some(MediaRole::Hidden))
        .filter(MediaTarget::is_control_channel)
        .collect()
}

/// Pick the rule each target gets in a mode.
///
/// With no roles in the space every target takes the primary rule. Otherwise
/// unassigned targets take the secondary rule, and a role without a rule in
/// the mode is powered off.
#[must_use]
pub fn select_rules_for_mode(
    rules: &BTreeMap<MediaRole, MediaRoleRule>,
    targets: &[MediaTarget<'_>],
) -> Vec<MediaRoleRule> {
    let rule_for = |role| rules.get(&role).copied().unwrap_or(MediaRoleRule::OFF);

    if targets.iter().all(|t| t.role.is_none()) {
        return vec![rule_for(MediaRole::Primary); targets.len()];
    }

    targets
        .iter()
        .map(|t| rule_for(t.role.unwrap_or(MediaRole::Secondary)))
        .collect()
}

/// Resolve a media intent for every target, in order.
#[must_use]
pub fn resolve(
    intent: &MediaIntent,
    targets: &[MediaTarget<'_>],
    config: &OrchestratorConfig,
) -> Vec<Resolution> {
    match intent {
        MediaIntent::SetMode(mode) => {
            let Some(rules) = config.media_modes.get(mode) else {
                let error = IntentError::UnknownMode(mode.as_str().to_string());
                return vec![Resolution::Failed(error); targets.len()];
            };
            select_rules_for_mode(rules, targets)
                .into_iter()
                .zip(targets)
                .map(|(rule, target)| apply_rule(target, rule))
                .collect()
        }
        MediaIntent::Playback(command) => {
            // One transport command per device, on its first capable channel.
            let mut sent = Vec::new();
            targets
                .iter()
                .map(|target| match target.playback_property() {
                    Some(property) if !sent.contains(&target.device.id) => {
                        sent.push(target.device.id);
                        Resolution::Commands(vec![target.write(property, command.as_str())])
                    }
                    _ => Resolution::Untouched,
                })
                .collect()
        }
        _ => targets
            .iter()
            .map(|target| resolve_target(intent, target, config))
            .collect(),
    }
}

fn apply_rule(target: &MediaTarget<'_>, rule: MediaRoleRule) -> Resolution {
    let mut commands = Vec::with_capacity(3);
    if let (Some(power), Some(property)) = (rule.power, target.power_property()) {
        commands.push(target.write(property, power));
    }
    if rule.power != Some(false) {
        if let (Some(volume), Some(property)) = (rule.volume, target.volume_property()) {
            commands.push(target.write(property, volume.min(100)));
        }
        if let (Some(muted), Some(property)) = (rule.muted, target.mute_property()) {
            commands.push(target.write(property, muted));
        }
    }
    Resolution::from_commands(commands)
}

fn set_power(target: &MediaTarget<'_>, on: bool) -> Resolution {
    match target.power_property() {
        Some(property) => Resolution::Commands(vec![target.write(property, on)]),
        None => Resolution::Untouched,
    }
}

fn set_volume(target: &MediaTarget<'_>, volume: u8) -> Resolution {
    match target.volume_property() {
        Some(property) if !target.is_switched_off() => {
            Resolution::Commands(vec![target.write(property, volume)])
        }
        _ => Resolution::Untouched,
    }
}

fn resolve_target(
    intent: &MediaIntent,
    target: &MediaTarget<'_>,
    config: &OrchestratorConfig,
) -> Resolution {
    match intent {
        MediaIntent::PowerOn => set_power(target, true),
        MediaIntent::PowerOff => set_power(target, false),
        MediaIntent::VolumeSet(volume) => set_volume(target, *volume),
        MediaIntent::VolumeDelta { delta, increase } => {
            let Some(property) = target.volume_property() else {
                return Resolution::Untouched;
            };
            if target.is_switched_off() {
                return Resolution::Untouched;
            }
            let current = target.volume().unwrap_or(UNKNOWN_VOLUME);
            let step = f64::from(config.volume_steps.step(*delta));
            Resolution::Commands(vec![target.write(property, apply_delta(current, step, *increase))])
        }
        MediaIntent::Mute => match (target.mute_property(), target.volume_property()) {
            (Some(mute), _) => Resolution::Commands(vec![target.write(mute, true)]),
            // Devices without a mute switch go silent instead.
            (None, Some(volume)) => Resolution::Commands(vec![target.write(volume, 0u8)]),
            (None, None) => Resolution::Untouched,
        },
        MediaIntent::Unmute => match target.mute_property() {
            Some(mute) => Resolution::Commands(vec![target.write(mute, false)]),
            None => Resolution::Untouched,
        },
        MediaIntent::RolePower { role, on } if target.role == Some(*role) => set_power(target, *on),
        MediaIntent::RoleVolume { role, volume } if target.role == Some(*role) => {
            set_volume(target, *volume)
        }
        MediaIntent::InputSet(source) => match target.input_property() {
            Some((channel, property)) if channel.id == target.channel.id => {
                Resolution::Commands(vec![PropertyCommand::new(
                    target.device.id,
                    channel.id,
                    property.id,
                    source.as_str(),
                )])
            }
            _ => Resolution::Untouched,
        },
        MediaIntent::RolePower { .. }
        | MediaIntent::RoleVolume { .. }
        | MediaIntent::Playback(_)
        | MediaIntent::SetMode(_) => Resolution::Untouched,
    }
}
