//! Orchestration configuration.
//!
//! This module holds the rule tables that drive mode orchestration (role to
//! brightness or position) together with step sizes, safety bounds and timing
//! constants. Every field has a default, so an empty JSON document is a valid
//! configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spaces_store::{CoversRole, LightingRole, MediaRole};

use crate::error::{OrchestratorError, Result};
use crate::intent::{CoversMode, DeltaSize, LightingMode, MediaMode};
use crate::routing::OfflineWait;
use crate::suggestion::DEFAULT_BEDROOM_PATTERNS;

/// Lowest setpoint ever sent to a device, in °C.
pub const ABSOLUTE_SETPOINT_MIN: f64 = -10.0;

/// Highest setpoint ever sent to a device, in °C.
pub const ABSOLUTE_SETPOINT_MAX: f64 = 50.0;

/// What a lighting role does in a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Whether lights with the role are switched on.
    pub on: bool,
    /// Brightness for lights that are switched on.
    #[serde(default)]
    pub brightness: Option<u8>,
}

impl RoleRule {
    /// Switch on at the given brightness.
    #[must_use]
    pub const fn on(brightness: u8) -> Self {
        Self {
            on: true,
            brightness: Some(brightness),
        }
    }

    /// Switch off.
    #[must_use]
    pub const fn off() -> Self {
        Self {
            on: false,
            brightness: None,
        }
    }
}

/// What a media role does in a mode. Unset fields are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaRoleRule {
    /// Power state.
    #[serde(default)]
    pub power: Option<bool>,
    /// Volume, only applied when not powering off.
    #[serde(default)]
    pub volume: Option<u8>,
    /// Mute state, only applied when not powering off.
    #[serde(default)]
    pub muted: Option<bool>,
}

impl MediaRoleRule {
    /// Power off.
    pub const OFF: Self = Self {
        power: Some(false),
        volume: None,
        muted: None,
    };

    /// Power on at a volume, unmuted.
    #[must_use]
    pub const fn playing(volume: u8) -> Self {
        Self {
            power: Some(true),
            volume: Some(volume),
            muted: Some(false),
        }
    }
}

/// Orchestration rules of one lighting mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightingModeConfig {
    /// Brightness applied to every light when no light in the space has a role.
    pub mvp_brightness: u8,
    /// Per-role rules. Roles without a rule are left untouched.
    #[serde(default)]
    pub roles: BTreeMap<LightingRole, RoleRule>,
    /// Roles switched on instead when no light has the mode's own role (night mode).
    #[serde(default)]
    pub fallback_roles: Vec<LightingRole>,
    /// Brightness used for `fallback_roles`.
    #[serde(default)]
    pub fallback_brightness: Option<u8>,
}

/// Small, medium and large step sizes for relative adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepSizes<T> {
    /// Small step.
    pub small: T,
    /// Medium step.
    pub medium: T,
    /// Large step.
    pub large: T,
}

impl<T: Copy> StepSizes<T> {
    /// Step for the given delta size.
    pub fn step(&self, size: DeltaSize) -> T {
        match size {
            DeltaSize::Small => self.small,
            DeltaSize::Medium => self.medium,
            DeltaSize::Large => self.large,
        }
    }
}

/// Configuration for the orchestrator service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Lighting mode rules.
    #[serde(default = "OrchestratorConfig::default_lighting_modes")]
    pub lighting_modes: BTreeMap<LightingMode, LightingModeConfig>,

    /// Covers mode rules: role to position (0 closed, 100 open).
    #[serde(default = "OrchestratorConfig::default_covers_modes")]
    pub covers_modes: BTreeMap<CoversMode, BTreeMap<CoversRole, u8>>,

    /// Media mode rules: role to power, volume and mute.
    #[serde(default = "OrchestratorConfig::default_media_modes")]
    pub media_modes: BTreeMap<MediaMode, BTreeMap<MediaRole, MediaRoleRule>>,

    /// Brightness steps in percent.
    #[serde(default = "OrchestratorConfig::default_brightness_steps")]
    pub brightness_steps: StepSizes<u8>,

    /// Setpoint steps in °C.
    #[serde(default = "OrchestratorConfig::default_setpoint_steps")]
    pub setpoint_steps: StepSizes<f64>,

    /// Position steps in percent.
    #[serde(default = "OrchestratorConfig::default_position_steps")]
    pub position_steps: StepSizes<u8>,

    /// Volume steps in percent.
    #[serde(default = "OrchestratorConfig::default_volume_steps")]
    pub volume_steps: StepSizes<u8>,

    /// Lowest allowed setpoint in °C.
    #[serde(default = "OrchestratorConfig::default_setpoint_min")]
    pub setpoint_min: f64,

    /// Highest allowed setpoint in °C.
    #[serde(default = "OrchestratorConfig::default_setpoint_max")]
    pub setpoint_max: f64,

    /// How long an undo entry stays valid, in seconds.
    #[serde(default = "OrchestratorConfig::default_undo_ttl")]
    pub undo_ttl_seconds: u64,

    /// How long a dismissed or applied suggestion stays quiet, in seconds.
    #[serde(default = "OrchestratorConfig::default_suggestion_cooldown")]
    pub suggestion_cooldown_seconds: u64,

    /// Substrings marking a space name as a bedroom, matched ignoring case.
    #[serde(default = "OrchestratorConfig::default_bedroom_patterns")]
    pub bedroom_patterns: Vec<String>,

    /// How long a WAIT routing waits for an offline device, in milliseconds.
    #[serde(default = "OrchestratorConfig::default_media_offline_wait")]
    pub media_offline_wait_ms: u64,

    /// How often a WAIT routing polls for the device, in milliseconds.
    #[serde(default = "OrchestratorConfig::default_media_poll_interval")]
    pub media_poll_interval_ms: u64,
}

impl OrchestratorConfig {
    fn default_lighting_modes() -> BTreeMap<LightingMode, LightingModeConfig> {
        use LightingRole::{Accent, Ambient, Main, Night, Other, Task};

        let work = LightingModeConfig {
            mvp_brightness: 100,
            roles: BTreeMap::from([
                (Main, RoleRule::on(100)),
                (Task, RoleRule::on(100)),
                (Ambient, RoleRule::on(70)),
                (Accent, RoleRule::on(50)),
                (Night, RoleRule::off()),
                (Other, RoleRule::on(100)),
            ]),
            fallback_roles: Vec::new(),
            fallback_brightness: None,
        };

        let relax = LightingModeConfig {
            mvp_brightness: 50,
            roles: BTreeMap::from([
                (Main, RoleRule::on(40)),
                (Task, RoleRule::off()),
                (Ambient, RoleRule::on(50)),
                (Accent, RoleRule::on(60)),
                (Night, RoleRule::off()),
                (Other, RoleRule::on(50)),
            ]),
            fallback_roles: Vec::new(),
            fallback_brightness: None,
        };

        let night = LightingModeConfig {
            mvp_brightness: 20,
            roles: BTreeMap::from([
                (Main, RoleRule::off()),
                (Task, RoleRule::off()),
                (Ambient, RoleRule::off()),
                (Accent, RoleRule::off()),
                (Night, RoleRule::on(20)),
                (Other, RoleRule::off()),
            ]),
            fallback_roles: vec![Main, Ambient],
            fallback_brightness: Some(20),
        };

        BTreeMap::from([
            (LightingMode::Work, work),
            (LightingMode::Relax, relax),
            (LightingMode::Night, night),
        ])
    }

    fn default_covers_modes() -> BTreeMap<CoversMode, BTreeMap<CoversRole, u8>> {
        use CoversRole::{Blackout, Outdoor, Primary, Sheer};

        let all = |position: u8| {
            BTreeMap::from([
                (Primary, position),
                (Blackout, position),
                (Sheer, position),
                (Outdoor, position),
            ])
        };

        BTreeMap::from([
            (CoversMode::Open, all(100)),
            (CoversMode::Closed, all(0)),
            (
                CoversMode::Privacy,
                BTreeMap::from([(Primary, 50), (Blackout, 100), (Sheer, 0), (Outdoor, 100)]),
            ),
            (
                CoversMode::Daylight,
                BTreeMap::from([(Primary, 75), (Blackout, 100), (Sheer, 0), (Outdoor, 100)]),
            ),
        ])
    }

    fn default_media_modes() -> BTreeMap<MediaMode, BTreeMap<MediaRole, MediaRoleRule>> {
        use MediaRole::{Background, Gaming, Primary, Secondary};

        let off = MediaRoleRule::OFF;
        BTreeMap::from([
            (
                MediaMode::Off,
                BTreeMap::from([(Primary, off), (Secondary, off), (Background, off), (Gaming, off)]),
            ),
            (
                MediaMode::Background,
                BTreeMap::from([
                    (Primary, off),
                    (Secondary, off),
                    (Background, MediaRoleRule::playing(30)),
                    (Gaming, off),
                ]),
            ),
            (
                MediaMode::Focused,
                BTreeMap::from([
                    (Primary, MediaRoleRule::playing(50)),
                    (Secondary, off),
                    (
                        Background,
                        MediaRoleRule {
                            power: Some(true),
                            volume: None,
                            muted: Some(true),
                        },
                    ),
                    (Gaming, off),
                ]),
            ),
            (
                MediaMode::Party,
                BTreeMap::from([
                    (Primary, MediaRoleRule::playing(70)),
                    (Secondary, MediaRoleRule::playing(70)),
                    (Background, MediaRoleRule::playing(70)),
                ]),
            ),
        ])
    }

    const fn default_brightness_steps() -> StepSizes<u8> {
        StepSizes {
            small: 10,
            medium: 25,
            large: 50,
        }
    }

    const fn default_setpoint_steps() -> StepSizes<f64> {
        StepSizes {
            small: 0.5,
            medium: 1.0,
            large: 2.0,
        }
    }

    const fn default_position_steps() -> StepSizes<u8> {
        StepSizes {
            small: 10,
            medium: 25,
            large: 50,
        }
    }

    const fn default_volume_steps() -> StepSizes<u8> {
        StepSizes {
            small: 5,
            medium: 10,
            large: 20,
        }
    }

    const fn default_setpoint_min() -> f64 {
        ABSOLUTE_SETPOINT_MIN
    }

    const fn default_setpoint_max() -> f64 {
        ABSOLUTE_SETPOINT_MAX
    }

    const fn default_undo_ttl() -> u64 {
        300 // 5 minutes
    }

    const fn default_suggestion_cooldown() -> u64 {
        1800 // 30 minutes
    }

    const fn default_media_offline_wait() -> u64 {
        10_000
    }

    const fn default_media_poll_interval() -> u64 {
        500
    }

    fn default_bedroom_patterns() -> Vec<String> {
        DEFAULT_BEDROOM_PATTERNS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Config` if the document is malformed or out of bounds.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OrchestratorError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Config` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Check numeric bounds.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.setpoint_min < ABSOLUTE_SETPOINT_MIN || self.setpoint_max > ABSOLUTE_SETPOINT_MAX
        {
            return Err(OrchestratorError::Config(format!(
                "setpoint bounds must stay within {ABSOLUTE_SETPOINT_MIN}..{ABSOLUTE_SETPOINT_MAX}"
            )));
        }
        if self.setpoint_min >= self.setpoint_max {
            return Err(OrchestratorError::Config(
                "setpoint_min must be below setpoint_max".into(),
            ));
        }

        let brightness_values = self.lighting_modes.iter().flat_map(|(mode, rules)| {
            rules
                .roles
                .values()
                .filter_map(|r| r.brightness)
                .chain([rules.mvp_brightness])
                .chain(rules.fallback_brightness)
                .map(move |b| (format!("{mode:?}"), b))
        });
        let position_values = self
            .covers_modes
            .iter()
            .flat_map(|(mode, roles)| roles.values().map(move |p| (format!("{mode:?}"), *p)));
        let volume_values = self.media_modes.iter().flat_map(|(mode, roles)| {
            roles
                .values()
                .filter_map(|r| r.volume)
                .map(move |v| (format!("{mode:?}"), v))
        });

        if let Some((mode, value)) = brightness_values
            .chain(position_values)
            .chain(volume_values)
            .find(|(_, value)| *value > 100)
        {
            return Err(OrchestratorError::Config(format!(
                "mode {mode} uses {value}%, above 100%"
            )));
        }

        if self.media_poll_interval_ms == 0 {
            return Err(OrchestratorError::Config(
                "media_poll_interval_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Get the undo TTL as a `Duration`.
    #[must_use]
    pub const fn undo_ttl(&self) -> Duration {
        Duration::from_secs(self.undo_ttl_seconds)
    }

    /// Get the suggestion cooldown as a `Duration`.
    #[must_use]
    pub const fn suggestion_cooldown(&self) -> Duration {
        Duration::from_secs(self.suggestion_cooldown_seconds)
    }

    /// Timings for routings that wait for offline devices.
    #[must_use]
    pub const fn offline_wait(&self) -> OfflineWait {
        OfflineWait {
            timeout: Duration::from_millis(self.media_offline_wait_ms),
            poll_interval: Duration::from_millis(self.media_poll_interval_ms),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lighting_modes: Self::default_lighting_modes(),
            covers_modes: Self::default_covers_modes(),
            media_modes: Self::default_media_modes(),
            brightness_steps: Self::default_brightness_steps(),
            setpoint_steps: Self::default_setpoint_steps(),
            position_steps: Self::default_position_steps(),
            volume_steps: Self::default_volume_steps(),
            setpoint_min: Self::default_setpoint_min(),
            setpoint_max: Self::default_setpoint_max(),
            undo_ttl_seconds: Self::default_undo_ttl(),
            suggestion_cooldown_seconds: Self::default_suggestion_cooldown(),
            bedroom_patterns: Self::default_bedroom_patterns(),
            media_offline_wait_ms: Self::default_media_offline_wait(),
            media_poll_interval_ms: Self::default_media_poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.undo_ttl(), Duration::from_secs(300));
        assert_eq!(config.suggestion_cooldown(), Duration::from_secs(1800));
        assert_eq!(config.brightness_steps.step(DeltaSize::Large), 50);
        assert!((config.setpoint_steps.step(DeltaSize::Small) - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.offline_wait(), OfflineWait::default());
        assert!(config.validate().is_ok());

        let night = &config.lighting_modes[&LightingMode::Night];
        assert_eq!(night.roles[&LightingRole::Night], RoleRule::on(20));
        assert_eq!(night.fallback_roles, vec![LightingRole::Main, LightingRole::Ambient]);

        assert_eq!(config.volume_steps.step(DeltaSize::Small), 5);
        let focused = &config.media_modes[&MediaMode::Focused];
        assert_eq!(focused[&MediaRole::Primary], MediaRoleRule::playing(50));
        assert_eq!(focused[&MediaRole::Secondary], MediaRoleRule::OFF);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = OrchestratorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = OrchestratorConfig::from_json_str(
            r#"{
                "setpoint_min": 5,
                "setpoint_max": 30,
                "lighting_modes": {
                    "work": { "mvp_brightness": 90, "roles": { "main": { "on": true, "brightness": 80 } } }
                }
            }"#,
        )
        .unwrap();

        assert!((config.setpoint_min - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.lighting_modes.len(), 1);
        assert_eq!(
            config.lighting_modes[&LightingMode::Work].roles[&LightingRole::Main],
            RoleRule::on(80)
        );
        assert_eq!(config.covers_modes.len(), 4);
    }

    #[test]
    fn out_of_bounds_setpoints_are_rejected() {
        let err = OrchestratorConfig::from_json_str(r#"{ "setpoint_max": 60 }"#).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));

        let err = OrchestratorConfig::from_json_str(r#"{ "setpoint_min": 25, "setpoint_max": 20 }"#)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn offline_wait_is_configurable() {
        let config = OrchestratorConfig::from_json_str(
            r#"{ "media_offline_wait_ms": 2000, "media_poll_interval_ms": 100 }"#,
        )
        .unwrap();
        assert_eq!(config.offline_wait().timeout, Duration::from_secs(2));
        assert_eq!(config.offline_wait().poll_interval, Duration::from_millis(100));

        let err = OrchestratorConfig::from_json_str(r#"{ "media_poll_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn percentages_above_hundred_are_rejected() {
        let err = OrchestratorConfig::from_json_str(
            r#"{ "covers_modes": { "open": { "primary": 120 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));

        let err = OrchestratorConfig::from_json_str(
            r#"{ "media_modes": { "party": { "primary": { "power": true, "volume": 101 } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orchestration.json");
        std::fs::write(&path, r#"{ "undo_ttl_seconds": 60 }"#).unwrap();

        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.undo_ttl_seconds, 60);

        assert!(OrchestratorConfig::load(dir.path().join("missing.json")).is_err());
    }
}
