//! Device state reader.
//!
//! Platforms report property values loosely typed: booleans as `"on"` or `1`,
//! numbers as strings. The helpers here normalise them, and the summary
//! functions aggregate a space's devices into per-domain state.

use serde::Serialize;
use spaces_core::{Channel, Device, Property, PropertyCategory, PropertyFormat, PropertyValue};

use crate::config::{OrchestratorConfig, ABSOLUTE_SETPOINT_MAX, ABSOLUTE_SETPOINT_MIN};
use crate::intent::climate::{self, ClimateMode, SetpointKind};
use crate::intent::lighting::{self, LightTarget};
use crate::intent::covers;
use crate::roles::RoleMap;

/// Setpoints of one kind that differ by more than this are "mixed".
pub const SETPOINT_TOLERANCE: f64 = 0.5;

// =============================================================================
// Value normalisation
// =============================================================================

/// Read a value as a boolean.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn as_bool(value: &PropertyValue) -> Option<bool> {
    match value {
        PropertyValue::Bool(b) => Some(*b),
        PropertyValue::Number(n) if *n == 1.0 => Some(true),
        PropertyValue::Number(n) if *n == 0.0 => Some(false),
        PropertyValue::Number(_) => None,
        PropertyValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
    }
}

/// Read a value as a number.
#[must_use]
pub fn as_number(value: &PropertyValue) -> Option<f64> {
    match value {
        PropertyValue::Number(n) if n.is_finite() => Some(*n),
        PropertyValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        PropertyValue::Number(_) | PropertyValue::Bool(_) => None,
    }
}

/// Boolean value of the first property of `category` on a channel.
#[must_use]
pub fn channel_bool(channel: &Channel, category: PropertyCategory) -> Option<bool> {
    channel
        .property(category)
        .and_then(|p| p.value.as_ref())
        .and_then(as_bool)
}

/// Numeric value of the first property of `category` on a channel.
#[must_use]
pub fn channel_number(channel: &Channel, category: PropertyCategory) -> Option<f64> {
    channel
        .property(category)
        .and_then(|p| p.value.as_ref())
        .and_then(as_number)
}

/// `[min, max]` a property accepts, from a range format or `"min:max"` / `"min|max"` text.
#[must_use]
pub fn property_range(property: &Property) -> Option<(f64, f64)> {
    let (min, max) = match property.format.as_ref()? {
        PropertyFormat::Range([min, max]) => (*min, *max),
        PropertyFormat::Text(text) => {
            let (min, max) = text.split_once(':').or_else(|| text.split_once('|'))?;
            (min.trim().parse().ok()?, max.trim().parse().ok()?)
        }
        PropertyFormat::Options(_) => return None,
    };
    (min.is_finite() && max.is_finite() && min <= max).then_some((min, max))
}

/// Round to the nearest 0.5.
#[must_use]
pub fn round_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

#[allow(clippy::cast_precision_loss)]
fn average(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn spread(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        0.0
    } else {
        max - min
    }
}

// =============================================================================
// Lighting
// =============================================================================

/// Lighting summary of a space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingState {
    /// Whether the space has any visible light.
    pub has_lighting: bool,
    /// Number of visible lights.
    pub lights_count: usize,
    /// Number of lights reporting on.
    pub on_count: usize,
    /// Average brightness of the lights that are on and report one.
    pub average_brightness: Option<f64>,
}

impl LightingState {
    /// Whether any light is on.
    #[must_use]
    pub const fn any_on(&self) -> bool {
        self.on_count > 0
    }
}

/// Summarise the lights of a space, ignoring hidden ones.
///
/// The reported average is rounded to a whole percent.
#[must_use]
pub fn lighting_state(devices: &[Device], roles: &RoleMap) -> LightingState {
    let lights = lighting::collect_targets(devices, roles);

    LightingState {
        has_lighting: !lights.is_empty(),
        lights_count: lights.len(),
        on_count: lights.iter().filter(|l| l.is_on()).count(),
        average_brightness: on_brightness_average(&lights).map(f64::round),
    }
}

/// Exact average brightness of the lights that are on and report one.
#[must_use]
pub fn on_brightness_average(lights: &[LightTarget<'_>]) -> Option<f64> {
    let brightness: Vec<f64> = lights
        .iter()
        .filter(|l| l.is_on())
        .filter_map(LightTarget::brightness)
        .collect();
    average(&brightness)
}

// =============================================================================
// Climate
// =============================================================================

/// Climate summary of a space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateState {
    /// Whether the space has any climate actuator.
    pub has_climate: bool,
    /// Detected mode.
    pub mode: ClimateMode,
    /// Average heating setpoint.
    pub heating_setpoint: Option<f64>,
    /// Average cooling setpoint.
    pub cooling_setpoint: Option<f64>,
    /// Setpoint relevant to the current mode.
    pub target_setpoint: Option<f64>,
    /// Lowest setpoint every device accepts.
    pub min_setpoint: f64,
    /// Highest setpoint every device accepts.
    pub max_setpoint: f64,
    /// Whether devices disagree on a setpoint.
    pub is_mixed: bool,
    /// Whether any device can heat.
    pub supports_heating: bool,
    /// Whether any device can cool.
    pub supports_cooling: bool,
}

/// Summarise the climate actuators of a space.
#[must_use]
pub fn climate_state(devices: &[Device], roles: &RoleMap, config: &OrchestratorConfig) -> ClimateState {
    let targets = climate::collect_targets(devices, roles);

    let mut heater_on = false;
    let mut cooler_on = false;
    let mut reported_mode = None;
    let mut supports_heating = false;
    let mut supports_cooling = false;
    let mut heating = Vec::new();
    let mut cooling = Vec::new();
    let mut ranges = Vec::new();

    for target in &targets {
        if let Some(heater) = target.heater() {
            supports_heating = true;
            heater_on |= channel_bool(heater, PropertyCategory::On).unwrap_or(false);
        }
        if let Some(cooler) = target.cooler() {
            supports_cooling = true;
            cooler_on |= channel_bool(cooler, PropertyCategory::On).unwrap_or(false);
        }
        if reported_mode.is_none() {
            reported_mode = target
                .thermostat()
                .and_then(|t| t.property(PropertyCategory::Mode))
                .and_then(|p| p.value.as_ref())
                .and_then(parse_mode);
        }

        for setpoint in target.setpoints() {
            if let Some(range) = setpoint.range() {
                ranges.push(range);
            }
            let Some(current) = setpoint.current() else {
                continue;
            };
            match setpoint.kind {
                SetpointKind::Heating => heating.push(current),
                SetpointKind::Cooling => cooling.push(current),
                SetpointKind::Target => {
                    supports_heating = true;
                    heating.push(current);
                }
            }
        }
    }

    let mode = match (heater_on, cooler_on) {
        (true, true) => ClimateMode::Auto,
        (true, false) => ClimateMode::Heat,
        (false, true) => ClimateMode::Cool,
        (false, false) => reported_mode.unwrap_or(ClimateMode::Off),
    };

    let heating_setpoint = average(&heating).map(round_half);
    let cooling_setpoint = average(&cooling).map(round_half);
    let target_setpoint = match mode {
        ClimateMode::Cool => cooling_setpoint.or(heating_setpoint),
        ClimateMode::Off | ClimateMode::Heat | ClimateMode::Auto => {
            heating_setpoint.or(cooling_setpoint)
        }
    };
    let (min_setpoint, max_setpoint) = space_bounds(&ranges, config);

    ClimateState {
        has_climate: !targets.is_empty(),
        mode,
        heating_setpoint,
        cooling_setpoint,
        target_setpoint,
        min_setpoint,
        max_setpoint,
        is_mixed: spread(&heating) > SETPOINT_TOLERANCE || spread(&cooling) > SETPOINT_TOLERANCE,
        supports_heating,
        supports_cooling,
    }
}

fn parse_mode(value: &PropertyValue) -> Option<ClimateMode> {
    let PropertyValue::Text(text) = value else {
        return None;
    };
    match text.trim().to_ascii_lowercase().as_str() {
        "auto" | "heat_cool" => Some(ClimateMode::Auto),
        "heat" => Some(ClimateMode::Heat),
        "cool" => Some(ClimateMode::Cool),
        "off" => Some(ClimateMode::Off),
        _ => None,
    }
}

/// Intersection of device ranges, else their union, clamped to the configured bounds.
fn space_bounds(ranges: &[(f64, f64)], config: &OrchestratorConfig) -> (f64, f64) {
    let lo_bound = config.setpoint_min.max(ABSOLUTE_SETPOINT_MIN);
    let hi_bound = config.setpoint_max.min(ABSOLUTE_SETPOINT_MAX);
    if ranges.is_empty() {
        return (lo_bound, hi_bound);
    }

    let mins = ranges.iter().map(|r| r.0);
    let maxs = ranges.iter().map(|r| r.1);
    let (mut lo, mut hi) = (
        mins.clone().fold(f64::NEG_INFINITY, f64::max),
        maxs.clone().fold(f64::INFINITY, f64::min),
    );
    if lo > hi {
        lo = mins.fold(f64::INFINITY, f64::min);
        hi = maxs.fold(f64::NEG_INFINITY, f64::max);
    }

    let lo = lo.clamp(lo_bound, hi_bound);
    let hi = hi.clamp(lo_bound, hi_bound);
    (lo, hi)
}

// =============================================================================
// Covers
// =============================================================================

/// Covers summary of a space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoversState {
    /// Whether the space has any visible cover.
    pub has_covers: bool,
    /// Average reported position.
    pub average_position: Option<f64>,
    /// Whether any cover is at least partly open.
    pub any_open: bool,
    /// Whether every cover reporting a position is closed.
    pub all_closed: bool,
    /// Number of distinct covering devices.
    pub devices_count: usize,
}

/// Summarise the covers of a space, ignoring hidden ones.
#[must_use]
pub fn covers_state(devices: &[Device], roles: &RoleMap) -> CoversState {
    let covers = covers::collect_targets(devices, roles);
    let positions: Vec<f64> = covers.iter().filter_map(covers::CoverTarget::position).collect();

    let mut device_ids: Vec<_> = covers.iter().map(|c| c.device.id).collect();
    device_ids.sort_unstable();
    device_ids.dedup();

    CoversState {
        has_covers: !covers.is_empty(),
        average_position: average(&positions).map(f64::round),
        any_open: positions.iter().any(|p| *p > 0.0),
        all_closed: !positions.is_empty() && positions.iter().all(|p| *p <= 0.0),
        devices_count: device_ids.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::fixtures::{blind, dimmable_light, ranged, switch_light, thermostat};
    use spaces_core::SpaceId;

    #[test]
    fn loose_booleans_and_numbers_normalise() {
        assert_eq!(as_bool(&"on".into()), Some(true));
        assert_eq!(as_bool(&"1".into()), Some(true));
        assert_eq!(as_bool(&PropertyValue::Number(1.0)), Some(true));
        assert_eq!(as_bool(&"maybe".into()), None);
        assert_eq!(as_number(&" 21.5 ".into()), Some(21.5));
        assert_eq!(as_number(&true.into()), None);
        assert_eq!(as_number(&"warm".into()), None);
    }

    #[test]
    fn ranges_parse_from_text_formats() {
        let mut property = ranged(PropertyCategory::Temperature, 20.0, 5.0, 35.0);
        assert_eq!(property_range(&property), Some((5.0, 35.0)));

        property.format = Some(PropertyFormat::Text("16:30".into()));
        assert_eq!(property_range(&property), Some((16.0, 30.0)));

        property.format = Some(PropertyFormat::Text("10|28".into()));
        assert_eq!(property_range(&property), Some((10.0, 28.0)));

        property.format = Some(PropertyFormat::Text("30:10".into()));
        assert_eq!(property_range(&property), None);
    }

    #[test]
    fn half_rounding() {
        assert!((round_half(21.26) - 21.5).abs() < f64::EPSILON);
        assert!((round_half(21.74) - 21.5).abs() < f64::EPSILON);
        assert!((round_half(21.76) - 22.0).abs() < f64::EPSILON);
    }

    #[test]
    fn lighting_summary_counts_lights_on() {
        let space = SpaceId::generate();
        let devices = vec![
            dimmable_light(space, "Ceiling", true, 80.0),
            dimmable_light(space, "Lamp", true, 40.0),
            switch_light(space, "Strip", false),
        ];
        let state = lighting_state(&devices, &RoleMap::default());

        assert!(state.has_lighting);
        assert_eq!(state.lights_count, 3);
        assert_eq!(state.on_count, 2);
        assert_eq!(state.average_brightness, Some(60.0));
    }

    #[test]
    fn exact_average_is_not_rounded() {
        let space = SpaceId::generate();
        let devices = vec![
            dimmable_light(space, "Ceiling", true, 69.0),
            dimmable_light(space, "Lamp", true, 70.0),
            dimmable_light(space, "Desk", false, 100.0),
        ];
        let roles = RoleMap::default();
        let lights = lighting::collect_targets(&devices, &roles);

        assert_eq!(on_brightness_average(&lights), Some(69.5));
        assert_eq!(lighting_state(&devices, &roles).average_brightness, Some(70.0));
    }

    #[test]
    fn climate_summary_detects_mode_and_bounds() {
        let space = SpaceId::generate();
        let devices = vec![thermostat(space, 21.0, 25.0)];
        let state = climate_state(&devices, &RoleMap::default(), &OrchestratorConfig::default());

        assert!(state.has_climate);
        assert_eq!(state.mode, ClimateMode::Heat);
        assert_eq!(state.heating_setpoint, Some(21.0));
        assert_eq!(state.cooling_setpoint, Some(25.0));
        assert_eq!(state.target_setpoint, Some(21.0));
        // Heater 5..35 and cooler 16..30 intersect at 16..30
        assert!((state.min_setpoint - 16.0).abs() < f64::EPSILON);
        assert!((state.max_setpoint - 30.0).abs() < f64::EPSILON);
        assert!(!state.is_mixed);
        assert!(state.supports_heating && state.supports_cooling);
    }

    #[test]
    fn climate_summary_flags_mixed_setpoints() {
        let space = SpaceId::generate();
        let devices = vec![thermostat(space, 19.0, 25.0), thermostat(space, 22.0, 25.0)];
        let state = climate_state(&devices, &RoleMap::default(), &OrchestratorConfig::default());

        assert!(state.is_mixed);
        assert_eq!(state.heating_setpoint, Some(20.5));
    }

    #[test]
    fn disjoint_ranges_fall_back_to_union() {
        let config = OrchestratorConfig::default();
        assert_eq!(space_bounds(&[(5.0, 15.0), (20.0, 30.0)], &config), (5.0, 30.0));
        assert_eq!(space_bounds(&[(-40.0, 90.0)], &config), (-10.0, 50.0));
        assert_eq!(space_bounds(&[], &config), (-10.0, 50.0));
    }

    #[test]
    fn empty_space_has_no_climate() {
        let state = climate_state(&[], &RoleMap::default(), &OrchestratorConfig::default());
        assert!(!state.has_climate);
        assert_eq!(state.mode, ClimateMode::Off);
        assert_eq!(state.target_setpoint, None);
    }

    #[test]
    fn covers_summary() {
        let space = SpaceId::generate();
        let devices = vec![blind(space, "Left", 0.0), blind(space, "Right", 40.0)];
        let state = covers_state(&devices, &RoleMap::default());

        assert!(state.has_covers);
        assert_eq!(state.average_position, Some(20.0));
        assert!(state.any_open);
        assert!(!state.all_closed);
        assert_eq!(state.devices_count, 2);
    }
}
