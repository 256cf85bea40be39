//! Read-only view of devices as exposed by the device platform.
//!
//! A device owns channels, and a channel owns properties. The orchestrator never
//! mutates these records; it reads them and issues property writes through the
//! platform.

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, DeviceId, PropertyId, SpaceId};

/// Functional category of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Light fixture or bulb.
    Lighting,
    /// Thermostat controlling heating and/or cooling.
    Thermostat,
    /// Radiator, heater, or other heating-only unit.
    HeatingUnit,
    /// Air conditioner.
    AirConditioner,
    /// Fan or ventilation unit.
    Fan,
    /// Humidifier.
    AirHumidifier,
    /// Dehumidifier.
    AirDehumidifier,
    /// Blinds, shutters, curtains.
    WindowCovering,
    /// Television or display.
    Television,
    /// Speaker or soundbar.
    Speaker,
    /// AV receiver.
    AvReceiver,
    /// Streaming box, console, or other media source.
    MediaPlayer,
    /// Standalone sensor.
    Sensor,
    /// Anything else.
    Generic,
}

impl DeviceCategory {
    /// Whether devices of this category can drive room temperature.
    #[must_use]
    pub const fn is_climate_actuator(self) -> bool {
        matches!(
            self,
            Self::Thermostat | Self::HeatingUnit | Self::AirConditioner
        )
    }

    /// Whether devices of this category take part in climate orchestration.
    #[must_use]
    pub const fn is_climate_device(self) -> bool {
        matches!(
            self,
            Self::Thermostat
                | Self::HeatingUnit
                | Self::AirConditioner
                | Self::Fan
                | Self::AirHumidifier
                | Self::AirDehumidifier
                | Self::Sensor
        )
    }

    /// Whether devices of this category take part in media orchestration.
    #[must_use]
    pub const fn is_media_device(self) -> bool {
        matches!(
            self,
            Self::Television | Self::Speaker | Self::AvReceiver | Self::MediaPlayer
        )
    }
}

/// Functional category of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCategory {
    /// Light output.
    Light,
    /// Heating element with an on switch and a target temperature.
    Heater,
    /// Cooling element with an on switch and a target temperature.
    Cooler,
    /// Thermostat control (active flag, mode).
    Thermostat,
    /// Fan control.
    Fan,
    /// Humidity control.
    Humidifier,
    /// Window covering motor.
    WindowCovering,
    /// Television control.
    Television,
    /// Speaker control.
    Speaker,
    /// Input switching on media devices.
    MediaInput,
    /// Playback transport (play, pause, skip).
    MediaPlayback,
    /// Temperature reading.
    TemperatureSensor,
    /// Humidity reading.
    HumiditySensor,
    /// Anything else.
    Generic,
}

/// Category of a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    /// On/off switch.
    On,
    /// Brightness percentage.
    Brightness,
    /// Colour temperature.
    ColorTemperature,
    /// Hue.
    Hue,
    /// Saturation.
    Saturation,
    /// Temperature (setpoint on heater/cooler channels, reading on sensors).
    Temperature,
    /// Active flag.
    Active,
    /// Operating mode text.
    Mode,
    /// Cover position percentage.
    Position,
    /// Cover command (`open`, `close`, `stop`).
    Command,
    /// Cover tilt.
    Tilt,
    /// Input source selection.
    InputSource,
    /// Volume percentage.
    Volume,
    /// Mute flag.
    Mute,
    /// Remote control key press.
    RemoteKey,
    /// Relative humidity.
    Humidity,
    /// Anything else.
    Generic,
}

/// Connection state reported by the device platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connected and responsive.
    Connected,
    /// Connected, reporting a fault.
    Alert,
    /// Platform reports the device as reachable and idle.
    Ready,
    /// Platform reports the device as asleep but wakeable.
    Sleeping,
    /// Cleanly disconnected.
    Disconnected,
    /// Connection lost.
    Lost,
    /// Stopped by the platform.
    Stopped,
    /// State not reported yet.
    #[default]
    Unknown,
}

impl ConnectionState {
    /// Whether the platform reports the device as definitely unreachable.
    ///
    /// `Unknown` is not offline: commands are still attempted.
    #[must_use]
    pub const fn is_offline(self) -> bool {
        matches!(self, Self::Disconnected | Self::Lost | Self::Stopped)
    }
}

/// A raw property value as reported by the platform.
///
/// Platforms are inconsistent about encoding, so numbers and booleans often
/// arrive as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Allowed values of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyFormat {
    /// Numeric `[min, max]` range.
    Range([f64; 2]),
    /// Enumerated options.
    Options(Vec<String>),
    /// Free-form format text such as `"16:30"`.
    Text(String),
}

/// A single property on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property identifier.
    pub id: PropertyId,
    /// Property category.
    pub category: PropertyCategory,
    /// Last reported value.
    #[serde(default)]
    pub value: Option<PropertyValue>,
    /// Allowed values.
    #[serde(default)]
    pub format: Option<PropertyFormat>,
}

/// A functional unit of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Channel category.
    pub category: ChannelCategory,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Properties exposed by the channel.
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Channel {
    /// First property of the given category.
    #[must_use]
    pub fn property(&self, category: PropertyCategory) -> Option<&Property> {
        self.properties.iter().find(|p| p.category == category)
    }

    /// Property by id.
    #[must_use]
    pub fn property_by_id(&self, id: &PropertyId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == *id)
    }
}

/// A device with its channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Device category.
    pub category: DeviceCategory,
    /// Space the device is placed in.
    #[serde(default)]
    pub space_id: Option<SpaceId>,
    /// Connection state.
    #[serde(default)]
    pub connection: ConnectionState,
    /// Channels.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Device {
    /// Channel by id.
    #[must_use]
    pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == *id)
    }

    /// All channels of the given category.
    pub fn channels_of(&self, category: ChannelCategory) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(move |c| c.category == category)
    }

    /// First channel of the given category.
    #[must_use]
    pub fn first_channel(&self, category: ChannelCategory) -> Option<&Channel> {
        self.channels_of(category).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_value_accepts_mixed_json() {
        let values: Vec<PropertyValue> =
            serde_json::from_str(r#"[true, 42, "21.5"]"#).unwrap();
        assert_eq!(values[0], PropertyValue::Bool(true));
        assert_eq!(values[1], PropertyValue::Number(42.0));
        assert_eq!(values[2], PropertyValue::Text("21.5".into()));
    }

    #[test]
    fn property_format_variants() {
        let range: PropertyFormat = serde_json::from_str("[16, 30]").unwrap();
        assert_eq!(range, PropertyFormat::Range([16.0, 30.0]));

        let options: PropertyFormat = serde_json::from_str(r#"["heat", "cool"]"#).unwrap();
        assert!(matches!(options, PropertyFormat::Options(ref o) if o.len() == 2));

        let text: PropertyFormat = serde_json::from_str(r#""5:35""#).unwrap();
        assert_eq!(text, PropertyFormat::Text("5:35".into()));
    }

    #[test]
    fn unknown_connection_is_not_offline() {
        assert!(!ConnectionState::Unknown.is_offline());
        assert!(!ConnectionState::Connected.is_offline());
        assert!(ConnectionState::Disconnected.is_offline());
        assert!(ConnectionState::Lost.is_offline());
    }

    #[test]
    fn device_lookup_helpers() {
        let light = Channel {
            id: ChannelId::generate(),
            category: ChannelCategory::Light,
            name: None,
            properties: vec![Property {
                id: PropertyId::generate(),
                category: PropertyCategory::On,
                value: Some(true.into()),
                format: None,
            }],
        };
        let device = Device {
            id: DeviceId::generate(),
            name: "Lamp".into(),
            category: DeviceCategory::Lighting,
            space_id: None,
            connection: ConnectionState::Connected,
            channels: vec![light.clone()],
        };

        assert_eq!(device.channel(&light.id), Some(&light));
        assert!(device.first_channel(ChannelCategory::Light).is_some());
        assert!(device.first_channel(ChannelCategory::Heater).is_none());
        assert!(light.property(PropertyCategory::On).is_some());
        assert!(light.property(PropertyCategory::Brightness).is_none());
    }
}
