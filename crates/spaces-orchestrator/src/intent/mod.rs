//! Intents and their resolution into property writes.
//!
//! Each domain accepts a flat wire request (`{type, ...optional fields}`) and
//! converts it into a sum type. A missing required field surfaces here as an
//! [`IntentError`], which the execution engine records as a failure for every
//! target instead of aborting the call.
//!
//! Resolvers are pure: given the intent, the targets (device, channel, role)
//! and configuration, they return one [`Resolution`] per target.

pub mod climate;
pub mod covers;
pub mod lighting;
pub mod media;

use serde::{Deserialize, Serialize};
use spaces_core::{Channel, Device, PropertyCategory, PropertyValue};
use thiserror::Error;

use crate::platform::PropertyCommand;

pub use climate::{ClimateIntent, ClimateIntentRequest, ClimateIntentType, ClimateMode};
pub use covers::{CoversIntent, CoversIntentRequest, CoversIntentType, CoversMode};
pub use lighting::{LightingIntent, LightingIntentRequest, LightingIntentType, LightingMode};
pub use media::{MediaIntent, MediaIntentRequest, MediaIntentType, MediaMode, PlaybackCommand};

/// Size of a relative adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSize {
    /// Small step.
    Small,
    /// Medium step.
    Medium,
    /// Large step.
    Large,
}

/// Domain an intent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Lighting intents.
    Lighting,
    /// Climate intents.
    Climate,
    /// Covers intents.
    Covers,
}

/// Why an intent could not be resolved for a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    /// The intent type requires a field that was not supplied.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The target lacks every property the intent needs.
    #[error("target does not support {0}")]
    UnsupportedCapability(&'static str),

    /// A relative change needs a current value that the target does not report.
    #[error("no current {0} value to adjust")]
    NoCurrentValue(&'static str),

    /// The requested mode has no orchestration rules configured.
    #[error("mode `{0}` is not configured")]
    UnknownMode(String),
}

/// What a target should do for an intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Write these properties as one batch.
    Commands(Vec<PropertyCommand>),
    /// The intent does not concern this target.
    Untouched,
    /// The intent cannot be applied to this target.
    Failed(IntentError),
}

impl Resolution {
    /// Wrap a command list, treating an empty list as untouched.
    #[must_use]
    pub fn from_commands(commands: Vec<PropertyCommand>) -> Self {
        if commands.is_empty() {
            Self::Untouched
        } else {
            Self::Commands(commands)
        }
    }

    /// Commands to dispatch, if any.
    #[must_use]
    pub fn commands(&self) -> Option<&[PropertyCommand]> {
        match self {
            Self::Commands(commands) => Some(commands),
            Self::Untouched | Self::Failed(_) => None,
        }
    }
}

/// Push a write of `value` to the first property of `category`, if the channel has one.
pub(crate) fn write_if_supported(
    commands: &mut Vec<PropertyCommand>,
    device: &Device,
    channel: &Channel,
    category: PropertyCategory,
    value: impl Into<PropertyValue>,
) -> bool {
    match channel.property(category) {
        Some(property) => {
            commands.push(PropertyCommand::new(
                device.id,
                channel.id,
                property.id,
                value,
            ));
            true
        }
        None => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_list_is_untouched() {
        assert_eq!(Resolution::from_commands(Vec::new()), Resolution::Untouched);
        assert!(Resolution::Failed(IntentError::MissingField("mode"))
            .commands()
            .is_none());
    }

    #[test]
    fn delta_size_wire_form() {
        let size: DeltaSize = serde_json::from_str("\"large\"").unwrap();
        assert_eq!(size, DeltaSize::Large);
    }
}
