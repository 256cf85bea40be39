//! Proactive lighting suggestions.
//!
//! Rules look at the time of day, the space name and the lighting state, and
//! propose at most one lighting intent. Dismissed or applied suggestions stay
//! quiet for a cooldown period.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use spaces_core::SpaceId;

use crate::intent::lighting::{LightingIntent, LightingMode};

/// Space name fragments that mark a bedroom.
pub const DEFAULT_BEDROOM_PATTERNS: &[&str] = &[
    "bedroom",
    "master bedroom",
    "kids room",
    "guest room",
    "schlafzimmer",
    "kinderzimmer",
    "ložnice",
    "spálňa",
    "sypialnia",
    "chambre",
    "dormitorio",
    "camera da letto",
    "slaapkamer",
];

/// Average brightness at which evening lighting counts as too bright.
const RELAX_BRIGHTNESS_THRESHOLD: f64 = 70.0;

/// Kind of suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Switch to night lighting.
    LightingNight,
    /// Switch to relax lighting.
    LightingRelax,
    /// Turn lights off.
    LightingOff,
}

impl SuggestionType {
    /// Intent applied when the suggestion is accepted.
    #[must_use]
    pub const fn intent(self) -> LightingIntent {
        match self {
            Self::LightingNight => LightingIntent::SetMode {
                mode: LightingMode::Night,
            },
            Self::LightingRelax => LightingIntent::SetMode {
                mode: LightingMode::Relax,
            },
            Self::LightingOff => LightingIntent::Off,
        }
    }
}

/// Inputs of the rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionContext<'a> {
    /// Space display name.
    pub space_name: &'a str,
    /// Local hour, 0..=23.
    pub current_hour: u32,
    /// Whether any light is on.
    pub lights_on: bool,
    /// Average brightness of lights that are on.
    pub average_brightness: Option<f64>,
}

/// A proposed lighting change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    /// Kind of suggestion.
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    /// Short title.
    pub title: String,
    /// Why it is suggested.
    pub reason: String,
    /// Intent executed when applied.
    pub intent: LightingIntent,
}

impl Suggestion {
    fn new(suggestion_type: SuggestionType, title: &str, reason: &str) -> Self {
        Self {
            suggestion_type,
            title: title.to_string(),
            reason: reason.to_string(),
            intent: suggestion_type.intent(),
        }
    }
}

/// User reaction to a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// Execute the suggested intent.
    Applied,
    /// Ignore it.
    Dismissed,
}

/// Outcome of recording feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedbackResult {
    /// Whether the feedback was handled.
    pub success: bool,
    /// Whether the intent ran successfully; absent for dismissals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_executed: Option<bool>,
}

/// Whether `name` looks like a bedroom. Matching ignores case on both sides.
#[must_use]
pub fn is_bedroom(name: &str, patterns: &[String]) -> bool {
    let name = name.to_lowercase();
    patterns.iter().any(|p| name.contains(&p.to_lowercase()))
}

/// Evaluate the rules in order and return the first match.
///
/// 1. Bedroom, from 22:00, lights on: night lighting.
/// 2. 17:00 to 23:00, lights on at 70% or brighter: relax lighting.
/// 3. From 23:00, lights on, not a bedroom: lights off.
#[must_use]
pub fn evaluate(context: &SuggestionContext<'_>, bedroom_patterns: &[String]) -> Option<Suggestion> {
    let bedroom = is_bedroom(context.space_name, bedroom_patterns);
    let hour = context.current_hour;

    if !context.lights_on {
        return None;
    }

    if bedroom && hour >= 22 {
        return Some(Suggestion::new(
            SuggestionType::LightingNight,
            "Night lighting",
            "Late evening - switch to night mode for better sleep",
        ));
    }

    if (17..23).contains(&hour)
        && context
            .average_brightness
            .is_some_and(|b| b >= RELAX_BRIGHTNESS_THRESHOLD)
    {
        return Some(Suggestion::new(
            SuggestionType::LightingRelax,
            "Relax lighting",
            "Evening time - switch to a calmer lighting mode",
        ));
    }

    if hour >= 23 && !bedroom {
        return Some(Suggestion::new(
            SuggestionType::LightingOff,
            "Turn off lights",
            "Late night - consider turning off the lights",
        ));
    }

    None
}

/// Per-space, per-type suggestion cooldowns.
#[derive(Debug)]
pub struct CooldownTracker {
    duration: Duration,
    until: RwLock<HashMap<(SpaceId, SuggestionType), DateTime<Utc>>>,
}

impl CooldownTracker {
    /// Create a tracker with the given cooldown length.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: RwLock::new(HashMap::new()),
        }
    }

    /// Start a cooldown now.
    pub fn set_cooldown(&self, space_id: SpaceId, suggestion_type: SuggestionType) {
        self.set_cooldown_at(space_id, suggestion_type, Utc::now());
    }

    /// Start a cooldown at `now`.
    pub fn set_cooldown_at(&self, space_id: SpaceId, suggestion_type: SuggestionType, now: DateTime<Utc>) {
        let duration = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::MAX);
        let until = now.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.until.write().insert((space_id, suggestion_type), until);
    }

    /// Whether the suggestion is quiet now.
    #[must_use]
    pub fn is_on_cooldown(&self, space_id: SpaceId, suggestion_type: SuggestionType) -> bool {
        self.is_on_cooldown_at(space_id, suggestion_type, Utc::now())
    }

    /// Whether the suggestion is quiet at `now`.
    #[must_use]
    pub fn is_on_cooldown_at(&self, space_id: SpaceId, suggestion_type: SuggestionType, now: DateTime<Utc>) -> bool {
        self.until
            .read()
            .get(&(space_id, suggestion_type))
            .is_some_and(|until| now < *until)
    }

    /// Forget all cooldowns of a space.
    pub fn clear_space(&self, space_id: &SpaceId) {
        self.until.write().retain(|(space, _), _| space != space_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        DEFAULT_BEDROOM_PATTERNS.iter().map(ToString::to_string).collect()
    }

    fn context(name: &str, hour: u32, on: bool, brightness: Option<f64>) -> SuggestionContext<'_> {
        SuggestionContext {
            space_name: name,
            current_hour: hour,
            lights_on: on,
            average_brightness: brightness,
        }
    }

    fn kind(ctx: &SuggestionContext<'_>) -> Option<SuggestionType> {
        evaluate(ctx, &patterns()).map(|s| s.suggestion_type)
    }

    #[test]
    fn bedroom_at_night_suggests_night_mode() {
        assert_eq!(
            kind(&context("Master Bedroom", 22, true, Some(30.0))),
            Some(SuggestionType::LightingNight)
        );
        assert_eq!(
            kind(&context("Schlafzimmer", 23, true, None)),
            Some(SuggestionType::LightingNight)
        );
    }

    #[test]
    fn bright_evening_suggests_relax() {
        assert_eq!(
            kind(&context("Living room", 17, true, Some(70.0))),
            Some(SuggestionType::LightingRelax)
        );
        assert_eq!(kind(&context("Living room", 17, true, Some(69.0))), None);
        assert_eq!(kind(&context("Living room", 16, true, Some(90.0))), None);
        assert_eq!(kind(&context("Living room", 20, true, None)), None);
    }

    #[test]
    fn late_night_suggests_off_outside_bedrooms() {
        let suggestion = evaluate(&context("Kitchen", 23, true, Some(90.0)), &patterns()).unwrap();
        assert_eq!(suggestion.suggestion_type, SuggestionType::LightingOff);
        assert_eq!(suggestion.intent, LightingIntent::Off);
    }

    #[test]
    fn custom_patterns_match_regardless_of_case() {
        let custom = vec!["Schlafzimmer".to_string(), "NURSERY".to_string()];
        assert!(is_bedroom("schlafzimmer oben", &custom));
        assert!(is_bedroom("Blue Nursery", &custom));
        assert!(!is_bedroom("Kitchen", &custom));
    }

    #[test]
    fn lights_off_never_suggests() {
        for hour in 0..24 {
            assert_eq!(kind(&context("Bedroom", hour, false, None)), None);
        }
    }

    #[test]
    fn suggested_intents_match_types() {
        let suggestion = evaluate(&context("Office", 18, true, Some(100.0)), &patterns()).unwrap();
        assert_eq!(
            suggestion.intent,
            LightingIntent::SetMode {
                mode: LightingMode::Relax
            }
        );
    }

    #[test]
    fn cooldowns_are_per_space_and_type() {
        let tracker = CooldownTracker::new(Duration::from_secs(1800));
        let space = SpaceId::generate();
        let other = SpaceId::generate();
        let now = Utc::now();

        tracker.set_cooldown_at(space, SuggestionType::LightingRelax, now);

        assert!(tracker.is_on_cooldown_at(space, SuggestionType::LightingRelax, now));
        assert!(!tracker.is_on_cooldown_at(space, SuggestionType::LightingOff, now));
        assert!(!tracker.is_on_cooldown_at(other, SuggestionType::LightingRelax, now));
        assert!(!tracker.is_on_cooldown_at(
            space,
            SuggestionType::LightingRelax,
            now + chrono::Duration::seconds(1800)
        ));

        tracker.clear_space(&space);
        assert!(!tracker.is_on_cooldown_at(space, SuggestionType::LightingRelax, now));
    }
}
