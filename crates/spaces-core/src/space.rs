//! Rooms and zones.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::SpaceId;

/// Whether a space is a room or a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    /// A single room. May belong to one zone.
    Room,
    /// A group of rooms. Never nested.
    Zone,
}

/// A room or zone grouping devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Space identifier.
    pub id: SpaceId,
    /// Display name, also used for name-based suggestion rules.
    pub name: String,
    /// Room or zone.
    pub kind: SpaceKind,
    /// Parent zone (rooms only).
    #[serde(default)]
    pub parent_id: Option<SpaceId>,
    /// Free-form category (e.g. `bedroom`, `living_room`).
    #[serde(default)]
    pub category: Option<String>,
    /// Whether proactive suggestions are generated for this space.
    #[serde(default = "Space::default_suggestions_enabled")]
    pub suggestions_enabled: bool,
}

impl Space {
    const fn default_suggestions_enabled() -> bool {
        true
    }

    /// Create a room without a parent.
    #[must_use]
    pub fn room(name: impl Into<String>) -> Self {
        Self {
            id: SpaceId::generate(),
            name: name.into(),
            kind: SpaceKind::Room,
            parent_id: None,
            category: None,
            suggestions_enabled: true,
        }
    }

    /// Create a zone.
    #[must_use]
    pub fn zone(name: impl Into<String>) -> Self {
        Self {
            kind: SpaceKind::Zone,
            ..Self::room(name)
        }
    }

    /// Check the two-level hierarchy: only rooms have a parent, and that parent is a zone.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidHierarchy` if the parent link is not allowed.
    pub fn validate_parent(&self, parent: Option<&Self>) -> Result<()> {
        let invalid = |reason: &str| CoreError::InvalidHierarchy {
            space_id: self.id,
            reason: reason.to_string(),
        };

        match (self.kind, self.parent_id, parent) {
            (_, None, None) => Ok(()),
            (SpaceKind::Zone, Some(_), _) => Err(invalid("zones cannot have a parent")),
            (SpaceKind::Room, Some(parent_id), Some(parent)) => {
                if parent.id != parent_id {
                    Err(invalid("parent record does not match parent id"))
                } else if parent.kind != SpaceKind::Zone {
                    Err(invalid("rooms can only belong to a zone"))
                } else {
                    Ok(())
                }
            }
            (SpaceKind::Room, Some(_), None) => Err(invalid("parent zone does not exist")),
            (_, None, Some(_)) => Err(invalid("unexpected parent record")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_under_zone_is_valid() {
        let zone = Space::zone("Ground floor");
        let room = Space {
            parent_id: Some(zone.id),
            ..Space::room("Kitchen")
        };
        assert!(room.validate_parent(Some(&zone)).is_ok());
    }

    #[test]
    fn zone_with_parent_is_rejected() {
        let outer = Space::zone("House");
        let inner = Space {
            parent_id: Some(outer.id),
            ..Space::zone("Upstairs")
        };
        assert!(matches!(
            inner.validate_parent(Some(&outer)),
            Err(CoreError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn room_under_room_is_rejected() {
        let parent = Space::room("Living room");
        let child = Space {
            parent_id: Some(parent.id),
            ..Space::room("Reading corner")
        };
        assert!(child.validate_parent(Some(&parent)).is_err());
    }

    #[test]
    fn missing_parent_is_rejected() {
        let room = Space {
            parent_id: Some(SpaceId::generate()),
            ..Space::room("Office")
        };
        assert!(room.validate_parent(None).is_err());
    }

    #[test]
    fn suggestions_enabled_by_default() {
        let json = format!(
            r#"{{"id":"{}","name":"Bedroom","kind":"room"}}"#,
            SpaceId::generate()
        );
        let space: Space = serde_json::from_str(&json).unwrap();
        assert!(space.suggestions_enabled);
    }
}
