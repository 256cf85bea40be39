//! Undo history.
//!
//! Each space has a single undo slot holding the pre-intent state of the last
//! successful mutating intent. A new capture replaces the slot. Entries expire
//! a fixed time after capture and are never returned once expired.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use spaces_core::{
    Channel, ChannelId, DeviceId, PropertyCategory, PropertyId, PropertyValue, SpaceId, UndoEntryId,
};

use crate::directory::SpaceDirectory;
use crate::execution::ExecutionEngine;
use crate::intent::climate::ClimateTarget;
use crate::intent::covers::CoverTarget;
use crate::intent::lighting::LightTarget;
use crate::intent::IntentCategory;
use crate::platform::PropertyCommand;

/// Pre-intent value of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySnapshot {
    /// Channel holding the property.
    pub channel_id: ChannelId,
    /// The property.
    pub property_id: PropertyId,
    /// Value before the intent; `None` when it was unknown.
    pub value: Option<PropertyValue>,
}

/// Pre-intent state of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    /// The device.
    pub device_id: DeviceId,
    /// Captured properties.
    pub properties: Vec<PropertySnapshot>,
}

impl TargetSnapshot {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            properties: Vec::new(),
        }
    }

    fn with_channel(mut self, channel: &Channel, categories: &[PropertyCategory]) -> Self {
        for category in categories {
            if let Some(property) = channel.property(*category) {
                self.properties.push(PropertySnapshot {
                    channel_id: channel.id,
                    property_id: property.id,
                    value: property.value.clone(),
                });
            }
        }
        self
    }

    fn restore_commands(&self) -> Vec<PropertyCommand> {
        self.properties
            .iter()
            .filter_map(|p| {
                let value = p.value.clone()?;
                Some(PropertyCommand::new(self.device_id, p.channel_id, p.property_id, value))
            })
            .collect()
    }
}

/// Snapshot on-state and brightness of lights.
#[must_use]
pub fn snapshot_lights(lights: &[LightTarget<'_>]) -> Vec<TargetSnapshot> {
    lights
        .iter()
        .map(|light| {
            TargetSnapshot::new(light.device.id)
                .with_channel(light.channel, &[PropertyCategory::On, PropertyCategory::Brightness])
        })
        .collect()
}

/// Snapshot setpoints, on-state and thermostat mode of climate devices.
#[must_use]
pub fn snapshot_climate(targets: &[ClimateTarget<'_>]) -> Vec<TargetSnapshot> {
    const CAPTURED: [PropertyCategory; 4] = [
        PropertyCategory::On,
        PropertyCategory::Temperature,
        PropertyCategory::Mode,
        PropertyCategory::Active,
    ];
    targets
        .iter()
        .map(|target| {
            target
                .channels()
                .into_iter()
                .fold(TargetSnapshot::new(target.device.id), |snapshot, channel| {
                    snapshot.with_channel(channel, &CAPTURED)
                })
        })
        .collect()
}

/// Snapshot cover positions.
#[must_use]
pub fn snapshot_covers(covers: &[CoverTarget<'_>]) -> Vec<TargetSnapshot> {
    covers
        .iter()
        .map(|cover| {
            TargetSnapshot::new(cover.device.id).with_channel(cover.channel, &[PropertyCategory::Position])
        })
        .collect()
}

/// A captured pre-intent state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoEntry {
    /// Entry identifier.
    pub id: UndoEntryId,
    /// Owning space.
    pub space_id: SpaceId,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Domain of the intent that will be undone.
    pub intent_category: IntentCategory,
    /// What the intent did.
    pub action_description: String,
    /// Pre-intent state.
    pub snapshot: Vec<TargetSnapshot>,
}

impl UndoEntry {
    /// Create an entry captured now.
    #[must_use]
    pub fn new(
        space_id: SpaceId,
        intent_category: IntentCategory,
        action_description: impl Into<String>,
        snapshot: Vec<TargetSnapshot>,
    ) -> Self {
        Self {
            id: UndoEntryId::generate(),
            space_id,
            captured_at: Utc::now(),
            intent_category,
            action_description: action_description.into(),
            snapshot,
        }
    }
}

/// What `peek` shows about the pending entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoPeek {
    /// Entry identifier.
    pub id: UndoEntryId,
    /// Domain of the intent.
    pub intent_category: IntentCategory,
    /// What the intent did.
    pub action_description: String,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Seconds until the entry expires.
    pub seconds_remaining: u64,
}

/// Outcome of an undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoExecutionResult {
    /// Overall verdict.
    pub success: bool,
    /// Targets restored.
    pub restored_devices: usize,
    /// Targets that could not be restored.
    pub failed_devices: usize,
    /// Summary.
    pub message: String,
}

/// Per-space undo slots.
#[derive(Debug)]
pub struct UndoHistory {
    ttl: Duration,
    slots: RwLock<HashMap<SpaceId, UndoEntry>>,
}

impl UndoHistory {
    /// Create an empty history whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn expires_at(&self, entry: &UndoEntry) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        entry
            .captured_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Store an entry, replacing the space's previous one.
    pub fn capture(&self, entry: UndoEntry) {
        tracing::debug!(
            space_id = %entry.space_id,
            category = ?entry.intent_category,
            targets = entry.snapshot.len(),
            "Undo entry captured"
        );
        self.slots.write().insert(entry.space_id, entry);
    }

    /// Show the pending entry, if any and unexpired.
    #[must_use]
    pub fn peek(&self, space_id: &SpaceId) -> Option<UndoPeek> {
        self.peek_at(space_id, Utc::now())
    }

    /// Show the pending entry as of `now`.
    #[must_use]
    pub fn peek_at(&self, space_id: &SpaceId, now: DateTime<Utc>) -> Option<UndoPeek> {
        let slots = self.slots.read();
        let entry = slots.get(space_id)?;
        let expires_at = self.expires_at(entry);
        if now >= expires_at {
            return None;
        }
        Some(UndoPeek {
            id: entry.id,
            intent_category: entry.intent_category,
            action_description: entry.action_description.clone(),
            captured_at: entry.captured_at,
            seconds_remaining: u64::try_from((expires_at - now).num_seconds()).unwrap_or(0),
        })
    }

    /// Empty the slot, returning its entry when it was still valid.
    #[must_use]
    pub fn take(&self, space_id: &SpaceId) -> Option<UndoEntry> {
        self.take_at(space_id, Utc::now())
    }

    /// Empty the slot as of `now`.
    #[must_use]
    pub fn take_at(&self, space_id: &SpaceId, now: DateTime<Utc>) -> Option<UndoEntry> {
        let entry = self.slots.write().remove(space_id)?;
        if now >= self.expires_at(&entry) {
            tracing::debug!(space_id = %space_id, "Undo entry expired");
            return None;
        }
        Some(entry)
    }

    /// Drop the space's entry.
    pub fn clear(&self, space_id: &SpaceId) {
        self.slots.write().remove(space_id);
    }
}

/// Write an entry's pre-intent values back, one batch per target.
///
/// Targets whose device has gone away fail. Unknown values are skipped, so a
/// target with nothing to restore counts as restored.
pub async fn restore(
    entry: &UndoEntry,
    directory: &dyn SpaceDirectory,
    engine: &ExecutionEngine,
) -> UndoExecutionResult {
    let device_ids: Vec<DeviceId> = entry.snapshot.iter().map(|t| t.device_id).collect();
    let known = match directory.devices_by_ids(&device_ids).await {
        Ok(devices) => devices.into_iter().map(|d| d.id).collect::<Vec<_>>(),
        Err(e) => {
            tracing::warn!(space_id = %entry.space_id, error = %e, "Could not load devices for undo");
            Vec::new()
        }
    };

    let mut restored = 0;
    let mut failed = 0;
    for target in &entry.snapshot {
        if !known.contains(&target.device_id) {
            failed += 1;
            continue;
        }
        let commands = target.restore_commands();
        if commands.is_empty() {
            restored += 1;
            continue;
        }
        match engine.dispatch(&commands).await {
            Ok(()) => restored += 1,
            Err(reason) => {
                tracing::warn!(device_id = %target.device_id, reason = %reason, "Undo restore failed");
                failed += 1;
            }
        }
    }

    tracing::info!(
        space_id = %entry.space_id,
        restored = restored,
        failed = failed,
        "Undo executed"
    );

    UndoExecutionResult {
        success: failed == 0 || restored > 0,
        restored_devices: restored,
        failed_devices: failed,
        message: format!("Restored {restored} device(s)"),
    }
}
