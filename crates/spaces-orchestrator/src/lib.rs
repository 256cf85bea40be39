//! Intent orchestration for home spaces.
//!
//! This crate turns high-level intents ("relax lighting", "set 21 °C", "open
//! the blinds", "watch TV") into per-device property writes, runs them against
//! the device platform and reports partial outcomes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OrchestratorService                      │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌────────────┐   │
//! │  │   Role    │ │  Intent   │ │   Media   │ │ Undo and   │   │
//! │  │ Registry  │ │ Resolvers │ │  Routing  │ │ Suggestion │   │
//! │  └───────────┘ └───────────┘ └───────────┘ └────────────┘   │
//! │                 ┌──────────────────┐                        │
//! │                 │ Execution Engine │                        │
//! │                 └──────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌───────────┐   ┌──────────┐
//!        │  Store   │   │ Directory │   │ Platform │
//!        │ (RocksDB)│   │  (reads)  │   │ (writes) │
//!        └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use spaces_orchestrator::{
//!     InMemoryDirectory, LightingIntent, NoopDevicePlatform, OrchestratorService,
//!     SpacesOrchestrator,
//! };
//! use spaces_store::RocksStore;
//! use spaces_core::Space;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/spaces")?);
//! let directory = Arc::new(InMemoryDirectory::new());
//! let living_room = Space::room("Living room");
//! directory.insert_space(living_room.clone())?;
//!
//! let service = OrchestratorService::with_defaults(
//!     store,
//!     Arc::new(NoopDevicePlatform::new()),
//!     directory,
//! );
//!
//! let result = service
//!     .execute_lighting_intent(&living_room.id, LightingIntent::Off.into())
//!     .await?;
//! println!("affected {} lights", result.affected_devices);
//! # Ok(())
//! # }
//! ```
//!
//! # Partial failure
//!
//! A single bad device never blocks the rest of a space. Not-found and
//! validation problems are returned as errors; everything that goes wrong per
//! device ends up in the counters of [`ExecutionResult`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bridge;
pub mod config;
pub mod directory;
pub mod error;
pub mod execution;
pub mod intent;
pub mod platform;
pub mod roles;
pub mod routing;
pub mod service;
pub mod state;
pub mod suggestion;
pub mod undo;

pub use bridge::HttpDeviceBridge;
pub use config::OrchestratorConfig;
pub use directory::{InMemoryDirectory, SpaceDirectory};
pub use error::{OrchestratorError, Result};
pub use execution::{ExecutionEngine, ExecutionResult};
pub use intent::climate::{ClimateIntent, ClimateIntentRequest, ClimateMode};
pub use intent::covers::{CoversIntent, CoversIntentRequest, CoversMode};
pub use intent::lighting::{LightingIntent, LightingIntentRequest, LightingMode};
pub use intent::media::{MediaIntent, MediaIntentRequest, MediaIntentType, MediaMode, PlaybackCommand};
pub use intent::{DeltaSize, IntentCategory};
#[cfg(any(test, feature = "test-utils"))]
pub use platform::MockDevicePlatform;
pub use platform::{DevicePlatform, NoopDevicePlatform, PropertyCommand};
pub use routing::{ActivationPlan, ActivationResult, OfflineWait};
pub use service::{
    ClimateExecutionResult, CoversExecutionResult, MediaExecutionResult, OrchestratorService, SpacesOrchestrator,
};
pub use suggestion::{Feedback, Suggestion, SuggestionType};
pub use undo::{UndoExecutionResult, UndoPeek};

// Re-export commonly used types from dependencies for convenience
pub use spaces_core::{ChannelId, DeviceId, RoutingId, SpaceId, UndoEntryId};
pub use spaces_store::{MediaRole, RoleDomain, RoutingDefinition, RoutingType};
