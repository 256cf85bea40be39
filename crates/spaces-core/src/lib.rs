//! Core types for the spaces orchestrator.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: Strongly-typed UUID identifiers for spaces, devices, channels,
//!   properties, routings, and endpoints
//! - **Device model**: The read-only device/channel/property view supplied by the
//!   device platform
//! - **Spaces**: Rooms and zones with their two-level hierarchy rules
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use spaces_core::{Space, SpaceId};
//!
//! let zone = Space::zone("Upstairs");
//! let bedroom = Space { parent_id: Some(zone.id), ..Space::room("Bedroom") };
//! assert!(bedroom.validate_parent(Some(&zone)).is_ok());
//!
//! let parsed: SpaceId = bedroom.id.to_string().parse().unwrap();
//! assert_eq!(parsed, bedroom.id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod device;
pub mod error;
pub mod ids;
pub mod space;

pub use device::{
    Channel, ChannelCategory, ConnectionState, Device, DeviceCategory, Property,
    PropertyCategory, PropertyFormat, PropertyValue,
};
pub use error::{CoreError, Result};
pub use ids::{ChannelId, DeviceId, EndpointId, IdError, PropertyId, RoutingId, SpaceId, UndoEntryId};
pub use space::{Space, SpaceKind};
