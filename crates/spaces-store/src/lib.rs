//! `RocksDB` storage layer for the spaces orchestrator.
//!
//! This crate persists role assignments and media routing configuration using
//! `RocksDB` with column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `roles`: Role assignments, keyed by `space_id || domain || device_id || channel_id`
//! - `roles_by_device`: Index for cascading deletes by device or channel
//! - `endpoints` / `endpoints_by_space`: Media endpoints and their space index
//! - `routings` / `routings_by_space`: Routing definitions and their space index
//! - `active_routings`: The single active-routing slot of each space
//!
//! # Example
//!
//! ```no_run
//! use spaces_store::{RocksStore, RoleDomain, Store};
//! use spaces_core::SpaceId;
//!
//! let store = RocksStore::open("/tmp/spaces-db").unwrap();
//!
//! let space_id = SpaceId::generate();
//! let lights = store.list_roles(&space_id, RoleDomain::Lighting).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    ActivationState, ActiveRouting, CapabilityMap, CapabilityMapping, ClimateRole,
    ConflictPolicy, CoversRole, InputPolicy, LightingRole, MediaEndpoint, MediaRole, OfflinePolicy,
    PowerPolicy, Role, RoleAssignment, RoleDomain, RoutingDefinition, RoutingType,
};

use spaces_core::{ChannelId, DeviceId, EndpointId, RoutingId, SpaceId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Role Operations
    // =========================================================================

    /// Insert or update a role assignment.
    ///
    /// This also maintains the device index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_role(&self, assignment: &RoleAssignment) -> Result<()>;

    /// Get the role assignment of a device (or one of its channels) in a space.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<&ChannelId>,
    ) -> Result<Option<RoleAssignment>>;

    /// Delete a role assignment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such assignment exists.
    fn delete_role(
        &self,
        space_id: &SpaceId,
        domain: RoleDomain,
        device_id: &DeviceId,
        channel_id: Option<&ChannelId>,
    ) -> Result<()>;

    /// List the role assignments of a space in one domain, ordered by role then priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_roles(&self, space_id: &SpaceId, domain: RoleDomain) -> Result<Vec<RoleAssignment>>;

    /// Delete every role assignment of a space. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_roles_by_space(&self, space_id: &SpaceId) -> Result<usize>;

    /// Delete every role assignment referencing a device. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_roles_by_device(&self, device_id: &DeviceId) -> Result<usize>;

    /// Delete every role assignment referencing one channel. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_roles_by_channel(&self, device_id: &DeviceId, channel_id: &ChannelId)
        -> Result<usize>;

    // =========================================================================
    // Media Endpoint Operations
    // =========================================================================

    /// Insert or update a media endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_endpoint(&self, endpoint: &MediaEndpoint) -> Result<()>;

    /// Get a media endpoint by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_endpoint(&self, endpoint_id: &EndpointId) -> Result<Option<MediaEndpoint>>;

    /// Delete a media endpoint.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the endpoint doesn't exist.
    fn delete_endpoint(&self, endpoint_id: &EndpointId) -> Result<()>;

    /// List the media endpoints of a space.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_endpoints_by_space(&self, space_id: &SpaceId) -> Result<Vec<MediaEndpoint>>;

    // =========================================================================
    // Routing Operations
    // =========================================================================

    /// Insert or update a routing definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_routing(&self, routing: &RoutingDefinition) -> Result<()>;

    /// Get a routing definition by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_routing(&self, routing_id: &RoutingId) -> Result<Option<RoutingDefinition>>;

    /// Delete a routing definition.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the routing doesn't exist.
    fn delete_routing(&self, routing_id: &RoutingId) -> Result<()>;

    /// List the routing definitions of a space.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_routings_by_space(&self, space_id: &SpaceId) -> Result<Vec<RoutingDefinition>>;

    /// Find the routing of a given type in a space, preferring default routings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_routing_by_type(
        &self,
        space_id: &SpaceId,
        routing_type: RoutingType,
    ) -> Result<Option<RoutingDefinition>> {
        let mut matching: Vec<_> = self
            .list_routings_by_space(space_id)?
            .into_iter()
            .filter(|r| r.routing_type == routing_type)
            .collect();
        matching.sort_by_key(|r| (!r.is_default, r.created_at));
        Ok(matching.into_iter().next())
    }

    // =========================================================================
    // Active Routing Operations
    // =========================================================================

    /// Replace the active-routing slot of a space.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_active_routing(&self, active: &ActiveRouting) -> Result<()>;

    /// Get the active-routing slot of a space.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_active_routing(&self, space_id: &SpaceId) -> Result<Option<ActiveRouting>>;

    /// Remove the active-routing slot of a space. Missing slots are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_active_routing(&self, space_id: &SpaceId) -> Result<()>;
}
