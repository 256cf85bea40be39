//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Role assignments, keyed by `space_id || domain || device_id || channel_id`.
    pub const ROLES: &str = "roles";

    /// Index: roles by device, keyed by `device_id || channel_id || domain || space_id`.
    pub const ROLES_BY_DEVICE: &str = "roles_by_device";

    /// Media endpoints, keyed by `endpoint_id`.
    pub const ENDPOINTS: &str = "endpoints";

    /// Index: endpoints by space, keyed by `space_id || endpoint_id`.
    pub const ENDPOINTS_BY_SPACE: &str = "endpoints_by_space";

    /// Routing definitions, keyed by `routing_id`.
    pub const ROUTINGS: &str = "routings";

    /// Index: routings by space, keyed by `space_id || routing_id`.
    pub const ROUTINGS_BY_SPACE: &str = "routings_by_space";

    /// Active-routing slot per space, keyed by `space_id`.
    pub const ACTIVE_ROUTINGS: &str = "active_routings";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ROLES,
        cf::ROLES_BY_DEVICE,
        cf::ENDPOINTS,
        cf::ENDPOINTS_BY_SPACE,
        cf::ROUTINGS,
        cf::ROUTINGS_BY_SPACE,
        cf::ACTIVE_ROUTINGS,
    ]
}
