//! Common error types shared across the spaces crates.

use crate::ids::{DeviceId, SpaceId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A space with the specified ID was not found.
    #[error("space not found: {0}")]
    SpaceNotFound(SpaceId),

    /// A device with the specified ID was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// A space violates the room/zone hierarchy.
    #[error("invalid hierarchy for space {space_id}: {reason}")]
    InvalidHierarchy {
        /// The offending space.
        space_id: SpaceId,
        /// What is wrong.
        reason: String,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
