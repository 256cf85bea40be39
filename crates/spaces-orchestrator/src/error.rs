//! Error types for the orchestrator.
//!
//! Only not-found, validation and conflict errors are meant to reach callers.
//! Per-device execution problems are aggregated into result counters instead.

use spaces_core::{ChannelId, DeviceId, EndpointId, RoutingId, SpaceId};
use spaces_store::ActivationState;
use thiserror::Error;

/// A result type using `OrchestratorError`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur in orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The requested space was not found.
    #[error("space not found: {0}")]
    SpaceNotFound(SpaceId),

    /// The requested device was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// The requested channel was not found on its device.
    #[error("channel {channel_id} not found on device {device_id}")]
    ChannelNotFound {
        /// Device that was searched.
        device_id: DeviceId,
        /// Missing channel.
        channel_id: ChannelId,
    },

    /// No role is assigned to the device (or channel) in the space.
    #[error("no role assigned to device {device_id} in space {space_id}")]
    RoleNotFound {
        /// Space that was searched.
        space_id: SpaceId,
        /// Device without a role.
        device_id: DeviceId,
    },

    /// The requested routing was not found.
    #[error("routing not found: {0}")]
    RoutingNotFound(RoutingId),

    /// The requested media endpoint was not found.
    #[error("media endpoint not found: {0}")]
    EndpointNotFound(EndpointId),

    /// The request was rejected before any device I/O.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another routing is active and the routing refuses to replace it.
    #[error("routing {active} is already active in space {space_id}")]
    RoutingConflict {
        /// Space whose slot is occupied.
        space_id: SpaceId,
        /// Routing currently active.
        active: RoutingId,
    },

    /// The requested activation state transition is not valid.
    #[error(
        "invalid activation transition for space {space_id}: cannot transition from {from:?} to {to:?}"
    )]
    InvalidActivation {
        /// Space whose slot is being transitioned.
        space_id: SpaceId,
        /// The current state.
        from: ActivationState,
        /// The requested target state.
        to: ActivationState,
    },

    /// The device platform could not be reached or answered with garbage.
    #[error("device platform error: {0}")]
    Platform(String),

    /// Orchestration configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] spaces_store::StoreError),

    /// Core model error.
    #[error(transparent)]
    Core(#[from] spaces_core::CoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::SpaceNotFound(_)
            | Self::DeviceNotFound(_)
            | Self::ChannelNotFound { .. }
            | Self::RoleNotFound { .. }
            | Self::RoutingNotFound(_)
            | Self::EndpointNotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::RoutingConflict { .. } | Self::InvalidActivation { .. } => 409,
            Self::Platform(_) => 502,
            Self::Core(spaces_core::CoreError::SpaceNotFound(_) | spaces_core::CoreError::DeviceNotFound(_)) => 404,
            Self::Core(spaces_core::CoreError::InvalidHierarchy { .. } | spaces_core::CoreError::InvalidId(_)) => 400,
            Self::Config(_) | Self::Store(_) | Self::Core(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Platform(_) | Self::Store(_) | Self::Internal(_))
    }

    /// Whether the error is a not-found signal rather than a failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.http_status_code() == 404
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let space_id = SpaceId::generate();

        assert_eq!(
            OrchestratorError::SpaceNotFound(space_id).http_status_code(),
            404
        );
        assert_eq!(
            OrchestratorError::ChannelNotFound {
                device_id: DeviceId::generate(),
                channel_id: ChannelId::generate(),
            }
            .http_status_code(),
            404
        );
        assert_eq!(
            OrchestratorError::Validation("bad role".into()).http_status_code(),
            400
        );
        assert_eq!(
            OrchestratorError::RoutingConflict {
                space_id,
                active: RoutingId::generate(),
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            OrchestratorError::InvalidActivation {
                space_id,
                from: ActivationState::Deactivated,
                to: ActivationState::Active,
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            OrchestratorError::Platform("timeout".into()).http_status_code(),
            502
        );
    }

    #[test]
    fn core_errors_keep_their_meaning() {
        let err: OrchestratorError = spaces_core::CoreError::SpaceNotFound(SpaceId::generate()).into();
        assert!(err.is_not_found());

        let err: OrchestratorError = spaces_core::CoreError::InvalidHierarchy {
            space_id: SpaceId::generate(),
            reason: "zones cannot have a parent".into(),
        }
        .into();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn retriable_errors() {
        assert!(OrchestratorError::Platform("down".into()).is_retriable());
        assert!(!OrchestratorError::Validation("bad".into()).is_retriable());
    }
}
