//! Media routing: planning, activation and the per-space active slot.

pub mod activator;
pub mod lifecycle;
pub mod plan;

pub use activator::{ActivationResult, MediaRouter, OfflineWait, StepResult, StepStatus};
pub use plan::{ActivationPlan, PlanStep, StepKind};
