//! Source/destination check policy
//!
//! Decides, per instance, whether the attribute may be mutated in the
//! instance's lifecycle state and whether a mutation is needed at all.
//! The mutating call itself is issued by the reconciler.

use crate::model::InstanceState;

/// Whether an instance in a given state may have its attribute set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Attribute mutation is allowed
    Eligible,
    /// Not yet ready for mutation
    Pending,
    /// Going away or gone; nothing to do
    Retiring,
    /// Unrecognised lifecycle state
    Unknown(String),
}

/// Classify an instance state for attribute mutation
pub fn eligibility(state: &InstanceState) -> Eligibility {
    match state {
        InstanceState::Running | InstanceState::Stopping | InstanceState::Stopped => {
            Eligibility::Eligible
        }
        InstanceState::Pending => Eligibility::Pending,
        InstanceState::ShuttingDown | InstanceState::Terminated => Eligibility::Retiring,
        InstanceState::Unknown(raw) => Eligibility::Unknown(raw.clone()),
    }
}

/// Whether the observed value must be corrected towards `desired`
///
/// An unreported value is treated as disabled, the provider's default.
pub fn needs_correction(observed: Option<bool>, desired: Option<bool>) -> bool {
    match desired {
        Some(desired) => observed.unwrap_or(false) != desired,
        None => false,
    }
}
