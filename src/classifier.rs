//! Data availability classification
//!
//! Decides whether a reconciled snapshot is worth showing and, when it is
//! not, which failure explains it. The explanation comes from the permission
//! state, never from the text of a query error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FailureReason;
use crate::types::{HealthSnapshot, PermissionState};

/// Coarse shape of a reconciled snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataAvailability {
    /// No metric has a value
    Absent,
    /// Values exist but every one of them is zero
    AllZero,
    /// At least one non-zero value
    Meaningful,
}

impl DataAvailability {
    pub fn of(snapshot: &HealthSnapshot) -> Self {
        if !snapshot.has_any_value() {
            DataAvailability::Absent
        } else if snapshot.all_present_zero() {
            DataAvailability::AllZero
        } else {
            DataAvailability::Meaningful
        }
    }
}

pub struct DataAvailabilityClassifier;

impl DataAvailabilityClassifier {
    /// Pass a meaningful snapshot through unchanged, or explain why it is not
    pub fn classify(
        snapshot: HealthSnapshot,
        permissions: &PermissionState,
    ) -> Result<HealthSnapshot, FailureReason> {
        let availability = DataAvailability::of(&snapshot);
        debug!(?availability, ?permissions, "classifying snapshot");

        match availability {
            DataAvailability::Absent => Err(Self::absence_reason(permissions)),
            // any-zero with other values present is still meaningful
            DataAvailability::AllZero => Err(FailureReason::DataAllZero),
            DataAvailability::Meaningful => Ok(snapshot),
        }
    }

    fn absence_reason(permissions: &PermissionState) -> FailureReason {
        if !permissions.provider_available {
            FailureReason::ProviderUnavailable
        } else if !permissions.provider_authorized {
            FailureReason::PermissionsNotGranted
        } else {
            FailureReason::NoDataInRange
        }
    }
}
