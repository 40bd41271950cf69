//! User-facing guidance for failure reasons
//!
//! This is the one place where a [`FailureReason`] becomes natural-language
//! text. Each reason maps to a single sentence of remediation.

use crate::error::FailureReason;

const PROVIDER_UNAVAILABLE: &str =
    "Install or update Health Connect from the Play Store, then reopen the app.";
const PERMISSIONS_NOT_GRANTED: &str =
    "Open Health Connect and allow this app to read heart rate, oxygen, sleep, steps, distance, energy and exercise data.";
const PERMISSIONS_REVOKED: &str =
    "Health data access was turned off while syncing; re-enable it in Health Connect app permissions.";
const NO_DATA_IN_RANGE: &str =
    "No health data was recorded in the last 30 days; wear your device and make sure its app syncs to Health Connect.";
const DATA_ALL_ZERO: &str =
    "Your device is connected but reported only zero values; check that it is worn snugly and its sensors are enabled.";
const UNKNOWN_PREFIX: &str = "Something went wrong while reading health data";

/// Guidance sentence for a failure.
///
/// `Unknown` passes its original diagnostic text through.
pub fn guidance_for(reason: &FailureReason) -> String {
    match reason {
        FailureReason::ProviderUnavailable => PROVIDER_UNAVAILABLE.to_string(),
        FailureReason::PermissionsNotGranted => PERMISSIONS_NOT_GRANTED.to_string(),
        FailureReason::PermissionsRevoked => PERMISSIONS_REVOKED.to_string(),
        FailureReason::NoDataInRange => NO_DATA_IN_RANGE.to_string(),
        FailureReason::DataAllZero => DATA_ALL_ZERO.to_string(),
        FailureReason::Unknown(detail) if detail.trim().is_empty() => {
            format!("{UNKNOWN_PREFIX}; try again in a moment.")
        }
        FailureReason::Unknown(detail) => format!("{UNKNOWN_PREFIX} ({detail}); try again in a moment."),
    }
}

impl FailureReason {
    pub fn guidance(&self) -> String {
        guidance_for(self)
    }

    /// Parse a stable code back into a reason; `UNKNOWN` carries no detail
    pub fn from_code(code: &str) -> Option<FailureReason> {
        match code {
            "PROVIDER_UNAVAILABLE" => Some(FailureReason::ProviderUnavailable),
            "PERMISSIONS_NOT_GRANTED" => Some(FailureReason::PermissionsNotGranted),
            "PERMISSIONS_REVOKED" => Some(FailureReason::PermissionsRevoked),
            "NO_DATA_IN_RANGE" => Some(FailureReason::NoDataInRange),
            "DATA_ALL_ZERO" => Some(FailureReason::DataAllZero),
            "UNKNOWN" => Some(FailureReason::Unknown(String::new())),
            _ => None,
        }
    }
}

/// Every fixed reason with its guidance, in severity order
pub fn table() -> Vec<(FailureReason, String)> {
    [
        FailureReason::ProviderUnavailable,
        FailureReason::PermissionsNotGranted,
        FailureReason::PermissionsRevoked,
        FailureReason::NoDataInRange,
        FailureReason::DataAllZero,
        FailureReason::Unknown(String::new()),
    ]
    .into_iter()
    .map(|reason| {
        let text = guidance_for(&reason);
        (reason, text)
    })
    .collect()
}
