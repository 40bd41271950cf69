//! Vitals Sync - On-device reconciliation engine for health-provider readings
//!
//! Vitals turns whatever a health provider returns into one trustworthy
//! snapshot of the user's current state through a deterministic pipeline:
//! permission gating → time-window scanning → metric reconciliation
//! → availability classification.
//!
//! When no usable data comes back, the failure is classified into a typed
//! [`FailureReason`] with user-facing guidance, and a [`DiagnosticReport`]
//! explains what was tried.
//!
//! ## Modules
//!
//! - **Pipeline**: [`HealthMonitor`] orchestrates fetch and refresh
//! - **Adapters**: Parse recorded provider exports (Health Connect) into readings
//! - **FFI**: C interface for mobile hosts that own the provider SDKs

pub mod adapters;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod guidance;
pub mod permissions;
pub mod pipeline;
pub mod provider;
pub mod reconciler;
pub mod replay;
pub mod scanner;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::DataAvailabilityClassifier;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SyncConfig;
pub use diagnostics::{DiagnosticReport, DiagnosticRunner};
pub use error::{FailureReason, ProviderError, VitalsError};
pub use permissions::PermissionGate;
pub use pipeline::{Fetch, HealthMonitor, RefreshOutcome};
pub use provider::{HealthProvider, PlatformPermissions};
pub use reconciler::MetricReconciler;
pub use scanner::{LookbackWindow, TimeWindowScanner};
pub use types::{HealthSnapshot, MetricKind, MetricSnapshot, PermissionState, Reading};

/// Vitals version reported by the CLI
pub const VITALS_VERSION: &str = env!("CARGO_PKG_VERSION");
