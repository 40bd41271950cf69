//! External collaborator seams
//!
//! The health provider and the OS permission API are consumed only through
//! these traits. Implementations are injected as `Arc<dyn ...>` into the
//! components that use them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::types::{Capability, MetricKind, PermissionStatus, Reading};

/// Read API of the third-party health-data provider
#[async_trait]
pub trait HealthProvider: Send + Sync {
    /// Readings of the given kinds recorded between `start` and `end`
    async fn query_readings(
        &self,
        kinds: &[MetricKind],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, ProviderError>;

    /// Prompt for read access; `Ok(granted)` means the provider answered
    async fn request_authorization(&self, kinds: &[MetricKind]) -> Result<bool, ProviderError>;
}

/// OS runtime permission API
#[async_trait]
pub trait PlatformPermissions: Send + Sync {
    async fn status(&self, capability: Capability) -> Result<PermissionStatus, ProviderError>;

    /// May surface a platform prompt
    async fn request(&self, capability: Capability) -> Result<PermissionStatus, ProviderError>;
}
