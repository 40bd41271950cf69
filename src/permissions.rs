//! Permission gate
//!
//! Combines OS runtime permissions with the provider's data-access grant.
//! Provider presence has no dedicated query: a well-formed answer to an
//! authorization request means the provider is installed, an error means it
//! is not.

use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::provider::{HealthProvider, PlatformPermissions};
use crate::types::{Capability, MetricKind, PermissionState, PermissionStatus};

/// Result of one permission check with whatever went wrong along the way
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionCheck {
    pub state: PermissionState,
    pub statuses: Vec<(Capability, PermissionStatus)>,
    pub errors: Vec<String>,
}

pub struct PermissionGate {
    platform: Arc<dyn PlatformPermissions>,
    provider: Arc<dyn HealthProvider>,
    capabilities: Vec<Capability>,
    metric_kinds: Vec<MetricKind>,
    state: RwLock<PermissionState>,
}

impl PermissionGate {
    pub fn new(
        platform: Arc<dyn PlatformPermissions>,
        provider: Arc<dyn HealthProvider>,
        capabilities: Vec<Capability>,
        metric_kinds: Vec<MetricKind>,
    ) -> Self {
        Self {
            platform,
            provider,
            capabilities,
            metric_kinds,
            state: RwLock::new(PermissionState::default()),
        }
    }

    /// State recorded by the most recent check
    pub fn current(&self) -> PermissionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Freshly computed permission state
    pub async fn check_all(&self) -> PermissionState {
        self.inspect().await.state
    }

    /// Like [`check_all`](Self::check_all), keeping per-capability detail and errors
    pub async fn inspect(&self) -> PermissionCheck {
        let mut errors = Vec::new();
        let mut statuses = Vec::with_capacity(self.capabilities.len());

        for capability in &self.capabilities {
            match self.platform.status(*capability).await {
                Ok(status) => statuses.push((*capability, status)),
                Err(e) => {
                    warn!(capability = capability.as_str(), error = %e, "runtime permission check failed");
                    errors.push(format!("{} status check failed: {}", capability.as_str(), e));
                    statuses.push((*capability, PermissionStatus::Undetermined));
                }
            }
        }
        let runtime_granted = statuses.iter().all(|(_, status)| status.is_granted());

        let (provider_available, provider_authorized) =
            match self.provider.request_authorization(&self.metric_kinds).await {
                Ok(authorized) => (true, authorized),
                Err(e) => {
                    warn!(error = %e, "provider authorization failed; treating provider as unavailable");
                    errors.push(format!("provider authorization failed: {}", e));
                    (false, false)
                }
            };

        let state = PermissionState {
            runtime_granted,
            provider_authorized,
            provider_available,
        };
        self.replace(state);
        debug!(?state, "permission check complete");

        PermissionCheck {
            state,
            statuses,
            errors,
        }
    }

    /// Prompt for every missing runtime permission, then provider access, then re-check
    pub async fn request_all(&self) -> PermissionState {
        for capability in &self.capabilities {
            match self.platform.status(*capability).await {
                Ok(status) if status.is_granted() => continue,
                Ok(status) if !status.is_requestable() => {
                    info!(capability = capability.as_str(), ?status, "permission cannot be prompted");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(capability = capability.as_str(), error = %e, "status unavailable; requesting anyway");
                }
            }
            match self.platform.request(*capability).await {
                Ok(status) => info!(capability = capability.as_str(), ?status, "runtime permission requested"),
                Err(e) => warn!(capability = capability.as_str(), error = %e, "runtime permission request failed"),
            }
        }

        if let Err(e) = self.provider.request_authorization(&self.metric_kinds).await {
            warn!(error = %e, "provider authorization request failed");
        }

        self.check_all().await
    }

    fn replace(&self, state: PermissionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}
