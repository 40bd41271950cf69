//! In-memory collaborators
//!
//! [`ReplayProvider`] serves a recorded set of readings (for example a parsed
//! Health Connect export) through the [`HealthProvider`] trait, filtering by
//! kind and time range like the live provider would. Failures can be scripted
//! per query. [`StaticPermissions`] answers runtime permission calls from a
//! fixed table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ProviderError;
use crate::provider::{HealthProvider, PlatformPermissions};
use crate::types::{Capability, MetricKind, PermissionStatus, Reading, TimeRange};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Health provider backed by recorded readings
pub struct ReplayProvider {
    readings: Vec<Reading>,
    authorization: Result<bool, ProviderError>,
    /// Per-query outcome overrides, consumed in order
    query_script: Mutex<VecDeque<Option<ProviderError>>>,
    /// Returned by every query once set
    persistent_failure: Option<ProviderError>,
    queried: Mutex<Vec<TimeRange>>,
    authorization_requests: Mutex<usize>,
}

impl ReplayProvider {
    /// Provider that authorizes every request and serves `readings`
    pub fn new(readings: Vec<Reading>) -> Self {
        Self {
            readings,
            authorization: Ok(true),
            query_script: Mutex::new(VecDeque::new()),
            persistent_failure: None,
            queried: Mutex::new(Vec::new()),
            authorization_requests: Mutex::new(0),
        }
    }

    /// Outcome of every `request_authorization` call
    pub fn with_authorization(mut self, outcome: Result<bool, ProviderError>) -> Self {
        self.authorization = outcome;
        self
    }

    /// Script the next queries: `Some(err)` fails that query, `None` serves data
    pub fn with_query_script(self, script: Vec<Option<ProviderError>>) -> Self {
        *lock(&self.query_script) = script.into();
        self
    }

    /// Fail every query with `error`
    pub fn failing_queries(mut self, error: ProviderError) -> Self {
        self.persistent_failure = Some(error);
        self
    }

    /// Ranges queried so far, in call order
    pub fn queried_ranges(&self) -> Vec<TimeRange> {
        lock(&self.queried).clone()
    }

    pub fn query_count(&self) -> usize {
        lock(&self.queried).len()
    }

    pub fn authorization_requests(&self) -> usize {
        *lock(&self.authorization_requests)
    }
}

#[async_trait]
impl HealthProvider for ReplayProvider {
    async fn query_readings(
        &self,
        kinds: &[MetricKind],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, ProviderError> {
        let range = TimeRange::new(start, end);
        lock(&self.queried).push(range);

        if let Some(err) = lock(&self.query_script).pop_front().flatten() {
            return Err(err);
        }
        if let Some(err) = &self.persistent_failure {
            return Err(err.clone());
        }

        Ok(self
            .readings
            .iter()
            .filter(|r| kinds.contains(&r.kind) && range.contains(r.observed_at))
            .cloned()
            .collect())
    }

    async fn request_authorization(&self, _kinds: &[MetricKind]) -> Result<bool, ProviderError> {
        *lock(&self.authorization_requests) += 1;
        self.authorization.clone()
    }
}

/// Runtime permissions answered from a fixed table
pub struct StaticPermissions {
    statuses: Mutex<HashMap<Capability, PermissionStatus>>,
    grant_on_request: bool,
    failure: Option<ProviderError>,
    requests: Mutex<Vec<Capability>>,
}

impl StaticPermissions {
    /// Every capability granted
    pub fn granted() -> Self {
        Self::with_status(PermissionStatus::Granted)
    }

    /// Every capability in the same status
    pub fn with_status(status: PermissionStatus) -> Self {
        Self {
            statuses: Mutex::new(Capability::ALL.iter().map(|c| (*c, status)).collect()),
            grant_on_request: false,
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::with_status(PermissionStatus::Undetermined)
        }
    }

    pub fn set(self, capability: Capability, status: PermissionStatus) -> Self {
        lock(&self.statuses).insert(capability, status);
        self
    }

    /// Requests for requestable capabilities come back granted
    pub fn granting_on_request(mut self) -> Self {
        self.grant_on_request = true;
        self
    }

    /// Capabilities requested so far, in call order
    pub fn requested(&self) -> Vec<Capability> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PlatformPermissions for StaticPermissions {
    async fn status(&self, capability: Capability) -> Result<PermissionStatus, ProviderError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(lock(&self.statuses)
            .get(&capability)
            .copied()
            .unwrap_or(PermissionStatus::Undetermined))
    }

    async fn request(&self, capability: Capability) -> Result<PermissionStatus, ProviderError> {
        lock(&self.requests).push(capability);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let mut statuses = lock(&self.statuses);
        let status = statuses
            .entry(capability)
            .or_insert(PermissionStatus::Undetermined);
        if self.grant_on_request && status.is_requestable() {
            *status = PermissionStatus::Granted;
        }
        Ok(*status)
    }
}
