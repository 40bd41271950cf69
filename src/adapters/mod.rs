//! Provider export adapters
//!
//! This module provides adapters that parse recorded provider data and map it
//! to [`Reading`]s, which can then be replayed through the engine.

mod health_connect;

pub use health_connect::HealthConnectAdapter;

use serde::Deserialize;

use crate::error::VitalsError;
use crate::types::Reading;

/// Trait for provider export adapters
pub trait ExportAdapter {
    /// Parse raw JSON into readings, sorted by observation time
    fn parse(&self, raw_json: &str) -> Result<Vec<Reading>, VitalsError>;
}

/// Adapter for readings already in the engine's own JSON shape.
///
/// Accepts either a bare array or an object with a `readings` array.
pub struct ReadingsAdapter;

#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingsPayload {
    Bare(Vec<Reading>),
    Wrapped { readings: Vec<Reading> },
}

impl ExportAdapter for ReadingsAdapter {
    fn parse(&self, raw_json: &str) -> Result<Vec<Reading>, VitalsError> {
        let payload: ReadingsPayload = serde_json::from_str(raw_json)
            .map_err(|e| VitalsError::ParseError(format!("expected reading list: {}", e)))?;
        let mut readings = match payload {
            ReadingsPayload::Bare(readings) => readings,
            ReadingsPayload::Wrapped { readings } => readings,
        };
        readings.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));
        Ok(readings)
    }
}
