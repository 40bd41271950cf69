//! Health Connect export adapter
//!
//! Parses a Health Connect record dump and maps each record to readings.
//! Interval records are observed at their end time.

use crate::error::VitalsError;
use crate::types::{MetricKind, Reading, TimeRange, WorkoutDetail};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::ExportAdapter;

/// Health Connect payload adapter
pub struct HealthConnectAdapter;

impl ExportAdapter for HealthConnectAdapter {
    fn parse(&self, raw_json: &str) -> Result<Vec<Reading>, VitalsError> {
        let payload: HealthConnectPayload = serde_json::from_str(raw_json)?;
        let mut readings = Vec::new();
        let mut skipped = 0usize;

        for record in payload.records {
            match record {
                HcRecord::HeartRate(r) => {
                    let interval = TimeRange::new(r.start_time, r.end_time);
                    for sample in r.samples {
                        readings.push(
                            Reading::new(MetricKind::HeartRate, sample.beats_per_minute, sample.time)
                                .with_interval(interval),
                        );
                    }
                }
                HcRecord::OxygenSaturation(r) => {
                    readings.push(Reading::new(MetricKind::BloodOxygen, r.percentage, r.time));
                }
                HcRecord::ActiveCaloriesBurned(r) => {
                    readings.push(interval_reading(
                        MetricKind::ActiveEnergy,
                        r.energy.in_kilocalories,
                        r.start_time,
                        r.end_time,
                    ));
                }
                HcRecord::Steps(r) => {
                    readings.push(interval_reading(
                        MetricKind::Steps,
                        r.count as f64,
                        r.start_time,
                        r.end_time,
                    ));
                }
                HcRecord::Distance(r) => {
                    readings.push(interval_reading(
                        MetricKind::Distance,
                        r.distance.in_meters,
                        r.start_time,
                        r.end_time,
                    ));
                }
                HcRecord::SleepSession(r) => {
                    readings.push(interval_reading(
                        MetricKind::SleepDuration,
                        minutes_between(r.start_time, r.end_time),
                        r.start_time,
                        r.end_time,
                    ));
                }
                HcRecord::ExerciseSession(r) => {
                    let duration = minutes_between(r.start_time, r.end_time);
                    let activity = r
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| exercise_name(r.exercise_type));
                    readings.push(
                        interval_reading(MetricKind::Workout, duration, r.start_time, r.end_time)
                            .with_detail(WorkoutDetail {
                                activity,
                                duration_minutes: duration,
                                energy_kcal: r.energy.map(|e| e.in_kilocalories),
                            }),
                    );
                }
                HcRecord::Unsupported => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "ignored unsupported Health Connect records");
        }

        // Sort by observation time
        readings.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));

        Ok(readings)
    }
}

fn interval_reading(
    kind: MetricKind,
    value: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Reading {
    Reading::new(kind, value, end).with_interval(TimeRange::new(start, end))
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    ((end - start).num_seconds().max(0) as f64) / 60.0
}

fn exercise_name(code: i32) -> String {
    match code {
        8 => "biking".to_string(),
        37 => "hiking".to_string(),
        56 => "running".to_string(),
        70 => "strength_training".to_string(),
        74 => "swimming_pool".to_string(),
        79 => "walking".to_string(),
        83 => "yoga".to_string(),
        other => format!("exercise_{}", other),
    }
}

// Health Connect record structures

#[derive(Debug, Deserialize)]
struct HealthConnectPayload {
    #[serde(default)]
    records: Vec<HcRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "recordType")]
enum HcRecord {
    HeartRate(HcHeartRate),
    OxygenSaturation(HcOxygenSaturation),
    ActiveCaloriesBurned(HcActiveCalories),
    Steps(HcSteps),
    Distance(HcDistance),
    SleepSession(HcInterval),
    ExerciseSession(HcExercise),
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcHeartRate {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    samples: Vec<HcHeartRateSample>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcHeartRateSample {
    time: DateTime<Utc>,
    beats_per_minute: f64,
}

#[derive(Debug, Deserialize)]
struct HcOxygenSaturation {
    time: DateTime<Utc>,
    percentage: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcEnergy {
    in_kilocalories: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcActiveCalories {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    energy: HcEnergy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcSteps {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcLength {
    in_meters: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcDistance {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    distance: HcLength,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcInterval {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcExercise {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    exercise_type: i32,
    title: Option<String>,
    energy: Option<HcEnergy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_export() -> &'static str {
        r#"{
            "records": [
                {
                    "recordType": "HeartRate",
                    "startTime": "2024-01-15T08:00:00Z",
                    "endTime": "2024-01-15T08:05:00Z",
                    "samples": [
                        { "time": "2024-01-15T08:01:00Z", "beatsPerMinute": 71 },
                        { "time": "2024-01-15T08:04:00Z", "beatsPerMinute": 74 }
                    ]
                },
                { "recordType": "OxygenSaturation", "time": "2024-01-15T07:30:00Z", "percentage": 97.5 },
                {
                    "recordType": "Steps",
                    "startTime": "2024-01-15T09:00:00Z",
                    "endTime": "2024-01-15T10:00:00Z",
                    "count": 1250
                },
                {
                    "recordType": "Distance",
                    "startTime": "2024-01-15T09:00:00Z",
                    "endTime": "2024-01-15T10:00:00Z",
                    "distance": { "inMeters": 940.5 }
                },
                {
                    "recordType": "ActiveCaloriesBurned",
                    "startTime": "2024-01-15T09:00:00Z",
                    "endTime": "2024-01-15T10:00:00Z",
                    "energy": { "inKilocalories": 88.0 }
                },
                {
                    "recordType": "SleepSession",
                    "startTime": "2024-01-14T22:30:00Z",
                    "endTime": "2024-01-15T06:30:00Z"
                },
                {
                    "recordType": "ExerciseSession",
                    "startTime": "2024-01-15T17:00:00Z",
                    "endTime": "2024-01-15T17:32:00Z",
                    "exerciseType": 56
                },
                { "recordType": "BodyTemperature", "time": "2024-01-15T07:00:00Z" }
            ]
        }"#
    }

    #[test]
    fn test_parse_health_connect_export() {
        let readings = HealthConnectAdapter.parse(sample_export()).unwrap();

        assert_eq!(readings.len(), 8);
        let count = |kind| readings.iter().filter(|r| r.kind == kind).count();
        assert_eq!(count(MetricKind::HeartRate), 2);
        assert_eq!(count(MetricKind::BloodOxygen), 1);
        assert_eq!(count(MetricKind::Steps), 1);
        assert_eq!(count(MetricKind::Distance), 1);
        assert_eq!(count(MetricKind::ActiveEnergy), 1);
        assert_eq!(count(MetricKind::SleepDuration), 1);
        assert_eq!(count(MetricKind::Workout), 1);
    }

    #[test]
    fn test_interval_records_observed_at_end() {
        let readings = HealthConnectAdapter.parse(sample_export()).unwrap();

        let sleep = readings
            .iter()
            .find(|r| r.kind == MetricKind::SleepDuration)
            .unwrap();
        assert_eq!(sleep.value, 480.0);
        assert_eq!(sleep.observed_at, Utc.with_ymd_and_hms(2024, 1, 15, 6, 30, 0).unwrap());
        assert_eq!(sleep.recorded_interval.duration().num_hours(), 8);
    }

    #[test]
    fn test_exercise_named_from_type() {
        let readings = HealthConnectAdapter.parse(sample_export()).unwrap();

        let workout = readings.iter().find(|r| r.kind == MetricKind::Workout).unwrap();
        let detail = workout.detail.as_ref().unwrap();
        assert_eq!(detail.activity, "running");
        assert_eq!(detail.duration_minutes, 32.0);
        assert_eq!(workout.value, 32.0);
    }

    #[test]
    fn test_sorted_by_observation() {
        let readings = HealthConnectAdapter.parse(sample_export()).unwrap();
        assert!(readings.windows(2).all(|w| w[0].observed_at <= w[1].observed_at));
    }

    #[test]
    fn test_empty_and_invalid_payloads() {
        assert!(HealthConnectAdapter.parse(r#"{"records": []}"#).unwrap().is_empty());
        assert!(HealthConnectAdapter.parse("{}").unwrap().is_empty());
        assert!(HealthConnectAdapter.parse("not json").is_err());
    }
}
