//! Metric reconciliation
//!
//! Collapses the readings of one scan into a single value per metric kind:
//! - Heart rate, blood oxygen, sleep: most recent non-zero reading
//! - Workout: most recent reading with its descriptive payload
//! - Active energy, steps, distance: sum over the current local day

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{current_day, Clock};
use crate::types::{HealthSnapshot, MetricKind, MetricSnapshot, Reading, ReductionPolicy, TimeRange};

pub struct MetricReconciler {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl MetricReconciler {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { clock, offset }
    }

    /// Reconcile against the clock's current time
    pub fn reconcile(&self, readings: &[Reading]) -> HealthSnapshot {
        reconcile_at(readings, self.clock.now(), self.offset)
    }
}

/// Reconcile `readings` as of `now`, with local days in `offset`
pub fn reconcile_at(readings: &[Reading], now: DateTime<Utc>, offset: FixedOffset) -> HealthSnapshot {
    let today = current_day(now, offset);

    let mut grouped: BTreeMap<MetricKind, Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        if !reading.value.is_finite() {
            debug!(kind = reading.kind.as_str(), "dropping non-finite reading");
            continue;
        }
        grouped.entry(reading.kind).or_default().push(reading);
    }

    let mut snapshot = HealthSnapshot::empty();
    for (kind, group) in grouped {
        let reduced = match kind.policy() {
            ReductionPolicy::LatestNonZero => {
                let total = group.len();
                let non_zero: Vec<&Reading> = group.into_iter().filter(|r| r.value != 0.0).collect();
                if non_zero.len() < total {
                    debug!(kind = kind.as_str(), discarded = total - non_zero.len(), "discarded zero readings");
                }
                latest(kind, non_zero)
            }
            ReductionPolicy::Latest => latest(kind, group),
            ReductionPolicy::DailySum => daily_sum(kind, &group, today),
        };
        snapshot.insert(reduced);
    }

    snapshot
}

fn latest(kind: MetricKind, mut candidates: Vec<&Reading>) -> MetricSnapshot {
    // stable: equal timestamps keep input order
    candidates.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
    match candidates.first() {
        Some(reading) => MetricSnapshot::present(kind, reading.value, reading.observed_at)
            .with_detail(reading.detail.clone()),
        None => MetricSnapshot::absent(kind),
    }
}

fn daily_sum(kind: MetricKind, group: &[&Reading], today: TimeRange) -> MetricSnapshot {
    let todays: Vec<&Reading> = group
        .iter()
        .copied()
        .filter(|r| today.contains(r.observed_at))
        .collect();

    let total: f64 = todays.iter().map(|r| r.value).sum();
    let last_seen = todays.iter().map(|r| r.observed_at).max();

    match last_seen {
        Some(at) if total != 0.0 => MetricSnapshot::present(kind, total, at),
        _ => MetricSnapshot::absent(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::WorkoutDetail;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn reconcile(readings: &[Reading]) -> HealthSnapshot {
        MetricReconciler::new(Arc::new(FixedClock(now())), utc()).reconcile(readings)
    }

    #[test]
    fn test_later_zero_heart_rate_discarded() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::HeartRate, 72.0, at(15, 9)),
            Reading::new(MetricKind::HeartRate, 0.0, at(15, 10)),
        ]);

        let heart_rate = snapshot.get(MetricKind::HeartRate).unwrap();
        assert_eq!(heart_rate.value(), Some(72.0));
        assert_eq!(heart_rate.observed_at(), Some(at(15, 9)));
    }

    #[test]
    fn test_all_zero_latest_metric_is_absent() {
        for kind in [MetricKind::HeartRate, MetricKind::BloodOxygen, MetricKind::SleepDuration] {
            let snapshot = reconcile(&[
                Reading::new(kind, 0.0, at(15, 8)),
                Reading::new(kind, 0.0, at(14, 8)),
            ]);
            assert_eq!(snapshot.get(kind), Some(&MetricSnapshot::absent(kind)));
        }
    }

    #[test]
    fn test_steps_sum_excludes_yesterday() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::Steps, 500.0, at(15, 8)),
            Reading::new(MetricKind::Steps, 300.0, at(15, 14)),
            Reading::new(MetricKind::Steps, 200.0, at(14, 16)),
        ]);

        let steps = snapshot.get(MetricKind::Steps).unwrap();
        assert_eq!(steps.value(), Some(800.0));
        assert_eq!(steps.observed_at(), Some(at(15, 14)));
    }

    #[test]
    fn test_cumulative_only_yesterday_is_absent() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::Distance, 1200.0, at(14, 16)),
            Reading::new(MetricKind::ActiveEnergy, 0.0, at(15, 9)),
        ]);

        assert_eq!(snapshot.value(MetricKind::Distance), None);
        assert_eq!(snapshot.value(MetricKind::ActiveEnergy), None);
    }

    #[test]
    fn test_future_readings_not_summed() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::Steps, 100.0, at(15, 12)),
            Reading::new(MetricKind::Steps, 900.0, now() + Duration::minutes(5)),
        ]);

        assert_eq!(snapshot.value(MetricKind::Steps), Some(100.0));
    }

    #[test]
    fn test_local_day_boundary() {
        // UTC+10: local day started at 14:00 UTC on the 15th
        let offset = FixedOffset::east_opt(10 * 3600).unwrap();
        let snapshot = reconcile_at(
            &[
                Reading::new(MetricKind::Steps, 400.0, at(15, 13)),
                Reading::new(MetricKind::Steps, 250.0, at(15, 15)),
            ],
            now(),
            offset,
        );

        assert_eq!(snapshot.value(MetricKind::Steps), Some(250.0));
    }

    #[test]
    fn test_tie_keeps_input_order() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::BloodOxygen, 97.0, at(15, 9)),
            Reading::new(MetricKind::BloodOxygen, 95.0, at(15, 9)),
        ]);

        assert_eq!(snapshot.value(MetricKind::BloodOxygen), Some(97.0));
    }

    #[test]
    fn test_workout_keeps_detail_and_zero() {
        let detail = WorkoutDetail {
            activity: "running".to_string(),
            duration_minutes: 32.0,
            energy_kcal: Some(310.0),
        };
        let snapshot = reconcile(&[
            Reading::new(MetricKind::Workout, 45.0, at(13, 7)),
            Reading::new(MetricKind::Workout, 32.0, at(15, 7)).with_detail(detail.clone()),
        ]);

        let workout = snapshot.get(MetricKind::Workout).unwrap();
        assert_eq!(workout.value(), Some(32.0));
        assert_eq!(workout.detail(), Some(&detail));

        let snapshot = reconcile(&[Reading::new(MetricKind::Workout, 0.0, at(15, 7))]);
        assert_eq!(snapshot.value(MetricKind::Workout), Some(0.0));
    }

    #[test]
    fn test_non_finite_dropped() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::HeartRate, f64::NAN, at(15, 11)),
            Reading::new(MetricKind::HeartRate, 61.0, at(15, 10)),
        ]);

        assert_eq!(snapshot.value(MetricKind::HeartRate), Some(61.0));
    }

    #[test]
    fn test_value_and_timestamp_always_paired() {
        let snapshot = reconcile(&[
            Reading::new(MetricKind::HeartRate, 0.0, at(15, 9)),
            Reading::new(MetricKind::Steps, 20.0, at(15, 9)),
            Reading::new(MetricKind::Distance, 5.0, at(12, 9)),
        ]);

        for metric in snapshot.iter() {
            assert_eq!(metric.value().is_some(), metric.observed_at().is_some());
        }
        assert_eq!(snapshot.present_count(), 1);
    }
}
