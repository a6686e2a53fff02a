//! Period aggregation: groups the weight log into calendar buckets and
//! computes per-bucket statistics plus the change against the prior bucket.
//!
//! Buckets are keyed by their start date; empty buckets are never
//! materialized, so consecutive output rows may span a calendar gap.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::domain::{ConfidenceLevel, EntryLog, PeriodGrouping, WeightEntry};
use crate::stats::{self, ConfidenceInterval};

/// Monday of the week containing the Unix epoch; two-week buckets are
/// counted from here so week pairs stay Monday-aligned.
const EPOCH_MONDAY: NaiveDate = match NaiveDate::from_ymd_opt(1969, 12, 29) {
    Some(d) => d,
    None => panic!("invalid reference date"),
};

/// Direction of a period-over-period change, read off the change CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// The whole change CI is above zero.
    ReliableGain,
    /// The whole change CI is below zero.
    ReliableLoss,
    /// The change CI straddles zero.
    Inconclusive,
}

/// Signed change against the previous bucket's mean.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeriodChange {
    pub delta_kg: f64,
    pub ci: ConfidenceInterval,
    pub class: ChangeClass,
}

/// Statistics for one calendar bucket.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodStats {
    /// First day of the bucket; buckets sort by this.
    pub start: NaiveDate,
    /// Date of the last entry inside the bucket.
    pub last_entry: NaiveDate,
    pub entry_count: usize,
    pub mean_kg: f64,
    /// Sample SD; 0 for a single entry.
    pub sd_kg: f64,
    /// CI of the mean; collapses to [mean, mean] for a single entry.
    pub ci: ConfidenceInterval,
    /// Change vs the previous bucket; None for the first bucket.
    pub change: Option<PeriodChange>,
}

/// Start date of the bucket containing `date` under the given grouping.
pub fn bucket_start(date: NaiveDate, grouping: PeriodGrouping) -> NaiveDate {
    match grouping {
        PeriodGrouping::Week => date.week(Weekday::Mon).first_day(),
        PeriodGrouping::TwoWeeks => {
            let monday = date.week(Weekday::Mon).first_day();
            let weeks = (monday - EPOCH_MONDAY).num_days().div_euclid(7);
            let pair = weeks.div_euclid(2);
            EPOCH_MONDAY + Duration::days(pair * 14)
        }
        PeriodGrouping::Month => {
            NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
        }
        PeriodGrouping::TwoMonths => {
            let start_month0 = (date.month0() / 2) * 2;
            NaiveDate::from_ymd_opt(date.year(), start_month0 + 1, 1).unwrap_or(date)
        }
    }
}

/// Groups the log into calendar buckets and computes bucket statistics
/// plus period-over-period changes.
///
/// The change CI uses the pooled standard error
/// sqrt(sd_cur²/n_cur + sd_prev²/n_prev); a side with a single entry
/// contributes nothing, so two consecutive single-entry buckets yield a
/// zero-width change CI.
pub fn aggregate(
    log: &EntryLog,
    grouping: PeriodGrouping,
    level: ConfidenceLevel,
) -> Vec<PeriodStats> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&WeightEntry>> = BTreeMap::new();
    for entry in log.iter() {
        buckets
            .entry(bucket_start(entry.date, grouping))
            .or_default()
            .push(entry);
    }

    let z = level.z_score();
    let mut result: Vec<PeriodStats> = Vec::with_capacity(buckets.len());

    for (start, entries) in buckets {
        let weights: Vec<f64> = entries.iter().map(|e| e.weight_kg).collect();
        let mean = stats::mean(&weights);
        let sd = stats::sample_sd(&weights, mean);
        let n = weights.len();
        let ci = stats::confidence_interval(mean, sd, n, z);

        let change = result.last().map(|prev: &PeriodStats| {
            let delta = mean - prev.mean_kg;
            let var_cur = if n > 1 {
                sd * sd / n as f64
            } else {
                0.0
            };
            let var_prev = if prev.entry_count > 1 {
                prev.sd_kg * prev.sd_kg / prev.entry_count as f64
            } else {
                0.0
            };
            let pooled_se = (var_cur + var_prev).sqrt();
            let ci = ConfidenceInterval::new(delta - z * pooled_se, delta + z * pooled_se);

            let class = if ci.entirely_positive() {
                ChangeClass::ReliableGain
            } else if ci.entirely_negative() {
                ChangeClass::ReliableLoss
            } else {
                ChangeClass::Inconclusive
            };

            PeriodChange {
                delta_kg: delta,
                ci,
                class,
            }
        });

        result.push(PeriodStats {
            start,
            last_entry: entries.last().map(|e| e.date).unwrap_or(start),
            entry_count: n,
            mean_kg: mean,
            sd_kg: sd,
            ci,
            change,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn entry(d: NaiveDate, weight: f64) -> WeightEntry {
        WeightEntry::new(d, weight, None)
    }

    #[test]
    fn test_week_bucket_monday_aligned() {
        // 2024-03-06 is a Wednesday; its week starts Monday 2024-03-04.
        assert_eq!(
            bucket_start(date(2024, 3, 6), PeriodGrouping::Week),
            date(2024, 3, 4)
        );
        // Sunday belongs to the week that started the previous Monday.
        assert_eq!(
            bucket_start(date(2024, 3, 10), PeriodGrouping::Week),
            date(2024, 3, 4)
        );
        // Monday starts its own week.
        assert_eq!(
            bucket_start(date(2024, 3, 11), PeriodGrouping::Week),
            date(2024, 3, 11)
        );
    }

    #[test]
    fn test_two_week_bucket_pairs_whole_weeks() {
        let grouping = PeriodGrouping::TwoWeeks;
        let start = bucket_start(date(2024, 3, 6), grouping);

        // The bucket start is itself a Monday, and a date 14 days later
        // lands in the next bucket exactly.
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(bucket_start(start, grouping), start);
        assert_eq!(
            bucket_start(start + Duration::days(13), grouping),
            start
        );
        assert_eq!(
            bucket_start(start + Duration::days(14), grouping),
            start + Duration::days(14)
        );
    }

    #[test]
    fn test_month_and_bimonth_buckets() {
        assert_eq!(
            bucket_start(date(2024, 3, 15), PeriodGrouping::Month),
            date(2024, 3, 1)
        );
        // Bimonths are Jan-Feb, Mar-Apr, May-Jun, ...
        assert_eq!(
            bucket_start(date(2024, 4, 30), PeriodGrouping::TwoMonths),
            date(2024, 3, 1)
        );
        assert_eq!(
            bucket_start(date(2024, 5, 1), PeriodGrouping::TwoMonths),
            date(2024, 5, 1)
        );
    }

    #[test]
    fn test_aggregate_counts_and_ordering() {
        let log = EntryLog::from_entries([
            entry(date(2024, 3, 4), 80.0),
            entry(date(2024, 3, 5), 80.4),
            entry(date(2024, 3, 11), 79.8),
            entry(date(2024, 3, 25), 79.0),
        ]);

        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P95);

        // Three non-empty weeks; the empty week of 3/18 is not materialized.
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].entry_count, 2);
        assert_eq!(periods[1].entry_count, 1);
        assert_eq!(periods[2].entry_count, 1);

        // Strictly ordered by bucket start.
        for pair in periods.windows(2) {
            assert!(pair[0].start < pair[1].start);
        }

        // Counts cover every source entry.
        let total: usize = periods.iter().map(|p| p.entry_count).sum();
        assert_eq!(total, log.len());
    }

    #[test]
    fn test_first_bucket_has_no_change() {
        let log = EntryLog::from_entries([entry(date(2024, 3, 4), 80.0)]);
        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P95);
        assert!(periods[0].change.is_none());
    }

    #[test]
    fn test_single_entry_buckets_have_zero_width_change_ci() {
        let log = EntryLog::from_entries([
            entry(date(2024, 3, 4), 80.0),
            entry(date(2024, 3, 11), 79.2),
        ]);

        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P95);
        let change = periods[1].change.unwrap();

        assert!((change.delta_kg + 0.8).abs() < 1e-9);
        assert_eq!(change.ci.low, change.ci.high);
        assert!((change.ci.low - change.delta_kg).abs() < 1e-9);
        assert_eq!(change.class, ChangeClass::ReliableLoss);
    }

    #[test]
    fn test_change_classification() {
        // Tight clusters well apart: the increase is reliable.
        let log = EntryLog::from_entries([
            entry(date(2024, 3, 4), 80.0),
            entry(date(2024, 3, 5), 80.1),
            entry(date(2024, 3, 6), 79.9),
            entry(date(2024, 3, 11), 81.0),
            entry(date(2024, 3, 12), 81.1),
            entry(date(2024, 3, 13), 80.9),
        ]);
        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P95);
        assert_eq!(periods[1].change.unwrap().class, ChangeClass::ReliableGain);

        // Wide scatter with overlapping means: inconclusive.
        let log = EntryLog::from_entries([
            entry(date(2024, 3, 4), 79.0),
            entry(date(2024, 3, 5), 81.0),
            entry(date(2024, 3, 6), 80.0),
            entry(date(2024, 3, 11), 80.3),
            entry(date(2024, 3, 12), 79.5),
            entry(date(2024, 3, 13), 81.2),
        ]);
        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P95);
        assert_eq!(periods[1].change.unwrap().class, ChangeClass::Inconclusive);
    }

    #[test]
    fn test_single_entry_bucket_ci_collapses() {
        let log = EntryLog::from_entries([entry(date(2024, 3, 4), 80.0)]);
        let periods = aggregate(&log, PeriodGrouping::Week, ConfidenceLevel::P99);
        assert_eq!(periods[0].ci.low, 80.0);
        assert_eq!(periods[0].ci.high, 80.0);
        assert_eq!(periods[0].sd_kg, 0.0);
    }
}
