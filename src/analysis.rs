//! Analysis orchestration: one pure pass from the raw logs to every
//! derived result the application serves.
//!
//! The calibration feedback loop is explicit here: the composition
//! estimator proposes a new factor, the pipeline applies it and
//! re-estimates exactly once, and the proposal is surfaced so the caller
//! can persist it. No hidden re-entrancy, no oscillation.

use serde::Serialize;

use crate::composition::{self, BodyCompositionEstimate};
use crate::domain::{BodyMeasurement, CalibrationFactor, EntryLog};
use crate::empirical::{self, EmpiricalEstimate};
use crate::notice::{self, IntakeNotice};
use crate::periods::{self, PeriodStats};
use crate::settings::Settings;
use crate::trend::{self, CaloricInference, KCAL_PER_KG};

/// Everything one analysis pass derives from the logs.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub periods: Vec<PeriodStats>,
    pub inference: Option<CaloricInference>,
    pub empirical: EmpiricalEstimate,
    pub notice: Option<IntakeNotice>,
    pub composition: Vec<BodyCompositionEstimate>,
    /// Calibration the composition pass derived; already applied to the
    /// series above, but the caller must persist it for the next cycle.
    pub updated_calibration: Option<CalibrationFactor>,
}

impl Report {
    /// The active energy conversion: empirical when stable, else 7700.
    pub fn kcal_per_kg(&self) -> f64 {
        active_kcal_per_kg(&self.empirical)
    }
}

fn active_kcal_per_kg(empirical: &EmpiricalEstimate) -> f64 {
    if empirical.is_stable() {
        empirical.kcal_per_kg.unwrap_or(KCAL_PER_KG)
    } else {
        KCAL_PER_KG
    }
}

/// Runs the whole pipeline over the current logs and settings.
///
/// Pure: identical inputs produce identical reports.
pub fn run(log: &EntryLog, measurements: &[BodyMeasurement], settings: &Settings) -> Report {
    let level = settings.confidence_level;

    let empirical = empirical::estimate(log, level);
    let kcal_per_kg = active_kcal_per_kg(&empirical);

    let inference = trend::infer(log, settings.trend_window, level, kcal_per_kg);
    let periods = periods::aggregate(log, settings.period_grouping, level);
    let notice = notice::detect(inference.as_ref(), &empirical, level);

    let first = composition::estimate_series(
        log,
        measurements,
        settings.starting_body_fat_pct,
        settings.calibration,
        kcal_per_kg,
    );

    // One explicit feedback step: apply the proposed calibration and
    // re-estimate, then stop.
    let (composition, updated_calibration) = match first.proposed_calibration {
        Some(updated) => {
            let second = composition::estimate_series(
                log,
                measurements,
                settings.starting_body_fat_pct,
                updated,
                kcal_per_kg,
            );
            (second.series, Some(updated))
        }
        None => (first.series, None),
    };

    Report {
        periods,
        inference,
        empirical,
        notice,
        composition,
        updated_calibration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeightEntry;
    use chrono::{Duration, NaiveDate};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample_log() -> EntryLog {
        EntryLog::from_entries((0..35).map(|i| {
            WeightEntry::new(
                date(2024, 1, 1) + Duration::days(i),
                80.0 + 0.05 * i as f64,
                Some(3000.0),
            )
        }))
    }

    #[test]
    fn test_report_covers_all_products() {
        let log = sample_log();
        let mut settings = Settings::default();
        settings.starting_body_fat_pct = Some(20.0);

        let report = run(&log, &[], &settings);

        assert!(!report.periods.is_empty());
        assert!(report.inference.is_some());
        assert_eq!(report.composition.len(), log.len());
        // Constant intake carries no empirical signal.
        assert!(report.empirical.kcal_per_kg.is_none());
        assert_eq!(report.kcal_per_kg(), KCAL_PER_KG);
    }

    #[test]
    fn test_run_is_idempotent() {
        let log = sample_log();
        let measurements = [
            BodyMeasurement::with_body_fat(date(2024, 1, 1), 20.0),
            BodyMeasurement::with_body_fat(date(2024, 1, 25), 20.4),
        ];
        let mut settings = Settings::default();
        settings.starting_body_fat_pct = Some(20.0);

        let a = run(&log, &measurements, &settings);
        let b = run(&log, &measurements, &settings);

        assert_eq!(a.composition, b.composition);
        assert_eq!(a.updated_calibration, b.updated_calibration);
    }

    #[test]
    fn test_calibration_feedback_settles_after_commit() {
        let log = sample_log();
        let measurements = [
            BodyMeasurement::with_body_fat(date(2024, 1, 1), 20.0),
            BodyMeasurement::with_body_fat(date(2024, 1, 25), 20.4),
        ];
        let mut settings = Settings::default();
        settings.starting_body_fat_pct = Some(20.0);

        let first = run(&log, &measurements, &settings);
        let updated = first.updated_calibration.expect("anchors should recalibrate");

        // After persisting the factor, the next cycle proposes nothing.
        settings.calibration = updated;
        let second = run(&log, &measurements, &settings);
        assert!(second.updated_calibration.is_none());
        assert_eq!(second.composition, first.composition);
    }

    #[test]
    fn test_empty_log_produces_empty_report() {
        let report = run(&EntryLog::new(), &[], &Settings::default());
        assert!(report.periods.is_empty());
        assert!(report.inference.is_none());
        assert!(report.notice.is_none());
        assert!(report.composition.is_empty());
    }
}
