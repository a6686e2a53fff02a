//! Body composition estimation: a single chronological pass that splits
//! each weight change into fat and lean mass.
//!
//! Measured body-fat dates are anchors the series snaps to exactly;
//! between anchors the split uses the calibration factors and the energy
//! conversion, with the confidence margin widening as the last anchor
//! ages. Crossing a fresh anchor lets the pass derive updated partition
//! factors, which are proposed to the caller rather than written back —
//! committing is an explicit separate step.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{BodyMeasurement, CalibrationFactor, EntryLog};
use crate::stats::ConfidenceInterval;
use crate::trend::KCAL_PER_KG;

/// Energy density of lean tissue (kcal per kg), used to translate an
/// empirical kcal/kg into an implied fat fraction of mass change.
pub const KCAL_PER_KG_LEAN: f64 = 1800.0;

/// Fat mass never drops below this fraction of body weight.
pub const MIN_FAT_FRACTION: f64 = 0.03;

/// Lean mass never drops below this fraction of body weight.
pub const MIN_LEAN_FRACTION: f64 = 0.50;

/// Body-fat CI half-width on an anchor, in percentage points.
pub const ANCHOR_MARGIN_PCT: f64 = 1.0;

/// Fixed wide margin when body fat is carried forward without calorie
/// data, in percentage points.
pub const CARRY_MARGIN_PCT: f64 = 3.0;

/// Margin growth per day since the last anchor.
pub const MARGIN_GROWTH_PER_DAY: f64 = 0.05;

/// Bounds on the interpolated margin, in percentage points.
pub const MARGIN_RANGE_PCT: (f64, f64) = (3.0, 60.0);

/// Weight changes smaller than this between anchors are too small to
/// derive a partition factor from.
const MIN_CALIBRATION_DELTA_KG: f64 = 0.2;

/// One point of the body composition series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodyCompositionEstimate {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub body_fat_pct: f64,
    pub fat_mass_kg: f64,
    pub lean_mass_kg: f64,
    pub body_fat_ci: ConfidenceInterval,
    /// True for ground-truth points (a measured body-fat date, or the
    /// externally supplied starting composition); false for interpolation.
    pub is_anchor: bool,
}

/// Result of one estimation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionOutcome {
    /// Per-entry series in chronological order.
    pub series: Vec<BodyCompositionEstimate>,
    /// Updated calibration derived from anchors newer than the input
    /// factor's date, if the pass crossed any. The caller decides whether
    /// to commit it and re-estimate.
    pub proposed_calibration: Option<CalibrationFactor>,
}

/// Runs the estimation pass.
///
/// Inert without a starting body-fat percentage: returns an empty series.
/// `kcal_per_kg` is the active energy conversion (empirical when stable,
/// otherwise the 7700 default); it shapes the interpolated fat fraction.
pub fn estimate_series(
    log: &EntryLog,
    measurements: &[BodyMeasurement],
    starting_body_fat_pct: Option<f64>,
    calibration: CalibrationFactor,
    kcal_per_kg: f64,
) -> CompositionOutcome {
    let Some(starting_bf) = starting_body_fat_pct else {
        return CompositionOutcome {
            series: Vec::new(),
            proposed_calibration: None,
        };
    };
    if log.is_empty() {
        return CompositionOutcome {
            series: Vec::new(),
            proposed_calibration: None,
        };
    }

    // Later measurement rows win when a date repeats.
    let measured_bf: BTreeMap<NaiveDate, f64> = measurements
        .iter()
        .filter_map(|m| m.body_fat_pct.map(|bf| (m.date, bf)))
        .collect();

    let mut working = calibration;
    let mut derived_any = false;

    let mut series = Vec::with_capacity(log.len());
    let mut fat_mass = 0.0_f64;
    let mut last_bf_pct = starting_bf;
    let mut last_anchor_date: Option<NaiveDate> = None;
    // (date, weight, fat mass) of the previous anchor, for calibration.
    let mut prior_anchor: Option<(NaiveDate, f64, f64)> = None;
    let mut prev_entry: Option<(NaiveDate, f64, Option<f64>)> = None;

    for entry in log.iter() {
        let weight = entry.weight_kg;
        let measurement = measured_bf.get(&entry.date).copied();

        let (bf_pct, margin, is_anchor) = if let Some(measured) = measurement {
            let fat = weight * measured / 100.0;

            if let Some((anchor_date, anchor_weight, anchor_fat)) = prior_anchor {
                let is_new = working.date.is_none_or(|d| entry.date > d);
                if is_new && has_calories_between(log, anchor_date, entry.date) {
                    let delta_w = weight - anchor_weight;
                    let delta_f = fat - anchor_fat;
                    if delta_w > MIN_CALIBRATION_DELTA_KG {
                        working.blend_muscle_gain(1.0 - delta_f / delta_w, entry.date);
                        derived_any = true;
                    } else if delta_w < -MIN_CALIBRATION_DELTA_KG {
                        working.blend_fat_loss(delta_f / delta_w, entry.date);
                        derived_any = true;
                    }
                }
            }

            fat_mass = fat;
            prior_anchor = Some((entry.date, weight, fat));
            last_anchor_date = Some(entry.date);
            (measured, ANCHOR_MARGIN_PCT, true)
        } else if prev_entry.is_none() {
            // First entry: trust the supplied starting composition.
            fat_mass = weight * starting_bf / 100.0;
            prior_anchor = Some((entry.date, weight, fat_mass));
            last_anchor_date = Some(entry.date);
            (starting_bf, ANCHOR_MARGIN_PCT, true)
        } else if let Some((_, prev_weight, Some(_))) = prev_entry
            && entry.calories.is_some()
        {
            // Calorie data on both ends: partition the delta.
            let delta = weight - prev_weight;
            let fraction = interpolated_fat_fraction(delta, &working, kcal_per_kg);
            fat_mass += delta * fraction;

            // Safety floors.
            fat_mass = fat_mass.max(MIN_FAT_FRACTION * weight);
            fat_mass = fat_mass.min((1.0 - MIN_LEAN_FRACTION) * weight);

            let days_since_anchor = last_anchor_date
                .map(|d| (entry.date - d).num_days())
                .unwrap_or(0);
            let margin = (1.0 + MARGIN_GROWTH_PER_DAY * days_since_anchor as f64)
                .clamp(MARGIN_RANGE_PCT.0, MARGIN_RANGE_PCT.1);
            (fat_mass / weight * 100.0, margin, false)
        } else {
            // Missing calories on one side: carry body fat forward.
            fat_mass = weight * last_bf_pct / 100.0;
            (last_bf_pct, CARRY_MARGIN_PCT, false)
        };

        last_bf_pct = bf_pct;
        prev_entry = Some((entry.date, weight, entry.calories));

        series.push(BodyCompositionEstimate {
            date: entry.date,
            weight_kg: weight,
            body_fat_pct: bf_pct,
            fat_mass_kg: fat_mass,
            lean_mass_kg: weight - fat_mass,
            body_fat_ci: ConfidenceInterval::new(bf_pct - margin, bf_pct + margin),
            is_anchor,
        });
    }

    CompositionOutcome {
        series,
        proposed_calibration: derived_any.then_some(working),
    }
}

/// Fraction of a weight delta assigned to fat mass: the calibration
/// factor for the delta's direction averaged with the fraction the energy
/// conversion implies.
fn interpolated_fat_fraction(
    delta_kg: f64,
    calibration: &CalibrationFactor,
    kcal_per_kg: f64,
) -> f64 {
    let implied = ((kcal_per_kg - KCAL_PER_KG_LEAN) / (KCAL_PER_KG - KCAL_PER_KG_LEAN))
        .clamp(0.0, 1.0);
    let calibrated = if delta_kg >= 0.0 {
        1.0 - calibration.muscle_gain_factor
    } else {
        calibration.fat_loss_factor
    };
    (calibrated + implied) / 2.0
}

/// True if any entry strictly between the two dates carries calories.
fn has_calories_between(log: &EntryLog, from: NaiveDate, to: NaiveDate) -> bool {
    log.iter()
        .any(|e| e.date > from && e.date < to && e.calories.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeightEntry;
    use chrono::Duration;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn entry(d: NaiveDate, weight: f64, calories: Option<f64>) -> WeightEntry {
        WeightEntry::new(d, weight, calories)
    }

    fn run(
        log: &EntryLog,
        measurements: &[BodyMeasurement],
        starting_bf: Option<f64>,
        calibration: CalibrationFactor,
    ) -> CompositionOutcome {
        estimate_series(log, measurements, starting_bf, calibration, KCAL_PER_KG)
    }

    #[test]
    fn test_inert_without_starting_body_fat() {
        let log = EntryLog::from_entries([entry(date(2024, 1, 1), 80.0, None)]);
        let outcome = run(&log, &[], None, CalibrationFactor::default());
        assert!(outcome.series.is_empty());
        assert!(outcome.proposed_calibration.is_none());
    }

    #[test]
    fn test_first_entry_uses_starting_body_fat() {
        let log = EntryLog::from_entries([entry(date(2024, 1, 1), 80.0, None)]);
        let outcome = run(&log, &[], Some(20.0), CalibrationFactor::default());

        let first = &outcome.series[0];
        assert!(first.is_anchor);
        assert_eq!(first.body_fat_pct, 20.0);
        assert!((first.fat_mass_kg - 16.0).abs() < 1e-9);
        assert!((first.lean_mass_kg - 64.0).abs() < 1e-9);
        assert_eq!(first.body_fat_ci.low, 19.0);
        assert_eq!(first.body_fat_ci.high, 21.0);
    }

    #[test]
    fn test_measured_date_snaps_exactly() {
        let log = EntryLog::from_entries([
            entry(date(2024, 1, 1), 80.0, Some(2500.0)),
            entry(date(2024, 1, 2), 80.1, Some(2500.0)),
            entry(date(2024, 1, 3), 80.2, Some(2500.0)),
        ]);
        let measurements = [BodyMeasurement::with_body_fat(date(2024, 1, 3), 22.5)];
        let outcome = run(&log, &measurements, Some(20.0), CalibrationFactor::default());

        let last = outcome.series.last().unwrap();
        assert!(last.is_anchor);
        assert_eq!(last.body_fat_pct, 22.5);
        assert!((last.fat_mass_kg - 80.2 * 0.225).abs() < 1e-9);
        assert_eq!(last.body_fat_ci.half_width(), ANCHOR_MARGIN_PCT);
    }

    #[test]
    fn test_interpolated_margin_widens_with_anchor_age() {
        let log = EntryLog::from_entries((0..60).map(|i| {
            entry(date(2024, 1, 1) + Duration::days(i), 80.0 + 0.02 * i as f64, Some(2800.0))
        }));
        let outcome = run(&log, &[], Some(20.0), CalibrationFactor::default());

        let early = &outcome.series[1];
        let late = outcome.series.last().unwrap();
        assert!(!late.is_anchor);
        assert!(late.body_fat_ci.half_width() > early.body_fat_ci.half_width());

        for point in &outcome.series[1..] {
            let margin = point.body_fat_ci.half_width();
            assert!(margin >= MARGIN_RANGE_PCT.0 - 1e-9);
            assert!(margin <= MARGIN_RANGE_PCT.1 + 1e-9);
        }
        // Day 59: 1 + 0.05·59 = 3.95 points.
        assert!((late.body_fat_ci.half_width() - 3.95).abs() < 1e-9);
    }

    #[test]
    fn test_carry_forward_without_calories() {
        let log = EntryLog::from_entries([
            entry(date(2024, 1, 1), 80.0, Some(2500.0)),
            entry(date(2024, 1, 2), 80.5, None),
        ]);
        let outcome = run(&log, &[], Some(20.0), CalibrationFactor::default());

        let second = &outcome.series[1];
        assert!(!second.is_anchor);
        assert_eq!(second.body_fat_pct, 20.0);
        assert_eq!(second.body_fat_ci.half_width(), CARRY_MARGIN_PCT);
        // Percentage carried, mass rescales with the new weight.
        assert!((second.fat_mass_kg - 80.5 * 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_masses_always_sum_to_weight() {
        let log = EntryLog::from_entries((0..30).map(|i| {
            entry(date(2024, 1, 1) + Duration::days(i), 80.0 - 0.1 * i as f64, Some(1800.0))
        }));
        let outcome = run(&log, &[], Some(18.0), CalibrationFactor::default());

        for point in &outcome.series {
            assert!((point.fat_mass_kg + point.lean_mass_kg - point.weight_kg).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fat_floor_holds_under_extreme_loss() {
        // Aggressive loss from an already lean start.
        let log = EntryLog::from_entries((0..40).map(|i| {
            entry(date(2024, 1, 1) + Duration::days(i), 75.0 - 0.15 * i as f64, Some(1200.0))
        }));
        let outcome = run(&log, &[], Some(5.0), CalibrationFactor::default());

        for point in &outcome.series[1..] {
            assert!(point.fat_mass_kg >= MIN_FAT_FRACTION * point.weight_kg - 1e-9);
            assert!(point.lean_mass_kg >= MIN_LEAN_FRACTION * point.weight_kg - 1e-9);
        }
    }

    #[test]
    fn test_calibration_derived_between_anchors() {
        // Two measured anchors 20 days apart with calories in between;
        // weight up 2 kg, fat up only 0.5 kg: most of the gain was lean.
        let mut log = EntryLog::new();
        for i in 0..21 {
            log.insert(entry(
                date(2024, 1, 1) + Duration::days(i),
                80.0 + 0.1 * i as f64,
                Some(3200.0),
            ));
        }
        let measurements = [
            BodyMeasurement::with_body_fat(date(2024, 1, 1), 20.0),
            // 82 kg at 20.12% keeps fat gain ~0.5 kg of a 2 kg total gain.
            BodyMeasurement::with_body_fat(date(2024, 1, 21), 20.12),
        ];

        let outcome = run(&log, &measurements, Some(20.0), CalibrationFactor::default());
        let proposed = outcome.proposed_calibration.unwrap();

        // Derived muscle fraction ~0.75 clamps to 0.7, blended with 0.3.
        assert!(proposed.muscle_gain_factor > CalibrationFactor::default().muscle_gain_factor);
        assert_eq!(proposed.date, Some(date(2024, 1, 21)));
        // The fat-loss factor is untouched by a gain.
        assert_eq!(proposed.fat_loss_factor, CalibrationFactor::default().fat_loss_factor);
    }

    #[test]
    fn test_committed_calibration_reaches_fixed_point() {
        let mut log = EntryLog::new();
        for i in 0..21 {
            log.insert(entry(
                date(2024, 1, 1) + Duration::days(i),
                80.0 + 0.1 * i as f64,
                Some(3200.0),
            ));
        }
        let measurements = [
            BodyMeasurement::with_body_fat(date(2024, 1, 1), 20.0),
            BodyMeasurement::with_body_fat(date(2024, 1, 21), 20.12),
        ];

        let first = run(&log, &measurements, Some(20.0), CalibrationFactor::default());
        let committed = first.proposed_calibration.unwrap();

        // Re-running with the committed factor finds no newer anchors.
        let second = run(&log, &measurements, Some(20.0), committed);
        assert!(second.proposed_calibration.is_none());
    }

    #[test]
    fn test_idempotent_for_identical_inputs() {
        let log = EntryLog::from_entries((0..25).map(|i| {
            entry(date(2024, 1, 1) + Duration::days(i), 80.0 + 0.05 * i as f64, Some(3000.0))
        }));
        let measurements = [BodyMeasurement::with_body_fat(date(2024, 1, 10), 21.0)];
        let calibration = CalibrationFactor::default();

        let a = run(&log, &measurements, Some(20.0), calibration);
        let b = run(&log, &measurements, Some(20.0), calibration);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_recalibration_without_calories_between_anchors() {
        let log = EntryLog::from_entries([
            entry(date(2024, 1, 1), 80.0, None),
            entry(date(2024, 1, 10), 81.0, None),
            entry(date(2024, 1, 21), 82.0, None),
        ]);
        let measurements = [
            BodyMeasurement::with_body_fat(date(2024, 1, 1), 20.0),
            BodyMeasurement::with_body_fat(date(2024, 1, 21), 20.5),
        ];

        let outcome = run(&log, &measurements, Some(20.0), CalibrationFactor::default());
        assert!(outcome.proposed_calibration.is_none());
    }
}
