//! Intake notice detection: flags when the observed weight trend
//! disagrees with what the logged calories predict.
//!
//! The detector consumes already-computed inference results rather than
//! raw entries, so tests can hand it arbitrary stubbed inputs.

use serde::Serialize;

use crate::domain::ConfidenceLevel;
use crate::empirical::EmpiricalEstimate;
use crate::trend::{CaloricInference, KCAL_PER_KG, MIN_DAYS_FOR_INFERENCE};

/// Observed trends whose daily energy equivalent falls below this are
/// attributed to measurement noise and never produce a notice. The same
/// figure is the minimal expected imbalance assumed when intake sits
/// outside the maintenance CI but no stable empirical conversion exists.
pub const NOISE_KCAL_PER_DAY: f64 = 150.0;

/// How observed weight change disagreed with the calorie-implied
/// expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeDirection {
    /// Expected gain, observed an even larger gain.
    GainLargerThanExpected,
    /// Calories sat below maintenance, yet weight went up.
    GainDespiteDeficit,
    /// Calories sat above maintenance, yet weight went down.
    LossDespiteSurplus,
    /// Expected loss, observed an even larger loss.
    LossLargerThanExpected,
}

/// A detected mismatch between intake and outcome.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntakeNotice {
    pub direction: NoticeDirection,
    /// Observed weight-change rate, kg/day.
    pub observed_rate: f64,
    /// Rate the logged calories implied, kg/day.
    pub expected_rate: f64,
    /// Gap between observed and expected, converted to kcal/day via the
    /// best available conversion. Positive means outcomes ran heavier
    /// than intake implies.
    pub suggested_adjustment_kcal: f64,
    /// Conversion used for the adjustment (empirical when stable,
    /// otherwise the 7700 constant).
    pub kcal_per_kg_used: f64,
}

/// Compares the observed trend with the calorie-implied expectation.
///
/// Returns None when there is not enough data (fewer than
/// [`MIN_DAYS_FOR_INFERENCE`] days), no logged intake, or the observed
/// trend is plausibly pure noise: a slope CI straddling zero, or a rate
/// whose energy equivalent stays under [`NOISE_KCAL_PER_DAY`].
pub fn detect(
    inference: Option<&CaloricInference>,
    empirical: &EmpiricalEstimate,
    _level: ConfidenceLevel,
) -> Option<IntakeNotice> {
    let inference = inference?;
    if inference.days_of_data < MIN_DAYS_FOR_INFERENCE {
        return None;
    }
    let avg_intake = inference.avg_intake_kcal?;

    // Best available conversion and the rate the intake implies.
    let (kcal_per_kg, expected_rate) = match (
        empirical.is_stable(),
        empirical.kcal_per_kg,
        empirical.maintenance_kcal,
    ) {
        (true, Some(k), Some(maintenance)) => (k, (avg_intake - maintenance) / k),
        _ => {
            // Without a trustworthy empirical model the maintenance
            // estimate is circular with the observed slope, so only the
            // direction of the imbalance is taken from it; the expected
            // magnitude is the smallest trend the noise floor can resolve.
            let m_ci = inference.maintenance.ci;
            let expected = if avg_intake > m_ci.high {
                NOISE_KCAL_PER_DAY / KCAL_PER_KG
            } else if avg_intake < m_ci.low {
                -NOISE_KCAL_PER_DAY / KCAL_PER_KG
            } else {
                0.0
            };
            (KCAL_PER_KG, expected)
        }
    };

    let observed = inference.slope_kg_per_day;
    let ci = inference.slope_ci;

    // Noise gate: the trend must be statistically real and energetically
    // meaningful.
    if ci.contains(0.0) || observed.abs() * kcal_per_kg < NOISE_KCAL_PER_DAY {
        return None;
    }

    let direction = if observed > 0.0 {
        if expected_rate < 0.0 {
            NoticeDirection::GainDespiteDeficit
        } else if ci.low > expected_rate {
            // Gaining, and even the CI's low end exceeds the expectation.
            NoticeDirection::GainLargerThanExpected
        } else {
            return None; // Gain within expectation.
        }
    } else if expected_rate > 0.0 {
        NoticeDirection::LossDespiteSurplus
    } else if ci.high < expected_rate {
        NoticeDirection::LossLargerThanExpected
    } else {
        return None; // Loss within expectation.
    };

    Some(IntakeNotice {
        direction,
        observed_rate: observed,
        expected_rate,
        suggested_adjustment_kcal: (observed - expected_rate) * kcal_per_kg,
        kcal_per_kg_used: kcal_per_kg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryLog, TrendWindow, WeightEntry};
    use crate::empirical::{self, Stability};
    use crate::stats::ConfidenceInterval;
    use crate::trend::{self, MaintenanceEstimate};
    use chrono::{Duration, NaiveDate};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn daily_log(n: i64, base: f64, step: f64, calories: f64) -> EntryLog {
        EntryLog::from_entries((0..n).map(|i| {
            WeightEntry::new(
                date(2024, 1, 1) + Duration::days(i),
                base + step * i as f64,
                Some(calories),
            )
        }))
    }

    /// Stubbed inference with the given slope CI and intake anchor.
    fn stub_inference(
        slope: f64,
        ci: ConfidenceInterval,
        avg_intake: f64,
        maintenance: f64,
        days: i64,
    ) -> CaloricInference {
        CaloricInference {
            window: TrendWindow::Days30,
            slope_kg_per_day: slope,
            slope_se: ci.half_width() / 1.96,
            slope_ci: ci,
            intercept_kg: 80.0,
            r_squared: 0.9,
            days_of_data: days,
            reliable: days >= MIN_DAYS_FOR_INFERENCE,
            avg_intake_kcal: Some(avg_intake),
            maintenance: MaintenanceEstimate {
                kcal_per_day: maintenance,
                ci: ConfidenceInterval::point(maintenance),
                intake_anchored: true,
            },
            trend: Vec::new(),
        }
    }

    /// Stubbed stable empirical estimate.
    fn stub_stable(kcal_per_kg: f64, maintenance: f64) -> EmpiricalEstimate {
        EmpiricalEstimate {
            kcal_per_kg: Some(kcal_per_kg),
            kcal_per_kg_ci: Some(ConfidenceInterval::new(
                kcal_per_kg * 0.9,
                kcal_per_kg * 1.1,
            )),
            maintenance_kcal: Some(maintenance),
            r_squared: 0.85,
            pair_count: 40,
            slope: 1.0 / kcal_per_kg,
            slope_ci: ConfidenceInterval::new(0.8 / kcal_per_kg, 1.2 / kcal_per_kg),
            stability: Stability::Stable,
        }
    }

    fn run(log: &EntryLog) -> Option<IntakeNotice> {
        let inference = trend::infer(log, TrendWindow::All, ConfidenceLevel::P95, KCAL_PER_KG);
        let est = empirical::estimate(log, ConfidenceLevel::P95);
        detect(inference.as_ref(), &est, ConfidenceLevel::P95)
    }

    #[test]
    fn test_flat_trend_within_noise_is_silent() {
        // 0.01 kg/day is 77 kcal/day, under the noise floor.
        let log = daily_log(31, 80.0, 0.01, 2500.0);
        assert!(run(&log).is_none());
    }

    #[test]
    fn test_gain_larger_than_expected() {
        // Gaining 0.05 kg/day with intake above the inferred maintenance CI.
        let log = daily_log(31, 80.0, 0.05, 3000.0);
        let notice = run(&log).unwrap();

        assert_eq!(notice.direction, NoticeDirection::GainLargerThanExpected);
        assert!(notice.suggested_adjustment_kcal > 0.0);
    }

    #[test]
    fn test_gain_despite_deficit() {
        // Empirical model says maintenance is 3000; eating 2500 yet gaining.
        let inference = stub_inference(
            0.03,
            ConfidenceInterval::new(0.025, 0.035),
            2500.0,
            2300.0,
            31,
        );
        let notice = detect(
            Some(&inference),
            &stub_stable(7700.0, 3000.0),
            ConfidenceLevel::P95,
        )
        .unwrap();

        assert_eq!(notice.direction, NoticeDirection::GainDespiteDeficit);
        assert!(notice.suggested_adjustment_kcal > 0.0);
    }

    #[test]
    fn test_loss_despite_surplus() {
        // Eating 3500 against an empirical maintenance of 3000 yet losing.
        let inference = stub_inference(
            -0.03,
            ConfidenceInterval::new(-0.035, -0.025),
            3500.0,
            3700.0,
            31,
        );
        let notice = detect(
            Some(&inference),
            &stub_stable(7700.0, 3000.0),
            ConfidenceLevel::P95,
        )
        .unwrap();

        assert_eq!(notice.direction, NoticeDirection::LossDespiteSurplus);
        assert!(notice.suggested_adjustment_kcal < 0.0);
    }

    #[test]
    fn test_loss_larger_than_expected() {
        // Expected a mild deficit (~0.02 kg/day), observed triple that.
        let inference = stub_inference(
            -0.06,
            ConfidenceInterval::new(-0.065, -0.055),
            2500.0,
            2600.0,
            31,
        );
        let notice = detect(
            Some(&inference),
            &stub_stable(7700.0, 2654.0),
            ConfidenceLevel::P95,
        )
        .unwrap();

        assert_eq!(notice.direction, NoticeDirection::LossLargerThanExpected);
        assert!(notice.suggested_adjustment_kcal < 0.0);
    }

    #[test]
    fn test_gain_within_expectation_is_silent() {
        // Observed gain matches the expected surplus almost exactly.
        let inference = stub_inference(
            0.05,
            ConfidenceInterval::new(0.045, 0.055),
            3000.0,
            2615.0,
            31,
        );
        let result = detect(
            Some(&inference),
            &stub_stable(7700.0, 2615.0),
            ConfidenceLevel::P95,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_insufficient_days_is_silent() {
        let log = daily_log(10, 80.0, 0.08, 3200.0);
        assert!(run(&log).is_none());
    }

    #[test]
    fn test_no_logged_intake_is_silent() {
        let log = EntryLog::from_entries((0..31).map(|i| {
            WeightEntry::new(date(2024, 1, 1) + Duration::days(i), 80.0 + 0.05 * i as f64, None)
        }));
        assert!(run(&log).is_none());
    }

    #[test]
    fn test_inconclusive_trend_is_silent() {
        // Slope CI straddling zero never produces a notice.
        let inference = stub_inference(
            0.03,
            ConfidenceInterval::new(-0.01, 0.07),
            3000.0,
            2500.0,
            31,
        );
        let result = detect(
            Some(&inference),
            &stub_stable(7700.0, 2500.0),
            ConfidenceLevel::P95,
        );
        assert!(result.is_none());
    }
}
