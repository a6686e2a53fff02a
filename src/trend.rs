//! Weight-trend regression and maintenance-calorie inference.
//!
//! Regresses weight against elapsed days over a trailing window, derives a
//! confidence interval on the weight-change rate, and converts the rate to
//! a maintenance-calorie estimate when logged intake is available.

use chrono::Duration;
use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{ConfidenceLevel, EntryLog, TrendWindow, WeightEntry};
use crate::stats::{self, ConfidenceInterval};

/// Energy density of body fat (kcal per kg); the textbook conversion used
/// when no empirical value is available.
pub const KCAL_PER_KG: f64 = 7700.0;

/// Below this many days of data the inference is computed but flagged
/// unreliable; callers decide how to present it.
pub const MIN_DAYS_FOR_INFERENCE: i64 = 14;

/// One charted point of the fitted trend with its prediction band.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub actual_kg: f64,
    pub predicted_kg: f64,
    /// Band edge from the low end of the slope CI.
    pub band_low_kg: f64,
    /// Band edge from the high end of the slope CI.
    pub band_high_kg: f64,
}

/// Maintenance-calorie estimate derived from the trend.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MaintenanceEstimate {
    pub kcal_per_day: f64,
    pub ci: ConfidenceInterval,
    /// True when the estimate is anchored on average logged intake;
    /// false for the |slope · kcal/kg| fallback, which only sizes the
    /// imbalance without locating maintenance.
    pub intake_anchored: bool,
}

/// Result of regressing weight against elapsed days over a window.
#[derive(Debug, Clone, Serialize)]
pub struct CaloricInference {
    pub window: TrendWindow,
    /// Weight-change rate in kg/day.
    pub slope_kg_per_day: f64,
    pub slope_se: f64,
    pub slope_ci: ConfidenceInterval,
    pub intercept_kg: f64,
    pub r_squared: f64,
    /// Inclusive day span of the fitted data.
    pub days_of_data: i64,
    /// False below `MIN_DAYS_FOR_INFERENCE` days of data.
    pub reliable: bool,
    /// Mean of logged calories in the window, when at least two entries
    /// carry calories.
    pub avg_intake_kcal: Option<f64>,
    pub maintenance: MaintenanceEstimate,
    /// Per-entry fitted trend with prediction band, in date order.
    pub trend: Vec<TrendPoint>,
}

/// Entries inside the trailing window, oldest first.
///
/// The window is anchored on the last entry: date >= last − (window − 1)
/// days. `TrendWindow::All` keeps everything.
pub fn window_entries(log: &EntryLog, window: TrendWindow) -> Vec<WeightEntry> {
    let Some(last) = log.last_date() else {
        return Vec::new();
    };

    match window.days() {
        Some(days) => {
            let cutoff = last - Duration::days(days - 1);
            log.iter().filter(|e| e.date >= cutoff).copied().collect()
        }
        None => log.sorted(),
    }
}

/// Regresses weight against elapsed days over the trailing window.
///
/// Returns None with fewer than two entries in the window. Elapsed days
/// are counted from the first entry of the *filtered* set, so switching
/// windows re-anchors the time origin.
///
/// `kcal_per_kg` is the conversion used for the maintenance estimate:
/// pass [`KCAL_PER_KG`] or a personalized empirical value.
pub fn infer(
    log: &EntryLog,
    window: TrendWindow,
    level: ConfidenceLevel,
    kcal_per_kg: f64,
) -> Option<CaloricInference> {
    let entries = window_entries(log, window);
    if entries.len() < 2 {
        return None;
    }

    let origin = entries[0].date;
    let xs: Vec<f64> = entries
        .iter()
        .map(|e| (e.date - origin).num_days() as f64)
        .collect();
    let ys: Vec<f64> = entries.iter().map(|e| e.weight_kg).collect();

    let fit = stats::linear_regression(&xs, &ys);
    let se = stats::slope_standard_error(&xs, &ys, &fit);
    let z = level.z_score();
    let slope_ci = ConfidenceInterval::new(fit.slope - z * se, fit.slope + z * se);

    let days_of_data = xs
        .last()
        .map(|last| *last as i64 - xs[0] as i64 + 1)
        .unwrap_or(0);

    let intakes: Vec<f64> = entries.iter().filter_map(|e| e.calories).collect();
    let avg_intake = if intakes.len() >= 2 {
        Some(stats::mean(&intakes))
    } else {
        None
    };

    let maintenance = match avg_intake {
        Some(avg) => {
            // Pair the intake anchor with each end of the slope CI and
            // take the envelope.
            let a = avg - slope_ci.high * kcal_per_kg;
            let b = avg - slope_ci.low * kcal_per_kg;
            MaintenanceEstimate {
                kcal_per_day: avg - fit.slope * kcal_per_kg,
                ci: ConfidenceInterval::new(a, b),
                intake_anchored: true,
            }
        }
        None => {
            let a = (slope_ci.low * kcal_per_kg).abs();
            let b = (slope_ci.high * kcal_per_kg).abs();
            MaintenanceEstimate {
                kcal_per_day: (fit.slope * kcal_per_kg).abs(),
                ci: ConfidenceInterval::new(a.min(b), a.max(b)),
                intake_anchored: false,
            }
        }
    };

    let trend = entries
        .iter()
        .zip(&xs)
        .map(|(e, &x)| TrendPoint {
            date: e.date,
            actual_kg: e.weight_kg,
            predicted_kg: fit.predict(x),
            band_low_kg: fit.intercept + slope_ci.low * x,
            band_high_kg: fit.intercept + slope_ci.high * x,
        })
        .collect();

    Some(CaloricInference {
        window,
        slope_kg_per_day: fit.slope,
        slope_se: se,
        slope_ci,
        intercept_kg: fit.intercept,
        r_squared: fit.r_squared,
        days_of_data,
        reliable: days_of_data >= MIN_DAYS_FOR_INFERENCE,
        avg_intake_kcal: avg_intake,
        maintenance,
        trend,
    })
}
