//! Empirical kcal/kg estimation from the log itself.
//!
//! Every pair of calorie-logged entries yields an interval with an average
//! intake and an observed weight-change rate. Regressing rate against
//! intake gives a personalized energy conversion: the reciprocal of the
//! slope is kcal per kg of body-mass change, and the intake at which the
//! predicted rate crosses zero is an implied maintenance level.

use serde::Serialize;

use crate::domain::{ConfidenceLevel, EntryLog};
use crate::stats::{self, ConfidenceInterval};

/// Minimum number of valid (calories, weight-rate) interval pairs.
pub const MIN_INTERVAL_PAIRS: usize = 3;

/// The kcal/kg CI half-width beyond this fraction of the point estimate
/// classifies the estimate as noisy.
pub const WIDE_CI_FRACTION: f64 = 0.5;

/// Reliability of the empirical estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// Enough pairs, slope CI excludes zero, narrow kcal/kg CI.
    Stable,
    /// A real correlation, but the kcal/kg CI is wide relative to the
    /// point estimate.
    Noisy,
    /// Too few pairs, or calories are statistically uncorrelated with
    /// weight change in this log.
    Insufficient,
}

/// Data-derived kcal/kg conversion with its reliability classification.
///
/// The point-estimate fields double as the reduced view: callers that only
/// want numbers read `kcal_per_kg` / `maintenance_kcal` and ignore the CI
/// and stability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmpiricalEstimate {
    /// Personalized kcal per kg of body-mass change; None when the log
    /// cannot support an estimate.
    pub kcal_per_kg: Option<f64>,
    /// CI on the kcal/kg value; None whenever the slope CI straddles zero,
    /// since the reciprocal blows up near a zero slope.
    pub kcal_per_kg_ci: Option<ConfidenceInterval>,
    /// Intake at which the predicted weight-rate is zero.
    pub maintenance_kcal: Option<f64>,
    /// Fit quality of the rate-vs-intake regression.
    pub r_squared: f64,
    /// Number of interval pairs the regression used.
    pub pair_count: usize,
    /// Raw regression slope, kg/day per kcal/day.
    pub slope: f64,
    pub slope_ci: ConfidenceInterval,
    pub stability: Stability,
}

impl EmpiricalEstimate {
    fn insufficient(pair_count: usize) -> Self {
        Self {
            kcal_per_kg: None,
            kcal_per_kg_ci: None,
            maintenance_kcal: None,
            r_squared: 0.0,
            pair_count,
            slope: 0.0,
            slope_ci: ConfidenceInterval::point(0.0),
            stability: Stability::Insufficient,
        }
    }

    /// True when the estimate is solid enough to replace the textbook
    /// 7700 kcal/kg constant.
    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }
}

/// Builds all (i < j) interval pairs over calorie-logged entries and
/// regresses weight-change rate against average intake.
pub fn estimate(log: &EntryLog, level: ConfidenceLevel) -> EmpiricalEstimate {
    let logged: Vec<_> = log
        .iter()
        .filter(|e| e.calories.is_some())
        .copied()
        .collect();

    let mut avg_calories = Vec::new();
    let mut rates = Vec::new();
    for (i, a) in logged.iter().enumerate() {
        for b in &logged[i + 1..] {
            let days = (b.date - a.date).num_days();
            if days <= 0 {
                continue;
            }
            // Both ends carry calories by construction of `logged`.
            let cal_a = a.calories.unwrap_or(0.0);
            let cal_b = b.calories.unwrap_or(0.0);
            avg_calories.push((cal_a + cal_b) / 2.0);
            rates.push((b.weight_kg - a.weight_kg) / days as f64);
        }
    }

    let pair_count = rates.len();
    if pair_count < MIN_INTERVAL_PAIRS {
        return EmpiricalEstimate::insufficient(pair_count);
    }

    let fit = stats::linear_regression(&avg_calories, &rates);
    if fit.slope == 0.0 {
        // Degenerate: calories carry no signal about weight change.
        return EmpiricalEstimate::insufficient(pair_count);
    }

    let se = stats::slope_standard_error(&avg_calories, &rates, &fit);
    let z = level.z_score();
    let slope_ci = ConfidenceInterval::new(fit.slope - z * se, fit.slope + z * se);

    let kcal_per_kg = (1.0 / fit.slope).abs();
    let maintenance = -fit.intercept / fit.slope;

    if slope_ci.contains(0.0) {
        // Statistically indistinguishable from "calories don't predict
        // weight change here"; keep the point estimates but no CI.
        return EmpiricalEstimate {
            kcal_per_kg: Some(kcal_per_kg),
            kcal_per_kg_ci: None,
            maintenance_kcal: Some(maintenance),
            r_squared: fit.r_squared,
            pair_count,
            slope: fit.slope,
            slope_ci,
            stability: Stability::Insufficient,
        };
    }

    // Slope CI excludes zero, so both ends share a sign and the reciprocal
    // maps the interval monotonically.
    let a = (1.0 / slope_ci.low).abs();
    let b = (1.0 / slope_ci.high).abs();
    let kcal_ci = ConfidenceInterval::new(a.min(b), a.max(b));

    let stability = if kcal_ci.half_width() > WIDE_CI_FRACTION * kcal_per_kg {
        Stability::Noisy
    } else {
        Stability::Stable
    };

    EmpiricalEstimate {
        kcal_per_kg: Some(kcal_per_kg),
        kcal_per_kg_ci: Some(kcal_ci),
        maintenance_kcal: Some(maintenance),
        r_squared: fit.r_squared,
        pair_count,
        slope: fit.slope,
        slope_ci,
        stability,
    }
}
