//! Statistics primitives: mean, sample standard deviation, z-based
//! confidence intervals and single-predictor ordinary least squares.
//!
//! Everything here is total: degenerate inputs (fewer than two points,
//! zero variance) produce a defined neutral result rather than NaN.

use serde::Serialize;

/// A two-sided confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

impl ConfidenceInterval {
    pub fn new(low: f64, high: f64) -> Self {
        if low <= high {
            Self { low, high }
        } else {
            Self { low: high, high: low }
        }
    }

    /// A zero-width interval collapsed onto a single value.
    pub fn point(value: f64) -> Self {
        Self { low: value, high: value }
    }

    /// Half the interval width.
    pub fn half_width(&self) -> f64 {
        (self.high - self.low) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// True if the whole interval lies strictly above zero.
    pub fn entirely_positive(&self) -> bool {
        self.low > 0.0
    }

    /// True if the whole interval lies strictly below zero.
    pub fn entirely_negative(&self) -> bool {
        self.high < 0.0
    }
}

/// Ordinary least squares fit of y against a single predictor x.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Number of points the fit used.
    pub n: usize,
}

impl Regression {
    /// The neutral fit returned for degenerate inputs.
    fn degenerate(n: usize) -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            n,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Arithmetic mean. Returns 0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation, sqrt(sum((x - mean)^2) / (n - 1)).
///
/// Returns 0 when fewer than two values are present.
pub fn sample_sd(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let ss: f64 = xs.iter().map(|x| (x - mean) * (x - mean)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Confidence interval for a mean: mean ± z · sd / sqrt(n).
///
/// Collapses to a point interval when n < 2 (sd is 0 there anyway).
pub fn confidence_interval(mean: f64, sd: f64, n: usize, z: f64) -> ConfidenceInterval {
    if n < 2 {
        return ConfidenceInterval::point(mean);
    }
    let margin = z * sd / (n as f64).sqrt();
    ConfidenceInterval::new(mean - margin, mean + margin)
}

/// Ordinary least squares regression of y against x.
///
/// Degenerate inputs (fewer than two points, mismatched lengths, or zero
/// variance in x) yield slope 0, intercept 0, R² 0.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Regression {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Regression::degenerate(n);
    }

    let xs = &xs[..n];
    let ys = &ys[..n];
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let mut ss_x = 0.0;
    let mut ss_xy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        ss_x += (x - x_mean) * (x - x_mean);
        ss_xy += (x - x_mean) * (y - y_mean);
    }

    if ss_x == 0.0 {
        return Regression::degenerate(n);
    }

    let slope = ss_xy / ss_x;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let predicted = intercept + slope * x;
        ss_res += (y - predicted) * (y - predicted);
        ss_tot += (y - y_mean) * (y - y_mean);
    }

    let r_squared = if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Regression {
        slope,
        intercept,
        r_squared,
        n,
    }
}

/// Standard error of a regression slope, sqrt(MSE / SSx) with n − 2
/// degrees of freedom.
///
/// Returns 0 when n < 3 or x has no variance, so a caller always gets a
/// finite (possibly degenerate) confidence interval.
pub fn slope_standard_error(xs: &[f64], ys: &[f64], fit: &Regression) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return 0.0;
    }

    let x_mean = mean(&xs[..n]);
    let mut ss_x = 0.0;
    let mut ss_res = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        ss_x += (x - x_mean) * (x - x_mean);
        let residual = y - fit.predict(*x);
        ss_res += residual * residual;
    }

    if ss_x == 0.0 {
        return 0.0;
    }

    let mse = ss_res / (n - 2) as f64;
    (mse / ss_x).sqrt()
}
