//! Domain types for the weight and intake log.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One logged day: morning weight, optionally the day's calorie intake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub date: NaiveDate,
    /// Body weight in kilograms.
    pub weight_kg: f64,
    /// Daily intake in kcal, when logged.
    pub calories: Option<f64>,
}

impl WeightEntry {
    pub fn new(date: NaiveDate, weight_kg: f64, calories: Option<f64>) -> Self {
        Self {
            date,
            weight_kg,
            calories,
        }
    }
}

/// The weight log: at most one entry per calendar day, iterated in
/// ascending date order regardless of insertion order.
///
/// Inserting a second entry for an existing date replaces the first
/// (last write wins).
#[derive(Debug, Clone, Default)]
pub struct EntryLog {
    entries: BTreeMap<NaiveDate, WeightEntry>,
}

impl EntryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = WeightEntry>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            log.insert(entry);
        }
        log
    }

    /// Inserts an entry, replacing any prior entry for the same date.
    pub fn insert(&mut self, entry: WeightEntry) {
        self.entries.insert(entry.date, entry);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&WeightEntry> {
        self.entries.get(&date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending date order.
    pub fn iter(&self) -> impl Iterator<Item = &WeightEntry> {
        self.entries.values()
    }

    /// Entries in ascending date order, collected.
    pub fn sorted(&self) -> Vec<WeightEntry> {
        self.entries.values().copied().collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next_back().copied()
    }

    /// Inclusive span of the log in days (1 for a single entry).
    pub fn span_days(&self) -> i64 {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => (last - first).num_days() + 1,
            _ => 0,
        }
    }
}

/// A body measurement row: a date plus at least one metric.
///
/// Multiple rows may share a date; they are independent observations and
/// are not deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurement {
    pub date: NaiveDate,
    /// Measured body fat in percent of body weight.
    pub body_fat_pct: Option<f64>,
    /// Named circumference metrics in cm (neck, waist, ...).
    pub circumferences: BTreeMap<String, f64>,
}

impl BodyMeasurement {
    pub fn with_body_fat(date: NaiveDate, body_fat_pct: f64) -> Self {
        Self {
            date,
            body_fat_pct: Some(body_fat_pct),
            circumferences: BTreeMap::new(),
        }
    }

    /// True if the row carries at least one metric besides the date.
    pub fn has_any_metric(&self) -> bool {
        self.body_fat_pct.is_some() || !self.circumferences.is_empty()
    }
}

/// Confidence level for every interval the engine produces.
///
/// A closed set, each level mapped to its fixed two-tailed z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    P80,
    P90,
    #[default]
    P95,
    P99,
}

impl ConfidenceLevel {
    pub fn z_score(&self) -> f64 {
        match self {
            ConfidenceLevel::P80 => 1.28,
            ConfidenceLevel::P90 => 1.645,
            ConfidenceLevel::P95 => 1.96,
            ConfidenceLevel::P99 => 2.576,
        }
    }

    pub fn as_fraction(&self) -> f64 {
        match self {
            ConfidenceLevel::P80 => 0.80,
            ConfidenceLevel::P90 => 0.90,
            ConfidenceLevel::P95 => 0.95,
            ConfidenceLevel::P99 => 0.99,
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.80" | "0.8" | "80" => Ok(ConfidenceLevel::P80),
            "0.90" | "0.9" | "90" => Ok(ConfidenceLevel::P90),
            "0.95" | "95" => Ok(ConfidenceLevel::P95),
            "0.99" | "99" => Ok(ConfidenceLevel::P99),
            _ => Err(ParseError::UnknownSelector {
                kind: "confidence level",
                value: s.to_string(),
            }),
        }
    }
}

/// Trailing window for trend inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendWindow {
    Days14,
    #[default]
    Days30,
    Days60,
    All,
}

impl TrendWindow {
    /// Window length in days, None for full history.
    pub fn days(&self) -> Option<i64> {
        match self {
            TrendWindow::Days14 => Some(14),
            TrendWindow::Days30 => Some(30),
            TrendWindow::Days60 => Some(60),
            TrendWindow::All => None,
        }
    }
}

impl FromStr for TrendWindow {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "14" | "14d" => Ok(TrendWindow::Days14),
            "30" | "30d" => Ok(TrendWindow::Days30),
            "60" | "60d" => Ok(TrendWindow::Days60),
            "all" => Ok(TrendWindow::All),
            _ => Err(ParseError::UnknownSelector {
                kind: "trend window",
                value: s.to_string(),
            }),
        }
    }
}

/// Calendar grouping for the period aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGrouping {
    #[default]
    Week,
    TwoWeeks,
    Month,
    TwoMonths,
}

impl FromStr for PeriodGrouping {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1w" | "week" => Ok(PeriodGrouping::Week),
            "2w" | "two_weeks" => Ok(PeriodGrouping::TwoWeeks),
            "1m" | "month" => Ok(PeriodGrouping::Month),
            "2m" | "two_months" => Ok(PeriodGrouping::TwoMonths),
            _ => Err(ParseError::UnknownSelector {
                kind: "period grouping",
                value: s.to_string(),
            }),
        }
    }
}

/// Default fraction of a weight gain attributed to lean mass.
pub const DEFAULT_MUSCLE_GAIN_FACTOR: f64 = 0.3;

/// Default fraction of a weight loss attributed to fat mass.
pub const DEFAULT_FAT_LOSS_FACTOR: f64 = 0.9;

/// Allowed range for the muscle-gain partition factor.
pub const MUSCLE_GAIN_RANGE: (f64, f64) = (0.0, 0.7);

/// Allowed range for the fat-loss partition factor.
pub const FAT_LOSS_RANGE: (f64, f64) = (0.5, 1.0);

/// Self-calibrating partition state for the body composition estimator.
///
/// `date` records the newest measurement that contributed, so a committed
/// factor is never re-derived from the same anchors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFactor {
    /// Date of the newest anchor that has been folded in.
    pub date: Option<NaiveDate>,
    /// Fraction of a surplus-driven gain that went to lean mass, in [0, 0.7].
    pub muscle_gain_factor: f64,
    /// Fraction of a deficit-driven loss that came from fat, in [0.5, 1.0].
    pub fat_loss_factor: f64,
}

impl Default for CalibrationFactor {
    fn default() -> Self {
        Self {
            date: None,
            muscle_gain_factor: DEFAULT_MUSCLE_GAIN_FACTOR,
            fat_loss_factor: DEFAULT_FAT_LOSS_FACTOR,
        }
    }
}

impl CalibrationFactor {
    /// Blends a newly derived muscle-gain fraction into the factor,
    /// averaging rather than overwriting so one noisy anchor pair cannot
    /// swing the state.
    pub fn blend_muscle_gain(&mut self, derived: f64, anchor: NaiveDate) {
        let derived = derived.clamp(MUSCLE_GAIN_RANGE.0, MUSCLE_GAIN_RANGE.1);
        self.muscle_gain_factor = (self.muscle_gain_factor + derived) / 2.0;
        self.date = Some(self.date.map_or(anchor, |d| d.max(anchor)));
    }

    /// Blends a newly derived fat-loss fraction into the factor.
    pub fn blend_fat_loss(&mut self, derived: f64, anchor: NaiveDate) {
        let derived = derived.clamp(FAT_LOSS_RANGE.0, FAT_LOSS_RANGE.1);
        self.fat_loss_factor = (self.fat_loss_factor + derived) / 2.0;
        self.date = Some(self.date.map_or(anchor, |d| d.max(anchor)));
    }
}
