//! Persistent analysis settings.
//!
//! Everything the engine needs besides the logs lives in one JSON file
//! with explicit load/save boundaries: display selectors, the starting
//! composition, and the calibration factor the composition estimator
//! feeds back through.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{CalibrationFactor, ConfidenceLevel, PeriodGrouping, TrendWindow};
use crate::error::SettingsError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Weight at the start of tracking, kg.
    pub starting_weight_kg: Option<f64>,
    /// Body fat at the start of tracking, percent; the composition
    /// estimator is inert without it.
    pub starting_body_fat_pct: Option<f64>,
    /// Target weight, kg. Informational only.
    pub goal_weight_kg: Option<f64>,
    pub confidence_level: ConfidenceLevel,
    pub trend_window: TrendWindow,
    pub period_grouping: PeriodGrouping,
    pub calibration: CalibrationFactor,
}

impl Settings {
    /// Loads settings from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes settings back as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
