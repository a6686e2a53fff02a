//! Excel file parsing for the weight and measurement logs.
//!
//! The workbook carries a `log` sheet (date, weight, calories) and an
//! optional `measurements` sheet (date, bodyfat, plus any circumference
//! columns). Malformed rows are logged and skipped; duplicate log dates
//! resolve last-write-wins.

use calamine::{Data, DataType, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use log::warn;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{BodyMeasurement, EntryLog, WeightEntry};
use crate::error::ParseError;

/// Expected column names (case-insensitive).
const COL_DATE: &str = "date";
const COL_WEIGHT: &str = "weight";
const COL_CALORIES: &str = "calories";
const COL_BODY_FAT: &str = "bodyfat";

/// Sheet names (case-insensitive); the log falls back to the first sheet.
const SHEET_LOG: &str = "log";
const SHEET_MEASUREMENTS: &str = "measurements";

/// Both logs parsed from one workbook.
#[derive(Debug, Default)]
pub struct LoadedData {
    pub entries: EntryLog,
    pub measurements: Vec<BodyMeasurement>,
}

/// Loads the weight log and measurement log from an Excel file.
///
/// # Errors
/// Returns `ParseError` if the file cannot be read or the log sheet is
/// missing its required columns. Individual bad rows are skipped with a
/// warning instead.
pub fn load_workbook<P: AsRef<Path>>(path: P) -> Result<LoadedData, ParseError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ParseError::FileNotFound(path.display().to_string()));
    }

    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| ParseError::CannotRead(format!("{}: {}", path.display(), e)))?;

    let sheet_names = workbook.sheet_names().to_vec();

    let log_sheet = sheet_names
        .iter()
        .find(|name| name.trim().eq_ignore_ascii_case(SHEET_LOG))
        .or_else(|| sheet_names.first())
        .ok_or_else(|| ParseError::InvalidFormat("workbook has no sheets".to_string()))?
        .clone();

    let range = workbook
        .worksheet_range(&log_sheet)
        .map_err(|e| ParseError::CannotRead(format!("cannot read sheet '{}': {}", log_sheet, e)))?;
    let entries = parse_log_sheet(&range)?;

    let measurements = match sheet_names
        .iter()
        .find(|name| name.trim().eq_ignore_ascii_case(SHEET_MEASUREMENTS))
    {
        Some(name) => {
            let range = workbook.worksheet_range(name).map_err(|e| {
                ParseError::CannotRead(format!("cannot read sheet '{}': {}", name, e))
            })?;
            parse_measurement_sheet(&range)?
        }
        None => Vec::new(),
    };

    Ok(LoadedData {
        entries,
        measurements,
    })
}

fn find_column(header: &[Data], name: &str) -> Option<usize> {
    header.iter().position(|cell| {
        cell.get_string()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(name))
    })
}

fn parse_log_sheet(range: &calamine::Range<Data>) -> Result<EntryLog, ParseError> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| ParseError::InvalidFormat("empty log sheet".to_string()))?;

    let date_col = find_column(header, COL_DATE)
        .ok_or_else(|| ParseError::MissingColumn(COL_DATE.to_string()))?;
    let weight_col = find_column(header, COL_WEIGHT)
        .ok_or_else(|| ParseError::MissingColumn(COL_WEIGHT.to_string()))?;
    let calories_col = find_column(header, COL_CALORIES);

    let mut log = EntryLog::new();

    for (row_idx, row) in rows.enumerate() {
        let row_num = row_idx + 2; // +1 for 0-index, +1 for header row

        // Trailing empty rows are common in spreadsheets.
        if row.get(date_col).is_none_or(|c| *c == Data::Empty) {
            continue;
        }

        let date = match parse_date(&row[date_col], row_num) {
            Ok(d) => d,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let weight = match parse_positive_number(&row[weight_col], row_num, COL_WEIGHT) {
            Ok(w) => w,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let calories = match calories_col.and_then(|col| row.get(col)) {
            None => None,
            Some(Data::Empty) => None,
            Some(cell) => match parse_positive_number(cell, row_num, COL_CALORIES) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            },
        };

        log.insert(WeightEntry::new(date, weight, calories));
    }

    Ok(log)
}

fn parse_measurement_sheet(
    range: &calamine::Range<Data>,
) -> Result<Vec<BodyMeasurement>, ParseError> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| ParseError::InvalidFormat("empty measurements sheet".to_string()))?;

    let date_col = find_column(header, COL_DATE)
        .ok_or_else(|| ParseError::MissingColumn(COL_DATE.to_string()))?;
    let body_fat_col = find_column(header, COL_BODY_FAT);

    // Every other labelled column is a circumference metric.
    let metric_cols: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_col && Some(*i) != body_fat_col)
        .filter_map(|(i, cell)| {
            cell.get_string()
                .map(|s| (i, s.trim().to_lowercase()))
                .filter(|(_, s)| !s.is_empty())
        })
        .collect();

    let mut measurements = Vec::new();

    for (row_idx, row) in rows.enumerate() {
        let row_num = row_idx + 2;

        if row.get(date_col).is_none_or(|c| *c == Data::Empty) {
            continue;
        }

        let date = match parse_date(&row[date_col], row_num) {
            Ok(d) => d,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        let body_fat_pct = match body_fat_col.and_then(|col| row.get(col)) {
            None | Some(Data::Empty) => None,
            Some(cell) => match parse_positive_number(cell, row_num, COL_BODY_FAT) {
                Ok(v) if v <= 100.0 => Some(v),
                Ok(v) => {
                    warn!("body fat {}% out of range in row {}", v, row_num);
                    None
                }
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            },
        };

        let mut circumferences = BTreeMap::new();
        for (col, name) in &metric_cols {
            match row.get(*col) {
                None | Some(Data::Empty) => {}
                Some(cell) => match parse_positive_number(cell, row_num, name) {
                    Ok(v) => {
                        circumferences.insert(name.clone(), v);
                    }
                    Err(e) => warn!("{}", e),
                },
            }
        }

        let measurement = BodyMeasurement {
            date,
            body_fat_pct,
            circumferences,
        };

        // A date with no metrics at all is not a measurement.
        if measurement.has_any_metric() {
            measurements.push(measurement);
        } else {
            warn!("measurement row {} has no metric values, skipping", row_num);
        }
    }

    Ok(measurements)
}

/// Parses a date from a cell.
fn parse_date(cell: &Data, row: usize) -> Result<NaiveDate, ParseError> {
    match cell {
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|ndt| ndt.date())
            .ok_or_else(|| ParseError::InvalidDate {
                row,
                value: format!("{:?}", dt),
            }),
        Data::DateTimeIso(s) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ParseError::InvalidDate {
                row,
                value: s.clone(),
            })
        }
        Data::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
            .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
            .map_err(|_| ParseError::InvalidDate {
                row,
                value: s.clone(),
            }),
        other => Err(ParseError::InvalidDate {
            row,
            value: format!("{:?}", other),
        }),
    }
}

/// Parses a strictly positive numeric cell.
fn parse_positive_number(cell: &Data, row: usize, column: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        row,
        column: column.to_string(),
        value: format!("{:?}", cell),
    };

    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if value > 0.0 { Ok(value) } else { Err(invalid()) }
}
