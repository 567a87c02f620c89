//! Flat CSV projection of a finished timetable result.

use std::collections::HashMap;

use serde_json::Value;

use crate::lenient;

/// Academic-year month order; column `i` holds month block `i + 1`.
pub const MONTH_LABELS: [&str; 12] = [
    "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar", "Apr", "May", "Jun",
];

pub const CSV_FILENAME: &str = "final_timetable.csv";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Invalid API response shape")]
    InvalidShape,
}

/// One CSV row per resident, in resident order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimetableGrid {
    rows: Vec<Vec<String>>,
}

impl TimetableGrid {
    /// Build the grid from a result-shaped document.
    ///
    /// Requires a truthy `success` and list-valued `residents`,
    /// `resident_history` and `optimisation_scores`.
    pub fn from_document(doc: &Value) -> Result<Self, ExportError> {
        if !doc.get("success").is_some_and(lenient::truthy) {
            return Err(ExportError::InvalidShape);
        }
        let list = |key: &str| doc.get(key).and_then(Value::as_array).ok_or(ExportError::InvalidShape);
        let residents = list("residents")?;
        let history = list("resident_history")?;
        let scores = list("optimisation_scores")?;

        let slots = current_year_slots(history);
        let rows = residents
            .iter()
            .enumerate()
            .map(|(idx, resident)| {
                let resident = resident.as_object().ok_or(ExportError::InvalidShape)?;
                let field = |key: &str| resident.get(key).map(lenient::text).unwrap_or_default();
                let mcr = field("mcr");
                let score = scores.get(idx).map(lenient::text).unwrap_or_default();
                let ccr = resident
                    .get("ccr_status")
                    .and_then(|c| c.get("posting_code"))
                    .map(lenient::text)
                    .unwrap_or_default();

                let by_block = slots.get(mcr.as_str());
                let months = (1..=12).map(|block| {
                    by_block
                        .and_then(|b| b.get(&block))
                        .cloned()
                        .unwrap_or_default()
                });

                let mut row = vec![mcr.clone(), field("name"), field("resident_year"), score];
                row.extend(months);
                row.push(ccr);
                Ok(row)
            })
            .collect::<Result<Vec<_>, ExportError>>()?;

        Ok(Self { rows })
    }

    pub fn header() -> String {
        let mut cols = vec!["mcr", "name", "resident_year", "optimisation_score"];
        cols.extend(MONTH_LABELS);
        cols.push("ccr_posting_code");
        cols.join(",")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header line, then one quoted row per resident. No trailing newline.
    pub fn to_csv(&self) -> String {
        let body = self
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| quote(cell)).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n{body}", Self::header())
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// `mcr -> month_block -> posting_code` for current-year rows.
///
/// Rows with an uncoercible block, an empty mcr or an empty posting code are
/// skipped. A later row for the same slot wins.
fn current_year_slots(history: &[Value]) -> HashMap<String, HashMap<i64, String>> {
    let mut slots: HashMap<String, HashMap<i64, String>> = HashMap::new();
    for row in history {
        if !row.get("is_current_year").is_some_and(lenient::truthy) {
            continue;
        }
        let block = row
            .get("month_block")
            .filter(|v| lenient::truthy(v))
            .or_else(|| row.get("block"))
            .and_then(lenient::int);
        let Some(block) = block else {
            continue;
        };
        let text = |key: &str| row.get(key).map(lenient::text).unwrap_or_default().trim().to_string();
        let mcr = text("mcr");
        let posting_code = text("posting_code");
        if mcr.is_empty() || posting_code.is_empty() {
            continue;
        }
        slots.entry(mcr).or_default().insert(block, posting_code);
    }
    slots
}
