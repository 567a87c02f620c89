//! Merges a partial manual edit into a full prior context.
//!
//! The caller's context is only ever read. Every function here returns freshly
//! owned containers so a result can never alias the request it came from.

use serde_json::Value;

use crate::errors::PipelineError;
use crate::lenient;
use crate::model::{Context, HistoryEntry, PostprocessPayload, SlotAssignment, ValidationRequest};

const MISSING_MCR: &str = "missing resident_mcr";
const MISSING_CONTEXT: &str = "Missing context. Please provide the full API response context.";

/// One normalised current-year assignment submitted by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentYearEdit {
    pub month_block: u8,
    pub posting_code: String,
    pub career_block: Option<i64>,
}

impl CurrentYearEdit {
    fn from_value(raw: &Value) -> Option<Self> {
        let month_block = raw
            .get("month_block")
            .and_then(lenient::int)
            .filter(|m| (1..=12).contains(m))?;
        let posting_code = raw.get("posting_code").map(lenient::text)?;
        let posting_code = posting_code.trim();
        if posting_code.is_empty() {
            return None;
        }
        Some(Self {
            month_block: month_block as u8,
            posting_code: posting_code.to_string(),
            career_block: raw.get("career_block").and_then(lenient::int),
        })
    }

    fn into_history(self, mcr: &str, year: Option<i64>) -> HistoryEntry {
        HistoryEntry::current_year(mcr, year, self.month_block, &self.posting_code, self.career_block)
    }
}

/// Coerce a submitted `current_year` list. Entries that fail coercion are
/// dropped; a repeated month block keeps only its last occurrence.
pub fn normalise_current_year(raw: &[Value]) -> Vec<CurrentYearEdit> {
    let mut edits: Vec<CurrentYearEdit> = Vec::with_capacity(raw.len());
    for edit in raw.iter().filter_map(CurrentYearEdit::from_value) {
        edits.retain(|e| e.month_block != edit.month_block);
        edits.push(edit);
    }
    edits
}

/// A parsed `/api/save` request.
#[derive(Clone, Debug)]
pub struct SaveRequest {
    pub resident_mcr: String,
    pub context: Context,
    pub current_year: Vec<CurrentYearEdit>,
}

impl SaveRequest {
    pub fn from_value(body: &Value) -> Result<Self, PipelineError> {
        let resident_mcr = body
            .get("resident_mcr")
            .map(lenient::text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if resident_mcr.is_empty() {
            return Err(PipelineError::BadRequest(MISSING_MCR.into()));
        }

        let raw_context = body.get("context").filter(|c| c.is_object());
        let has = |key: &str| raw_context.and_then(|c| c.get(key)).is_some_and(lenient::truthy);
        let Some(raw_context) = raw_context.filter(|_| has("residents") && has("postings")) else {
            return Err(PipelineError::BadRequest(MISSING_CONTEXT.into()));
        };
        let context: Context = serde_json::from_value(raw_context.clone())
            .map_err(|e| PipelineError::BadRequest(format!("Invalid context: {e}")))?;

        let current_year = match body.get("current_year") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => normalise_current_year(items),
            Some(_) => return Err(PipelineError::BadRequest("current_year must be a list".into())),
        };

        Ok(Self {
            resident_mcr,
            context,
            current_year,
        })
    }

    pub fn validation_request(&self) -> ValidationRequest {
        ValidationRequest {
            resident_mcr: self.resident_mcr.clone(),
            current_year: self
                .current_year
                .iter()
                .map(|e| SlotAssignment {
                    month_block: e.month_block,
                    posting_code: e.posting_code.clone(),
                })
                .collect(),
            residents: self.context.residents.clone(),
            resident_history: self.context.resident_history.clone(),
            postings: self.context.postings.clone(),
        }
    }
}

/// Replace `mcr`'s current-year slate with `edits`.
///
/// Untouched history keeps its order and its exact JSON; new entries follow
/// in submitted order. A resident missing from `residents` gets `year: null`.
pub fn apply_edit(prior: &Context, mcr: &str, edits: &[CurrentYearEdit]) -> Context {
    let year = prior.resident(mcr).and_then(|r| r.resident_year());
    let mut resident_history: Vec<HistoryEntry> = prior
        .resident_history
        .iter()
        .filter(|row| !(row.is_current_year() && row.mcr() == mcr))
        .cloned()
        .collect();
    resident_history.extend(edits.iter().cloned().map(|e| e.into_history(mcr, year)));

    Context {
        resident_history,
        ..prior.clone()
    }
}

/// Base input plus an optional computed solution, ready for postprocessing.
pub fn assemble_payload(base: Context, solver_solution: Option<Value>) -> PostprocessPayload {
    PostprocessPayload {
        context: base,
        solver_solution,
    }
}
