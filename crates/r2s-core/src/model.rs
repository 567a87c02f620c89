//! Document shapes that flow through every pipeline stage.
//!
//! The context is carried through unchanged. Residents and history rows wrap
//! the raw JSON the caller sent and expose lenient accessors for the few keys
//! the core reads. Postings, preferences, leaves and weightages belong to the
//! external collaborators and are carried as opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::lenient;

/// Opaque structural record (posting, preference, leave) passed through unmodified.
pub type Record = Value;

/// Criterion name to weight. Kept as raw JSON so it round-trips untouched.
pub type Weightages = Map<String, Value>;

/// One resident record, carried exactly as the caller sent it.
///
/// The core only reads `mcr` and `resident_year`; everything else belongs to
/// the client and the collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resident(pub Value);

impl Resident {
    pub fn mcr(&self) -> String {
        read_text(&self.0, "mcr")
    }

    pub fn resident_year(&self) -> Option<i64> {
        self.0.get("resident_year").and_then(lenient::int)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One resident's assignment for one month of one academic year.
///
/// Rows are never rewritten: keys the core does not read, and loosely typed
/// values such as `"4"` or `1`, go back out byte for byte.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry(pub Value);

impl HistoryEntry {
    /// A fresh current-year row with every contract key present.
    pub fn current_year(
        mcr: &str,
        year: Option<i64>,
        month_block: u8,
        posting_code: &str,
        career_block: Option<i64>,
    ) -> Self {
        Self(json!({
            "mcr": mcr,
            "year": year,
            "month_block": month_block,
            "career_block": career_block,
            "posting_code": posting_code,
            "is_current_year": true,
            "is_leave": false,
            "leave_type": "",
        }))
    }

    pub fn mcr(&self) -> String {
        read_text(&self.0, "mcr")
    }

    pub fn year(&self) -> Option<i64> {
        self.0.get("year").and_then(lenient::int)
    }

    /// Month block of this row, falling back to the legacy `block` key.
    pub fn slot(&self) -> Option<i64> {
        self.0
            .get("month_block")
            .and_then(lenient::int)
            .or_else(|| self.0.get("block").and_then(lenient::int))
    }

    pub fn posting_code(&self) -> String {
        read_text(&self.0, "posting_code")
    }

    pub fn is_current_year(&self) -> bool {
        self.0.get("is_current_year").is_some_and(lenient::truthy)
    }

    pub fn is_leave(&self) -> bool {
        self.0.get("is_leave").is_some_and(lenient::truthy)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

fn read_text(record: &Value, key: &str) -> String {
    record.get(key).map(lenient::text).unwrap_or_default().trim().to_string()
}

/// The unit of round-trip state between client and server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub residents: Vec<Resident>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub resident_history: Vec<HistoryEntry>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub resident_preferences: Vec<Record>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub resident_sr_preferences: Vec<Record>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub postings: Vec<Record>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub weightages: Weightages,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub resident_leaves: Vec<Record>,
}

impl Context {
    pub fn resident(&self, mcr: &str) -> Option<&Resident> {
        self.residents.iter().find(|r| r.mcr() == mcr)
    }
}

/// Normalised solver input: a full context plus allocation controls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverInput {
    #[serde(flatten)]
    pub context: Context,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub pinned_assignments: Vec<Record>,
    /// Forwarded to the allocator as-is; the core never enforces it.
    #[serde(
        default,
        deserialize_with = "lenient::opt_float",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_time_in_minutes: Option<f64>,
}

/// Successful allocator reply: the echoed inputs plus the computed solution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    #[serde(flatten)]
    pub context: Context,
    #[serde(default)]
    pub solver_solution: Value,
}

/// Document handed to the postprocess collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostprocessPayload {
    #[serde(flatten)]
    pub context: Context,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_solution: Option<Value>,
}

/// A single proposed current-year assignment as seen by the validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub month_block: u8,
    pub posting_code: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub resident_mcr: String,
    pub current_year: Vec<SlotAssignment>,
    pub residents: Vec<Resident>,
    pub resident_history: Vec<HistoryEntry>,
    pub postings: Vec<Record>,
}

/// Final document returned by solve and save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimetableResult {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub success: bool,
    #[serde(flatten)]
    pub context: Context,
    #[serde(default)]
    pub solver_solution: Value,
    /// Index-aligned with `context.residents`. Kept as sent so integer
    /// scores stay integers.
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub optimisation_scores: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Derived fields the postprocess collaborator adds beyond the core contract.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
