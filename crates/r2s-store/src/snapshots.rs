use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use r2s_core::lenient;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const SUMMARY_COLUMNS: &str = "id, name, created_at, updated_at, academic_year, notes,
     COALESCE(json_array_length(result, '$.residents'), 0)";

/// Listing projection of a snapshot; never carries the result document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub academic_year: Option<String>,
    pub notes: Option<String>,
    /// Derived from `result.residents`; not stored.
    pub resident_count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub summary: SnapshotSummary,
    pub result: Value,
}

/// Validated input for [`SnapshotRepo::create`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewSnapshot {
    pub name: String,
    pub academic_year: Option<String>,
    pub notes: Option<String>,
    pub result: Map<String, Value>,
}

impl NewSnapshot {
    /// Parse a create request. `api_response` is accepted in place of `result`.
    pub fn from_value(body: &Value) -> Result<Self, StoreError> {
        let name = body.get("name").map(lenient::text).unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("Snapshot name is required".into()));
        }
        let result = match result_field(body) {
            Some(Value::Object(map)) if !map.is_empty() => map.clone(),
            _ => return Err(StoreError::InvalidInput("result is required".into())),
        };
        Ok(Self {
            name,
            academic_year: body.get("academic_year").and_then(optional_text),
            notes: body.get("notes").and_then(optional_text),
            result,
        })
    }
}

/// Partial update. Only fields that are `Some` are written; the inner
/// `None` of `academic_year`/`notes` clears the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotPatch {
    pub name: Option<String>,
    pub academic_year: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub result: Option<Map<String, Value>>,
}

impl SnapshotPatch {
    /// Parse an update request; a key that is present is applied.
    pub fn from_value(body: &Value) -> Result<Self, StoreError> {
        let mut patch = Self::default();
        if let Some(name) = body.get("name") {
            let name = lenient::text(name).trim().to_string();
            if name.is_empty() {
                return Err(StoreError::InvalidInput("Snapshot name cannot be empty".into()));
            }
            patch.name = Some(name);
        }
        if let Some(v) = body.get("academic_year") {
            patch.academic_year = Some(optional_text(v));
        }
        if let Some(v) = body.get("notes") {
            patch.notes = Some(optional_text(v));
        }
        if let Some(v) = result_field(body) {
            match v {
                Value::Object(map) => patch.result = Some(map.clone()),
                _ => return Err(StoreError::InvalidInput("result must be a valid object".into())),
            }
        }
        Ok(patch)
    }
}

fn result_field(body: &Value) -> Option<&Value> {
    body.get("result").or_else(|| body.get("api_response"))
}

/// Trimmed text; empty or `null` means absent.
fn optional_text(value: &Value) -> Option<String> {
    let text = lenient::text(value);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn not_found(id: i64) -> StoreError {
    StoreError::NotFound(format!("Snapshot {id}"))
}

/// Repository for persisted snapshots.
#[derive(Clone)]
pub struct SnapshotRepo {
    db: Database,
}

impl SnapshotRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create(&self, new: &NewSnapshot) -> Result<SnapshotSummary, StoreError> {
        let result = serde_json::to_string(&new.result)?;
        let now = now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snapshots (name, academic_year, notes, result, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![new.name, new.academic_year, new.notes, result, now, now],
            )?;
            let id = conn.last_insert_rowid();
            summary_by_id(conn, id)
        })
    }

    /// All snapshots, most recently updated first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<SnapshotSummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM snapshots ORDER BY updated_at DESC, id DESC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_summary(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(snapshot_id = id))]
    pub fn get(&self, id: i64) -> Result<Snapshot, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS}, result FROM snapshots WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_snapshot(row),
                None => Err(not_found(id)),
            }
        })
    }

    /// The most recently updated snapshot, if any.
    #[instrument(skip(self))]
    pub fn latest(&self) -> Result<Option<Snapshot>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUMMARY_COLUMNS}, result FROM snapshots
                 ORDER BY updated_at DESC, id DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => row_to_snapshot(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Apply `patch` and refresh `updated_at`.
    #[instrument(skip(self, patch), fields(snapshot_id = id))]
    pub fn update(&self, id: i64, patch: &SnapshotPatch) -> Result<SnapshotSummary, StoreError> {
        let result = patch.result.as_ref().map(serde_json::to_string).transpose()?;
        let now = now();
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let exists: bool = tx.query_row("SELECT EXISTS(SELECT 1 FROM snapshots WHERE id = ?1)", [id], |row| {
                row.get(0)
            })?;
            if !exists {
                return Err(not_found(id));
            }
            if let Some(name) = &patch.name {
                tx.execute("UPDATE snapshots SET name = ?1 WHERE id = ?2", rusqlite::params![name, id])?;
            }
            if let Some(academic_year) = &patch.academic_year {
                tx.execute(
                    "UPDATE snapshots SET academic_year = ?1 WHERE id = ?2",
                    rusqlite::params![academic_year, id],
                )?;
            }
            if let Some(notes) = &patch.notes {
                tx.execute("UPDATE snapshots SET notes = ?1 WHERE id = ?2", rusqlite::params![notes, id])?;
            }
            if let Some(result) = &result {
                tx.execute("UPDATE snapshots SET result = ?1 WHERE id = ?2", rusqlite::params![result, id])?;
            }
            tx.execute("UPDATE snapshots SET updated_at = ?1 WHERE id = ?2", rusqlite::params![now, id])?;
            let summary = summary_by_id(&tx, id)?;
            tx.commit()?;
            Ok(summary)
        })
    }

    #[instrument(skip(self), fields(snapshot_id = id))]
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM snapshots WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(not_found(id));
            }
            Ok(())
        })
    }
}

fn summary_by_id(conn: &rusqlite::Connection, id: i64) -> Result<SnapshotSummary, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {SUMMARY_COLUMNS} FROM snapshots WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_summary(row),
        None => Err(not_found(id)),
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> Result<SnapshotSummary, StoreError> {
    Ok(SnapshotSummary {
        id: row_helpers::get(row, 0, "snapshots", "id")?,
        name: row_helpers::get(row, 1, "snapshots", "name")?,
        created_at: row_helpers::get(row, 2, "snapshots", "created_at")?,
        updated_at: row_helpers::get(row, 3, "snapshots", "updated_at")?,
        academic_year: row_helpers::get_opt(row, 4, "snapshots", "academic_year")?,
        notes: row_helpers::get_opt(row, 5, "snapshots", "notes")?,
        resident_count: row_helpers::get(row, 6, "snapshots", "resident_count")?,
    })
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> Result<Snapshot, StoreError> {
    let raw: String = row_helpers::get(row, 7, "snapshots", "result")?;
    Ok(Snapshot {
        summary: row_to_summary(row)?,
        result: row_helpers::parse_json(&raw, "snapshots", "result")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn repo() -> SnapshotRepo {
        SnapshotRepo::new(Database::in_memory().unwrap())
    }

    fn new_snapshot(name: &str) -> NewSnapshot {
        NewSnapshot::from_value(&json!({
            "name": name,
            "academic_year": "2025/2026",
            "result": {"success": true, "residents": [{"mcr": "M1"}, {"mcr": "M2"}]}
        }))
        .unwrap()
    }

    fn tick() {
        std::thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn create_requires_name_and_result() {
        let err = NewSnapshot::from_value(&json!({"name": "  ", "result": {"a": 1}})).unwrap_err();
        assert_eq!(err.to_string(), "Snapshot name is required");
        for result in [json!(null), json!({}), json!([1]), json!("x")] {
            let err = NewSnapshot::from_value(&json!({"name": "Draft", "result": result})).unwrap_err();
            assert_eq!(err.to_string(), "result is required");
        }
    }

    #[test]
    fn create_accepts_legacy_key_and_blanks_to_null() {
        let new = NewSnapshot::from_value(&json!({
            "name": " Draft ",
            "notes": "   ",
            "api_response": {"residents": []}
        }))
        .unwrap();
        assert_eq!(new.name, "Draft");
        assert_eq!(new.notes, None);
        assert_eq!(new.academic_year, None);
        assert!(new.result.contains_key("residents"));
    }

    #[test]
    fn create_and_get() {
        let repo = repo();
        let created = repo.create(&new_snapshot("Draft A")).unwrap();
        assert_eq!(created.name, "Draft A");
        assert_eq!(created.resident_count, 2);
        assert_eq!(created.created_at, created.updated_at);

        let fetched = repo.get(created.id).unwrap();
        assert_eq!(fetched.summary, created);
        assert_eq!(fetched.result.clone(), json!({"success": true, "residents": [{"mcr": "M1"}, {"mcr": "M2"}]}));

        let json = serde_json::to_value(&fetched).unwrap();
        assert_eq!(json["academic_year"], "2025/2026");
        assert_eq!(json["result"]["success"], true);
    }

    #[test]
    fn resident_count_tolerates_missing_residents() {
        let repo = repo();
        let new = NewSnapshot::from_value(&json!({"name": "odd", "result": {"residents": "none"}})).unwrap();
        assert_eq!(repo.create(&new).unwrap().resident_count, 0);
        let new = NewSnapshot::from_value(&json!({"name": "bare", "result": {"success": true}})).unwrap();
        assert_eq!(repo.create(&new).unwrap().resident_count, 0);
    }

    #[test]
    fn list_orders_by_updated_at() {
        let repo = repo();
        let a = repo.create(&new_snapshot("A")).unwrap();
        tick();
        let b = repo.create(&new_snapshot("B")).unwrap();
        let names: Vec<_> = repo.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["B", "A"]);

        tick();
        repo.update(a.id, &SnapshotPatch::default()).unwrap();
        let ids: Vec<_> = repo.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(repo.latest().unwrap().unwrap().summary.id, a.id);
    }

    #[test]
    fn latest_on_empty_store() {
        assert!(repo().latest().unwrap().is_none());
    }

    #[test]
    fn update_overwrites_only_supplied_fields() {
        let repo = repo();
        let created = repo.create(&new_snapshot("Draft")).unwrap();
        let original = repo.get(created.id).unwrap().result;
        tick();

        let patch = SnapshotPatch::from_value(&json!({"notes": "check ED load"})).unwrap();
        let updated = repo.update(created.id, &patch).unwrap();
        assert_eq!(repo.get(created.id).unwrap().result, original);
        assert_eq!(updated.notes.as_deref(), Some("check ED load"));
        assert_eq!(updated.name, "Draft");
        assert_eq!(updated.academic_year.as_deref(), Some("2025/2026"));
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);

        let patch = SnapshotPatch::from_value(&json!({
            "academic_year": "",
            "result": {"residents": [{"mcr": "M9"}]}
        }))
        .unwrap();
        let updated = repo.update(created.id, &patch).unwrap();
        assert_eq!(updated.academic_year, None);
        assert_eq!(updated.notes.as_deref(), Some("check ED load"));
        assert_eq!(updated.resident_count, 1);
        assert_eq!(repo.get(created.id).unwrap().result["residents"][0]["mcr"], "M9");
    }

    #[test]
    fn patch_validation() {
        let err = SnapshotPatch::from_value(&json!({"name": ""})).unwrap_err();
        assert_eq!(err.to_string(), "Snapshot name cannot be empty");
        let err = SnapshotPatch::from_value(&json!({"api_response": [1, 2]})).unwrap_err();
        assert_eq!(err.to_string(), "result must be a valid object");
        let patch = SnapshotPatch::from_value(&json!({"notes": null})).unwrap();
        assert_eq!(patch.notes, Some(None));
        assert_eq!(SnapshotPatch::from_value(&json!({})).unwrap(), SnapshotPatch::default());
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let repo = repo();
        assert!(matches!(repo.get(42), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.update(42, &SnapshotPatch::default()), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.delete(42), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn lifecycle() {
        let repo = repo();
        let created = repo.create(&new_snapshot("Lifecycle")).unwrap();
        assert_eq!(repo.get(created.id).unwrap().summary.name, "Lifecycle");

        tick();
        let patch = SnapshotPatch::from_value(&json!({"notes": "revised"})).unwrap();
        assert_eq!(repo.update(created.id, &patch).unwrap().notes.as_deref(), Some("revised"));

        repo.delete(created.id).unwrap();
        let err = repo.get(created.id).unwrap_err();
        assert_eq!(err.to_string(), format!("Snapshot {} not found", created.id));
        assert!(repo.list().unwrap().is_empty());
    }
}
