use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON string column, returning CorruptRow on parse failure.
pub fn parse_json(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_success() {
        let result = parse_json(r#"{"residents": []}"#, "snapshots", "result").unwrap();
        assert!(result["residents"].is_array());
    }

    #[test]
    fn parse_json_failure() {
        let result = parse_json("not valid json", "snapshots", "result");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "snapshots", column: "result", .. })
        ));
    }

    #[test]
    fn get_reports_column_on_type_mismatch() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 'text'", [], |row| Ok(get::<i64>(row, 0, "snapshots", "id")))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { column: "id", .. }));

        let none: Option<String> = conn
            .query_row("SELECT NULL", [], |row| Ok(get_opt(row, 0, "snapshots", "notes")))
            .unwrap()
            .unwrap();
        assert!(none.is_none());
    }
}
