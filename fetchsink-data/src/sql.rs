//! Helpers shared by the relational backends.

use fetchsink_core::{ColumnKind, PersistError, Table};

/// Double-quote an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Record columns the existing table does not have, in record order.
pub(crate) fn missing_columns(existing: &[String], rows: &Table) -> Vec<String> {
    rows.columns()
        .iter()
        .filter(|column| !existing.contains(column))
        .cloned()
        .collect()
}

/// Fail with [`PersistError::SchemaMismatch`] when `rows` has columns the
/// table lacks.
pub(crate) fn ensure_compatible(
    table: &str,
    existing: &[String],
    rows: &Table,
) -> Result<(), PersistError> {
    let missing = missing_columns(existing, rows);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PersistError::SchemaMismatch {
            table: table.to_owned(),
            missing,
        })
    }
}

/// `CREATE TABLE IF NOT EXISTS` for the table's columns, typed by `type_of`.
pub(crate) fn create_statement(
    table: &str,
    rows: &Table,
    type_of: impl Fn(ColumnKind) -> &'static str,
) -> String {
    let columns = rows
        .columns()
        .iter()
        .zip(rows.column_kinds())
        .map(|(name, kind)| format!("{} {}", quote_ident(name), type_of(kind)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quote_ident(table)
    )
}

/// Column list of an `INSERT` for `rows`, e.g. `("word", "score")`.
pub(crate) fn column_list(rows: &Table) -> String {
    let names = rows
        .columns()
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("({names})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchsink_core::{FlattenOptions, Record};
    use rstest::rstest;
    use serde_json::json;

    fn table() -> Table {
        Table::from_record(
            &Record::new(json!([{"word": "a", "score": 1, "ok": true, "w": 0.5}])),
            &FlattenOptions::default(),
        )
        .expect("flatten")
    }

    #[rstest]
    #[case("words", "\"words\"")]
    #[case("odd\"name", "\"odd\"\"name\"")]
    #[case("meta.score", "\"meta.score\"")]
    fn quotes_identifiers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(quote_ident(raw), expected);
    }

    #[rstest]
    fn create_statement_types_columns() {
        let sql = create_statement("words", &table(), |kind| match kind {
            ColumnKind::Integer | ColumnKind::Bool => "INTEGER",
            ColumnKind::Float => "REAL",
            ColumnKind::Text => "TEXT",
        });
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"words\" (\"word\" TEXT, \"score\" INTEGER, \"ok\" INTEGER, \"w\" REAL)"
        );
    }

    #[rstest]
    fn reports_missing_columns() {
        let existing = vec!["word".to_owned(), "score".to_owned()];
        assert_eq!(missing_columns(&existing, &table()), vec!["ok", "w"]);
        assert!(matches!(
            ensure_compatible("words", &existing, &table()),
            Err(PersistError::SchemaMismatch { .. })
        ));
    }
}
