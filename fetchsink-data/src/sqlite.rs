//! Embedded SQLite backend.

use camino::{Utf8Path, Utf8PathBuf};
use fetchsink_core::{
    Cell, ColumnKind, Connection, ConnectionError, ConnectionHandle, ConnectionManager,
    PersistError, Record, Table,
};
use fetchsink_fs::ensure_parent_dir;
use log::debug;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection as SqliteConnection, Error as SqliteError, params_from_iter};
use serde_json::{Map, Number, Value};

use crate::sql::{column_list, create_statement, ensure_compatible, quote_ident};

const BACKEND: &str = "sqlite";

/// Opens file-backed SQLite databases, creating them (and their parent
/// directory) when missing.
///
/// Booleans are stored as `0`/`1` integers and arrays nested in a record as
/// JSON text, so reading a table back yields those representations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteManager {
    path: Utf8PathBuf,
}

impl SqliteManager {
    /// Manager for the database file at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn unavailable(
        &self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> ConnectionError {
        ConnectionError::StorageUnavailable {
            target: self.describe(),
            source: Box::new(source),
        }
    }
}

impl ConnectionManager for SqliteManager {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }

    fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        ensure_parent_dir(&self.path).map_err(|source| self.unavailable(source))?;
        let connection = SqliteConnection::open(self.path.as_std_path())
            .map_err(|source| self.unavailable(source))?;
        debug!("opened {}", self.describe());
        Ok(ConnectionHandle::new(
            self.describe(),
            Box::new(SqliteTableConnection {
                target: self.describe(),
                connection,
            }),
        ))
    }
}

struct SqliteTableConnection {
    target: String,
    connection: SqliteConnection,
}

fn sql_error(table: &str) -> impl FnOnce(SqliteError) -> PersistError + '_ {
    move |source| PersistError::Sql {
        backend: BACKEND,
        table: table.to_owned(),
        source: Box::new(source),
    }
}

const fn column_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Bool | ColumnKind::Integer => "INTEGER",
        ColumnKind::Float => "REAL",
        ColumnKind::Text => "TEXT",
    }
}

fn to_sql(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Null => SqlValue::Null,
        Cell::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Cell::Integer(int) => SqlValue::Integer(*int),
        Cell::Float(float) => SqlValue::Real(*float),
        Cell::Text(text) => SqlValue::Text(text.clone()),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(float) => Number::from_f64(float).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn existing_columns(
    connection: &SqliteConnection,
    table: &str,
) -> Result<Vec<String>, SqliteError> {
    let mut statement =
        connection.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

impl Connection for SqliteTableConnection {
    fn append(&mut self, table: &str, rows: &Table) -> Result<usize, PersistError> {
        let transaction = self.connection.transaction().map_err(sql_error(table))?;

        let existing = existing_columns(&transaction, table).map_err(sql_error(table))?;
        if existing.is_empty() {
            debug!("creating table {table} on {}", self.target);
            transaction
                .execute(&create_statement(table, rows, column_type), [])
                .map_err(sql_error(table))?;
        } else {
            ensure_compatible(table, &existing, rows)?;
        }

        let placeholders = (1..=rows.columns().len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} {} VALUES ({placeholders})",
            quote_ident(table),
            column_list(rows)
        );
        {
            let mut statement = transaction.prepare(&insert).map_err(sql_error(table))?;
            for row in rows.rows() {
                statement
                    .execute(params_from_iter(row.iter().map(to_sql)))
                    .map_err(sql_error(table))?;
            }
        }

        transaction.commit().map_err(sql_error(table))?;
        Ok(rows.len())
    }

    fn read_table(&mut self, table: &str) -> Result<Vec<Record>, PersistError> {
        let mut statement = self
            .connection
            .prepare(&format!("SELECT * FROM {}", quote_ident(table)))
            .map_err(sql_error(table))?;
        let names: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let records = statement
            .query_map([], |row| {
                let mut object = Map::new();
                for (index, name) in names.iter().enumerate() {
                    object.insert(name.clone(), to_json(row.get_ref(index)?));
                }
                Ok(Record::new(Value::Object(object)))
            })
            .map_err(sql_error(table))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_error(table))?;
        Ok(records)
    }

    fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        let Self { target, connection } = *self;
        connection
            .close()
            .map_err(|(_, err)| ConnectionError::Close {
                target,
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchsink_core::FlattenOptions;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    struct Db {
        _dir: TempDir,
        manager: SqliteManager,
    }

    #[fixture]
    fn db() -> Db {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        Db {
            manager: SqliteManager::new(root.join("nested/db.sqlite")),
            _dir: dir,
        }
    }

    fn table(value: Value) -> Table {
        Table::from_record(&Record::new(value), &FlattenOptions::default()).expect("flatten")
    }

    #[rstest]
    fn append_then_read_back(db: Db) {
        let mut handle = db.manager.open().expect("open");
        let rows = table(json!([
            {"word": "regretful", "score": 1393, "weight": 0.5, "ok": true, "tags": ["adj"]},
            {"word": "nostalgic", "score": null, "weight": 2.0, "ok": false}
        ]));

        assert_eq!(handle.append("words", &rows).expect("append"), 2);
        let back = handle.read_table("words").expect("read");

        let values: Vec<_> = back.into_iter().map(Record::into_value).collect();
        assert_eq!(
            values,
            vec![
                json!({"word": "regretful", "score": 1393, "weight": 0.5, "ok": 1, "tags": "[\"adj\"]"}),
                json!({"word": "nostalgic", "score": null, "weight": 2.0, "ok": 0, "tags": null}),
            ]
        );
    }

    #[rstest]
    fn appends_across_connections(db: Db) {
        for word in ["a", "b"] {
            let mut handle = db.manager.open().expect("open");
            handle
                .append("words", &table(json!({"word": word})))
                .expect("append");
            handle.close().expect("close");
        }
        let mut handle = db.manager.open().expect("reopen");
        assert_eq!(handle.read_table("words").expect("read").len(), 2);
    }

    #[rstest]
    fn subset_of_columns_is_accepted(db: Db) {
        let mut handle = db.manager.open().expect("open");
        handle
            .append("words", &table(json!({"word": "a", "score": 1})))
            .expect("create");
        handle
            .append("words", &table(json!({"word": "b"})))
            .expect("subset");
        let back = handle.read_table("words").expect("read");
        assert_eq!(back[1].as_value(), &json!({"word": "b", "score": null}));
    }

    #[rstest]
    fn unknown_columns_are_rejected_atomically(db: Db) {
        let mut handle = db.manager.open().expect("open");
        handle
            .append("words", &table(json!({"word": "a"})))
            .expect("create");
        let err = handle
            .append("words", &table(json!([{"word": "b"}, {"word": "c", "extra": 1}])))
            .expect_err("extra column");
        assert!(matches!(err, PersistError::SchemaMismatch { .. }));
        assert_eq!(handle.read_table("words").expect("read").len(), 1);
    }

    #[rstest]
    fn reading_a_missing_table_fails(db: Db) {
        let mut handle = db.manager.open().expect("open");
        let err = handle.read_table("absent").expect_err("no table");
        assert!(matches!(err, PersistError::Sql { backend: "sqlite", .. }));
    }

    #[rstest]
    fn open_close_close(db: Db) {
        let mut handle = db.manager.open().expect("open");
        handle.close().expect("close");
        handle.close().expect("close again");
        assert!(!handle.is_open());
    }

    #[rstest]
    fn inaccessible_path_is_storage_unavailable() {
        let dir = TempDir::new().expect("create temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");
        let path = Utf8PathBuf::from_path_buf(blocker.join("db.sqlite")).expect("utf-8 path");

        let err = SqliteManager::new(path).open().expect_err("parent is a file");

        assert!(matches!(err, ConnectionError::StorageUnavailable { .. }));
    }

    #[rstest]
    fn quoted_table_names_round_trip(db: Db) {
        let mut handle = db.manager.open().expect("open");
        handle
            .append("odd \"name\"", &table(json!({"meta": {"score": 3}})))
            .expect("append");
        let back = handle.read_table("odd \"name\"").expect("read");
        assert_eq!(back[0].as_value(), &json!({"meta.score": 3}));
    }
}
