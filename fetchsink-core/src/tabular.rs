//! Flattening records into rows and columns.
//!
//! Tabular sinks (CSV, spreadsheets, SQL tables) all consume the same
//! [`Table`] so that a record is flattened identically wherever it lands.
//!
//! Layout rules:
//! - a top-level object is one row;
//! - a top-level array yields one row per element, objects spreading into
//!   columns and anything else landing in a `value` column;
//! - a top-level scalar is a single row with a `value` column;
//! - nested objects become dotted column names (`meta.score`);
//! - arrays inside a row are stored as compact JSON text.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::record::Record;

/// Default limit on object nesting inside a single row.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Column used for rows that are not objects.
pub const VALUE_COLUMN: &str = "value";

/// Options controlling [`Table::from_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenOptions {
    /// Deepest object nesting accepted, counting the row object as depth 1.
    pub max_depth: usize,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Errors raised while flattening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    /// A nested object exceeded [`FlattenOptions::max_depth`].
    #[error("field `{column}` nests deeper than the limit of {max_depth}")]
    TooDeep {
        /// Dotted path of the offending field.
        column: String,
        /// Configured limit.
        max_depth: usize,
    },
}

/// A single scalar value in a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing or JSON `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer that fits an `i64`.
    Integer(i64),
    /// Any other number.
    Float(f64),
    /// Text, including JSON-encoded arrays.
    Text(String),
}

impl Cell {
    fn from_scalar(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => Self::from_number(number),
            Value::String(text) => Self::Text(text.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    fn from_number(number: &Number) -> Self {
        if let Some(int) = number.as_i64() {
            Self::Integer(int)
        } else if number.is_u64() {
            // Above i64::MAX: keep the digits rather than lose precision.
            Self::Text(number.to_string())
        } else {
            number.as_f64().map_or(Self::Null, Self::Float)
        }
    }

    /// Convert back into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Integer(int) => Value::from(*int),
            Self::Float(float) => Number::from_f64(*float).map_or(Value::Null, Value::Number),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    /// Whether the cell holds no value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Integer(int) => write!(f, "{int}"),
            Self::Float(float) => write!(f, "{float}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Storage class inferred for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Only booleans (and nulls).
    Bool,
    /// Only integers (and nulls).
    Integer,
    /// Integers mixed with floats.
    Float,
    /// Anything else, including all-null columns.
    Text,
}

/// Rows of cells sharing one ordered column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Flatten `record` following the module-level layout rules.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchsink_core::{Cell, FlattenOptions, Record, Table};
    /// use serde_json::json;
    ///
    /// # fn main() -> Result<(), fetchsink_core::FlattenError> {
    /// let record = Record::new(json!([
    ///     {"word": "regretful", "meta": {"score": 1393}},
    ///     {"word": "nostalgic"}
    /// ]));
    /// let table = Table::from_record(&record, &FlattenOptions::default())?;
    /// assert_eq!(table.columns(), ["word", "meta.score"]);
    /// assert_eq!(table.rows()[1][1], Cell::Null);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_record(record: &Record, options: &FlattenOptions) -> Result<Self, FlattenError> {
        let mut flat_rows = Vec::new();
        match record.as_value() {
            Value::Array(items) => {
                for item in items {
                    flat_rows.push(flatten_row(item, options)?);
                }
            }
            other => flat_rows.push(flatten_row(other, options)?),
        }

        let mut columns: IndexSet<String> = IndexSet::new();
        for row in &flat_rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }

        let rows = flat_rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|column| row.swap_remove(column).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();

        Ok(Self {
            columns: columns.into_iter().collect(),
            rows,
        })
    }

    /// Build a table directly from columns and rows.
    ///
    /// Rows shorter than `columns` are padded with nulls; longer rows are
    /// truncated.
    #[must_use]
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, each as wide as [`Table::columns`].
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Infer a storage class per column from the non-null cells.
    #[must_use]
    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        (0..self.columns.len())
            .map(|index| {
                infer_kind(
                    self.rows
                        .iter()
                        .filter_map(move |row| row.get(index))
                        .filter(|cell| !cell.is_null()),
                )
            })
            .collect()
    }

    /// Re-assemble each row as a flat JSON object record.
    #[must_use]
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Cell::to_json))
                    .collect();
                Record::new(Value::Object(object))
            })
            .collect()
    }
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a Cell>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let next = match cell {
            Cell::Bool(_) => ColumnKind::Bool,
            Cell::Integer(_) => ColumnKind::Integer,
            Cell::Float(_) => ColumnKind::Float,
            Cell::Text(_) | Cell::Null => ColumnKind::Text,
        };
        kind = Some(match (kind, next) {
            (None, next) => next,
            (Some(current), next) if current == next => current,
            (Some(ColumnKind::Integer | ColumnKind::Float), ColumnKind::Integer | ColumnKind::Float) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn flatten_row(
    value: &Value,
    options: &FlattenOptions,
) -> Result<IndexMap<String, Cell>, FlattenError> {
    let mut row = IndexMap::new();
    match value {
        Value::Object(map) => flatten_object(None, map, 1, options, &mut row)?,
        other => {
            row.insert(VALUE_COLUMN.to_owned(), Cell::from_scalar(other));
        }
    }
    Ok(row)
}

fn flatten_object(
    prefix: Option<&str>,
    map: &Map<String, Value>,
    depth: usize,
    options: &FlattenOptions,
    row: &mut IndexMap<String, Cell>,
) -> Result<(), FlattenError> {
    for (key, value) in map {
        let column = prefix.map_or_else(|| key.clone(), |prefix| format!("{prefix}.{key}"));
        match value {
            Value::Object(nested) if nested.is_empty() => {
                row.insert(column, Cell::Null);
            }
            Value::Object(nested) => {
                if depth + 1 > options.max_depth {
                    return Err(FlattenError::TooDeep {
                        column,
                        max_depth: options.max_depth,
                    });
                }
                flatten_object(Some(&column), nested, depth + 1, options, row)?;
            }
            other => {
                row.insert(column, Cell::from_scalar(other));
            }
        }
    }
    Ok(())
}
