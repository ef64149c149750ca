//! CSV encoding of a flattened table.

use fetchsink_core::{BoxError, Table};

/// Encode `table` as RFC 4180 CSV with a header row.
///
/// With `include_index` the first column is an unnamed 0-based row index.
pub(super) fn encode(table: &Table, include_index: bool) -> Result<Vec<u8>, BoxError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let index_header = include_index.then_some("");
    let header = index_header
        .into_iter()
        .chain(table.columns().iter().map(String::as_str));
    writer.write_record(header)?;

    for (index, row) in table.rows().iter().enumerate() {
        let index_cell = include_index.then(|| index.to_string());
        let record = index_cell
            .into_iter()
            .chain(row.iter().map(ToString::to_string));
        writer.write_record(record)?;
    }

    Ok(writer.into_inner().map_err(|err| err.into_error())?)
}
