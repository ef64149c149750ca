//! XLSX encoding of a flattened table.

use fetchsink_core::{BoxError, Cell, Table};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet};

/// Encode `table` as a single-sheet workbook (`Sheet1`) with a bold header
/// row. With `include_index` the first column holds a 0-based row index.
pub(super) fn encode(table: &Table, include_index: bool) -> Result<Vec<u8>, BoxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    {
        let sheet = workbook.add_worksheet();
        let offset: ColNum = u16::from(include_index);

        for (index, name) in table.columns().iter().enumerate() {
            sheet.write_string_with_format(0, column(index, offset)?, name, &header_format)?;
        }

        for (index, row) in table.rows().iter().enumerate() {
            let row_num: RowNum = RowNum::try_from(index + 1)?;
            if include_index {
                sheet.write_number_with_format(row_num, 0, f64::from(row_num - 1), &header_format)?;
            }
            for (col, cell) in row.iter().enumerate() {
                write_cell(sheet, row_num, column(col, offset)?, cell)?;
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

fn column(index: usize, offset: ColNum) -> Result<ColNum, BoxError> {
    let col = ColNum::try_from(index)?;
    col.checked_add(offset)
        .ok_or_else(|| BoxError::from("too many columns for a worksheet"))
}

fn write_cell(sheet: &mut Worksheet, row: RowNum, col: ColNum, cell: &Cell) -> Result<(), BoxError> {
    match cell {
        Cell::Null => {}
        Cell::Bool(flag) => {
            sheet.write_boolean(row, col, *flag)?;
        }
        Cell::Integer(int) => {
            // Spreadsheet numbers are doubles.
            sheet.write_number(row, col, *int as f64)?;
        }
        Cell::Float(float) => {
            sheet.write_number(row, col, *float)?;
        }
        Cell::Text(text) => {
            sheet.write_string(row, col, text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchsink_core::{FlattenOptions, Record};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn produces_a_zip_container() {
        let table = Table::from_record(
            &Record::new(json!([{"word": "regretful", "score": 1393, "ok": true}, {"word": null}])),
            &FlattenOptions::default(),
        )
        .expect("flatten");

        let bytes = encode(&table, true).expect("encode");

        assert!(bytes.starts_with(b"PK\x03\x04"), "xlsx files are zip archives");
    }

    #[rstest]
    fn empty_table_still_encodes() {
        let bytes = encode(&Table::default(), false).expect("encode");
        assert!(!bytes.is_empty());
    }
}
