//! Read worksheets of a legacy `.xls` workbook (BIFF8, Excel 97 to 2003).
//!
//! The workbook stream opens with a globals substream (shared strings and
//! one `BOUNDSHEET8` per sheet, pointing at that sheet's substream), then
//! one substream per sheet:
//!
//! ```text
//! BOF(globals) … SST … BOUNDSHEET8 … EOF │ BOF(sheet) cells… EOF │ …
//! ```
//!
//! Cells map onto [`Cell`] the same way as for xlsx: numbers stay numbers
//! (dates included), error values and blank cells are empty, and formulas
//! contribute their cached result.

use super::biff8::RecordReader;
use super::cfb::CompoundFile;
use super::{place, SheetGrid};
use crate::error::{SheetError, SheetResult};
use crate::models::Cell;

const BIFF8: u16 = 0x0600;

const RECORD_FORMULA: u16 = 0x0006;
const RECORD_EOF: u16 = 0x000A;
const RECORD_FILE_PASS: u16 = 0x002F;
const RECORD_BOUND_SHEET: u16 = 0x0085;
const RECORD_MUL_RK: u16 = 0x00BD;
const RECORD_SST: u16 = 0x00FC;
const RECORD_LABEL_SST: u16 = 0x00FD;
const RECORD_NUMBER: u16 = 0x0203;
const RECORD_LABEL: u16 = 0x0204;
const RECORD_BOOL_ERR: u16 = 0x0205;
const RECORD_STRING: u16 = 0x0207;
const RECORD_ARRAY: u16 = 0x0221;
const RECORD_TABLE: u16 = 0x0236;
const RECORD_RK: u16 = 0x027E;
const RECORD_SHARED_FORMULA: u16 = 0x04BC;
const RECORD_BOF: u16 = 0x0809;

/// `BOUNDSHEET8` sheet type of a worksheet (as opposed to charts or macros).
const SHEET_TYPE_WORKSHEET: u8 = 0x00;

struct BoundSheet {
    name: String,
    position: usize,
}

struct Globals {
    shared_strings: Vec<String>,
    sheets: Vec<BoundSheet>,
}

/// Read the first worksheet of an in-memory `.xls` file.
pub fn read_first_sheet(bytes: &[u8]) -> SheetResult<SheetGrid> {
    read_sheet(bytes, 0)
}

/// Worksheet names in tab order.
pub fn sheet_names(bytes: &[u8]) -> SheetResult<Vec<String>> {
    let stream = workbook_stream(bytes)?;
    let globals = read_globals(&mut RecordReader::new(&stream))?;
    Ok(globals.sheets.into_iter().map(|sheet| sheet.name).collect())
}

/// Read the worksheet at zero-based tab position `index`.
pub fn read_sheet(bytes: &[u8], index: usize) -> SheetResult<SheetGrid> {
    let stream = workbook_stream(bytes)?;
    let mut reader = RecordReader::new(&stream);
    let globals = read_globals(&mut reader)?;
    let sheet = match globals.sheets.get(index) {
        Some(sheet) => sheet,
        None if globals.sheets.is_empty() => return Err(SheetError::NoWorksheet),
        None => return Err(SheetError::SheetNotFound(index)),
    };
    let rows = read_cells(&mut reader, &globals.shared_strings, sheet.position)?;
    Ok(SheetGrid {
        name: sheet.name.clone(),
        rows,
    })
}

fn workbook_stream(bytes: &[u8]) -> SheetResult<Vec<u8>> {
    let file = CompoundFile::open(bytes)?;
    // "Book" is the stream name of pre-97 files, rejected later by version.
    for name in ["Workbook", "Book"] {
        if let Some(stream) = file.stream(name)? {
            return Ok(stream);
        }
    }
    Err(SheetError::MissingPart("Workbook".to_string()))
}

fn read_globals(reader: &mut RecordReader) -> SheetResult<Globals> {
    if reader.next()? != Some(RECORD_BOF) {
        return Err(SheetError::Xls("workbook stream does not start with BOF".to_string()));
    }
    let version = reader.read_u16()?;
    if version != BIFF8 {
        return Err(SheetError::Xls(format!("unsupported BIFF version {:#06x}", version)));
    }

    let mut globals = Globals {
        shared_strings: Vec::new(),
        sheets: Vec::new(),
    };
    while let Some(kind) = reader.next()? {
        match kind {
            RECORD_EOF => break,
            RECORD_FILE_PASS => return Err(SheetError::PasswordProtected),
            RECORD_BOUND_SHEET => {
                let position = reader.read_u32()? as usize;
                let _visibility = reader.read_u8()?;
                let sheet_type = reader.read_u8()?;
                let name = reader.read_short_unicode_string()?;
                if sheet_type == SHEET_TYPE_WORKSHEET {
                    globals.sheets.push(BoundSheet { name, position });
                }
            }
            RECORD_SST => {
                reader.skip(4)?;
                let count = reader.read_u32()?;
                for _ in 0..count {
                    globals.shared_strings.push(reader.read_rich_string()?);
                }
            }
            _ => {}
        }
    }
    Ok(globals)
}

fn read_cells(
    reader: &mut RecordReader,
    shared_strings: &[String],
    position: usize,
) -> SheetResult<Vec<Vec<Cell>>> {
    reader.goto(position);
    if reader.next()? != Some(RECORD_BOF) {
        return Err(SheetError::Xls(format!("no worksheet BOF at offset {}", position)));
    }

    let mut grid: Vec<Vec<Cell>> = Vec::new();
    let mut put = |row: u16, col: u16, cell: Cell| -> SheetResult<()> {
        if cell.is_empty() {
            return Ok(());
        }
        place(&mut grid, usize::from(row), usize::from(col), cell)
    };

    // Embedded chart substreams nest BOF/EOF pairs inside the worksheet.
    let mut depth = 0usize;
    while let Some(kind) = reader.next()? {
        match kind {
            RECORD_BOF => depth += 1,
            RECORD_EOF if depth == 0 => break,
            RECORD_EOF => depth -= 1,
            _ if depth > 0 => {}
            RECORD_MUL_RK => {
                let row = reader.read_u16()?;
                let first = reader.read_u16()?;
                let last = reader.last_u16()?;
                for col in first..=last {
                    reader.skip(2)?;
                    let value = reader.read_u32()?;
                    put(row, col, Cell::Number(rk_number(value)))?;
                }
            }
            RECORD_NUMBER | RECORD_RK | RECORD_LABEL_SST | RECORD_LABEL | RECORD_BOOL_ERR
            | RECORD_FORMULA => {
                let row = reader.read_u16()?;
                let col = reader.read_u16()?;
                reader.skip(2)?;
                let cell = match kind {
                    RECORD_NUMBER => Cell::Number(reader.read_f64()?),
                    RECORD_RK => Cell::Number(rk_number(reader.read_u32()?)),
                    RECORD_LABEL_SST => {
                        let index = reader.read_u32()? as usize;
                        let text = shared_strings
                            .get(index)
                            .ok_or_else(|| SheetError::MissingPart(format!("shared string #{}", index)))?;
                        Cell::text(text.as_str())
                    }
                    RECORD_LABEL => Cell::text(reader.read_unicode_string()?),
                    RECORD_BOOL_ERR => {
                        let value = reader.read_u8()?;
                        let is_error = reader.read_u8()?;
                        if is_error == 0 {
                            Cell::Bool(value != 0)
                        } else {
                            Cell::Empty
                        }
                    }
                    _ => formula_result(reader)?,
                };
                put(row, col, cell)?;
            }
            _ => {}
        }
    }

    grid.retain(|r| r.iter().any(|c| !c.is_empty()));
    Ok(grid)
}

/// Cached value of a `FORMULA` record. String results live in the
/// `STRING` record that follows (after any shared formula definitions).
fn formula_result(reader: &mut RecordReader) -> SheetResult<Cell> {
    let value: [u8; 8] = reader.read_array()?;
    if value[6..8] != [0xFF, 0xFF] {
        return Ok(Cell::Number(f64::from_le_bytes(value)));
    }
    let cell = match value[0] {
        0x00 => {
            while matches!(
                reader.peek(),
                Some(RECORD_SHARED_FORMULA | RECORD_ARRAY | RECORD_TABLE)
            ) {
                reader.next()?;
            }
            if reader.peek() == Some(RECORD_STRING) {
                reader.next()?;
                Cell::text(reader.read_unicode_string()?)
            } else {
                Cell::Empty
            }
        }
        0x01 => Cell::Bool(value[2] != 0),
        _ => Cell::Empty,
    };
    Ok(cell)
}

/// Decode an `RkNumber`: a packed integer or truncated double, optionally
/// scaled by 1/100.
fn rk_number(value: u32) -> f64 {
    let number = if value & 0x02 != 0 {
        f64::from((value as i32) >> 2)
    } else {
        f64::from_bits(u64::from(value & 0xFFFF_FFFC) << 32)
    };
    if value & 0x01 != 0 {
        number / 100.0
    } else {
        number
    }
}

/// Builders for BIFF8 workbooks used by tests across the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::spreadsheet::cfb::tests::compound_file;

    pub(crate) fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend((body.len() as u16).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    fn bof(substream: u16) -> Vec<u8> {
        let mut body = BIFF8.to_le_bytes().to_vec();
        body.extend(substream.to_le_bytes());
        body.extend([0u8; 12]);
        record(RECORD_BOF, &body)
    }

    /// Characters plus option byte: compressed when every char fits in a byte.
    fn characters(text: &str) -> (u8, Vec<u8>) {
        if text.chars().all(|c| (c as u32) < 0x100) {
            (0x00, text.chars().map(|c| c as u8).collect())
        } else {
            (0x01, text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect())
        }
    }

    /// Row, column and format index that open every cell record.
    pub(crate) fn header(row: usize, col: usize) -> Vec<u8> {
        let mut body = (row as u16).to_le_bytes().to_vec();
        body.extend((col as u16).to_le_bytes());
        body.extend(0u16.to_le_bytes());
        body
    }

    /// Cell records for `cell` at `(row, col)`. Text goes through the
    /// shared string table, small integers through RK.
    fn cell_records(row: usize, col: usize, cell: &Cell, strings: &mut Vec<String>) -> Vec<u8> {
        let mut body = header(row, col);
        match cell {
            Cell::Empty => return Vec::new(),
            Cell::Text(text) => {
                let index = match strings.iter().position(|s| s == text) {
                    Some(index) => index,
                    None => {
                        strings.push(text.clone());
                        strings.len() - 1
                    }
                };
                body.extend((index as u32).to_le_bytes());
                record(RECORD_LABEL_SST, &body)
            }
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e8 => {
                body.extend((((*n as i32) << 2) as u32 | 0x02).to_le_bytes());
                record(RECORD_RK, &body)
            }
            Cell::Number(n) => {
                body.extend(n.to_le_bytes());
                record(RECORD_NUMBER, &body)
            }
            Cell::Bool(b) => {
                body.extend([u8::from(*b), 0]);
                record(RECORD_BOOL_ERR, &body)
            }
        }
    }

    /// Workbook stream with one worksheet per `(name, cell records)`.
    pub(crate) fn workbook_stream(sheets: &[(&str, Vec<u8>)], strings: &[String]) -> Vec<u8> {
        let globals = |positions: &[u32]| {
            let mut stream = bof(0x0005);
            let mut sst = (strings.len() as u32).to_le_bytes().to_vec();
            sst.extend((strings.len() as u32).to_le_bytes());
            for text in strings {
                let (options, chars) = characters(text);
                sst.extend((text.chars().count() as u16).to_le_bytes());
                sst.push(options);
                sst.extend(chars);
            }
            stream.extend(record(RECORD_SST, &sst));
            for ((name, _), position) in sheets.iter().zip(positions) {
                let (options, chars) = characters(name);
                let mut body = position.to_le_bytes().to_vec();
                body.extend([0u8, SHEET_TYPE_WORKSHEET]);
                body.push(name.chars().count() as u8);
                body.push(options);
                body.extend(chars);
                stream.extend(record(RECORD_BOUND_SHEET, &body));
            }
            stream.extend(record(RECORD_EOF, &[]));
            stream
        };

        let mut position = globals(&vec![0; sheets.len()]).len() as u32;
        let mut positions = Vec::new();
        let mut substreams = Vec::new();
        for (_, records) in sheets {
            let mut substream = bof(0x0010);
            substream.extend(records);
            substream.extend(record(RECORD_EOF, &[]));
            positions.push(position);
            position += substream.len() as u32;
            substreams.extend(substream);
        }

        let mut stream = globals(&positions);
        stream.extend(substreams);
        stream
    }

    /// A complete `.xls` file with one worksheet per `(name, rows)`.
    pub(crate) fn xls_file(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
        let mut strings = Vec::new();
        let records: Vec<(&str, Vec<u8>)> = sheets
            .iter()
            .map(|(name, rows)| {
                let mut bytes = Vec::new();
                for (r, row) in rows.iter().enumerate() {
                    for (c, cell) in row.iter().enumerate() {
                        bytes.extend(cell_records(r, c, cell, &mut strings));
                    }
                }
                (*name, bytes)
            })
            .collect();
        xls_from_stream(&workbook_stream(&records, &strings))
    }

    pub(crate) fn xls_from_stream(stream: &[u8]) -> Vec<u8> {
        compound_file(&[("Workbook", stream)])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use super::fixtures::workbook_stream;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::text(*c)).collect()
    }

    #[test]
    fn test_workbook_round_trip() {
        let rows = vec![
            text_row(&["Type", "Object Name", "Count"]),
            vec![Cell::text("Application"), Cell::text("Siebel Financial Services"), Cell::Number(3.0)],
            vec![Cell::text("View"), Cell::text("Überblick ✓"), Cell::Number(2.25)],
            vec![Cell::text("Application"), Cell::Bool(true), Cell::Number(-7.0)],
        ];
        let bytes = xls_file(&[("Objects", rows.clone()), ("Second", vec![text_row(&["x"])])]);

        let grid = read_first_sheet(&bytes).unwrap();

        assert_eq!(grid.name, "Objects");
        assert_eq!(grid.rows, rows);
        assert_eq!(sheet_names(&bytes).unwrap(), ["Objects", "Second"]);
        assert_eq!(read_sheet(&bytes, 1).unwrap().rows, vec![text_row(&["x"])]);
        assert!(matches!(read_sheet(&bytes, 2), Err(SheetError::SheetNotFound(2))));
    }

    #[test]
    fn test_large_workbook_stream() {
        let mut rows = vec![text_row(&["Type", "Object Name"])];
        for i in 0..600 {
            rows.push(vec![Cell::text(format!("T{}", i % 7)), Cell::text(format!("Object {}", i))]);
        }
        let bytes = xls_file(&[("Objects", rows.clone())]);

        assert_eq!(read_first_sheet(&bytes).unwrap().rows, rows);
    }

    #[test]
    fn test_mul_rk_label_and_formula_results() {
        let mut records = Vec::new();

        let mut mul_rk = (0u16).to_le_bytes().to_vec();
        mul_rk.extend(1u16.to_le_bytes());
        for rk in [(5u32 << 2) | 0x02, (1234u32 << 2) | 0x03] {
            mul_rk.extend(0u16.to_le_bytes());
            mul_rk.extend(rk.to_le_bytes());
        }
        mul_rk.extend(2u16.to_le_bytes());
        records.extend(record(RECORD_MUL_RK, &mul_rk));

        let mut label = header(0, 0);
        label.extend(3u16.to_le_bytes());
        label.push(0x00);
        label.extend(b"Key");
        records.extend(record(RECORD_LABEL, &label));

        let mut number_formula = header(1, 0);
        number_formula.extend(4.5f64.to_le_bytes());
        number_formula.extend([0u8; 6]);
        records.extend(record(RECORD_FORMULA, &number_formula));

        let mut string_formula = header(1, 1);
        string_formula.extend([0x00, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
        string_formula.extend([0u8; 6]);
        records.extend(record(RECORD_FORMULA, &string_formula));
        records.extend(record(RECORD_SHARED_FORMULA, &[0u8; 10]));
        let mut string = 6u16.to_le_bytes().to_vec();
        string.push(0x00);
        string.extend(b"cached");
        records.extend(record(RECORD_STRING, &string));

        let mut bool_formula = header(1, 2);
        bool_formula.extend([0x01, 0, 1, 0, 0, 0, 0xFF, 0xFF]);
        bool_formula.extend([0u8; 6]);
        records.extend(record(RECORD_FORMULA, &bool_formula));

        let mut error_cell = header(2, 0);
        error_cell.extend([0x2A, 1]);
        records.extend(record(RECORD_BOOL_ERR, &error_cell));

        let stream = workbook_stream(&[("Sheet1", records)], &[]);
        let grid = read_first_sheet(&xls_from_stream(&stream)).unwrap();

        assert_eq!(
            grid.rows,
            vec![
                vec![Cell::text("Key"), Cell::Number(5.0), Cell::Number(12.34)],
                vec![Cell::Number(4.5), Cell::text("cached"), Cell::Bool(true)],
            ]
        );
    }

    #[test]
    fn test_password_protected_rejected() {
        let mut stream = record(RECORD_BOF, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        stream.extend(record(RECORD_FILE_PASS, &[0u8; 6]));
        stream.extend(record(RECORD_EOF, &[]));

        let err = read_first_sheet(&xls_from_stream(&stream)).unwrap_err();
        assert!(matches!(err, SheetError::PasswordProtected));
    }

    #[test]
    fn test_biff5_rejected() {
        let mut stream = record(RECORD_BOF, &[0x00, 0x05, 0x05, 0x00, 0, 0, 0, 0]);
        stream.extend(record(RECORD_EOF, &[]));

        let err = read_first_sheet(&xls_from_stream(&stream)).unwrap_err();
        assert!(matches!(err, SheetError::Xls(ref m) if m.contains("0x0500")));
    }

    #[test]
    fn test_missing_shared_string() {
        let mut body = header(0, 0);
        body.extend(9u32.to_le_bytes());
        let stream = workbook_stream(&[("Sheet1", record(RECORD_LABEL_SST, &body))], &[]);

        let err = read_first_sheet(&xls_from_stream(&stream)).unwrap_err();
        assert!(matches!(err, SheetError::MissingPart(ref p) if p == "shared string #9"));
    }

    #[test]
    fn test_rk_number() {
        assert_eq!(rk_number((42u32 << 2) | 0x02), 42.0);
        assert_eq!(rk_number(((-3i32 << 2) as u32) | 0x02), -3.0);
        assert_eq!(rk_number((150u32 << 2) | 0x03), 1.5);
        let bits = 2.5f64.to_bits();
        assert_eq!(rk_number((bits >> 32) as u32), 2.5);
    }
}
