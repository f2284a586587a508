//! Read a worksheet of an xlsx workbook into a grid of cells.

use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::{BufRead, Cursor, Read, Seek};
use zip::ZipArchive;

use super::{place, MAX_COLUMNS, MAX_ROWS};
use super::xml::{on_xml_events, push_bytes_ref, xml_part, XmlNodeHelper, XmlReader};
use crate::error::{SheetError, SheetResult};
use crate::models::Cell;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_SHEET: QName = QName(b"sheet");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// Raw cell grid of one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGrid {
    /// Worksheet name as shown on its tab.
    pub name: String,
    /// Rows top to bottom; fully empty rows are dropped.
    pub rows: Vec<Vec<Cell>>,
}

/// How a `<c>` element encodes its value (`t` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Number,
    SharedString,
    InlineString,
    Boolean,
    Error,
}

impl CellKind {
    fn from_attribute(t: Option<&str>) -> Self {
        match t {
            Some("s") => CellKind::SharedString,
            Some("inlineStr") | Some("str") | Some("d") => CellKind::InlineString,
            Some("b") => CellKind::Boolean,
            Some("e") => CellKind::Error,
            _ => CellKind::Number,
        }
    }
}

/// Read the first worksheet of an in-memory xlsx file.
pub fn read_first_sheet(bytes: &[u8]) -> SheetResult<SheetGrid> {
    read_sheet(bytes, 0)
}

/// Worksheet names in tab order.
pub fn sheet_names(bytes: &[u8]) -> SheetResult<Vec<String>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let sheets = workbook_sheets(&mut zip)?;
    Ok(sheets.into_iter().map(|(name, _)| name).collect())
}

/// Read the worksheet at zero-based tab position `index`.
pub fn read_sheet(bytes: &[u8], index: usize) -> SheetResult<SheetGrid> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut sheets = workbook_sheets(&mut zip)?;
    if sheets.is_empty() {
        return Err(SheetError::NoWorksheet);
    }
    if index >= sheets.len() {
        return Err(SheetError::SheetNotFound(index));
    }
    let (name, path) = sheets.swap_remove(index);
    let shared_strings = load_shared_strings(&mut zip)?;
    let mut reader = xml_part(&mut zip, &path)?.ok_or(SheetError::MissingPart(path))?;
    let rows = read_rows(&mut reader, &shared_strings)?;
    Ok(SheetGrid { name, rows })
}

/// Name and part path of every `<sheet>` backed by a worksheet part.
fn workbook_sheets<R: Read + Seek>(zip: &mut ZipArchive<R>) -> SheetResult<Vec<(String, String)>> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = xml_part(zip, "xl/workbook.xml")?
        .ok_or_else(|| SheetError::MissingPart("xl/workbook.xml".to_string()))?;

    let mut sheets = Vec::new();
    on_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None;
            let mut id = None;
            for attribute in event.attributes() {
                let attribute = attribute?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attribute.unescape_value()?.into_owned()),
                    b"id" => id = Some(attribute.unescape_value()?.into_owned()),
                    _ => (),
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id) {
                    sheets.push((name, path.clone()));
                }
            }
        }
    });
    Ok(sheets)
}

/// Relationship id → part path, for worksheet relationships only.
fn load_relationships<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    path: &str,
) -> SheetResult<HashMap<String, String>> {
    let mut reader = xml_part(zip, path)?.ok_or_else(|| SheetError::MissingPart(path.to_string()))?;
    let mut relationships = HashMap::new();
    on_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|k| k.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.into_owned(), to_part_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolve a relationship target against the `xl/` directory.
fn to_part_path(target: &str) -> String {
    let target = target.replace('\\', "/");
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if target.starts_with("xl/") => target,
        None => format!("xl/{}", target),
    }
}

fn load_shared_strings<R: Read + Seek>(zip: &mut ZipArchive<R>) -> SheetResult<Vec<String>> {
    let mut strings = Vec::new();
    let Some(mut reader) = xml_part(zip, "xl/sharedStrings.xml")? else {
        return Ok(strings);
    };
    on_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(strings)
}

/// Text content up to `end_tag`, skipping phonetic runs.
///
/// With `is_text_content` all text counts; otherwise only text inside `<t>`.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> SheetResult<String> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    on_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = is_text_content,
        Event::Text(event) if is_text && !is_phonetic_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text && !is_phonetic_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text && !is_phonetic_text => push_bytes_ref(&mut text, &event)?,
    });
    Ok(text)
}

fn read_rows<R: BufRead>(reader: &mut XmlReader<R>, shared_strings: &[String]) -> SheetResult<Vec<Vec<Cell>>> {
    let mut grid: Vec<Vec<Cell>> = Vec::new();
    let mut next_row = 0usize;
    let mut row = 0usize;
    let mut next_col = 0usize;
    let mut current: Option<(usize, usize, CellKind)> = None;
    let mut value: Option<String> = None;

    on_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_ROW => {
            row = match event.get_attribute_value("r")? {
                Some(r) => r.parse::<usize>()?.saturating_sub(1),
                None => next_row,
            };
            if row >= MAX_ROWS {
                return Err(SheetError::CellOutOfRange { row, col: 0 });
            }
            next_col = 0;
        }
        Event::End(event) if event.name() == TAG_ROW => {
            next_row = row + 1;
        }
        Event::Start(event) if event.name() == TAG_CELL => {
            let (cell_row, cell_col) = match event.get_attribute_value("r")? {
                Some(reference) => reference_to_index(&reference)
                    .ok_or_else(|| SheetError::CellReference(reference.into_owned()))?,
                None => (row, next_col),
            };
            if cell_row >= MAX_ROWS || cell_col >= MAX_COLUMNS {
                return Err(SheetError::CellOutOfRange { row: cell_row, col: cell_col });
            }
            let kind = CellKind::from_attribute(event.get_attribute_value("t")?.as_deref());
            next_col = cell_col + 1;
            current = Some((cell_row, cell_col, kind));
            value = None;
        }
        Event::Start(event) if current.is_some() && event.name() == TAG_VALUE => {
            value = Some(read_string_value(reader, TAG_VALUE, true)?);
        }
        Event::Start(event) if current.is_some() && event.name() == TAG_INLINE_STRING => {
            value = Some(read_string_value(reader, TAG_INLINE_STRING, false)?);
        }
        Event::End(event) if event.name() == TAG_CELL => {
            if let Some((cell_row, cell_col, kind)) = current.take() {
                let cell = decode_cell(kind, value.take(), shared_strings)?;
                if !cell.is_empty() {
                    place(&mut grid, cell_row, cell_col, cell)?;
                }
            }
        }
    });

    grid.retain(|r| r.iter().any(|c| !c.is_empty()));
    Ok(grid)
}

fn decode_cell(kind: CellKind, value: Option<String>, shared_strings: &[String]) -> SheetResult<Cell> {
    let Some(value) = value else {
        return Ok(Cell::Empty);
    };
    let cell = match kind {
        CellKind::SharedString => {
            let index = value.trim().parse::<usize>()?;
            let text = shared_strings
                .get(index)
                .ok_or_else(|| SheetError::MissingPart(format!("shared string #{}", index)))?;
            Cell::text(text.as_str())
        }
        CellKind::InlineString => Cell::text(value),
        CellKind::Boolean => Cell::Bool(matches!(value.trim(), "1" | "true" | "TRUE")),
        CellKind::Error => Cell::Empty,
        CellKind::Number => match value.trim().parse::<f64>() {
            Ok(n) => Cell::Number(n),
            Err(_) => Cell::text(value),
        },
    };
    Ok(cell)
}

/// `"B3"` → `(2, 1)`: zero-based row and column. `None` on overflow.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters.bytes().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)
    })?;
    let row = digits.parse::<usize>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn workbook(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Objects" sheetId="1" r:id="rId1"/><sheet name="Other" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet1.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

    const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
<si><t>Type</t></si>
<si><t>Object Name</t></si>
<si><r><t>Appli</t></r><r><t>cation</t></r><rPh><t>ignored</t></rPh></si>
<si><t xml:space="preserve">Siebel &amp; Co </t></si>
</sst>"#;

    const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="s"><v>3</v></c><c r="C2"><v>42</v></c></row>
<row r="4"><c r="A4" t="inlineStr"><is><t>View</t></is></c><c r="B4" t="b"><v>1</v></c></row>
<row r="5"><c r="B5" t="e"><v>#N/A</v></c></row>
<row r="6"><c r="A6" t="str"><f>A4</f><v>View</v></c><c r="B6"/></row>
</sheetData></worksheet>"#;

    const SHEET2: &str = r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>other</t></is></c></row></sheetData></worksheet>"#;

    #[test]
    fn test_read_first_sheet() {
        let bytes = workbook(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]);

        let grid = read_first_sheet(&bytes).unwrap();

        assert_eq!(grid.name, "Objects");
        assert_eq!(grid.rows.len(), 4);
        assert_eq!(grid.rows[0], vec![Cell::text("Type"), Cell::text("Object Name")]);
        assert_eq!(
            grid.rows[1],
            vec![Cell::text("Application"), Cell::text("Siebel & Co "), Cell::Number(42.0)]
        );
        assert_eq!(grid.rows[2], vec![Cell::text("View"), Cell::Bool(true)]);
        // Error cell row dropped as empty; formula string keeps its cached value.
        assert_eq!(grid.rows[3], vec![Cell::text("View")]);
    }

    #[test]
    fn test_read_sheet_by_position() {
        let bytes = workbook(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]);

        assert_eq!(sheet_names(&bytes).unwrap(), ["Objects", "Other"]);

        let grid = read_sheet(&bytes, 1).unwrap();
        assert_eq!(grid.name, "Other");
        assert_eq!(grid.rows, vec![vec![Cell::text("other")]]);

        assert!(matches!(read_sheet(&bytes, 2), Err(SheetError::SheetNotFound(2))));
    }

    fn single_sheet(sheet: &str) -> Vec<u8> {
        workbook(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/worksheets/sheet1.xml", sheet),
        ])
    }

    #[test]
    fn test_column_past_xfd_rejected() {
        let bytes = single_sheet(
            r#"<worksheet><sheetData><row r="1"><c r="XFD1"><v>1</v></c><c r="XFE1"><v>2</v></c></row></sheetData></worksheet>"#,
        );

        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(matches!(err, SheetError::CellOutOfRange { row: 0, col: 16_384 }));
    }

    #[test]
    fn test_huge_row_number_rejected() {
        let bytes = single_sheet(
            r#"<worksheet><sheetData><row r="4000000000"><c t="inlineStr"><is><t>far</t></is></c></row></sheetData></worksheet>"#,
        );

        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(matches!(err, SheetError::CellOutOfRange { row: 3_999_999_999, .. }));
    }

    #[test]
    fn test_overflowing_reference_rejected() {
        let bytes = single_sheet(
            r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
        );

        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(matches!(err, SheetError::CellReference(ref r) if r == "ZZZZZZZZZZZZZZZ1"));
    }

    #[test]
    fn test_last_valid_cell_accepted() {
        let bytes = single_sheet(
            r#"<worksheet><sheetData><row r="1048576"><c r="XFD1048576"><v>7</v></c></row></sheetData></worksheet>"#,
        );

        let grid = read_first_sheet(&bytes).unwrap();
        assert_eq!(grid.rows.len(), 1);
        assert_eq!(grid.rows[0].len(), 16_384);
        assert_eq!(grid.rows[0][16_383], Cell::Number(7.0));
    }

    #[test]
    fn test_missing_workbook_part() {
        let bytes = workbook(&[("xl/_rels/workbook.xml.rels", RELS)]);

        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(matches!(err, SheetError::MissingPart(ref p) if p == "xl/workbook.xml"));
    }

    #[test]
    fn test_not_a_zip() {
        let err = read_first_sheet(b"Type,Object Name\n").unwrap_err();
        assert!(matches!(err, SheetError::Zip(_)));
    }

    #[test]
    fn test_reference_to_index() {
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("B3"), Some((2, 1)));
        assert_eq!(reference_to_index("AA10"), Some((9, 26)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(reference_to_index("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(reference_to_index("ZZZZZZZZZZZZZZZ1"), None);
        assert_eq!(reference_to_index("A99999999999999999999999"), None);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(to_part_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_part_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }
}
