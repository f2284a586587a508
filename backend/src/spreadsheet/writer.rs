//! Minimal OOXML workbook writer.
//!
//! Produces a valid `.xlsx` package with one worksheet per added table:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! xl/workbook.xml
//! xl/_rels/workbook.xml.rels
//! xl/styles.xml                  default + bold header style
//! xl/worksheets/sheet{n}.xml     header row, then data rows
//! ```
//!
//! Text is written as inline strings, so no shared-string table is needed.

use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ExportError, ExportResult};
use crate::models::{Cell, Table};

/// MIME type of the produced workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const STYLES: &str = r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#;

/// Style index of header cells in `cellXfs`.
const HEADER_STYLE: u8 = 1;

/// Accumulates sheets, then packs them into an xlsx archive.
#[derive(Debug, Default)]
pub struct WorkbookWriter {
    sheets: Vec<(String, String)>,
}

impl WorkbookWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `table` as a new sheet named `name`.
    ///
    /// Sheet names must be 1 to 31 characters, must not contain
    /// `[ ] : * ? / \`, and must be unique ignoring case.
    pub fn add_sheet(&mut self, name: &str, table: &Table) -> ExportResult<&mut Self> {
        let invalid = name.is_empty()
            || name.chars().count() > MAX_SHEET_NAME_LEN
            || name.contains(&FORBIDDEN_SHEET_CHARS[..])
            || self.sheets.iter().any(|(n, _)| n.to_lowercase() == name.to_lowercase());
        if invalid {
            return Err(ExportError::InvalidSheetName(name.to_string()));
        }
        self.sheets.push((name.to_string(), sheet_xml(table)));
        Ok(self)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    /// Write the package and return its bytes.
    pub fn finish(self) -> ExportResult<Vec<u8>> {
        if self.sheets.is_empty() {
            return Err(ExportError::Empty);
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let parts = [
            ("[Content_Types].xml", self.content_types()),
            ("_rels/.rels", package_rels()),
            ("xl/workbook.xml", self.workbook_xml()),
            ("xl/_rels/workbook.xml.rels", self.workbook_rels()),
            ("xl/styles.xml", format!(r#"{XML_DECL}<styleSheet xmlns="{NS_MAIN}">{STYLES}</styleSheet>"#)),
        ];
        for (path, content) in parts {
            zip.start_file(path, options)?;
            zip.write_all(content.as_bytes())?;
        }
        for (i, (_, content)) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(content.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn content_types(&self) -> String {
        let mut xml = format!(
            r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
        );
        for i in 1..=self.sheets.len() {
            xml.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    fn workbook_xml(&self) -> String {
        let mut xml = format!(r#"{XML_DECL}<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets>"#);
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            let id = i + 1;
            xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
                escape(name.as_str())
            ));
        }
        xml.push_str("</sheets></workbook>");
        xml
    }

    fn workbook_rels(&self) -> String {
        let mut xml = format!(r#"{XML_DECL}<Relationships xmlns="{NS_PKG_REL}">"#);
        for i in 1..=self.sheets.len() {
            xml.push_str(&format!(
                r#"<Relationship Id="rId{i}" Type="{NS_REL}/worksheet" Target="worksheets/sheet{i}.xml"/>"#
            ));
        }
        let styles_id = self.sheets.len() + 1;
        xml.push_str(&format!(
            r#"<Relationship Id="rId{styles_id}" Type="{NS_REL}/styles" Target="styles.xml"/></Relationships>"#
        ));
        xml
    }
}

fn package_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = format!(r#"{XML_DECL}<worksheet xmlns="{NS_MAIN}"><sheetData>"#);

    xml.push_str(r#"<row r="1">"#);
    for (col, name) in table.columns().iter().enumerate() {
        let reference = cell_reference(0, col);
        xml.push_str(&format!(
            r#"<c r="{reference}" t="inlineStr" s="{HEADER_STYLE}"><is><t xml:space="preserve">{}</t></is></c>"#,
            escape_text(name)
        ));
    }
    xml.push_str("</row>");

    for (i, row) in table.rows().iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, i + 2));
        for (col, cell) in row.iter().enumerate() {
            xml.push_str(&cell_xml(&cell_reference(i + 1, col), cell));
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

/// One `<c>` element; empty cells are omitted.
fn cell_xml(reference: &str, cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Bool(b) => format!(r#"<c r="{reference}" t="b"><v>{}</v></c>"#, u8::from(*b)),
        Cell::Number(n) if n.is_finite() => format!(r#"<c r="{reference}"><v>{n}</v></c>"#),
        Cell::Number(_) | Cell::Text(_) => format!(
            r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            escape_text(&cell.to_text())
        ),
    }
}

/// Escape markup and drop characters XML 1.0 cannot carry.
fn escape_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect();
    escape(cleaned.as_str()).into_owned()
}

/// Zero-based `(row, col)` → `"B3"`.
pub(crate) fn cell_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::reader::{read_first_sheet, reference_to_index};

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(2, 1), "B3");
        assert_eq!(cell_reference(9, 25), "Z10");
        assert_eq!(cell_reference(0, 26), "AA1");
        assert_eq!(cell_reference(0, 701), "ZZ1");
        assert_eq!(reference_to_index(&cell_reference(41, 730)), Some((41, 730)));
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let table = Table::from_rows(
            ["Type", "Object Name", "Count", "Flag"],
            vec![
                vec![Cell::text("Application"), Cell::text("A <&> \"B\""), Cell::Number(3.0), Cell::Bool(false)],
                vec![Cell::text("View"), Cell::Empty, Cell::Number(1.5), Cell::Empty],
            ],
        )
        .unwrap();

        let mut writer = WorkbookWriter::new();
        writer.add_sheet("Grouped Data", &table).unwrap();
        let bytes = writer.finish().unwrap();

        let grid = read_first_sheet(&bytes).unwrap();
        assert_eq!(grid.name, "Grouped Data");
        assert_eq!(grid.rows.len(), 3);
        assert_eq!(grid.rows[0], table.columns().iter().map(|c| Cell::text(c.as_str())).collect::<Vec<_>>());
        assert_eq!(grid.rows[1], table.rows()[0]);
        assert_eq!(grid.rows[2], vec![Cell::text("View"), Cell::Empty, Cell::Number(1.5)]);
    }

    #[test]
    fn test_sheet_order_preserved() {
        let table = Table::new(["Type"]).unwrap();
        let mut writer = WorkbookWriter::new();
        writer.add_sheet("Grouped Data", &table).unwrap();
        writer.add_sheet("Raw Data", &table).unwrap();

        assert_eq!(writer.sheet_names().collect::<Vec<_>>(), ["Grouped Data", "Raw Data"]);
        let bytes = writer.finish().unwrap();
        assert_eq!(read_first_sheet(&bytes).unwrap().name, "Grouped Data");
    }

    #[test]
    fn test_invalid_sheet_names() {
        let table = Table::new(["Type"]).unwrap();
        let mut writer = WorkbookWriter::new();

        assert!(writer.add_sheet("", &table).is_err());
        assert!(writer.add_sheet("a/b", &table).is_err());
        assert!(writer.add_sheet(&"x".repeat(32), &table).is_err());
        writer.add_sheet("Raw Data", &table).unwrap();
        assert!(matches!(
            writer.add_sheet("raw data", &table),
            Err(ExportError::InvalidSheetName(_))
        ));
    }

    #[test]
    fn test_empty_workbook_rejected() {
        assert!(matches!(WorkbookWriter::new().finish(), Err(ExportError::Empty)));
    }

    #[test]
    fn test_cell_xml() {
        assert_eq!(cell_xml("A1", &Cell::Empty), "");
        assert_eq!(cell_xml("B2", &Cell::Bool(true)), r#"<c r="B2" t="b"><v>1</v></c>"#);
        assert_eq!(cell_xml("C3", &Cell::Number(2.5)), r#"<c r="C3"><v>2.5</v></c>"#);
        assert_eq!(
            cell_xml("D4", &Cell::text("a&b")),
            r#"<c r="D4" t="inlineStr"><is><t xml:space="preserve">a&amp;b</t></is></c>"#
        );
    }

    #[test]
    fn test_control_characters_stripped() {
        assert_eq!(escape_text("a\u{1}b\tc"), "ab\tc");
        assert_eq!(escape_text("<x>"), "&lt;x&gt;");
    }
}
