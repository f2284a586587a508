//! CSV decoding with encoding and delimiter auto-detection.
//!
//! Every value is kept as text; empty fields become [`Cell::Empty`].

use crate::error::{SheetError, SheetResult};
use crate::models::Cell;

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _confidence, _language) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the named encoding.
///
/// A leading UTF-8 byte order mark is stripped. Unknown encoding names are
/// resolved through `encoding_rs` labels, then fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SheetResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (text, _, had_errors) = encoding.decode(bytes);
                if had_errors {
                    return Err(SheetError::Encoding(format!(
                        "content is not valid {}",
                        encoding.name()
                    )));
                }
                text.into_owned()
            }
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Ties and lines without any candidate resolve to `,`.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Split CSV text into rows of cells, header row included.
///
/// Blank lines are skipped. Rows may have differing widths; the caller
/// decides how to reconcile them with the header.
pub fn read_records(content: &str, delimiter: char) -> SheetResult<Vec<Vec<Cell>>> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| SheetError::Encoding(format!("delimiter {:?} is not a single byte", delimiter)))?;

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(Cell::text).collect());
    }
    Ok(rows)
}
