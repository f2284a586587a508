//! Workbook support.
//!
//! - [`reader`] - Worksheets of an `.xlsx` file into a cell grid
//! - [`xls`] - Worksheets of a legacy BIFF8 `.xls` file into a cell grid
//! - [`writer`] - Multi-sheet `.xlsx` package from [`crate::models::Table`]s
//!
//! Both sides work on in-memory byte buffers; no temporary files.

mod biff8;
mod cfb;
mod xml;

pub mod reader;
pub mod writer;
pub mod xls;

pub use reader::{read_first_sheet, read_sheet, sheet_names, SheetGrid};
pub use writer::{WorkbookWriter, XLSX_MIME};

use crate::error::{SheetError, SheetResult};
use crate::models::Cell;

/// Zip local file header magic, the first bytes of every `.xlsx` file.
pub const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// OLE compound file signature, the first bytes of every `.xls` file.
pub const OLE_MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Rows per worksheet in current Excel versions.
pub const MAX_ROWS: usize = 1_048_576;

/// Columns per worksheet in current Excel versions (`A` to `XFD`).
pub const MAX_COLUMNS: usize = 16_384;

/// True when `bytes` look like a zip container.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// True when `bytes` look like an OLE compound file.
pub fn is_ole(bytes: &[u8]) -> bool {
    bytes.starts_with(OLE_MAGIC)
}

/// Store `cell` at zero-based `(row, col)`, growing the grid as needed.
pub(crate) fn place(grid: &mut Vec<Vec<Cell>>, row: usize, col: usize, cell: Cell) -> SheetResult<()> {
    if row >= MAX_ROWS || col >= MAX_COLUMNS {
        return Err(SheetError::CellOutOfRange { row, col });
    }
    if grid.len() <= row {
        grid.resize_with(row + 1, Vec::new);
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        cells.resize(col + 1, Cell::Empty);
    }
    cells[col] = cell;
    Ok(())
}
