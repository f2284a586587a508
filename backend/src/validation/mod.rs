//! Required-column validation.
//!
//! The grouping step reads two named columns; this module checks that an
//! input [`Table`] carries them before anything else runs.
//!
//! Matching is exact: column order does not matter, but case and
//! surrounding whitespace do. On failure, every missing column is reported
//! at once so the user can fix the file in a single pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use classifier::{validate, Table, REQUIRED_COLUMNS};
//!
//! let table = Table::new(["Object Name", "Type"]).unwrap();
//! assert!(validate(table, &REQUIRED_COLUMNS).is_ok());
//!
//! let table = Table::new(["Type"]).unwrap();
//! let err = validate(table, &REQUIRED_COLUMNS).unwrap_err();
//! assert_eq!(err.missing, vec!["Object Name"]);
//! ```

use crate::error::SchemaError;
use crate::models::Table;

/// Required columns absent from `table`, in the order they were required.
pub fn missing_columns<S: AsRef<str>>(table: &Table, required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !table.has_column(name))
        .map(str::to_string)
        .collect()
}

/// Check that every required column is present.
///
/// Returns the table unchanged on success.
pub fn validate<S: AsRef<str>>(table: Table, required: &[S]) -> Result<Table, SchemaError> {
    check(&table, required)?;
    Ok(table)
}

/// Borrowing form of [`validate`].
pub fn check<S: AsRef<str>>(table: &Table, required: &[S]) -> Result<(), SchemaError> {
    let missing = missing_columns(table, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError {
            missing,
            required: required.iter().map(|s| s.as_ref().to_string()).collect(),
        })
    }
}

/// Quick check: true when no required column is missing.
pub fn is_valid<S: AsRef<str>>(table: &Table, required: &[S]) -> bool {
    missing_columns(table, required).is_empty()
}
