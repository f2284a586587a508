//! Group rows by one column and join the distinct values of another.
//!
//! # Architecture
//!
//! ```text
//! Input table                              Derived table
//! ┌──────────────┬──────────┐             ┌──────────────┬────────────┐
//! │ Type         │ Obj Name │             │ Type         │ Obj Name   │
//! ├──────────────┼──────────┤             ├──────────────┼────────────┤
//! │ Application  │ A        │             │ Application  │ A OR B     │
//! │ Bus. Comp.   │ C        │      →      │ Bus. Comp.   │ C          │
//! │ Application  │ B        │             └──────────────┴────────────┘
//! │ Application  │ A        │
//! └──────────────┴──────────┘
//! ```
//!
//! # Ordering
//!
//! Output rows follow the first appearance of each group key, scanning the
//! input top to bottom. Inside a group, values keep the order in which they
//! were first seen; later duplicates are dropped. The output is therefore a
//! pure function of the input table and the separator.
//!
//! Keys and values are compared through [`Cell::to_text`]: exact,
//! case-sensitive and whitespace-sensitive. Rows with an empty key are
//! dropped. Empty values are skipped, so a group never gains a dangling
//! separator; a group whose values are all empty joins to the empty string.

use std::collections::{HashMap, HashSet};

use crate::error::SchemaError;
use crate::models::{Cell, Table};
use crate::validation::missing_columns;

/// Group `table` by `group_column`, joining the distinct `value_column`
/// texts of each group with `separator`.
///
/// The derived table has two columns, named after `group_column` and
/// `value_column`, and one row per distinct key. Both columns must exist in
/// `table` and must differ.
pub fn group(
    table: &Table,
    group_column: &str,
    value_column: &str,
    separator: &str,
) -> Result<Table, SchemaError> {
    let indexes = table
        .column_index(group_column)
        .zip(table.column_index(value_column));
    let Some((key_index, value_index)) = indexes else {
        return Err(SchemaError {
            missing: missing_columns(table, &[group_column, value_column]),
            required: vec![group_column.to_string(), value_column.to_string()],
        });
    };

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupBuilder> = Vec::new();

    for row in table.rows() {
        let key = row[key_index].to_text();
        if key.is_empty() {
            continue;
        }
        let index = match positions.get(&key) {
            Some(&index) => index,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(GroupBuilder::new(key));
                groups.len() - 1
            }
        };
        let value = row[value_index].to_text();
        if !value.is_empty() {
            groups[index].add(value);
        }
    }

    let columns = [group_column, value_column];
    let rows = groups.into_iter().map(|g| g.build(separator)).collect();

    // Only fails when both column names are equal.
    Table::from_rows(columns, rows).map_err(|_| SchemaError {
        missing: Vec::new(),
        required: columns.iter().map(|c| c.to_string()).collect(),
    })
}

/// Join the distinct items of `values` with `separator`, keeping
/// first-seen order.
pub fn join_distinct<I, S>(values: I, separator: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut builder = GroupBuilder::new(String::new());
    for value in values {
        builder.add(value.into());
    }
    builder.values.join(separator)
}

/// Accumulates the distinct values of one group.
struct GroupBuilder {
    key: String,
    seen: HashSet<String>,
    values: Vec<String>,
}

impl GroupBuilder {
    fn new(key: String) -> Self {
        Self {
            key,
            seen: HashSet::new(),
            values: Vec::new(),
        }
    }

    fn add(&mut self, value: String) {
        if !self.seen.contains(&value) {
            self.seen.insert(value.clone());
            self.values.push(value);
        }
    }

    fn build(self, separator: &str) -> Vec<Cell> {
        vec![Cell::text(self.key), Cell::text(self.values.join(separator))]
    }
}
