use std::mem::size_of;

use crate::types::{Cell, SizeHint};

/// A row ready to be written, holding cells keyed by conformed column name.
///
/// Only the columns the record provided (plus metadata columns) are present. Columns a row
/// lacks are written as `NULL` when another row of the same batch provides them.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Position of the source message the row was built from.
    position: u64,
    /// Approximate row size in bytes.
    size_hint_bytes: usize,
    values: Vec<(String, Cell)>,
}

impl TableRow {
    pub fn new(position: u64, values: Vec<(String, Cell)>) -> Self {
        let size_hint_bytes = estimate_row_bytes(&values);

        Self {
            position,
            size_hint_bytes,
            values,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn values(&self) -> &[(String, Cell)] {
        &self.values
    }

    /// Returns the cell of `column`, if the row carries it.
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cell)| cell)
    }

    /// Sets the cell of `column`, replacing any previous value.
    pub fn set(&mut self, column: &str, cell: Cell) {
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = cell,
            None => self.values.push((column.to_string(), cell)),
        }

        self.size_hint_bytes = estimate_row_bytes(&self.values);
    }

    pub fn into_values(self) -> Vec<(String, Cell)> {
        self.values
    }
}

impl SizeHint for TableRow {
    fn size_hint(&self) -> usize {
        self.size_hint_bytes
    }
}

fn estimate_row_bytes(values: &[(String, Cell)]) -> usize {
    values.iter().fold(size_of::<TableRow>(), |total, (name, cell)| {
        total
            .saturating_add(size_of::<String>())
            .saturating_add(name.capacity())
            .saturating_add(cell.size_hint())
    })
}
