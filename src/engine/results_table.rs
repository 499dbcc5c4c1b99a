//! Loosely typed engine output
//!
//! Mirrors an ImageJ results table: named `f64` columns in insertion order,
//! one row per particle. The extractor validates it into typed records.

/// Named numeric columns, one row per particle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl ResultsTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to a column, creating the column on first use
    pub fn push(&mut self, column: &str, value: f64) {
        if let Some((_, values)) = self.columns.iter_mut().find(|(name, _)| name == column) {
            values.push(value);
        } else {
            self.columns.push((column.to_string(), vec![value]));
        }
    }

    /// Replace a whole column
    pub fn set_column(&mut self, column: &str, values: Vec<f64>) {
        if let Some((_, existing)) = self.columns.iter_mut().find(|(name, _)| name == column) {
            *existing = values;
        } else {
            self.columns.push((column.to_string(), values));
        }
    }

    /// Values of a column, if present
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of rows (length of the longest column)
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0)
    }

    /// True when no particle was measured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Drop all columns
    pub fn clear(&mut self) {
        self.columns.clear();
    }
}
