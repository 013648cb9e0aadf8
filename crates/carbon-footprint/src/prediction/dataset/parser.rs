use std::collections::BTreeMap;
use std::io::Read;

use super::DataError;

/// Rows of named string cells as produced by the external dataset loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut table = Self::new(columns);

        for record in csv_reader.records() {
            let record = record?;
            table
                .rows
                .push(record.iter().map(str::to_string).collect());
        }

        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Append a row given as column-name/value pairs; absent columns stay blank.
    pub fn push_named(&mut self, values: &BTreeMap<&str, String>) {
        let row = self
            .columns
            .iter()
            .map(|column| values.get(column.as_str()).cloned().unwrap_or_default())
            .collect();
        self.rows.push(row);
    }
}
