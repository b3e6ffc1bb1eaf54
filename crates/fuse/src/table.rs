use std::collections::HashMap;

use crate::error::FuseError;
use crate::value::Value;

/// A named column of values, one per record.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Read-only source table keyed by record id.
///
/// Storage is column-major: alignment fetches whole columns at the matched
/// record positions, never whole rows.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    columns: Vec<Column>,
}

impl Table {
    /// Create a table with the given record ids and no columns.
    pub fn new<I, S>(name: impl Into<String>, ids: I) -> Result<Self, FuseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(FuseError::DuplicateRecord {
                    table: name,
                    record_id: id.clone(),
                });
            }
        }
        Ok(Self {
            name,
            ids,
            positions,
            columns: Vec::new(),
        })
    }

    /// Append a column. Values are in record-id order.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Self, FuseError> {
        let name = name.into();
        if values.len() != self.ids.len() {
            return Err(FuseError::ConfigValidation(format!(
                "table '{}': column '{name}' has {} values for {} records",
                self.name,
                values.len(),
                self.ids.len()
            )));
        }
        if self.columns.iter().any(|c| c.name == name) {
            return Err(FuseError::ConfigValidation(format!(
                "table '{}': duplicate column '{name}'",
                self.name
            )));
        }
        self.columns.push(Column { name, values });
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&[Value], FuseError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| FuseError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn position(&self, record_id: &str) -> Result<usize, FuseError> {
        self.positions
            .get(record_id)
            .copied()
            .ok_or_else(|| FuseError::MissingRecord {
                table: self.name.clone(),
                record_id: record_id.to_string(),
            })
    }

    /// Resolve record ids to row positions, preserving order.
    pub fn positions<'a, I>(&self, record_ids: I) -> Result<Vec<usize>, FuseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        record_ids.into_iter().map(|id| self.position(id)).collect()
    }

    /// Values of `column` at the given row positions, in that order.
    pub fn gather(&self, column: &str, positions: &[usize]) -> Result<Vec<Value>, FuseError> {
        let values = self.column(column)?;
        Ok(positions.iter().map(|&p| values[p].clone()).collect())
    }

    pub fn get(&self, record_id: &str, column: &str) -> Result<&Value, FuseError> {
        let pos = self.position(record_id)?;
        Ok(&self.column(column)?[pos])
    }

    /// Load a table from CSV text with a header row. `id_column` supplies the
    /// record ids; every other column becomes a value column.
    pub fn from_csv(
        name: impl Into<String>,
        csv_data: &str,
        id_column: &str,
    ) -> Result<Self, FuseError> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| FuseError::Io(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let id_idx = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| FuseError::MissingColumn {
                table: name.clone(),
                column: id_column.to_string(),
            })?;

        let mut ids = Vec::new();
        let mut data: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

        for record in reader.records() {
            let record = record.map_err(|e| FuseError::Io(e.to_string()))?;
            ids.push(record.get(id_idx).unwrap_or("").to_string());
            for (i, column) in data.iter_mut().enumerate() {
                column.push(Value::from_input(record.get(i).unwrap_or("")));
            }
        }

        let mut table = Table::new(name, ids)?;
        for (i, (header, values)) in headers.into_iter().zip(data).enumerate() {
            if i == id_idx {
                continue;
            }
            table = table.with_column(header, values)?;
        }
        Ok(table)
    }
}
