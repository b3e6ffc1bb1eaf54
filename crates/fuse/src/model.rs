use serde::Serialize;

use crate::align::Broadcast;
use crate::error::FuseError;
use crate::pairs::{PairIndex, PairVectors};
use crate::table::Table;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-loaded inputs for a config-driven run.
#[derive(Debug, Clone)]
pub struct FuseInput {
    pub table_a: Table,
    pub table_b: Table,
    pub vectors: PairVectors,
    pub predictions: Option<Vec<bool>>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One resolved column, index-aligned with [`FusedTable::pairs`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedColumn {
    pub name: String,
    pub values: Vec<Value>,
}

/// Result of a fusion run: one column per queued job, in queue order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedTable {
    pub pairs: PairIndex,
    pub columns: Vec<FusedColumn>,
    /// Count mismatches that were resolved by broadcasting.
    pub broadcasts: Vec<Broadcast>,
}

impl FusedTable {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Resolved values of row `i`, in column order.
    pub fn row(&self, i: usize) -> Option<Vec<&Value>> {
        if i >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// CSV with `id_a,id_b` followed by one column per job.
    pub fn to_csv(&self) -> Result<String, FuseError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["id_a", "id_b"];
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        writer
            .write_record(&header)
            .map_err(|e| FuseError::Io(e.to_string()))?;

        for (i, pair) in self.pairs.iter().enumerate() {
            let mut record = vec![pair.a.clone(), pair.b.clone()];
            record.extend(self.columns.iter().map(|c| c.values[i].to_string()));
            writer
                .write_record(&record)
                .map_err(|e| FuseError::Io(e.to_string()))?;
        }

        let bytes = writer.into_inner().map_err(|e| FuseError::Io(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| FuseError::Io(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FuseMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuseReport {
    pub meta: FuseMeta,
    pub table: FusedTable,
}
