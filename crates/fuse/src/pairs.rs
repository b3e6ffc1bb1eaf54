use serde::Serialize;

use crate::error::FuseError;
use crate::value::Value;

/// One matched pair: a record id from table A and one from table B.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Pair {
    pub a: String,
    pub b: String,
}

impl Pair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self { a: a.into(), b: b.into() }
    }
}

/// Ordered matched pairs. Pair order is output row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PairIndex {
    pairs: Vec<Pair>,
}

impl PairIndex {
    pub fn new(pairs: Vec<Pair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.pairs.iter()
    }

    pub fn ids_a(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.a.as_str())
    }

    pub fn ids_b(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.b.as_str())
    }

    /// Load a links file. Returns the index plus, if `prediction_column` is
    /// given, one match/non-match label per pair.
    pub fn from_csv(
        csv_data: &str,
        column_a: &str,
        column_b: &str,
        prediction_column: Option<&str>,
    ) -> Result<(Self, Option<Vec<bool>>), FuseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| FuseError::Io(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let idx = |name: &str| -> Result<usize, FuseError> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                FuseError::MissingColumn {
                    table: "links".into(),
                    column: name.into(),
                }
            })
        };

        let a_idx = idx(column_a)?;
        let b_idx = idx(column_b)?;
        let pred_idx = prediction_column.map(idx).transpose()?;

        let mut pairs = Vec::new();
        let mut predictions = pred_idx.map(|_| Vec::new());

        for record in reader.records() {
            let record = record.map_err(|e| FuseError::Io(e.to_string()))?;
            pairs.push(Pair::new(
                record.get(a_idx).unwrap_or(""),
                record.get(b_idx).unwrap_or(""),
            ));
            if let (Some(pi), Some(labels)) = (pred_idx, predictions.as_mut()) {
                let raw = record.get(pi).unwrap_or("");
                labels.push(parse_label(raw).ok_or_else(|| {
                    FuseError::ConfigValidation(format!(
                        "links: cannot read prediction '{raw}' as a match label"
                    ))
                })?);
            }
        }

        Ok((Self { pairs }, predictions))
    }
}

fn parse_label(raw: &str) -> Option<bool> {
    match Value::from_input(raw) {
        Value::Bool(b) => Some(b),
        Value::Number(n) if n.0 == 1.0 => Some(true),
        Value::Number(n) if n.0 == 0.0 => Some(false),
        _ => None,
    }
}

impl FromIterator<Pair> for PairIndex {
    fn from_iter<T: IntoIterator<Item = Pair>>(iter: T) -> Self {
        Self { pairs: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a PairIndex {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// Comparison vectors from the matching step: the pair index plus any named
/// similarity features computed for each pair. Fusion only reads the index.
#[derive(Debug, Clone, Default)]
pub struct PairVectors {
    pub index: PairIndex,
    pub features: Vec<(String, Vec<f64>)>,
}

impl PairVectors {
    pub fn new(index: PairIndex) -> Self {
        Self { index, features: Vec::new() }
    }

    pub fn with_feature(mut self, name: impl Into<String>, scores: Vec<f64>) -> Self {
        self.features.push((name.into(), scores));
        self
    }
}

impl From<PairIndex> for PairVectors {
    fn from(index: PairIndex) -> Self {
        Self::new(index)
    }
}
