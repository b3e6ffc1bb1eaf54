//! Alignment: turns one [`ResolutionJob`] plus the source tables and pair
//! index into one [`AlignedRecord`] per pair.
//!
//! Per side, value columns and metadata columns need not have the same
//! count. When they differ, the first column of the shorter list is
//! broadcast ("generalized") across the longer one. The decision is made
//! once per job and every broadcast is reported as a [`Broadcast`].

use std::fmt;

use log::warn;
use serde::Serialize;

use crate::error::FuseError;
use crate::job::{MetaInput, ResolutionJob, Side, Transform};
use crate::pairs::PairIndex;
use crate::table::Table;
use crate::value::Value;

/// Candidate values for one pair, A-side slots first, then B-side slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRecord {
    /// Row of this pair in the pair index.
    pub position: usize,
    pub values: Vec<Value>,
    /// Parallel to `values` when the job declares metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<Value>>,
}

impl AlignedRecord {
    /// Values zipped with their metadata. Metadata is `None` for jobs without it.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, Option<&Value>)> {
        let meta = self.metadata.as_deref();
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (v, meta.and_then(|m| m.get(i))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    /// Fewer value columns than metadata columns: the first value column is repeated.
    Values,
    /// Fewer metadata columns than value columns: the first metadata column is repeated.
    Metadata,
}

/// A count mismatch that was resolved by broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Broadcast {
    pub job: String,
    pub side: Side,
    pub kind: BroadcastKind,
    /// Columns declared for the broadcast list.
    pub from: usize,
    /// Slots it was broadcast to.
    pub to: usize,
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (what, other) = match self.kind {
            BroadcastKind::Values => ("values", "metadata"),
            BroadcastKind::Metadata => ("metadata", "values"),
        };
        write!(
            f,
            "job '{}': generalizing {what} on side {}: {} {what} column(s) for {} {other} column(s), \
             first {what} column repeated",
            self.job, self.side, self.from, self.to
        )
    }
}

/// How metadata for one side is obtained, decided once per job.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataMode {
    /// The same literal in every slot of every pair.
    Static(Value),
    /// One column fetched once and repeated across all value slots.
    Generalized(String),
    /// One fetched column per slot.
    Direct(Vec<String>),
}

/// Output of [`build`]: records in pair-index order plus broadcast diagnostics.
#[derive(Debug, Clone, Default)]
pub struct AlignedSeries {
    pub records: Vec<AlignedRecord>,
    pub broadcasts: Vec<Broadcast>,
}

/// Per-side resolution of a job's columns.
#[derive(Debug)]
struct SidePlan<'j> {
    side: Side,
    /// One entry per slot; repeated names when values are generalized.
    value_columns: Vec<&'j str>,
    metadata: Option<MetadataMode>,
    broadcast: Option<BroadcastKind>,
}

/// Build the aligned records for `job`.
pub fn build(
    job: &ResolutionJob,
    table_a: Option<&Table>,
    table_b: Option<&Table>,
    pairs: &PairIndex,
) -> Result<AlignedSeries, FuseError> {
    let table_a = table_a.ok_or(FuseError::MissingTable(Side::A))?;
    let table_b = table_b.ok_or(FuseError::MissingTable(Side::B))?;

    let label = job.label();
    let (plan_a, plan_b) = plan(job, &label)?;

    let mut broadcasts = Vec::new();
    for p in [&plan_a, &plan_b] {
        if let Some(kind) = p.broadcast {
            let declared = match p.side {
                Side::A => (job.values_a.len(), meta_len(&job.meta_a)),
                Side::B => (job.values_b.len(), meta_len(&job.meta_b)),
            };
            let (from, to) = match kind {
                BroadcastKind::Values => (declared.0, declared.1),
                BroadcastKind::Metadata => (declared.1, declared.0),
            };
            broadcasts.push(Broadcast { job: label.clone(), side: p.side, kind, from, to });
        }
    }

    let pos_a = table_a.positions(pairs.ids_a())?;
    let pos_b = table_b.positions(pairs.ids_b())?;

    let values_a = collect_values(table_a, &plan_a, &pos_a, job.transform_values.as_ref())?;
    let values_b = collect_values(table_b, &plan_b, &pos_b, job.transform_values.as_ref())?;
    let value_slots = values_a.concat(values_b);

    let meta_slots = match (&plan_a.metadata, &plan_b.metadata) {
        (Some(ma), Some(mb)) => {
            let tm = job.transform_metadata.as_ref();
            let a = collect_metadata(table_a, ma, plan_a.value_columns.len(), &pos_a, tm)?;
            let b = collect_metadata(table_b, mb, plan_b.value_columns.len(), &pos_b, tm)?;
            Some(a.concat(b))
        }
        _ => None,
    };

    let records = (0..pairs.len())
        .map(|i| AlignedRecord {
            position: i,
            values: value_slots.row(i),
            metadata: meta_slots.as_ref().map(|m| m.row(i)),
        })
        .collect();

    for b in &broadcasts {
        warn!("{b}");
    }
    Ok(AlignedSeries { records, broadcasts })
}

/// Table-independent checks of `build`: one-sided or malformed metadata,
/// empty column lists and opposite-direction broadcasts.
pub(crate) fn check(job: &ResolutionJob) -> Result<(), FuseError> {
    plan(job, &job.label()).map(|_| ())
}

fn meta_len(meta: &Option<MetaInput>) -> usize {
    match meta {
        Some(MetaInput::Columns(c)) => c.len(),
        Some(MetaInput::Constant(_)) => 1,
        None => 0,
    }
}

/// Validate the job and decide, per side, value slots and metadata mode.
fn plan<'j>(job: &'j ResolutionJob, label: &str) -> Result<(SidePlan<'j>, SidePlan<'j>), FuseError> {
    if job.values_a.is_empty() || job.values_b.is_empty() {
        return Err(FuseError::ConfigValidation(format!(
            "job '{label}': at least one value column is required on each side"
        )));
    }

    let (plan_a, plan_b) = match (&job.meta_a, &job.meta_b) {
        (None, None) => (
            SidePlan::values_only(Side::A, &job.values_a),
            SidePlan::values_only(Side::B, &job.values_b),
        ),
        (Some(ma), Some(mb)) => (
            plan_side(Side::A, &job.values_a, ma, job.static_metadata, label)?,
            plan_side(Side::B, &job.values_b, mb, job.static_metadata, label)?,
        ),
        _ => return Err(FuseError::OneSidedMetadata { job: label.to_string() }),
    };

    if let (Some(ka), Some(kb)) = (plan_a.broadcast, plan_b.broadcast) {
        if ka != kb {
            return Err(FuseError::ConfigValidation(format!(
                "job '{label}': side a and side b would broadcast in opposite directions \
                 ({ka:?} vs {kb:?}); declare matching column counts"
            )));
        }
    }

    Ok((plan_a, plan_b))
}

impl<'j> SidePlan<'j> {
    fn values_only(side: Side, values: &'j [String]) -> Self {
        Self {
            side,
            value_columns: values.iter().map(String::as_str).collect(),
            metadata: None,
            broadcast: None,
        }
    }
}

fn plan_side<'j>(
    side: Side,
    values: &'j [String],
    meta: &'j MetaInput,
    static_metadata: bool,
    label: &str,
) -> Result<SidePlan<'j>, FuseError> {
    let declared: Vec<&str> = values.iter().map(String::as_str).collect();

    if static_metadata {
        let constant = match meta {
            MetaInput::Constant(v) => v.clone(),
            MetaInput::Columns(names) if names.len() == 1 => Value::text(names[0].clone()),
            MetaInput::Columns(names) => {
                return Err(FuseError::ConfigValidation(format!(
                    "job '{label}': static metadata for side {side} must be a single constant, got {} names",
                    names.len()
                )))
            }
        };
        return Ok(SidePlan {
            side,
            value_columns: declared,
            metadata: Some(MetadataMode::Static(constant)),
            broadcast: None,
        });
    }

    let names = match meta {
        MetaInput::Columns(names) if !names.is_empty() => names,
        MetaInput::Columns(_) => {
            return Err(FuseError::ConfigValidation(format!(
                "job '{label}': empty metadata column list for side {side}"
            )))
        }
        MetaInput::Constant(_) => {
            return Err(FuseError::ConfigValidation(format!(
                "job '{label}': constant metadata for side {side} requires static metadata"
            )))
        }
    };

    let plan = if declared.len() < names.len() {
        SidePlan {
            side,
            value_columns: vec![declared[0]; names.len()],
            metadata: Some(MetadataMode::Direct(names.clone())),
            broadcast: Some(BroadcastKind::Values),
        }
    } else if declared.len() > names.len() {
        SidePlan {
            side,
            value_columns: declared,
            metadata: Some(MetadataMode::Generalized(names[0].clone())),
            broadcast: Some(BroadcastKind::Metadata),
        }
    } else {
        SidePlan {
            side,
            value_columns: declared,
            metadata: Some(MetadataMode::Direct(names.clone())),
            broadcast: None,
        }
    };
    Ok(plan)
}

/// Distinct column sequences plus a slot → sequence mapping. Broadcast slots
/// share one sequence instead of copying it.
#[derive(Debug, Default)]
struct Slots {
    sequences: Vec<Vec<Value>>,
    slots: Vec<usize>,
}

impl Slots {
    fn push_sequence(&mut self, seq: Vec<Value>, times: usize) {
        let idx = self.sequences.len();
        self.sequences.push(seq);
        self.slots.extend(std::iter::repeat(idx).take(times));
    }

    fn transform(&mut self, transform: Option<&Transform>) {
        if let Some(t) = transform {
            for seq in &mut self.sequences {
                for v in seq.iter_mut() {
                    *v = t.apply(v);
                }
            }
        }
    }

    /// A-side slots followed by B-side slots.
    fn concat(mut self, other: Slots) -> Slots {
        let offset = self.sequences.len();
        self.sequences.extend(other.sequences);
        self.slots.extend(other.slots.into_iter().map(|s| s + offset));
        self
    }

    fn row(&self, i: usize) -> Vec<Value> {
        self.slots.iter().map(|&s| self.sequences[s][i].clone()).collect()
    }
}

fn collect_values(
    table: &Table,
    plan: &SidePlan<'_>,
    positions: &[usize],
    transform: Option<&Transform>,
) -> Result<Slots, FuseError> {
    let mut slots = Slots::default();
    if plan.broadcast == Some(BroadcastKind::Values) {
        let column = plan.value_columns[0];
        slots.push_sequence(table.gather(column, positions)?, plan.value_columns.len());
    } else {
        for column in &plan.value_columns {
            slots.push_sequence(table.gather(column, positions)?, 1);
        }
    }
    slots.transform(transform);
    Ok(slots)
}

fn collect_metadata(
    table: &Table,
    mode: &MetadataMode,
    value_slots: usize,
    positions: &[usize],
    transform: Option<&Transform>,
) -> Result<Slots, FuseError> {
    let mut slots = Slots::default();
    match mode {
        MetadataMode::Static(constant) => {
            slots.push_sequence(vec![constant.clone(); positions.len()], value_slots);
        }
        MetadataMode::Generalized(column) => {
            slots.push_sequence(table.gather(column, positions)?, value_slots);
        }
        MetadataMode::Direct(columns) => {
            for column in columns {
                slots.push_sequence(table.gather(column, positions)?, 1);
            }
        }
    }
    slots.transform(transform);
    Ok(slots)
}
