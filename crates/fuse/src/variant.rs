//! Fusion variants: how a run prepares its pair index and how a job's
//! aligned records are built.

use std::collections::HashSet;

use log::debug;

use crate::align::{self, AlignedSeries};
use crate::error::FuseError;
use crate::job::ResolutionJob;
use crate::pairs::PairIndex;
use crate::table::Table;

/// Inputs of one fusion run. Lives only for the duration of `fuse`.
#[derive(Debug)]
pub struct FusionContext<'a> {
    /// Output row index. Variants may refine it during setup.
    pub pairs: PairIndex,
    pub table_a: Option<&'a Table>,
    pub table_b: Option<&'a Table>,
    /// Match/non-match label per input pair.
    pub predictions: Option<&'a [bool]>,
    pub suffix_a: &'a str,
    pub suffix_b: &'a str,
}

pub trait FusionVariant: Send + Sync {
    fn name(&self) -> &str;

    /// Run-level preparation before any job is resolved.
    fn setup(&self, ctx: &mut FusionContext<'_>) -> Result<(), FuseError>;

    /// Aligned records for one job, in `ctx.pairs` order.
    fn align(&self, job: &ResolutionJob, ctx: &FusionContext<'_>) -> Result<AlignedSeries, FuseError>;
}

/// Pairwise fusion of record links.
#[derive(Debug, Clone, Default)]
pub struct LinkFusion {
    /// Keep only the first pair per side-A record.
    pub unique_a: bool,
    /// Keep only the first pair per side-B record.
    pub unique_b: bool,
}

impl LinkFusion {
    pub fn new(unique_a: bool, unique_b: bool) -> Self {
        Self { unique_a, unique_b }
    }

    fn refine(&self, pairs: &PairIndex, predictions: Option<&[bool]>) -> Result<PairIndex, FuseError> {
        if let Some(labels) = predictions {
            if labels.len() != pairs.len() {
                return Err(FuseError::ConfigValidation(format!(
                    "{} predictions for {} pairs",
                    labels.len(),
                    pairs.len()
                )));
            }
        }

        let mut seen_a = HashSet::new();
        let mut seen_b = HashSet::new();

        let refined = pairs
            .iter()
            .enumerate()
            .filter(|(i, _)| predictions.map_or(true, |labels| labels[*i]))
            .filter(|(_, p)| !self.unique_a || seen_a.insert(p.a.as_str()))
            .filter(|(_, p)| !self.unique_b || seen_b.insert(p.b.as_str()))
            .map(|(_, p)| p.clone())
            .collect();
        Ok(refined)
    }
}

impl FusionVariant for LinkFusion {
    fn name(&self) -> &str {
        "links"
    }

    fn setup(&self, ctx: &mut FusionContext<'_>) -> Result<(), FuseError> {
        let before = ctx.pairs.len();
        ctx.pairs = self.refine(&ctx.pairs, ctx.predictions)?;
        if ctx.pairs.len() != before {
            debug!("refinement kept {} of {before} pairs", ctx.pairs.len());
        }
        Ok(())
    }

    fn align(&self, job: &ResolutionJob, ctx: &FusionContext<'_>) -> Result<AlignedSeries, FuseError> {
        align::build(job, ctx.table_a, ctx.table_b, &ctx.pairs)
    }
}

/// Fusion over clusters of more than two records. Not implemented yet: the
/// contracts are the pairwise ones applied to n-ary groups.
#[derive(Debug, Clone)]
pub struct ClusterFusion {
    pub method: String,
}

impl ClusterFusion {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into() }
    }
}

impl FusionVariant for ClusterFusion {
    fn name(&self) -> &str {
        "clusters"
    }

    fn setup(&self, _ctx: &mut FusionContext<'_>) -> Result<(), FuseError> {
        Err(FuseError::Unsupported(format!(
            "cluster fusion (method '{}')",
            self.method
        )))
    }

    fn align(&self, _job: &ResolutionJob, _ctx: &FusionContext<'_>) -> Result<AlignedSeries, FuseError> {
        Err(FuseError::Unsupported("cluster alignment".into()))
    }
}
