use log::{debug, info};

use crate::align::Broadcast;
use crate::config::FuseConfig;
use crate::error::FuseError;
use crate::job::{output_names, ResolutionJob};
use crate::model::{FuseInput, FuseMeta, FuseReport, FusedColumn, FusedTable};
use crate::pairs::{PairIndex, PairVectors};
use crate::strategy::{Resolve, Strategy};
use crate::table::Table;
use crate::value::Value;
use crate::variant::{FusionContext, FusionVariant, LinkFusion};

/// Run the rules of `config` against pre-loaded input.
pub fn run(config: &FuseConfig, input: &FuseInput) -> Result<FuseReport, FuseError> {
    let mut engine = FusionEngine::new(config.variant()).parallel(config.options.parallel);
    for job in config.jobs()? {
        engine.queue(job);
    }

    let table = engine.fuse(
        &input.vectors,
        &input.table_a,
        &input.table_b,
        input.predictions.as_deref(),
        &config.options.suffix_a,
        &config.options.suffix_b,
    )?;

    Ok(FuseReport {
        meta: FuseMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            rows: table.len(),
            columns: table.columns.len(),
        },
        table,
    })
}

/// Parse the CSV contents named by `config` into a [`FuseInput`].
pub fn load_input(
    config: &FuseConfig,
    csv_a: &str,
    csv_b: &str,
    csv_links: &str,
) -> Result<FuseInput, FuseError> {
    let table_a = Table::from_csv("a", csv_a, &config.sources.a.id_column)?;
    let table_b = Table::from_csv("b", csv_b, &config.sources.b.id_column)?;
    let (index, predictions) = PairIndex::from_csv(
        csv_links,
        &config.links.column_a,
        &config.links.column_b,
        config.links.prediction_column.as_deref(),
    )?;
    Ok(FuseInput {
        table_a,
        table_b,
        vectors: PairVectors::new(index),
        predictions,
    })
}

/// Owns the resolution queue and runs it against a pair of tables.
///
/// The queue belongs to this engine alone; start a new engine for an
/// unrelated set of jobs.
pub struct FusionEngine<V: FusionVariant = LinkFusion> {
    variant: V,
    queue: Vec<ResolutionJob>,
    parallel: bool,
}

impl FusionEngine<LinkFusion> {
    /// Pairwise engine without refinement.
    pub fn links() -> Self {
        Self::new(LinkFusion::default())
    }
}

impl<V: FusionVariant> FusionEngine<V> {
    pub fn new(variant: V) -> Self {
        Self {
            variant,
            queue: Vec::new(),
            parallel: false,
        }
    }

    /// Resolve jobs on one scoped thread each. Output is identical to a
    /// sequential run.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    pub fn jobs(&self) -> &[ResolutionJob] {
        &self.queue
    }

    /// Append a job. Validation is deferred to alignment.
    pub fn queue(&mut self, job: ResolutionJob) -> &mut Self {
        self.queue.push(job);
        self
    }

    /// Take the value from the table tagged `trusted` ("a" or "b").
    pub fn trust_your_friends<A, B>(&mut self, values_a: A, values_b: B, trusted: &str) -> &mut Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.queue(
            ResolutionJob::new(Strategy::Trust, values_a, values_b)
                .static_metadata("a", "b")
                .param(trusted),
        )
    }

    /// Keep the value only when both tables agree.
    pub fn no_gossiping<A, B>(&mut self, values_a: A, values_b: B) -> &mut Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.queue(ResolutionJob::new(Strategy::NoGossip, values_a, values_b))
    }

    pub fn roll_the_dice<A, B>(&mut self, values_a: A, values_b: B) -> &mut Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.queue(ResolutionJob::new(
            Strategy::ChooseRandom { seed: None },
            values_a,
            values_b,
        ))
    }

    pub fn cry_with_the_wolves<A, B>(&mut self, values_a: A, values_b: B) -> &mut Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.queue(ResolutionJob::new(Strategy::Vote, values_a, values_b))
    }

    /// [`fuse`](Self::fuse) without predictions and with `_a` / `_b` suffixes.
    pub fn fuse_with_defaults(
        &self,
        vectors: &PairVectors,
        table_a: &Table,
        table_b: &Table,
    ) -> Result<FusedTable, FuseError> {
        self.fuse(vectors, table_a, table_b, None, "_a", "_b")
    }

    /// Run every queued job, in queue order, and assemble the fused table.
    pub fn fuse(
        &self,
        vectors: &PairVectors,
        table_a: &Table,
        table_b: &Table,
        predictions: Option<&[bool]>,
        suffix_a: &str,
        suffix_b: &str,
    ) -> Result<FusedTable, FuseError> {
        let names = output_names(&self.queue, suffix_a, suffix_b)?;

        let mut ctx = FusionContext {
            pairs: vectors.index.clone(),
            table_a: Some(table_a),
            table_b: Some(table_b),
            predictions,
            suffix_a,
            suffix_b,
        };
        self.variant.setup(&mut ctx)?;

        let resolved = if self.parallel && self.queue.len() > 1 {
            self.resolve_parallel(&ctx)
        } else {
            self.queue.iter().map(|job| self.resolve_job(job, &ctx)).collect()
        };

        let mut columns = Vec::with_capacity(self.queue.len());
        let mut broadcasts = Vec::new();
        for (name, result) in names.into_iter().zip(resolved) {
            let (values, mut job_broadcasts) = result?;
            broadcasts.append(&mut job_broadcasts);
            columns.push(FusedColumn { name, values });
        }

        info!(
            "{} fusion: {} job(s) over {} pair(s), {} broadcast(s)",
            self.variant.name(),
            columns.len(),
            ctx.pairs.len(),
            broadcasts.len()
        );

        Ok(FusedTable {
            pairs: ctx.pairs,
            columns,
            broadcasts,
        })
    }

    fn resolve_job(
        &self,
        job: &ResolutionJob,
        ctx: &FusionContext<'_>,
    ) -> Result<(Vec<Value>, Vec<Broadcast>), FuseError> {
        debug!("resolving '{}' with {}", job.label(), job.strategy.name());
        let series = self.variant.align(job, ctx)?;
        let values = series
            .records
            .iter()
            .map(|record| job.strategy.resolve(record, &job.params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((values, series.broadcasts))
    }

    fn resolve_parallel(
        &self,
        ctx: &FusionContext<'_>,
    ) -> Vec<Result<(Vec<Value>, Vec<Broadcast>), FuseError>> {
        std::thread::scope(|s| {
            let handles: Vec<_> = self
                .queue
                .iter()
                .map(|job| s.spawn(move || self.resolve_job(job, ctx)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }
}
