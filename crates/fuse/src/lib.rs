//! `visigrid-fuse`: pairwise data fusion engine.
//!
//! Pure engine crate: receives pre-loaded tables and the pair index from an
//! entity-matching step, returns one resolved column per queued job.
//! No CLI dependencies.

pub mod align;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod model;
pub mod pairs;
pub mod strategy;
pub mod table;
pub mod value;
pub mod variant;

pub use align::{AlignedRecord, AlignedSeries, Broadcast, BroadcastKind, MetadataMode};
pub use config::FuseConfig;
pub use engine::{load_input, run, FusionEngine};
pub use error::{ErrorKind, FuseError};
pub use job::{output_names, MetaInput, ResolutionJob, Side, Transform};
pub use model::{FuseInput, FuseMeta, FuseReport, FusedColumn, FusedTable};
pub use pairs::{Pair, PairIndex, PairVectors};
pub use strategy::{Resolve, Strategy};
pub use table::Table;
pub use value::Value;
pub use variant::{ClusterFusion, FusionContext, FusionVariant, LinkFusion};
