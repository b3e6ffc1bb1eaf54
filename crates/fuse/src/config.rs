use serde::Deserialize;

use crate::error::FuseError;
use crate::job::{output_names, MetaInput, ResolutionJob, Transform};
use crate::strategy::Strategy;
use crate::value::Value;
use crate::variant::LinkFusion;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FuseConfig {
    pub name: String,
    pub sources: SourcesConfig,
    pub links: LinksConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub resolve: Vec<ResolveConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub a: SourceConfig,
    pub b: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_id_column() -> String {
    "id".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinksConfig {
    pub file: String,
    #[serde(default = "default_column_a")]
    pub column_a: String,
    #[serde(default = "default_column_b")]
    pub column_b: String,
    /// Optional match/non-match label column (true/false or 1/0).
    #[serde(default)]
    pub prediction_column: Option<String>,
}

fn default_column_a() -> String {
    "id_a".into()
}

fn default_column_b() -> String {
    "id_b".into()
}

// ---------------------------------------------------------------------------
// Options + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OptionsConfig {
    #[serde(default)]
    pub unique_a: bool,
    #[serde(default)]
    pub unique_b: bool,
    #[serde(default = "default_suffix_a")]
    pub suffix_a: String,
    #[serde(default = "default_suffix_b")]
    pub suffix_b: String,
    #[serde(default)]
    pub parallel: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            unique_a: false,
            unique_b: false,
            suffix_a: default_suffix_a(),
            suffix_b: default_suffix_b(),
            parallel: false,
        }
    }
}

fn default_suffix_a() -> String {
    "_a".into()
}

fn default_suffix_b() -> String {
    "_b".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolution rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Columns {
    One(String),
    Many(Vec<String>),
}

impl Columns {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(c) => vec![c],
            Self::Many(c) => c,
        }
    }
}

/// `meta_a = ["updated"]` names columns; `meta_a = "crm"` names a column,
/// or the constant itself when `static_meta = true`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetaConfig {
    Many(Vec<String>),
    Scalar(Value),
}

impl MetaConfig {
    fn into_input(self, static_meta: bool) -> MetaInput {
        match self {
            Self::Many(columns) => MetaInput::Columns(columns),
            Self::Scalar(Value::Text(s)) if !static_meta => MetaInput::Columns(vec![s]),
            Self::Scalar(v) => MetaInput::Constant(v),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub strategy: String,
    pub values_a: Columns,
    pub values_b: Columns,
    #[serde(default)]
    pub meta_a: Option<MetaConfig>,
    #[serde(default)]
    pub meta_b: Option<MetaConfig>,
    #[serde(default)]
    pub static_meta: bool,
    #[serde(default)]
    pub transform_values: Option<String>,
    #[serde(default)]
    pub transform_meta: Option<String>,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ResolveConfig {
    pub fn to_job(&self) -> Result<ResolutionJob, FuseError> {
        let strategy = match (Strategy::from_name(&self.strategy)?, self.seed) {
            (Strategy::ChooseRandom { .. }, seed) => Strategy::ChooseRandom { seed },
            (_, Some(_)) => {
                return Err(FuseError::ConfigValidation(format!(
                    "strategy '{}': seed is only valid for choose_random",
                    self.strategy
                )))
            }
            (s, None) => s,
        };

        let mut job = ResolutionJob::new(
            strategy,
            self.values_a.clone().into_vec(),
            self.values_b.clone().into_vec(),
        )
        .params(self.params.clone())
        .static_flag(self.static_meta);

        job.meta_a = self.meta_a.clone().map(|m| m.into_input(self.static_meta));
        job.meta_b = self.meta_b.clone().map(|m| m.into_input(self.static_meta));

        if let Some(ref name) = self.name {
            job = job.named(name.clone());
        }
        if let Some(ref t) = self.transform_values {
            job = job.transform_values(Transform::named(t)?);
        }
        if let Some(ref t) = self.transform_meta {
            job = job.transform_metadata(Transform::named(t)?);
        }
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl FuseConfig {
    pub fn from_toml(input: &str) -> Result<Self, FuseError> {
        let config: FuseConfig =
            toml::from_str(input).map_err(|e| FuseError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FuseError> {
        if self.resolve.is_empty() {
            return Err(FuseError::ConfigValidation(
                "at least one [[resolve]] rule is required".into(),
            ));
        }

        let mut jobs = Vec::with_capacity(self.resolve.len());
        for (i, rule) in self.resolve.iter().enumerate() {
            let job = rule.to_job().map_err(|e| numbered(i, e))?;
            if job.values_a.is_empty() || job.values_b.is_empty() {
                return Err(FuseError::ConfigValidation(format!(
                    "resolve #{}: values_a and values_b must name at least one column",
                    i + 1
                )));
            }
            if job.meta_a.is_some() != job.meta_b.is_some() {
                return Err(FuseError::OneSidedMetadata { job: job.label() });
            }
            job.check().map_err(|e| numbered(i, e))?;
            jobs.push(job);
        }

        output_names(&jobs, &self.options.suffix_a, &self.options.suffix_b)?;
        Ok(())
    }

    pub fn jobs(&self) -> Result<Vec<ResolutionJob>, FuseError> {
        self.resolve.iter().map(ResolveConfig::to_job).collect()
    }

    pub fn variant(&self) -> LinkFusion {
        LinkFusion::new(self.options.unique_a, self.options.unique_b)
    }
}

/// Prefix a validation message with the 1-based rule number.
fn numbered(i: usize, err: FuseError) -> FuseError {
    match err {
        FuseError::ConfigValidation(msg) => {
            FuseError::ConfigValidation(format!("resolve #{}: {msg}", i + 1))
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
