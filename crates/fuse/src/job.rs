use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::FuseError;
use crate::strategy::{Resolve, Strategy};
use crate::value::Value;

/// Which source table a column or metadata slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "a"),
            Self::B => write!(f, "b"),
        }
    }
}

/// Metadata as supplied for one side of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaInput {
    /// Per-record metadata read from these columns.
    Columns(Vec<String>),
    /// One literal used for every pair. Requires `static_metadata`.
    Constant(Value),
}

impl From<&str> for MetaInput {
    fn from(column: &str) -> Self {
        MetaInput::Columns(vec![column.to_string()])
    }
}

impl From<String> for MetaInput {
    fn from(column: String) -> Self {
        MetaInput::Columns(vec![column])
    }
}

impl From<Vec<&str>> for MetaInput {
    fn from(columns: Vec<&str>) -> Self {
        MetaInput::Columns(columns.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for MetaInput {
    fn from(columns: Vec<String>) -> Self {
        MetaInput::Columns(columns)
    }
}

impl From<Value> for MetaInput {
    fn from(value: Value) -> Self {
        MetaInput::Constant(value)
    }
}

type TransformFn = dyn Fn(&Value) -> Value + Send + Sync;

/// Elementwise value or metadata transform, applied before tupling.
#[derive(Clone)]
pub struct Transform {
    name: String,
    f: Arc<TransformFn>,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self { name: name.into(), f: Arc::new(f) }
    }

    /// Look up a built-in transform by name.
    pub fn named(name: &str) -> Result<Self, FuseError> {
        let t = match name {
            "trim" => Self::new(name, |v| match v {
                Value::Text(s) => Value::text(s.trim()),
                other => other.clone(),
            }),
            "lower" => Self::new(name, |v| match v {
                Value::Text(s) => Value::text(s.to_lowercase()),
                other => other.clone(),
            }),
            "upper" => Self::new(name, |v| match v {
                Value::Text(s) => Value::text(s.to_uppercase()),
                other => other.clone(),
            }),
            "number" => Self::new(name, |v| v.as_number().map(Value::number).unwrap_or_default()),
            "length" => Self::new(name, |v| {
                if v.is_missing() {
                    Value::Empty
                } else {
                    Value::number(v.display_len() as f64)
                }
            }),
            "year" => Self::new(name, |v| {
                v.as_text()
                    .and_then(|s| s.trim().get(..10))
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    .map(|d| Value::number(d.year() as f64))
                    .unwrap_or_default()
            }),
            other => {
                return Err(FuseError::ConfigValidation(format!(
                    "unknown transform '{other}' (expected trim, lower, upper, number, length or year)"
                )))
            }
        };
        Ok(t)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: &Value) -> Value {
        (self.f)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}

/// Recipe for one output attribute: which columns feed it, which metadata
/// guides it, and which strategy resolves conflicts.
///
/// Nothing is validated here. Alignment checks the job against the actual
/// tables when it runs.
#[derive(Debug, Clone)]
pub struct ResolutionJob {
    pub strategy: Strategy,
    pub values_a: Vec<String>,
    pub values_b: Vec<String>,
    pub meta_a: Option<MetaInput>,
    pub meta_b: Option<MetaInput>,
    pub transform_values: Option<Transform>,
    pub transform_metadata: Option<Transform>,
    pub static_metadata: bool,
    pub params: Vec<Value>,
    pub name: Option<String>,
}

impl ResolutionJob {
    pub fn new<A, B>(strategy: Strategy, values_a: A, values_b: B) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            strategy,
            values_a: values_a.into_iter().map(Into::into).collect(),
            values_b: values_b.into_iter().map(Into::into).collect(),
            meta_a: None,
            meta_b: None,
            transform_values: None,
            transform_metadata: None,
            static_metadata: false,
            params: Vec::new(),
            name: None,
        }
    }

    /// Per-record metadata columns for both sides.
    pub fn metadata(mut self, meta_a: impl Into<MetaInput>, meta_b: impl Into<MetaInput>) -> Self {
        self.meta_a = Some(meta_a.into());
        self.meta_b = Some(meta_b.into());
        self
    }

    pub fn meta_a(mut self, meta: impl Into<MetaInput>) -> Self {
        self.meta_a = Some(meta.into());
        self
    }

    pub fn meta_b(mut self, meta: impl Into<MetaInput>) -> Self {
        self.meta_b = Some(meta.into());
        self
    }

    /// Constant metadata: every slot on side A carries `meta_a`, every slot
    /// on side B carries `meta_b`, for every pair.
    pub fn static_metadata(mut self, meta_a: impl Into<Value>, meta_b: impl Into<Value>) -> Self {
        self.meta_a = Some(MetaInput::Constant(meta_a.into()));
        self.meta_b = Some(MetaInput::Constant(meta_b.into()));
        self.static_metadata = true;
        self
    }

    /// Mark already-set metadata as static (a single column name is then
    /// read as the literal constant).
    pub fn static_flag(mut self, static_metadata: bool) -> Self {
        self.static_metadata = static_metadata;
        self
    }

    pub fn transform_values(mut self, transform: Transform) -> Self {
        self.transform_values = Some(transform);
        self
    }

    pub fn transform_metadata(mut self, transform: Transform) -> Self {
        self.transform_metadata = Some(transform);
        self
    }

    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Output column name: the explicit name, else the shared source column
    /// name, else both first columns with their table suffixes.
    pub fn output_name(&self, suffix_a: &str, suffix_b: &str) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        match (self.values_a.first(), self.values_b.first()) {
            (Some(a), Some(b)) if a == b => a.clone(),
            (Some(a), Some(b)) => format!("{a}{suffix_a}_{b}{suffix_b}"),
            (Some(a), None) => format!("{a}{suffix_a}"),
            (None, Some(b)) => format!("{b}{suffix_b}"),
            (None, None) => self.strategy.name().to_string(),
        }
    }

    /// Validate the job against everything that does not need the tables.
    pub fn check(&self) -> Result<(), FuseError> {
        crate::align::check(self)
    }

    /// Short label for diagnostics.
    pub fn label(&self) -> String {
        self.output_name("_a", "_b")
    }
}

/// Output column names for a queue, in queue order.
///
/// Names set with [`ResolutionJob::named`] must be unique. A default name
/// that is already taken gets a positional suffix: `name`, `name_2`, ...
pub fn output_names(
    jobs: &[ResolutionJob],
    suffix_a: &str,
    suffix_b: &str,
) -> Result<Vec<String>, FuseError> {
    let mut taken = HashSet::new();
    for name in jobs.iter().filter_map(|job| job.name.as_deref()) {
        if !taken.insert(name.to_string()) {
            return Err(FuseError::ConfigValidation(format!(
                "duplicate output column '{name}'"
            )));
        }
    }

    let mut names = Vec::with_capacity(jobs.len());
    for job in jobs {
        let name = match job.name {
            Some(ref name) => name.clone(),
            None => {
                let base = job.output_name(suffix_a, suffix_b);
                let mut candidate = base.clone();
                let mut n = 2;
                while !taken.insert(candidate.clone()) {
                    candidate = format!("{base}_{n}");
                    n += 1;
                }
                candidate
            }
        };
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_columns() {
        let job = ResolutionJob::new(Strategy::Vote, ["first", "last"], vec!["full".to_string()])
            .metadata(vec!["t1", "t2"], "ts")
            .param(3.0);
        assert_eq!(job.values_a, vec!["first", "last"]);
        assert_eq!(job.values_b, vec!["full"]);
        assert_eq!(
            job.meta_a,
            Some(MetaInput::Columns(vec!["t1".into(), "t2".into()]))
        );
        assert_eq!(job.meta_b, Some(MetaInput::Columns(vec!["ts".into()])));
        assert!(!job.static_metadata);
        assert_eq!(job.params, vec![Value::number(3.0)]);
    }

    #[test]
    fn static_metadata_sets_constants() {
        let job = ResolutionJob::new(Strategy::Trust, ["name"], ["name"])
            .static_metadata("source_x", "source_y");
        assert!(job.static_metadata);
        assert_eq!(job.meta_a, Some(MetaInput::Constant(Value::text("source_x"))));
    }

    #[test]
    fn output_name_choices() {
        let same = ResolutionJob::new(Strategy::Vote, ["name"], ["name"]);
        assert_eq!(same.output_name("_a", "_b"), "name");

        let differ = ResolutionJob::new(Strategy::Vote, ["surname"], ["last_name"]);
        assert_eq!(differ.output_name("_l", "_r"), "surname_l_last_name_r");

        let named = differ.named("family");
        assert_eq!(named.output_name("_a", "_b"), "family");
    }

    #[test]
    fn output_name_without_columns_uses_strategy() {
        let job = ResolutionJob::new(Strategy::Count, Vec::<String>::new(), Vec::<String>::new());
        assert_eq!(job.output_name("_a", "_b"), "count");
    }

    #[test]
    fn default_names_get_positional_suffix() {
        let jobs = vec![
            ResolutionJob::new(Strategy::Trust, ["name"], ["name"]),
            ResolutionJob::new(Strategy::Vote, ["name"], ["name"]),
            ResolutionJob::new(Strategy::Count, ["city"], ["city"]).named("name_2"),
            ResolutionJob::new(Strategy::Longest, ["name"], ["name"]),
        ];
        let names = output_names(&jobs, "_a", "_b").unwrap();
        assert_eq!(names, vec!["name", "name_3", "name_2", "name_4"]);
    }

    #[test]
    fn explicit_duplicate_names_rejected() {
        let jobs = vec![
            ResolutionJob::new(Strategy::Vote, ["name"], ["name"]).named("who"),
            ResolutionJob::new(Strategy::Vote, ["city"], ["city"]).named("who"),
        ];
        let err = output_names(&jobs, "_a", "_b").unwrap_err();
        assert!(err.to_string().contains("duplicate output column 'who'"));
    }

    #[test]
    fn builtin_transforms() {
        let trim = Transform::named("trim").unwrap();
        assert_eq!(trim.apply(&Value::text("  Jon ")), Value::text("Jon"));
        assert_eq!(trim.apply(&Value::number(2.0)), Value::number(2.0));

        let number = Transform::named("number").unwrap();
        assert_eq!(number.apply(&Value::text(" 12.5")), Value::number(12.5));
        assert_eq!(number.apply(&Value::text("n/a")), Value::Empty);

        let year = Transform::named("year").unwrap();
        assert_eq!(year.apply(&Value::text("2021-06-30T10:00:00")), Value::number(2021.0));
        assert_eq!(year.apply(&Value::text("June")), Value::Empty);

        let length = Transform::named("length").unwrap();
        assert_eq!(length.apply(&Value::text("John")), Value::number(4.0));
        assert_eq!(length.apply(&Value::Empty), Value::Empty);
    }

    #[test]
    fn unknown_transform_is_config_error() {
        let err = Transform::named("shout").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("unknown transform 'shout'"));
    }
}
