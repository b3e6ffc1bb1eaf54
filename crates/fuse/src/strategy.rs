//! Conflict-resolution strategies.
//!
//! A strategy reduces one [`AlignedRecord`] plus the job's fixed parameters
//! to a single value. Built-ins skip missing candidates; a record with no
//! usable candidate resolves to [`Value::Empty`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::align::AlignedRecord;
use crate::error::FuseError;
use crate::value::Value;

/// Strategy call contract. Implementations must not depend on hidden state
/// if fused output is expected to be reproducible.
pub trait Resolve: Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, record: &AlignedRecord, params: &[Value]) -> Result<Value, FuseError>;
}

#[derive(Clone)]
pub enum Strategy {
    ChooseMax,
    ChooseMin,
    Longest,
    Shortest,
    ChooseFirst,
    ChooseLast,
    /// Plurality; ties go to the earliest candidate.
    Vote,
    /// The agreed value, or Empty when candidates disagree.
    NoGossip,
    /// Value whose metadata equals `params[0]`.
    Trust,
    /// Uniform pick. With a seed the pick depends only on (seed, pair position).
    ChooseRandom { seed: Option<u64> },
    MetadataMax,
    MetadataMin,
    Count,
    Group,
    AnnotatedConcat,
    /// Numeric aggregate named by `params[0]`.
    Metric,
    Custom(Arc<dyn Resolve>),
}

impl Strategy {
    pub fn from_name(name: &str) -> Result<Self, FuseError> {
        let s = match name {
            "choose_max" => Self::ChooseMax,
            "choose_min" => Self::ChooseMin,
            "longest" => Self::Longest,
            "shortest" => Self::Shortest,
            "choose_first" => Self::ChooseFirst,
            "choose_last" => Self::ChooseLast,
            "vote" => Self::Vote,
            "no_gossip" => Self::NoGossip,
            "trust" => Self::Trust,
            "choose_random" => Self::ChooseRandom { seed: None },
            "metadata_max" => Self::MetadataMax,
            "metadata_min" => Self::MetadataMin,
            "count" => Self::Count,
            "group" => Self::Group,
            "annotated_concat" => Self::AnnotatedConcat,
            "metric" => Self::Metric,
            other => {
                return Err(FuseError::ConfigValidation(format!("unknown strategy '{other}'")))
            }
        };
        Ok(s)
    }

    /// Wrap a user-defined strategy.
    pub fn custom(resolver: impl Resolve + 'static) -> Self {
        Self::Custom(Arc::new(resolver))
    }

    /// Wrap a closure as a named strategy.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&AlignedRecord, &[Value]) -> Result<Value, FuseError> + Send + Sync + 'static,
    {
        Self::custom(FnStrategy { name: name.into(), f })
    }
}

impl Resolve for Strategy {
    fn name(&self) -> &str {
        match self {
            Self::ChooseMax => "choose_max",
            Self::ChooseMin => "choose_min",
            Self::Longest => "longest",
            Self::Shortest => "shortest",
            Self::ChooseFirst => "choose_first",
            Self::ChooseLast => "choose_last",
            Self::Vote => "vote",
            Self::NoGossip => "no_gossip",
            Self::Trust => "trust",
            Self::ChooseRandom { .. } => "choose_random",
            Self::MetadataMax => "metadata_max",
            Self::MetadataMin => "metadata_min",
            Self::Count => "count",
            Self::Group => "group",
            Self::AnnotatedConcat => "annotated_concat",
            Self::Metric => "metric",
            Self::Custom(inner) => inner.name(),
        }
    }

    fn resolve(&self, record: &AlignedRecord, params: &[Value]) -> Result<Value, FuseError> {
        let name = self.name();
        match self {
            Self::Custom(inner) => inner.resolve(record, params),
            Self::Trust => {
                let trusted = single_param(name, params)?;
                let entries = entries_with_metadata(name, record)?;
                Ok(entries
                    .into_iter()
                    .find(|(_, m)| *m == trusted)
                    .map(|(v, _)| v.clone())
                    .unwrap_or_default())
            }
            Self::MetadataMax | Self::MetadataMin => {
                no_params(name, params)?;
                let entries = entries_with_metadata(name, record)?
                    .into_iter()
                    .filter(|(_, m)| !m.is_missing());
                // max_by_key keeps the last maximum; fold keeps the first
                let pick = entries.fold(None::<(&Value, &Value)>, |best, cur| match best {
                    None => Some(cur),
                    Some(b) => {
                        let better = if matches!(self, Self::MetadataMax) {
                            cur.1 > b.1
                        } else {
                            cur.1 < b.1
                        };
                        Some(if better { cur } else { b })
                    }
                });
                Ok(pick.map(|(v, _)| v.clone()).unwrap_or_default())
            }
            Self::AnnotatedConcat => {
                let sep = separator(name, params)?;
                let parts: Vec<String> = record
                    .entries()
                    .filter(|(v, _)| !v.is_missing())
                    .map(|(v, m)| match m {
                        Some(m) if !m.is_missing() => format!("{v} ({m})"),
                        _ => v.to_string(),
                    })
                    .collect();
                Ok(joined(parts, &sep))
            }
            Self::Group => {
                let sep = separator(name, params)?;
                let parts = distinct(present(record)).into_iter().map(|v| v.to_string()).collect();
                Ok(joined(parts, &sep))
            }
            Self::Metric => metric(name, params, record),
            Self::ChooseRandom { seed } => {
                no_params(name, params)?;
                let candidates: Vec<&Value> = present(record).collect();
                if candidates.is_empty() {
                    return Ok(Value::Empty);
                }
                let pick = match seed {
                    Some(seed) => {
                        let mix = (record.position as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                        StdRng::seed_from_u64(seed ^ mix).gen_range(0..candidates.len())
                    }
                    None => rand::thread_rng().gen_range(0..candidates.len()),
                };
                Ok(candidates[pick].clone())
            }
            _ => {
                no_params(name, params)?;
                Ok(self.reduce_values(record).unwrap_or_default())
            }
        }
    }
}

impl Strategy {
    /// Strategies that look at candidate values only.
    fn reduce_values(&self, record: &AlignedRecord) -> Option<Value> {
        let mut values = present(record);
        let picked = match self {
            Self::ChooseMax => values.max(),
            Self::ChooseMin => values.min(),
            Self::ChooseFirst => values.next(),
            Self::ChooseLast => values.last(),
            Self::Longest => values.fold(None::<&Value>, |best, v| match best {
                Some(b) if b.display_len() >= v.display_len() => Some(b),
                _ => Some(v),
            }),
            Self::Shortest => values.fold(None::<&Value>, |best, v| match best {
                Some(b) if b.display_len() <= v.display_len() => Some(b),
                _ => Some(v),
            }),
            Self::Vote => {
                let mut counts: HashMap<&Value, usize> = HashMap::new();
                let mut order = Vec::new();
                for v in values {
                    let c = counts.entry(v).or_insert(0);
                    if *c == 0 {
                        order.push(v);
                    }
                    *c += 1;
                }
                let mut best: Option<(&Value, usize)> = None;
                for v in order {
                    let c = counts[v];
                    if best.map_or(true, |(_, bc)| c > bc) {
                        best = Some((v, c));
                    }
                }
                best.map(|(v, _)| v)
            }
            Self::NoGossip => {
                let first = values.next()?;
                if values.all(|v| v == first) {
                    Some(first)
                } else {
                    None
                }
            }
            Self::Count => {
                let n = distinct(values).len();
                return Some(Value::number(n as f64));
            }
            _ => None,
        };
        picked.cloned()
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(inner) => f.debug_tuple("Custom").field(&inner.name()).finish(),
            Self::ChooseRandom { seed } => {
                f.debug_struct("ChooseRandom").field("seed", seed).finish()
            }
            other => f.write_str(other.name()),
        }
    }
}

struct FnStrategy<F> {
    name: String,
    f: F,
}

impl<F> Resolve for FnStrategy<F>
where
    F: Fn(&AlignedRecord, &[Value]) -> Result<Value, FuseError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, record: &AlignedRecord, params: &[Value]) -> Result<Value, FuseError> {
        (self.f)(record, params)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn present(record: &AlignedRecord) -> impl Iterator<Item = &Value> {
    record.values.iter().filter(|v| !v.is_missing())
}

fn distinct<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<&'a Value> {
    let mut seen = Vec::new();
    for v in values {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}

/// (value, metadata) for every non-missing value. Errors when the job
/// declared no metadata.
fn entries_with_metadata<'r>(
    name: &str,
    record: &'r AlignedRecord,
) -> Result<Vec<(&'r Value, &'r Value)>, FuseError> {
    let meta = record
        .metadata
        .as_ref()
        .ok_or_else(|| FuseError::strategy(name, "requires metadata"))?;
    Ok(record
        .values
        .iter()
        .zip(meta)
        .filter(|(v, _)| !v.is_missing())
        .collect())
}

fn no_params(name: &str, params: &[Value]) -> Result<(), FuseError> {
    if params.is_empty() {
        Ok(())
    } else {
        Err(FuseError::strategy(
            name,
            format!("takes no parameters, got {}", params.len()),
        ))
    }
}

fn single_param<'p>(name: &str, params: &'p [Value]) -> Result<&'p Value, FuseError> {
    match params {
        [p] => Ok(p),
        _ => Err(FuseError::strategy(
            name,
            format!("expects exactly 1 parameter, got {}", params.len()),
        )),
    }
}

fn separator(name: &str, params: &[Value]) -> Result<String, FuseError> {
    match params {
        [] => Ok(", ".to_string()),
        [Value::Text(s)] => Ok(s.clone()),
        [other] => Err(FuseError::strategy(
            name,
            format!("separator must be text, got '{other}'"),
        )),
        _ => Err(FuseError::strategy(
            name,
            format!("expects at most 1 parameter, got {}", params.len()),
        )),
    }
}

fn joined(parts: Vec<String>, sep: &str) -> Value {
    if parts.is_empty() {
        Value::Empty
    } else {
        Value::Text(parts.join(sep))
    }
}

fn metric(name: &str, params: &[Value], record: &AlignedRecord) -> Result<Value, FuseError> {
    let which = match single_param(name, params)? {
        Value::Text(s) => s.as_str(),
        other => {
            return Err(FuseError::strategy(name, format!("metric name must be text, got '{other}'")))
        }
    };

    let mut nums = Vec::new();
    for v in present(record) {
        let n = v
            .as_number()
            .ok_or_else(|| FuseError::strategy(name, format!("'{v}' is not numeric")))?;
        nums.push(n);
    }
    if nums.is_empty() {
        return Ok(Value::Empty);
    }

    let n = nums.len() as f64;
    let mean = nums.iter().sum::<f64>() / n;
    let variance = || {
        if nums.len() < 2 {
            None
        } else {
            Some(nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
        }
    };

    let result = match which {
        "sum" => Some(nums.iter().sum::<f64>()),
        "mean" => Some(mean),
        "min" => nums.iter().copied().reduce(f64::min),
        "max" => nums.iter().copied().reduce(f64::max),
        "median" => {
            let mut sorted = nums.clone();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            Some(if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            })
        }
        "variance" => variance(),
        "stdev" => variance().map(f64::sqrt),
        other => {
            return Err(FuseError::strategy(
                name,
                format!("unknown metric '{other}' (expected sum, mean, min, max, median, stdev or variance)"),
            ))
        }
    };
    Ok(result.map(Value::number).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(values: Vec<Value>) -> AlignedRecord {
        AlignedRecord { position: 0, values, metadata: None }
    }

    fn rec_meta(values: Vec<Value>, metadata: Vec<Value>) -> AlignedRecord {
        AlignedRecord { position: 0, values, metadata: Some(metadata) }
    }

    fn t(s: &str) -> Value {
        Value::text(s)
    }

    fn n(x: f64) -> Value {
        Value::number(x)
    }

    #[test]
    fn max_and_min_skip_missing() {
        let r = rec(vec![n(3.0), Value::Empty, n(7.0), n(f64::NAN)]);
        assert_eq!(Strategy::ChooseMax.resolve(&r, &[]).unwrap(), n(7.0));
        assert_eq!(Strategy::ChooseMin.resolve(&r, &[]).unwrap(), n(3.0));
    }

    #[test]
    fn all_missing_resolves_to_empty() {
        let r = rec(vec![Value::Empty, Value::Empty]);
        for s in [Strategy::ChooseMax, Strategy::Vote, Strategy::Longest, Strategy::NoGossip] {
            assert_eq!(s.resolve(&r, &[]).unwrap(), Value::Empty, "{}", s.name());
        }
    }

    #[test]
    fn longest_and_shortest_keep_first_on_tie() {
        let r = rec(vec![t("Jon"), t("John"), t("Joan")]);
        assert_eq!(Strategy::Longest.resolve(&r, &[]).unwrap(), t("John"));
        let r = rec(vec![t("Ann"), t("Bob"), t("Carla")]);
        assert_eq!(Strategy::Shortest.resolve(&r, &[]).unwrap(), t("Ann"));
    }

    #[test]
    fn first_and_last() {
        let r = rec(vec![Value::Empty, t("x"), t("y"), Value::Empty]);
        assert_eq!(Strategy::ChooseFirst.resolve(&r, &[]).unwrap(), t("x"));
        assert_eq!(Strategy::ChooseLast.resolve(&r, &[]).unwrap(), t("y"));
    }

    #[test]
    fn vote_plurality_and_tie() {
        let r = rec(vec![t("b"), t("a"), t("a"), t("b"), t("a")]);
        assert_eq!(Strategy::Vote.resolve(&r, &[]).unwrap(), t("a"));
        let tie = rec(vec![t("b"), t("a"), t("a"), t("b")]);
        assert_eq!(Strategy::Vote.resolve(&tie, &[]).unwrap(), t("b"));
    }

    #[test]
    fn no_gossip_refuses_on_conflict() {
        let agree = rec(vec![t("x"), Value::Empty, t("x")]);
        assert_eq!(Strategy::NoGossip.resolve(&agree, &[]).unwrap(), t("x"));
        let conflict = rec(vec![t("x"), t("y")]);
        assert_eq!(Strategy::NoGossip.resolve(&conflict, &[]).unwrap(), Value::Empty);
    }

    #[test]
    fn trust_picks_trusted_source() {
        let r = rec_meta(vec![t("Jon"), t("John")], vec![t("source_x"), t("source_y")]);
        assert_eq!(Strategy::Trust.resolve(&r, &[t("source_x")]).unwrap(), t("Jon"));
        assert_eq!(Strategy::Trust.resolve(&r, &[t("source_y")]).unwrap(), t("John"));
        assert_eq!(Strategy::Trust.resolve(&r, &[t("source_z")]).unwrap(), Value::Empty);
    }

    #[test]
    fn trust_needs_metadata_and_one_param() {
        let r = rec(vec![t("Jon")]);
        let err = Strategy::Trust.resolve(&r, &[t("a")]).unwrap_err();
        assert!(err.to_string().contains("requires metadata"));

        let r = rec_meta(vec![t("Jon")], vec![t("a")]);
        let err = Strategy::Trust.resolve(&r, &[]).unwrap_err();
        assert!(err.to_string().contains("exactly 1 parameter"));
    }

    #[test]
    fn metadata_max_picks_most_recent() {
        let r = rec_meta(
            vec![t("old"), t("new"), Value::Empty],
            vec![t("2020-01-01"), t("2023-05-01"), t("2024-01-01")],
        );
        assert_eq!(Strategy::MetadataMax.resolve(&r, &[]).unwrap(), t("new"));
        assert_eq!(Strategy::MetadataMin.resolve(&r, &[]).unwrap(), t("old"));
    }

    #[test]
    fn seeded_random_is_repeatable() {
        let r = rec(vec![t("a"), t("b"), t("c"), t("d")]);
        let s = Strategy::ChooseRandom { seed: Some(7) };
        let first = s.resolve(&r, &[]).unwrap();
        for _ in 0..10 {
            assert_eq!(s.resolve(&r, &[]).unwrap(), first);
        }
        assert!(r.values.contains(&first));
    }

    #[test]
    fn count_group_and_concat() {
        let r = rec_meta(
            vec![t("x"), t("y"), t("x"), Value::Empty],
            vec![t("a"), t("b"), Value::Empty, t("d")],
        );
        assert_eq!(Strategy::Count.resolve(&r, &[]).unwrap(), n(2.0));
        assert_eq!(Strategy::Group.resolve(&r, &[]).unwrap(), t("x, y"));
        assert_eq!(Strategy::Group.resolve(&r, &[t("|")]).unwrap(), t("x|y"));
        assert_eq!(
            Strategy::AnnotatedConcat.resolve(&r, &[]).unwrap(),
            t("x (a), y (b), x")
        );
    }

    #[test]
    fn metrics() {
        let r = rec(vec![n(1.0), n(2.0), t("3"), n(6.0)]);
        let m = |name: &str| Strategy::Metric.resolve(&r, &[t(name)]).unwrap();
        assert_eq!(m("sum"), n(12.0));
        assert_eq!(m("mean"), n(3.0));
        assert_eq!(m("median"), n(2.5));
        assert_eq!(m("min"), n(1.0));
        assert_eq!(m("max"), n(6.0));
        assert_eq!(m("variance"), n(14.0 / 3.0));

        let single = rec(vec![n(4.0)]);
        assert_eq!(Strategy::Metric.resolve(&single, &[t("stdev")]).unwrap(), Value::Empty);

        let bad = rec(vec![t("abc")]);
        assert!(Strategy::Metric.resolve(&bad, &[t("sum")]).is_err());
        assert!(Strategy::Metric.resolve(&r, &[t("mode")]).is_err());
    }

    #[test]
    fn extra_params_are_arity_errors() {
        let r = rec(vec![n(1.0)]);
        let err = Strategy::ChooseMax.resolve(&r, &[n(1.0)]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Strategy);
    }

    #[test]
    fn custom_strategy_via_closure() {
        let s = Strategy::from_fn("concat_all", |r, _| {
            Ok(Value::text(r.values.iter().map(|v| v.to_string()).collect::<String>()))
        });
        assert_eq!(s.name(), "concat_all");
        assert_eq!(s.resolve(&rec(vec![t("a"), t("b")]), &[]).unwrap(), t("ab"));
    }

    #[test]
    fn names_round_trip() {
        for name in ["choose_max", "vote", "trust", "choose_random", "metric", "no_gossip"] {
            assert_eq!(Strategy::from_name(name).unwrap().name(), name);
        }
        assert!(Strategy::from_name("pick_best").is_err());
    }
}
