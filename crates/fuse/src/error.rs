use std::fmt;

use crate::job::Side;

/// Broad classification of a [`FuseError`], used by callers that only care
/// whether to fix the job definition, the input data, or a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Lookup,
    Strategy,
    Io,
}

#[derive(Debug)]
pub enum FuseError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config or job validation error (bad transform, ambiguous broadcast, etc.).
    ConfigValidation(String),
    /// A source table was not supplied to the run.
    MissingTable(Side),
    /// Metadata was given for one side but not the other.
    OneSidedMetadata { job: String },
    /// A declared column does not exist in its source table.
    MissingColumn { table: String, column: String },
    /// A pair references a record id absent from its source table.
    MissingRecord { table: String, record_id: String },
    /// The same record id appears twice in a source table.
    DuplicateRecord { table: String, record_id: String },
    /// A strategy function failed for one pair.
    Strategy { strategy: String, message: String },
    /// The fusion variant does not implement the requested operation.
    Unsupported(String),
    /// IO error (file read, CSV decode, etc.).
    Io(String),
}

impl FuseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigParse(_)
            | Self::ConfigValidation(_)
            | Self::MissingTable(_)
            | Self::OneSidedMetadata { .. }
            | Self::Unsupported(_) => ErrorKind::Configuration,
            Self::MissingColumn { .. }
            | Self::MissingRecord { .. }
            | Self::DuplicateRecord { .. } => ErrorKind::Lookup,
            Self::Strategy { .. } => ErrorKind::Strategy,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn strategy(strategy: &str, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FuseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingTable(side) => write!(f, "source table {side} is missing"),
            Self::OneSidedMetadata { job } => {
                write!(f, "job '{job}': metadata was given for one table but not the other")
            }
            Self::MissingColumn { table, column } => {
                write!(f, "table '{table}': missing column '{column}'")
            }
            Self::MissingRecord { table, record_id } => {
                write!(f, "table '{table}': no record with id '{record_id}'")
            }
            Self::DuplicateRecord { table, record_id } => {
                write!(f, "table '{table}': duplicate record id '{record_id}'")
            }
            Self::Strategy { strategy, message } => {
                write!(f, "strategy '{strategy}' failed: {message}")
            }
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for FuseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_error_policy() {
        assert_eq!(FuseError::MissingTable(Side::A).kind(), ErrorKind::Configuration);
        assert_eq!(
            FuseError::OneSidedMetadata { job: "x".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            FuseError::MissingColumn { table: "a".into(), column: "c".into() }.kind(),
            ErrorKind::Lookup
        );
        assert_eq!(FuseError::strategy("trust", "boom").kind(), ErrorKind::Strategy);
    }

    #[test]
    fn display_names_the_column() {
        let err = FuseError::MissingColumn { table: "b".into(), column: "email".into() };
        assert_eq!(err.to_string(), "table 'b': missing column 'email'");
    }
}
