use thiserror::Error;

/// Failure taxonomy shared by the store seams, the reconciliation engine and
/// the settings migrator.
///
/// Ambiguous matches are not errors: the matcher resolves them with
/// its first-bucket, first-hit policy and never reports them as errors.
#[derive(Debug, Error)]
pub enum OpsError {
    /// A call to the relational store or blob store failed (network, auth, quota).
    #[error("transport error during {op}: {message}")]
    Transport { op: String, message: String },

    /// A referenced table, bucket or row does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Malformed input: bad identifier, empty display name or filename.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl OpsError {
    pub fn transport(op: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            op: op.into(),
            message: err.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row", "query returned no rows"),
            other => Self::transport("sql", other),
        }
    }
}

impl From<reqwest::Error> for OpsError {
    fn from(err: reqwest::Error) -> Self {
        let op = err
            .url()
            .map(|u| format!("http {}", u.path()))
            .unwrap_or_else(|| "http".to_string());
        Self::transport(op, err)
    }
}

pub type OpsResult<T> = std::result::Result<T, OpsError>;
