use thiserror::Error;

use crate::database_ops::records::TaxonomyKind;

/// Longest slice of a remote error body kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 512;

/// Failures surfaced by the population pipeline.
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote api {url} failed (status {status:?}): {detail}")]
    RemoteApi {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PopulateError {
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    /// Non-success HTTP status; the body is truncated before it is kept.
    pub fn status(url: &str, status: u16, body: &str) -> Self {
        Self::RemoteApi {
            url: url.to_string(),
            status: Some(status),
            detail: truncate_body(body),
        }
    }

    /// Successful response whose payload could not be decoded.
    pub fn malformed(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::RemoteApi {
            url: url.to_string(),
            status: None,
            detail: format!("malformed payload: {reason}"),
        }
    }

    /// HTTP status carried by the error, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => *status,
            Self::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failures raised by a [`crate::database_ops::store::RecordStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("store rejected {operation} (status {status}): {detail}")]
    Rejected {
        operation: String,
        status: u16,
        detail: String,
    },

    #[error("store returned an unexpected payload for {operation}: {detail}")]
    Payload { operation: String, detail: String },

    #[error("{kind} slug '{slug}' requested by '{requested}' already belongs to '{existing}'")]
    SlugConflict {
        kind: TaxonomyKind,
        slug: String,
        requested: String,
        existing: String,
    },

    #[error("{kind} '{name}' conflicted {attempts} times without becoming readable")]
    ConflictRetriesExhausted {
        kind: TaxonomyKind,
        name: String,
        attempts: u32,
    },

    #[error("store rejected {entity} '{name}': {reason}")]
    Refused {
        entity: String,
        name: String,
        reason: String,
    },
}

pub(crate) fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_truncates_long_bodies() {
        let body = "x".repeat(2000);
        let err = PopulateError::status("https://example.test", 500, &body);
        match err {
            PopulateError::RemoteApi { detail, status, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(detail.len(), ERROR_BODY_LIMIT + 3);
                assert!(detail.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn http_status_reads_remote_api_errors() {
        let err = PopulateError::status("https://example.test/a.jpg", 404, "not found");
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(PopulateError::Parse("x".into()).http_status(), None);
    }
}
