//! Error and diagnostic types for the provider and the reconcile engine

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Provider result type
pub type Result<T> = std::result::Result<T, Error>;

/// A user-facing problem report: a short summary, a detail sentence and the
/// attribute it concerns, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Prefix the attribute path, e.g. with the owning resource address.
    pub fn within(mut self, prefix: &str) -> Self {
        self.attribute = Some(match self.attribute.take() {
            Some(attr) => format!("{}.{}", prefix, attr),
            None => prefix.to_string(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.detail)?;
        if let Some(attr) = &self.attribute {
            write!(f, " (at {})", attr)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("error making request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a status the operation does not accept.
    #[error("unexpected status code: {status}. Response body: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("error decoding JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider configuration failed (token exchange or organization lookup).
    #[error("{summary}: {source}")]
    Session {
        summary: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A single fatal diagnostic raised by a resource or data source.
    #[error("{0}")]
    Diagnostic(Diagnostic),

    /// Configuration rejected before any API call was made.
    #[error("{}", join_diagnostics(.0))]
    Invalid(Vec<Diagnostic>),

    #[error("manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("state file {path}: {message}")]
    State { path: PathBuf, message: String },

    /// An operation on one resource failed; earlier steps are already persisted.
    #[error("{address}: {source}")]
    Resource {
        address: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn diagnostic(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Diagnostic(Diagnostic::error(summary, detail))
    }

    pub fn invalid(diagnostic: Diagnostic) -> Self {
        Self::Invalid(vec![diagnostic])
    }

    pub fn at(address: impl fmt::Display, source: Error) -> Self {
        Self::Resource {
            address: address.to_string(),
            source: Box::new(source),
        }
    }

    /// HTTP status carried by the error, looking through wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Session { source, .. } | Self::Resource { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Configuration errors caught before touching the API.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Invalid(_) | Self::Manifest { .. } => true,
            Self::Resource { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// Flatten into diagnostics for reporting alongside others.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Self::Invalid(diags) => diags,
            Self::Diagnostic(diag) => vec![diag],
            other => vec![Diagnostic::error("Error", other.to_string())],
        }
    }

    /// Network failures and rejected credentials.
    pub fn is_transport_or_auth(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Session { .. } => true,
            Self::UnexpectedStatus { status, .. } => matches!(status, 401 | 403 | 407),
            Self::Resource { source, .. } => source.is_transport_or_auth(),
            _ => false,
        }
    }
}

fn join_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
