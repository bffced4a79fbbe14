use thiserror::Error;

use crate::schema::{DatasetKind, Period};

/// Failure of a single HTTP attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl TransportError {
    /// 404 means the dataset was never published for the requested period.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status(404))
    }
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("failed to fetch {kind} data from {url} after {attempts} attempts: {source}")]
    Fetch {
        kind: DatasetKind,
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("no {kind} data published for {period}")]
    EmptyResult { kind: DatasetKind, period: Period },

    #[error("{kind} data did not match the expected layout: {detail}")]
    Schema { kind: DatasetKind, detail: String },

    #[error("none of the {rows} enrollment rows matched a {year} ratebook county")]
    JoinMismatch { rows: usize, year: u16 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl DashboardError {
    pub fn schema(kind: DatasetKind, detail: impl Into<String>) -> Self {
        DashboardError::Schema {
            kind,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
