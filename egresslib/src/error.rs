use std::result;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the egress handler and the collaborators it drives.
///
/// Classification happens where the error is created: infrastructure faults are wrapped in
/// [`Error::Fatal`], anything attributable to the egress request uses one of the other variants.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport, listener or topic registration failure. Never reported to the status service.
    #[error("fatal: {0}")]
    Fatal(#[source] BoxError),

    /// The request itself is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("egress not found")]
    NotFound,

    #[error("{what} timed out after {after:?}")]
    DeadlineExceeded { what: &'static str, after: Duration },

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("profiler error: {0}")]
    Profiler(String),

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("topic {0} already has a subscriber")]
    TopicTaken(String),

    #[error("no subscriber for topic {0}")]
    Unavailable(String),
}

impl Error {
    pub fn fatal<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Fatal(err.into())
    }

    /// Fatal errors are infrastructure faults: no job identity was usably established, so they
    /// propagate without a status report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

pub type Result<T> = result::Result<T, Error>;
