use thiserror::Error;

/// Error kinds surfaced by the query core. Each kind maps onto the status
/// code the transport layer reports for it; nothing below this enum leaks
/// stack traces or internal paths to callers.
#[derive(Debug, Error)]
pub enum Error {
    /// The upload id resolves to no completed dump.
    #[error("no dump for the requested upload id")]
    MissingDump,

    /// The cursor decoded but is unusable: unknown version, unknown phase
    /// tag, or missing fields.
    #[error("malformed cursor: {0}")]
    MalformedCursor(String),

    /// A bundle manager call failed on transport. Never retried.
    #[error("bundle manager unavailable: {0}")]
    BundleUnavailable(String),

    /// The metadata store failed after its single retry.
    #[error("metadata store unavailable: {0}")]
    StoreUnavailable(String),

    /// The bundle returned an id referencing data it does not contain.
    #[error("malformed bundle: {kind} {key} missing from {filename}")]
    MalformedBundle {
        filename: String,
        kind: String,
        key: String,
    },

    /// The request deadline was exceeded; any partial page is discarded.
    #[error("request deadline exceeded")]
    Cancelled,

    /// The request itself is unusable: unknown method or bad params.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingDump => 404,
            Error::MalformedCursor(_) => 400,
            Error::BundleUnavailable(_) => 502,
            Error::StoreUnavailable(_) => 503,
            Error::MalformedBundle { .. } => 500,
            Error::Cancelled => 499,
            Error::InvalidRequest(_) => 400,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::MissingDump => "missing_dump",
            Error::MalformedCursor(_) => "malformed_cursor",
            Error::BundleUnavailable(_) => "bundle_unavailable",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::MalformedBundle { .. } => "malformed_bundle",
            Error::Cancelled => "cancelled",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
