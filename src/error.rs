use std::path::PathBuf;
use thiserror::Error;

/// Fetching the remote catalog failed. Fatal: without a catalog there is
/// nothing to iterate over.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog request returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("catalog response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog cache file error: {0}")]
    Cache(#[from] std::io::Error),
}

/// Scanning a local media directory failed. Fatal, same as `FetchError`.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("media directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read media directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog-level failure: the run cannot proceed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
}

/// Any failure that aborts a whole run before per-item processing starts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to reload completion ledger: {0}")]
    Ledger(#[from] SinkError),
}

/// Downloading one item's audio failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("download truncated: got {got} bytes, expected {expected}")]
    Truncated { got: u64, expected: u64 },

    #[error("local audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("audio file write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoding or trimming one item's audio failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to probe audio duration: {0}")]
    Probe(String),

    #[error("failed to trim audio: {0}")]
    Trim(String),

    #[error("trimmed artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The external transcription engine failed for one item.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription engine failed: {0}")]
    Engine(String),

    #[error("transcript store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The external analysis routine failed for one item.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Appending a row to the output report failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("report write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("report file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any per-item stage failure. Recoverable: the orchestrator logs it and
/// moves on to the next item.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ItemError {
    /// Pipeline stage name, for failure logging.
    pub fn stage(&self) -> &'static str {
        match self {
            ItemError::Download(_) => "download",
            ItemError::Decode(_) => "trim",
            ItemError::Transcription(_) => "transcribe",
            ItemError::Analysis(_) => "analyze",
            ItemError::Sink(_) => "report",
        }
    }
}
