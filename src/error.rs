use thiserror::Error;

/// Page could not be retrieved, or the retrieved page lacks the markup we scrape.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read page snapshot: {0}")]
    Snapshot(#[source] std::io::Error),

    #[error("Expected markup missing: {0}")]
    MarkupMissing(String),
}

/// Date text that does not match the "abbreviated month, day, year" pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown month abbreviation '{month}' in '{input}'")]
    UnknownMonth { input: String, month: String },

    #[error("Invalid day in '{0}'")]
    InvalidDay(String),

    #[error("Invalid year in '{0}'")]
    InvalidYear(String),

    #[error("Expected 'Mon D, YYYY' but got '{0}'")]
    Malformed(String),

    #[error("No year can be inferred for '{0}'")]
    MissingYear(String),

    #[error("Date does not exist: '{0}'")]
    NonexistentDate(String),

    #[error("End date precedes start date in '{0}'")]
    EndBeforeStart(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("The file was not found: {0}")]
    MissingFile(String),

    #[error("Credentials not available")]
    MissingCredentials,

    #[error("Object storage rejected request: {message}")]
    Rejected { message: String },
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Instance {instance_id} did not reach running state within {waited_secs}s")]
    InstanceTimeout { instance_id: String, waited_secs: u64 },

    #[error("Compute API error: {message}")]
    Api { message: String },

    #[error("Remote command {command_id} not found")]
    CommandNotFound { command_id: String },
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Packaging failed: {0}")]
    Packaging(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
