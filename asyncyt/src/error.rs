use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{name} binary not found and provisioning is disabled")]
    BinaryNotFound { name: String },

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("could not resolve {url}: {reason}")]
    Resolution { url: String, reason: String },

    #[error("{} failed ({}): {stderr_tail}", program.display(), exit_description(*code, *signal))]
    Process {
        program: PathBuf,
        code: Option<i32>,
        signal: Option<i32>,
        stderr_tail: String
    },

    #[error("{} timed out after {timeout:?}", program.display())]
    Timeout { program: PathBuf, timeout: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to parse JSON output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download of {url} finished but produced no output file")]
    MissingOutput { url: String },

    #[error("playlist is empty")]
    EmptyPlaylist
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn exit_description(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "unknown exit status".to_string()
    }
}

/// Failures while installing a pinned executable.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("no {name} build is available for this platform")]
    UnsupportedPlatform { name: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error
    },

    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String
    },

    #[error("no checksum for {asset} in {url}")]
    ChecksumUnavailable { asset: String, url: String },

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive for {name} has no member named {member}")]
    MissingArchiveMember { name: String, member: String },

    #[error("provisioning i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("installed {} does not run", path.display())]
    NotRunnable { path: PathBuf }
}

pub type Result<T> = std::result::Result<T, Error>;
