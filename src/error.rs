use std::path::PathBuf;

/// Every failure that can end a run: configuration, credentials, transport and remote errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account credential: {0}")]
    Credential(String),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status} {code}: {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("document {0} was modified concurrently")]
    Conflict(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid custom fields: {0}")]
    Fields(String),
}
