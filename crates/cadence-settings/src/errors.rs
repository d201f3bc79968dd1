use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file could not be turned into [`CadenceSettings`](crate::CadenceSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad JSON, or JSON whose values do not fit the settings shape.
    #[error("{} is not usable: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The compiled defaults failed to serialize.
    #[error("default settings are malformed: {0}")]
    Defaults(#[from] serde_json::Error),

    /// Well-formed, but a value the client cannot work with.
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;
