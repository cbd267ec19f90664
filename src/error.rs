use std::fmt;
use thiserror::Error;

/// Step of a package resolution that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchRecipe,
    FetchArchive,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::FetchRecipe => "fetching recipe",
            Stage::FetchArchive => "fetching archive",
            Stage::Extract => "extracting archive",
        })
    }
}

#[derive(Error, Debug)]
pub enum AurError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("HTTP GET {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("AUR RPC error: {0}")]
    Rpc(String),

    #[error("Malformed package database {source_name}: {reason}")]
    Database { source_name: String, reason: String },

    #[error("Malformed archive: {0}")]
    Archive(String),

    #[error("{name}: {stage} failed: {source}")]
    Package {
        name: String,
        stage: Stage,
        #[source]
        source: Box<AurError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AurError>;

impl AurError {
    /// Attach the package and step that produced this error.
    pub fn during(self, name: &str, stage: Stage) -> Self {
        AurError::Package {
            name: name.to_string(),
            stage,
            source: Box::new(self),
        }
    }
}
