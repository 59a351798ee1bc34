//! Manifest 层：agent 声明式配置的加载与查找

#[allow(clippy::module_inception)]
pub mod manifest;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

pub use manifest::{AgentManifest, EmbeddingsSpec, DEFAULT_TEMPERATURE};
pub use registry::{ManifestRegistry, ManifestSet};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid action {action} in {agent}: {message}")]
    InvalidAction {
        agent: String,
        action: String,
        message: String,
    },

    #[error("Invalid manifest pattern: {0}")]
    Glob(String),
}
