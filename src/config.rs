use std::fs;
use std::path::{Path, PathBuf};

use nbproc::Pipeline;
use thiserror::Error;
use tracing::debug;

/// Looked up in the working directory when no configuration file is given.
pub const DEFAULT_CONFIG: &str = "nbpress.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("could not read configuration file")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn parse_config(input: &str) -> Result<Pipeline, ConfigError> {
    if input.trim().is_empty() {
        return Ok(Pipeline::default());
    }
    Ok(serde_yaml::from_str(input)?)
}

/// Reads the pipeline configuration. An explicit path must exist; without one, `nbpress.yml` in
/// `dir` is used if present and the defaults otherwise.
pub fn load_config(path: Option<&Path>, dir: &Path) -> Result<Pipeline, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = dir.join(DEFAULT_CONFIG);
            if !candidate.exists() {
                debug!("no configuration file, using defaults");
                return Ok(Pipeline::default());
            }
            candidate
        }
    };

    debug!("reading configuration from {}", path.display());
    parse_config(&fs::read_to_string(path)?)
}
