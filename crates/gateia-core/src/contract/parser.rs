//! Loading contract schemas from YAML/JSON.

use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::JsonSchemaContract;

/// Errors that can occur when building a contract.
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Failed to read contract file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid contract schema: {0}")]
    InvalidSchema(String),
}

impl JsonSchemaContract {
    /// Build a contract from a JSON Schema document in a string.
    pub fn from_json(json: &str) -> Result<Self, ContractError> {
        let schema: Value = serde_json::from_str(json)?;
        Self::new(schema)
    }

    /// Build a contract from a JSON Schema document written as YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ContractError> {
        let schema: Value = serde_yaml::from_str(yaml)?;
        Self::new(schema)
    }

    /// Load a contract from disk. `.yaml`/`.yml` files are read as YAML,
    /// everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::from_yaml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }
}
