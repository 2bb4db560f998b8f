use serde::Deserialize;

use crate::error::ScgError;

/// Knobs for a compilation run, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Extension (without the dot) of schema files picked up from a directory.
    pub extension: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            extension: "scg".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> Result<Self, ScgError> {
        serde_json::from_str(text).map_err(ScgError::Config)
    }
}
