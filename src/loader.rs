//! Document loading for the command line.
//!
//! Handles loading JSON documents from files, stdin (`-`) and strings.

use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

/// Load a document from a file path, or from stdin when the path is `-`.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the content isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if path == Path::new("-") {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| LoadError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;
        return load_document_str(&content);
    }

    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load a document from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}
