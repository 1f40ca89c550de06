//! JSON serialization for covariance matrices, filter banks and inverse operators.
//!
//! Every persisted type carries its channel ordering, so a loaded artifact
//! can be validated with its `check_compatible` method before reapplication.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Serialize a value to a compact JSON string.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize a value to a pretty-printed JSON string.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Deserialize a value from a JSON string.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Write a value to `path` as pretty-printed JSON.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be written.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let json = to_json_pretty(value)?;
    fs::write(path, json).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "saved");
    Ok(())
}

/// Read a value previously written with [`save_json`].
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be read, [`Error::Serialization`] if it
/// does not hold the expected type.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_json(&json)
}
