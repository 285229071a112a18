use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Reads `path` and deserializes its JSON content into `T`.
///
/// An unreadable file gives `Error::IoError`, malformed JSON `Error::DeserializationError`.
pub fn parse_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    log::debug!("Read {} byte(s) of JSON from '{}'", data.len(), path.display());
    parse_json_str(&data)
}

pub fn parse_json_str<T: DeserializeOwned>(data: &str) -> Result<T> {
    Ok(serde_json::from_str(data)?)
}
