//! Grid snapshot IO: JSON loading of the flat record family.

pub mod records;

pub use records::*;

use std::fs;
use std::path::Path;

/// Parses a grid snapshot from a JSON string.
pub fn load_grid_json(content: &str) -> Result<GridInput, serde_json::Error> {
    serde_json::from_str(content)
}

/// Loads a grid snapshot from a JSON file.
pub fn load_grid_file(path: impl AsRef<Path>) -> Result<GridInput, std::io::Error> {
    let content = fs::read_to_string(path)?;
    load_grid_json(&content).map_err(std::io::Error::other)
}
