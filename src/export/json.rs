//! JSON export via serde.

use crate::error::StorageError;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(out, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryNode;
    use tempfile::TempDir;

    #[test]
    fn writes_pretty_json_arrays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        let categories = vec![CategoryNode::root("https://x/")];
        write(&path, &categories).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: Vec<CategoryNode> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].url, "https://x/");
    }
}
