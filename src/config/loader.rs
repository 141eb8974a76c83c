// src/config/loader.rs

use std::path::{Path, PathBuf};

use crate::config::model::RawConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; semantic validation happens in
/// [`validate`](crate::config::validate::validate) after merging.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs.read_to_string(path.as_ref())?;
    let raw: RawConfigFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load the config file when it exists; a missing file just means
/// defaults.
pub fn load_optional(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<Option<RawConfigFile>> {
    let path = path.as_ref();
    if !fs.is_file(path) {
        return Ok(None);
    }
    load_from_path(fs, path).map(Some)
}

/// Default config path: `Taskdag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskdag.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn missing_file_is_not_an_error() {
        let fs = MockFileSystem::new();
        assert!(load_optional(&fs, "Taskdag.toml").unwrap().is_none());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("Taskdag.toml", "[collect\nbroken");
        assert!(load_optional(&fs, "Taskdag.toml").is_err());
    }
}
