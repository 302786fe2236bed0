// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// File name looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "Pipedag.toml";

/// Task set used when no config file exists.
const BUILTIN_CONFIG: &str = include_str!("default.toml");

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Deserialize a config document without semantic validation.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Read, deserialize and validate a config file.
///
/// Validation covers unknown `after` references, self-dependencies, cycles and
/// dangling watch bindings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// The embedded default task set.
pub fn builtin_config() -> Result<ConfigFile> {
    ConfigFile::try_from(parse_str(BUILTIN_CONFIG)?)
}

/// Load `path`, falling back to the embedded task set when `path` is the
/// default file name and does not exist. An explicitly named file must exist.
pub fn load_or_builtin(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_FILE) {
        info!(
            "no {} in the working directory; using the built-in task set",
            DEFAULT_CONFIG_FILE
        );
        return builtin_config();
    }
    load_and_validate(path)
}

/// Directory that globs, `dest` and `[server].root` are relative to.
///
/// - A config path with a non-empty parent uses that directory.
/// - A bare file name uses the current working directory.
pub fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_has_the_original_task_set() {
        let cfg = builtin_config().unwrap();
        let names: Vec<&str> = cfg.tasks().keys().map(String::as_str).collect();
        for expected in [
            "build",
            "build-css",
            "build-css-source",
            "build-js",
            "clean",
            "clean-css",
            "clean-js",
            "serve",
            "serve:dev",
            "valid-css",
            "valid-html",
        ] {
            assert!(names.contains(&expected), "missing task {expected}");
        }

        assert_eq!(cfg.task("valid-css").unwrap().after, vec!["build-css-source"]);
        assert!(cfg.task("valid-html").unwrap().after.is_empty());
        assert_eq!(cfg.server().port, 3000);
    }

    #[test]
    fn bare_file_name_uses_working_directory() {
        let root = project_root(Path::new("Pipedag.toml"));
        assert_eq!(root, std::env::current_dir().unwrap());
        assert_eq!(
            project_root(Path::new("site/Pipedag.toml")),
            PathBuf::from("site")
        );
    }
}
