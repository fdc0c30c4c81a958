//! Configuration loading and discovery for `notpixel.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::BotConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration filename looked up during discovery.
pub const CONFIG_FILENAME: &str = "notpixel.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML parsing error
    #[error("Failed to parse notpixel.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override account concurrency
    pub concurrency: Option<usize>,
    /// Override scheduling mode
    pub mode: Option<crate::schedule::ScheduleMode>,
    /// Enable or disable repainting
    pub repaint: Option<bool>,
    /// Override the reference image
    pub image: Option<PathBuf>,
}

/// Find notpixel.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for notpixel.toml
/// 2. Check XDG_CONFIG_HOME/notpixel/notpixel.toml (or ~/.config/notpixel/notpixel.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find notpixel.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("notpixel").join(CONFIG_FILENAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find notpixel.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a notpixel.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the default
/// configuration, whose file paths are relative to the working directory.
///
/// Relative paths in `[files]` are resolved against the directory holding the
/// config file.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => {
            tracing::debug!(path = %p.display(), "loading config");
            load_config_file(&p)
        }
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<BotConfig, ConfigError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let mut config: BotConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    if let Some(root) = config_root(path) {
        resolve_files(&mut config, root);
    }
    Ok(config)
}

/// Default configuration used when no notpixel.toml is found.
pub fn default_config() -> BotConfig {
    BotConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut BotConfig, overrides: &CliOverrides) {
    if let Some(concurrency) = overrides.concurrency {
        config.schedule.concurrency = concurrency;
    }
    if let Some(mode) = overrides.mode {
        config.schedule.mode = mode;
    }
    if let Some(repaint) = overrides.repaint {
        config.repaint.enabled = repaint;
    }
    if let Some(ref image) = overrides.image {
        config.files.image = image.clone();
    }
}

/// Directory holding the config file.
pub fn config_root(config_path: &Path) -> Option<&Path> {
    config_path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Resolve a path relative to the config directory.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the config directory.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn resolve_files(config: &mut BotConfig, root: &Path) {
    let files = &mut config.files;
    for path in [
        &mut files.profiles,
        &mut files.sessions,
        &mut files.palette,
        &mut files.image,
        &mut files.ledger,
    ] {
        *path = resolve_path(root, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleMode;
    use serial_test::serial;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILENAME);
        File::create(&config_path)
            .expect("should create config file")
            .write_all(contents.as_bytes())
            .expect("should write config content");
        config_path
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[schedule]\nconcurrency = 2");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "");

        let subdir = temp.path().join("accounts").join("batch-1");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, None);
    }

    #[test]
    #[serial]
    fn test_find_xdg_config() {
        let temp = TempDir::new().expect("should create temp dir");
        let dir = temp.path().join("notpixel");
        fs::create_dir_all(&dir).expect("should create xdg dir");
        let config_path = write_config(&dir, "");

        let previous = env::var_os("XDG_CONFIG_HOME");
        env::set_var("XDG_CONFIG_HOME", temp.path());
        let found = find_xdg_config();
        match previous {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_load_config_resolves_files_against_config_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[files]
image = "art/target.png"
ledger = "/var/lib/notpx/ledger.json"

[schedule]
concurrency = 3
"#,
        );

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.schedule.concurrency, 3);
        assert_eq!(config.files.image, temp.path().join("art/target.png"));
        assert_eq!(config.files.palette, temp.path().join("mau.txt"));
        assert_eq!(config.files.ledger, PathBuf::from("/var/lib/notpx/ledger.json"));
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let result = load_config(Some(&temp.path().join("nonexistent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "this is not valid toml {{{");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r##"
[repaint]
row_stride = 0
allowed_colors = ["#GGGGGG"]
"##,
        );

        let result = load_config(Some(&config_path));
        match result {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = default_config();
        let overrides = CliOverrides {
            concurrency: Some(2),
            mode: Some(ScheduleMode::Pool),
            repaint: Some(false),
            image: Some(PathBuf::from("other.png")),
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.schedule.concurrency, 2);
        assert_eq!(config.schedule.mode, ScheduleMode::Pool);
        assert!(!config.repaint.enabled);
        assert_eq!(config.files.image, PathBuf::from("other.png"));
    }

    #[test]
    fn test_merge_empty_overrides_keeps_config() {
        let mut config = default_config();
        merge_cli_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config, default_config());
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/bot");
        assert_eq!(resolve_path(root, Path::new("/other/path")), PathBuf::from("/other/path"));
        assert_eq!(resolve_path(root, Path::new("mau.txt")), PathBuf::from("/bot/mau.txt"));
    }

    #[test]
    fn test_config_root() {
        assert_eq!(config_root(Path::new("/bot/notpixel.toml")), Some(Path::new("/bot")));
        assert_eq!(config_root(Path::new("notpixel.toml")), None);
    }
}
