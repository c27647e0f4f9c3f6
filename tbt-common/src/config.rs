//! Client configuration loading and data directory resolution

use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable overriding the client data directory
pub const DATA_DIR_ENV: &str = "TBT_DATA_DIR";

/// Resolve the client data directory (holds the local SQLite store) by
/// priority order:
/// 1. Explicit argument (highest priority)
/// 2. `TBT_DATA_DIR` environment variable
/// 3. `[client] data_dir` in the platform config file
/// 4. OS-dependent compiled default (fallback)
///
/// Missing or unreadable config files degrade to the next priority with a
/// warning; resolution never fails.
pub fn resolve_data_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file_path() {
        if let Some(dir) = data_dir_from_file(&config_path) {
            return dir;
        }
    }

    default_data_dir()
}

/// `[client] data_dir` from a TOML config file, or `None` when the file is
/// missing, malformed, or silent on the key.
fn data_dir_from_file(config_path: &Path) -> Option<PathBuf> {
    let contents = match std::fs::read_to_string(config_path) {
        Ok(contents) => contents,
        // No config file is the normal first-run state
        Err(_) => return None,
    };
    match toml::from_str::<toml::Value>(&contents) {
        Ok(config) => config
            .get("client")
            .and_then(|c| c.get("data_dir"))
            .and_then(|v| v.as_str())
            .map(PathBuf::from),
        Err(e) => {
            warn!("Ignoring malformed config file {}: {}", config_path.display(), e);
            None
        }
    }
}

/// Platform config file: `<config-dir>/tbtriage/config.toml`
fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tbtriage").join("config.toml"))
}

/// Compiled default data directory: `<data-dir>/tbtriage`, falling back to
/// the working directory when the platform reports no data dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tbtriage"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_argument_wins() {
        let dir = resolve_data_dir(Some("/tmp/tbt-test-data"));
        assert_eq!(dir, PathBuf::from("/tmp/tbt-test-data"));
    }

    // The environment is process-global, so this is the only test touching
    // the variable and it restores the unset state before returning.
    #[test]
    fn env_var_overrides_config_file_and_default() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/tbt-env-data");
        let from_env = resolve_data_dir(None);
        let explicit_still_wins = resolve_data_dir(Some("/tmp/tbt-arg-data"));
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(from_env, PathBuf::from("/tmp/tbt-env-data"));
        assert_eq!(explicit_still_wins, PathBuf::from("/tmp/tbt-arg-data"));
    }

    #[test]
    fn config_file_supplies_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\ndata_dir = \"/srv/tbt-data\"\n").unwrap();

        assert_eq!(
            data_dir_from_file(&path),
            Some(PathBuf::from("/srv/tbt-data"))
        );
    }

    #[test]
    fn missing_or_malformed_config_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(data_dir_from_file(&dir.path().join("absent.toml")), None);

        let malformed = dir.path().join("config.toml");
        std::fs::write(&malformed, "[client\ndata_dir = ").unwrap();
        assert_eq!(data_dir_from_file(&malformed), None);

        let silent = dir.path().join("other.toml");
        std::fs::write(&silent, "[client]\nother_key = 1\n").unwrap();
        assert_eq!(data_dir_from_file(&silent), None);
    }

    #[test]
    fn default_is_non_empty() {
        assert!(!default_data_dir().as_os_str().is_empty());
    }
}
