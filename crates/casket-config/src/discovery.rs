//! Config file discovery.
//!
//! The first file found wins:
//! 1. An explicit path (CLI `--config`)
//! 2. `CASKET_CONFIG` environment variable
//! 3. `./casket.toml` (project-local)
//! 4. `~/.config/casket/config.toml` (XDG user config)
//!
//! With no file at all, defaults are used.

use std::path::{Path, PathBuf};

use crate::{CasketConfig, ConfigError, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "casket.toml";

/// Default config filename within the XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "casket";

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "CASKET_CONFIG";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The loaded configuration.
    pub config: CasketConfig,
    /// File the configuration came from, if any.
    pub source: Option<PathBuf>,
}

/// Discover and load the configuration.
///
/// An explicit path must exist; discovered locations are skipped when absent.
/// A file that exists but fails to parse is always an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let env_path = std::env::var(CONFIG_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    load_config_with_options(explicit, env_path.as_deref(), Path::new("."))
}

/// Load configuration with every discovery input given explicitly.
pub fn load_config_with_options(
    explicit: Option<&Path>,
    env_path: Option<&Path>,
    project_dir: &Path,
) -> Result<LoadedConfig> {
    if let Some(path) = explicit.or(env_path) {
        return Ok(LoadedConfig {
            config: load_config_file(path)?,
            source: Some(path.to_path_buf()),
        });
    }

    let candidates = std::iter::once(project_dir.join(PROJECT_CONFIG_FILE)).chain(xdg_config_path());
    for path in candidates {
        if path.is_file() {
            return Ok(LoadedConfig {
                config: load_config_file(&path)?,
                source: Some(path),
            });
        }
    }

    Ok(LoadedConfig {
        config: CasketConfig::default(),
        source: None,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CasketConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CasketConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &CasketConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the XDG config file path for casket.
pub fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(USER_CONFIG_FILE))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::BackendKind;

    #[test]
    fn test_xdg_config_path() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("casket/config.toml"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[session]
namespace = "site"

[client]
backend = "sqlite"
path = "kv.sqlite3"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.session.namespace, "site");
        assert_eq!(config.client.backend, BackendKind::Sqlite);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/casket.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("casket.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_explicit_path_beats_env_and_project() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let env = dir.path().join("env.toml");
        fs::write(&explicit, "[session]\nnamespace = \"explicit\"\n").unwrap();
        fs::write(&env, "[session]\nnamespace = \"env\"\n").unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[session]\nnamespace = \"project\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(&explicit), Some(&env), dir.path()).unwrap();
        assert_eq!(loaded.config.session.namespace, "explicit");

        let loaded = load_config_with_options(None, Some(&env), dir.path()).unwrap();
        assert_eq!(loaded.config.session.namespace, "env");
        assert_eq!(loaded.source, Some(env));
    }

    #[test]
    fn test_project_config_discovered() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[session]\nnamespace = \"project\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(None, None, dir.path()).unwrap();
        assert_eq!(loaded.config.session.namespace, "project");
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(load_config_with_options(Some(&missing), None, dir.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("casket.toml");

        let mut config = CasketConfig::new();
        config.session.namespace = "saved".to_string();
        save_config(&config, &path).unwrap();

        assert_eq!(load_config_file(&path).unwrap(), config);
    }
}
