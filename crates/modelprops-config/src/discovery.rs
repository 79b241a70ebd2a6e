//! Finding and layering config files.
//!
//! Two optional layers are read, the second overriding the first:
//!
//! 1. `config.toml` in `$MODELPROPS_CONFIG_DIR`, falling back to the platform
//!    config dir (`~/.config/modelprops` on Linux)
//! 2. `modelprops.toml` in the project directory
//!
//! Flags and environment variables are applied on top by the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, ModelPropsConfig, Result};

const PROJECT_CONFIG_FILE: &str = "modelprops.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "MODELPROPS_CONFIG_DIR";

/// One candidate file and whether it contributed.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// The merged config and how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ModelPropsConfig,
    /// Candidates in precedence order, lowest first.
    pub sources: Vec<ConfigSource>,
    /// Broken files that were skipped, and plaintext secrets.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> impl Iterator<Item = &Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
    }
}

/// Discover and merge config, with the project layer taken from
/// `project_dir` or the working directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// As [`load_config`], reading the user layer from `config_dir` when given.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = config_dir
        .map(Path::to_path_buf)
        .or_else(self::config_dir)
        .map(|dir| dir.join(USER_CONFIG_FILE));
    let project = project_dir
        .unwrap_or(Path::new("."))
        .join(PROJECT_CONFIG_FILE);

    let mut loaded = LoadedConfig {
        config: ModelPropsConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for path in user.into_iter().chain([project]) {
        let layer = read_layer(&path);
        let contributed = match layer {
            Ok(Some(layer)) => {
                loaded.config.merge(layer);
                true
            }
            Ok(None) => false,
            Err(e) => {
                loaded.warnings.push(format!("Failed to load {}: {e}", path.display()));
                false
            }
        };
        loaded.sources.push(ConfigSource {
            path,
            loaded: contributed,
        });
    }

    if loaded
        .config
        .llm
        .as_ref()
        .is_some_and(|llm| llm.has_plaintext_api_key())
    {
        loaded.warnings.push(
            "[llm] holds a plaintext api_key; prefer the OPENAI_API_KEY environment variable"
                .to_string(),
        );
    }

    Ok(loaded)
}

/// Parse exactly one file, without discovery.
pub fn load_config_file(path: &Path) -> Result<ModelPropsConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    ModelPropsConfig::from_toml(&text)
}

/// `$MODELPROPS_CONFIG_DIR` when set and non-empty, else the platform
/// config dir. Logs live under it too.
pub fn config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("modelprops")),
    }
}

fn read_layer(path: &Path) -> Result<Option<ModelPropsConfig>> {
    if path.is_file() {
        load_config_file(path).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.config, ModelPropsConfig::default());
        assert_eq!(loaded.loaded_from().count(), 0);
        assert_eq!(loaded.sources.len(), 2);
    }

    #[test]
    fn test_project_overrides_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            r#"
[llm]
model = "gpt-4o"

[aps]
host = "https://aps.example"

[agent]
max_iterations = 6
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("modelprops.toml"),
            r#"
[agent]
max_iterations = 20
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        let config = &loaded.config;

        assert_eq!(config.effective_agent().max_iterations, 20);
        assert_eq!(config.effective_aps().host, "https://aps.example");
        assert_eq!(loaded.loaded_from().count(), 2);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_malformed_config_warns_but_continues() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("modelprops.toml"), "not valid toml {{{{").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
        assert_eq!(loaded.loaded_from().count(), 0);
    }

    #[test]
    fn test_plaintext_key_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            project.path().join("modelprops.toml"),
            "[llm]\napi_key = \"sk-secret\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }
}
