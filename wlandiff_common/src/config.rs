use crate::{AppConfig, WlanDiffError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "wlandiff.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
    pub exists: bool,
}

/// Load configuration from `explicit`, else from the platform config directory.
///
/// A missing file yields defaults. An explicitly named file must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, WlanDiffError> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(WlanDiffError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => default_config_path(),
    };

    let exists = path.as_deref().map_or(false, Path::exists);

    let config = match path.as_deref() {
        Some(path) if exists => read_config(path)?,
        _ => AppConfig::default(),
    };

    config.compare.validate()?;

    Ok(LoadedConfig {
        config,
        path,
        exists,
    })
}

pub fn read_config(path: &Path) -> Result<AppConfig, WlanDiffError> {
    let data = fs::read_to_string(path)?;
    toml::from_str(&data).map_err(|e| WlanDiffError::Serialization(e.to_string()))
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), WlanDiffError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| WlanDiffError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "wlandiff", "wlandiff").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
