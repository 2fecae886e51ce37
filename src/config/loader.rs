use super::types::PlayerConfig;
use super::validation::Validate;
use crate::log_error;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Loader for `<config dir>/sova/player.toml`.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("sova");

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(Self {
            config_path: config_dir.join("player.toml"),
        })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load_or_create(&self) -> Result<PlayerConfig> {
        if !self.config_path.exists() {
            let default_config = PlayerConfig::default();
            self.save(&default_config)?;
            Ok(default_config)
        } else {
            self.load_and_normalize()
        }
    }

    fn load_and_normalize(&self) -> Result<PlayerConfig> {
        let content =
            fs::read_to_string(&self.config_path).context("Failed to read config file")?;

        let mut config: PlayerConfig = match toml::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                let backup_path = self.config_path.with_extension("toml.backup");
                fs::write(&backup_path, &content).context("Failed to write backup")?;

                log_error!(
                    "Config file corrupted: {}. Backup saved to {:?}. Using defaults.",
                    e,
                    backup_path
                );

                let default = PlayerConfig::default();
                self.save(&default)?;
                return Ok(default);
            }
        };

        config.validate();

        let current_toml =
            toml::to_string_pretty(&config).context("Failed to serialize config")?;
        if content.trim() != current_toml.trim() {
            self.save(&config)?;
        }

        Ok(config)
    }

    pub fn save(&self, config: &PlayerConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_string = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_string).context("Failed to write config file")?;
        Ok(())
    }
}
