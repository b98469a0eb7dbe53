use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{QuestionError, Result};

pub const DEFAULT_PORT: u16 = 1323;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            list_page_size: default_list_page_size(),
            page_limit: default_page_limit(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub list_page_size: Option<usize>,
    pub page_limit: Option<usize>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.port.is_none()
            && self.data_dir.is_none()
            && self.list_page_size.is_none()
            && self.page_limit.is_none()
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = default_config_root()?;
    path.push("config.toml");
    Ok(path)
}

pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    } else {
        default_config_path()?
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let cfg: Config = toml::from_str(&contents)?;
        cfg.ensure_data_dir()?;
        Ok((cfg, config_path))
    } else {
        let cfg = Config::default();
        cfg.ensure_data_dir()?;
        cfg.save(&config_path)?;
        Ok((cfg, config_path))
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_update(&mut self, update: ConfigUpdate) {
        if let Some(port) = update.port {
            self.port = port;
        }
        if let Some(data_dir) = update.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(list_page_size) = update.list_page_size {
            self.list_page_size = list_page_size;
        }
        if let Some(page_limit) = update.page_limit {
            self.page_limit = page_limit;
        }
        self.updated_at = Utc::now();
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn questions_path(&self) -> PathBuf {
        self.data_dir.join("questions")
    }

    pub fn logs_path(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_config_root() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        Ok(home.join(".answerdb"))
    } else {
        env::current_dir()
            .map(|dir| dir.join(".answerdb"))
            .map_err(|err| QuestionError::Config(err.to_string()))
    }
}

fn default_data_dir() -> PathBuf {
    default_config_root().unwrap_or_else(|_| PathBuf::from(".answerdb"))
}

fn default_list_page_size() -> usize {
    10
}

fn default_page_limit() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_and_reloads_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.port = 4040;
        config.data_dir = temp.path().join("data");
        config.save(&path).unwrap();

        let (loaded, loaded_path) = load_or_default(Some(path.clone())).unwrap();
        assert_eq!(loaded_path, path);
        assert_eq!(loaded.port, 4040);
        assert_eq!(loaded.data_dir, temp.path().join("data"));
    }

    #[test]
    fn apply_update_touches_updated_at() {
        let mut config = Config::default();
        let before = config.updated_at;

        config.apply_update(ConfigUpdate {
            port: Some(8080),
            ..ConfigUpdate::default()
        });

        assert_eq!(config.port, 8080);
        assert!(config.updated_at >= before);
    }
}
