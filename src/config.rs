use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RULES_FILE: &str = "rules.json";
pub const STORE_ENV_VAR: &str = "MAIL_TRIAGE_STORE";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mail-triage")
}

fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn default_store_path() -> PathBuf {
    config_dir().join("emails.json")
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `--store` flag, then the environment, then this config, then the default.
    pub fn store_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(STORE_ENV_VAR).map(PathBuf::from))
            .or_else(|| self.store_path.clone())
            .unwrap_or_else(default_store_path)
    }

    pub fn rules_file(&self, arg: Option<PathBuf>) -> PathBuf {
        arg.or_else(|| self.rules_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(cfg.store_path.is_none());
        assert!(cfg.rules_file.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let cfg = Config {
            store_path: Some(PathBuf::from("/tmp/emails.json")),
            rules_file: Some(PathBuf::from("my-rules.json")),
        };
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.store_path, cfg.store_path);
        assert_eq!(loaded.rules_file, cfg.rules_file);
    }

    #[test]
    fn test_rules_file_resolution() {
        let mut cfg = Config::default();
        assert_eq!(cfg.rules_file(None), PathBuf::from("rules.json"));

        cfg.rules_file = Some(PathBuf::from("configured.json"));
        assert_eq!(cfg.rules_file(None), PathBuf::from("configured.json"));
        assert_eq!(
            cfg.rules_file(Some(PathBuf::from("cli.json"))),
            PathBuf::from("cli.json")
        );
    }

    #[test]
    fn test_store_flag_wins() {
        let cfg = Config {
            store_path: Some(PathBuf::from("configured.json")),
            rules_file: None,
        };
        assert_eq!(
            cfg.store_path(Some(PathBuf::from("flag.json"))),
            PathBuf::from("flag.json")
        );
    }
}
