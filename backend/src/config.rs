use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::detection::yolo::YoloParams;

pub const DEFAULT_CONFIG_PATH: &str = "config/pestwatch.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("static/uploads"),
            max_bytes: 16 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "bmp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub tabular: PathBuf,
    pub weekly: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("best.torchscript"),
            tabular: PathBuf::from("random_forest_model.json"),
            weekly: PathBuf::from("decision_tree_model.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    /// Host suffixes accepted over https, e.g. `.vercel.app`.
    pub allowed_origin_suffixes: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_origin_suffixes: vec![".vercel.app".to_string()],
        }
    }
}

impl CorsConfig {
    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        origin
            .strip_prefix("https://")
            .is_some_and(|host| {
                self.allowed_origin_suffixes
                    .iter()
                    .any(|suffix| host.len() > suffix.len() && host.ends_with(suffix.as_str()))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub runs_dir: PathBuf,
    pub models: ModelPaths,
    pub detector: YoloParams,
    pub cors: CorsConfig,
}

impl AppConfig {
    /// Reads the YAML file named by `PESTWATCH_CONFIG` (or the default path)
    /// and applies environment overrides. A missing default file is not an
    /// error; a missing file that was asked for explicitly is.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match env::var("PESTWATCH_CONFIG") {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if explicit || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: AppConfig = serde_yaml::from_str(contents)?;
        if config.runs_dir.as_os_str().is_empty() {
            config.runs_dir = PathBuf::from("runs");
        }
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PORT".into(),
                value: port.clone(),
            })?;
        }
        if let Some(origin) = lookup("FRONTEND_URL").filter(|o| !o.trim().is_empty()) {
            let origin = origin.trim().trim_end_matches('/').to_string();
            if !self.cors.allowed_origins.contains(&origin) {
                self.cors.allowed_origins.push(origin);
            }
        }
        if let Some(dir) = lookup("UPLOAD_FOLDER") {
            self.uploads.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            uploads: UploadConfig::default(),
            runs_dir: PathBuf::from("runs"),
            models: ModelPaths::default(),
            detector: YoloParams::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "server:\n  port: 8081\n\
                    detector:\n  conf_threshold: 0.4\n\
                    models:\n  weekly: models/week.json\n";
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.detector.conf_threshold, 0.4);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.models.weekly, PathBuf::from("models/week.json"));
        assert_eq!(config.models.tabular, PathBuf::from("random_forest_model.json"));
        assert_eq!(config.runs_dir, PathBuf::from("runs"));
        assert_eq!(config.uploads.max_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "7000"),
            ("FRONTEND_URL", "https://pestwatch.example.com/"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert!(config.cors.is_allowed("https://pestwatch.example.com"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|name| (name == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn cors_origins() {
        let cors = CorsConfig::default();
        assert!(cors.is_allowed("http://localhost:3000"));
        assert!(cors.is_allowed("https://pestwatch-git-main.vercel.app"));
        assert!(!cors.is_allowed("http://pestwatch.vercel.app"));
        assert!(!cors.is_allowed("https://.vercel.app"));
        assert!(!cors.is_allowed("https://evil.example.com"));
    }
}
