//! Configuration management for the CLI
//!
//! This module handles loading and merging configuration from:
//! - Default values
//! - Configuration files (YAML/JSON/TOML)
//! - Environment variables
//! - Command-line arguments

use std::path::{Path, PathBuf};

use restgate_core::ClientConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cli::{Cli, OutputFormat};
use crate::error::{Error, Result};

/// Environment variable holding the authorization token
pub const ENV_TOKEN: &str = "RESTGATE_TOKEN";
/// Environment variable overriding the API host
pub const ENV_BASE_URL: &str = "RESTGATE_BASE_URL";
/// Environment variable overriding the concurrency limit
pub const ENV_CONCURRENCY: &str = "RESTGATE_CONCURRENCY";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings handed to the gateway client
    pub client: ClientConfig,

    /// Default output format when `--output` is not given
    pub output: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from a file, format chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to load config");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        if let Some(path) = file {
            Self::from_file(path)
        } else {
            Self::load()
        }
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".restgate.yaml"),
            PathBuf::from(".restgate.json"),
            PathBuf::from(".restgate.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let restgate_dir = config_dir.join("restgate");
            paths.push(restgate_dir.join("config.yaml"));
            paths.push(restgate_dir.join("config.json"));
            paths.push(restgate_dir.join("config.toml"));
        }

        paths
    }

    /// Apply `RESTGATE_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN) {
            self.client.token = token;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.client.base_url = base_url;
        }
        if let Some(concurrency) = lookup(ENV_CONCURRENCY) {
            self.client.concurrency = concurrency.trim().parse().map_err(|_| {
                Error::config(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_CONCURRENCY, concurrency
                ))
            })?;
        }
        Ok(())
    }

    /// Apply command-line flags, which take precedence over everything else
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(token) = &cli.token {
            self.client.token = token.clone();
        }
        if let Some(base_url) = &cli.base_url {
            self.client.base_url = base_url.clone();
        }
        if let Some(concurrency) = cli.concurrency {
            self.client.concurrency = concurrency;
        }
        if cli.output.is_some() {
            self.output = cli.output;
        }
    }

    /// Effective output format
    pub fn output_format(&self) -> OutputFormat {
        self.output.unwrap_or(OutputFormat::Human)
    }

    /// Load, then layer environment and flags on top
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = Self::load_with_file(cli.config.as_deref())?;
        config.apply_env()?;
        config.apply_cli(cli);

        if config.client.token.is_empty() {
            return Err(Error::config(format!(
                "no token configured; pass --token, set {} or add client.token to a config file",
                ENV_TOKEN
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_yaml_config() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.yaml",
            "client:\n  token: from-yaml\n  concurrency: 3\noutput: json\n",
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.client.token, "from-yaml");
        assert_eq!(config.client.concurrency, 3);
        assert_eq!(config.client.api_version, 10);
        assert_eq!(config.output_format(), OutputFormat::Json);
    }

    #[test]
    fn test_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.toml",
            "output = \"json-pretty\"\n\n[client]\ntoken = \"from-toml\"\nauth_scheme = \"bearer\"\n",
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.client.token, "from-toml");
        assert_eq!(config.client.authorization(), "Bearer from-toml");
        assert_eq!(config.output, Some(OutputFormat::JsonPretty));
    }

    #[test]
    fn test_json_config_and_bad_content() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "config.json", r#"{"client": {"base_url": "https://api.test"}}"#);
        let bad = write(&dir, "broken.json", "{not json");

        let config = Config::from_file(&good).unwrap();
        assert_eq!(config.client.base_url, "https://api.test");
        assert!(matches!(Config::from_file(&bad), Err(Error::Json(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_with_file(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        config.client.token = "file-token".to_string();

        let env: HashMap<&str, &str> = [(ENV_TOKEN, "env-token"), (ENV_CONCURRENCY, " 6 ")]
            .into_iter()
            .collect();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.client.token, "env-token");
        assert_eq!(config.client.concurrency, 6);
        assert_eq!(config.client.base_url, "https://discord.com");
    }

    #[test]
    fn test_bad_env_concurrency() {
        let mut config = Config::default();
        let result =
            config.apply_env_from(|key| (key == ENV_CONCURRENCY).then(|| "many".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_flags_override_everything() {
        let mut config = Config::default();
        config.client.token = "env-token".to_string();
        config.output = Some(OutputFormat::Yaml);

        let cli = Cli::parse_from([
            "restgate",
            "--token",
            "flag-token",
            "--base-url",
            "http://localhost:8080",
            "--output",
            "json",
            "get",
            "/gateway",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.client.token, "flag-token");
        assert_eq!(config.client.base_url, "http://localhost:8080");
        assert_eq!(config.output_format(), OutputFormat::Json);
    }
}
