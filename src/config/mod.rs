//! Configuration system (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};

pub const ENV_MAX_STEPS: &str = "WEFT_MAX_STEPS";
pub const ENV_WORKING_DIR: &str = "WEFT_WORKING_DIR";
pub const ENV_STREAM_IDLE_TIMEOUT_MS: &str = "WEFT_STREAM_IDLE_TIMEOUT_MS";
pub const ENV_SYSTEM_PROMPT: &str = "WEFT_SYSTEM_PROMPT";

const CONFIG_FILE_NAME: &str = "weft.toml";

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct WeftConfig {
    /// Upper bound on model round trips per request.
    #[builder(default = 8)]
    pub max_steps: usize,
    /// Directory handed to tools.
    #[builder(default = default_working_directory(), into)]
    pub working_directory: PathBuf,
    /// Terminate a stream that yields nothing for this long. 0 disables.
    #[builder(default = 120_000)]
    pub stream_idle_timeout_ms: u64,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Repair the history before every model submission.
    #[builder(default = true)]
    pub repair_before_submit: bool,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Partial configuration as read from `weft.toml`. Absent keys keep the
/// lower layer's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub max_steps: Option<usize>,
    pub working_directory: Option<PathBuf>,
    pub stream_idle_timeout_ms: Option<u64>,
    pub system_prompt: Option<String>,
    pub repair_before_submit: Option<bool>,
}

impl ConfigFile {
    /// Read a config file. A missing file is an empty layer.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        toml::from_str(&raw).map_err(|err| {
            WeftError::Configuration(format!("invalid {}: {err}", path.display()))
        })
    }
}

impl WeftConfig {
    /// Load defaults, then the default config file, then the environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load defaults, then `path` (or the default config file), then the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = Self::default();
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "reading config file");
            config.apply_file(ConfigFile::read(&path)?);
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the values present in `file`.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(max_steps) = file.max_steps {
            self.max_steps = max_steps;
        }
        if let Some(dir) = file.working_directory {
            self.working_directory = dir;
        }
        if let Some(ms) = file.stream_idle_timeout_ms {
            self.stream_idle_timeout_ms = ms;
        }
        if file.system_prompt.is_some() {
            self.system_prompt = file.system_prompt;
        }
        if let Some(repair) = file.repair_before_submit {
            self.repair_before_submit = repair;
        }
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_steps = parse_env(ENV_MAX_STEPS, &raw)?;
        }
        if let Some(dir) = lookup(ENV_WORKING_DIR) {
            self.working_directory = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_STREAM_IDLE_TIMEOUT_MS) {
            self.stream_idle_timeout_ms = parse_env(ENV_STREAM_IDLE_TIMEOUT_MS, &raw)?;
        }
        if let Some(prompt) = lookup(ENV_SYSTEM_PROMPT) {
            self.system_prompt = Some(prompt);
        }
        Ok(())
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(WeftError::Configuration(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle timeout for model streams, `None` when disabled.
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_ms > 0).then(|| Duration::from_millis(self.stream_idle_timeout_ms))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| WeftError::Configuration(format!("{key}={raw:?}: {err}")))
}

fn default_working_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// `~/.weft/weft.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_weft_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Base directory for weft's own files.
pub fn default_weft_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".weft"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WeftConfig::default();
        assert_eq!(config.max_steps, 8);
        assert_eq!(config.stream_idle_timeout(), Some(Duration::from_secs(120)));
        assert!(config.repair_before_submit);
        assert_eq!(config.system_prompt, None);
    }

    #[test]
    fn builder_overrides() {
        let config = WeftConfig::builder()
            .max_steps(2)
            .system_prompt("be brief")
            .stream_idle_timeout_ms(0)
            .build();
        assert_eq!(config.max_steps, 2);
        assert_eq!(config.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(config.stream_idle_timeout(), None);
    }

    #[test]
    fn env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "max_steps = 3\nsystem_prompt = \"from file\"\n").unwrap();

        let mut config = WeftConfig::default();
        config.apply_file(ConfigFile::read(&path).unwrap());
        assert_eq!(config.max_steps, 3);
        config
            .apply_env(env(&[(ENV_MAX_STEPS, "5"), (ENV_WORKING_DIR, "/tmp/w")]))
            .unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.working_directory, PathBuf::from("/tmp/w"));
        assert_eq!(config.system_prompt.as_deref(), Some("from file"));
    }

    #[test]
    fn missing_file_is_empty_layer() {
        let dir = TempDir::new().unwrap();
        let file = ConfigFile::read(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(file, ConfigFile::default());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let mut config = WeftConfig::default();
        let err = config
            .apply_env(env(&[(ENV_STREAM_IDLE_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, WeftError::Configuration(_)));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(ConfigFile::read(&path).is_err());

        let zero = WeftConfig::builder().max_steps(0).build();
        assert!(zero.validate().is_err());
    }
}
