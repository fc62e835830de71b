use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatroomConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Server Config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.bind, self.port))
    }
}

// ── Logging Config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatroom")
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Built-in defaults; the path is the default location that was missing
    Defaults(PathBuf),
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("Loaded config from {}", path.display()),
            Self::Defaults(path) => format!("No config at {}, using defaults", path.display()),
        }
    }
}

impl ChatroomConfig {
    /// Load from `custom_path`, or from `~/.chatroom/config.toml`.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicitly requested file is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<(Self, ConfigSource)> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    return Ok((Self::default(), ConfigSource::Defaults(path)));
                }
                path
            }
        };
        let config = Self::load_file(&path)?;
        Ok((config, ConfigSource::File(path)))
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Expand environment variables before parsing
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["CHATROOM_BIND", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ChatroomConfig::parse("").unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_default_file_parses() {
        let cfg = ChatroomConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.server.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_partial_sections() {
        let cfg = ChatroomConfig::parse("[server]\nport = 8080\n").unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(ChatroomConfig::parse("[server\nport = ").is_err());
        assert!(ChatroomConfig::parse("[server]\nport = \"high\"\n").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let server = ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 9000,
        };
        assert_eq!(server.socket_addr().unwrap().to_string(), "0.0.0.0:9000");

        let bad = ServerConfig {
            bind: "not an address".to_string(),
            port: 9000,
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0\"\nport = 4000").unwrap();

        let (cfg, source) = ChatroomConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.server.port, 4000);
    }

    #[test]
    fn test_config_source_describe() {
        let file = ConfigSource::File(PathBuf::from("/etc/chatroom.toml"));
        assert_eq!(file.describe(), "Loaded config from /etc/chatroom.toml");

        let defaults = ConfigSource::Defaults(PathBuf::from("/home/a/.chatroom/config.toml"));
        assert_eq!(
            defaults.describe(),
            "No config at /home/a/.chatroom/config.toml, using defaults"
        );
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ChatroomConfig::load(&Some(missing)).is_err());
    }

    #[test]
    fn test_expand_allowed_var() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_env_vars("dir = \"${HOME}/x\""), format!("dir = \"{}/x\"", home));
    }

    #[test]
    fn test_expand_skips_unknown_var() {
        let input = "bind = \"${SECRET_TOKEN}\"";
        assert_eq!(expand_env_vars(input), input);
    }

    #[test]
    fn test_expand_unterminated() {
        assert_eq!(expand_env_vars("bind = \"${HOME"), "bind = \"${HOME");
    }
}
