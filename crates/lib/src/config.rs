//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.weixin/config.json`) and environment.
//! The `weixin` section feeds `Credentials`; `replies` are registered as literal text handlers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Custom-send endpoint; the access token is appended as a query parameter.
pub const DEFAULT_SEND_URL: &str = "https://api.weixin.qq.com/cgi-bin/message/custom/send";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Account settings and keyword replies.
    #[serde(default)]
    pub weixin: WeixinConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Official account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeixinConfig {
    /// Shared token used for request signatures. Overridden by WEIXIN_TOKEN env.
    pub token: Option<String>,
    /// Default reply sender (the account id). Overridden by WEIXIN_SENDER env.
    pub sender: Option<String>,
    /// Replay window in seconds; 0 disables the timestamp check. Overridden by WEIXIN_EXPIRES_IN env.
    #[serde(default)]
    pub expires_in: u64,
    /// Token for the custom-send API. Falls back to `token`. Overridden by WEIXIN_ACCESS_TOKEN env.
    pub access_token: Option<String>,
    /// Custom-send endpoint (default DEFAULT_SEND_URL).
    pub send_url: Option<String>,
    /// Keyword (or "*") -> literal reply text, registered when the gateway starts.
    #[serde(default)]
    pub replies: BTreeMap<String, String>,
}

/// Settings the adapter needs at runtime. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub sender: Option<String>,
    pub expires_in: u64,
    pub access_token: Option<String>,
    pub send_url: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            send_url: DEFAULT_SEND_URL.to_string(),
            ..Default::default()
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = secs;
        self
    }

    /// Build from config, applying environment overrides.
    pub fn from_config(config: &Config) -> Self {
        let weixin = &config.weixin;
        let expires_in = env_non_empty("WEIXIN_EXPIRES_IN")
            .and_then(|s| match s.parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("ignoring non-numeric WEIXIN_EXPIRES_IN: {:?}", s);
                    None
                }
            })
            .unwrap_or(weixin.expires_in);
        Self {
            token: resolve_setting("WEIXIN_TOKEN", weixin.token.as_deref()),
            sender: resolve_setting("WEIXIN_SENDER", weixin.sender.as_deref()),
            expires_in,
            access_token: resolve_setting("WEIXIN_ACCESS_TOKEN", weixin.access_token.as_deref()),
            send_url: weixin
                .send_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SEND_URL)
                .to_string(),
        }
    }

    /// Token for outbound sends: `access_token` when set, else the shared token.
    pub fn send_token(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.token.as_deref())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var overrides the config value; blank values count as unset.
fn resolve_setting(env_key: &str, configured: Option<&str>) -> Option<String> {
    env_non_empty(env_key).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WEIXIN_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".weixin").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (WEIXIN_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15152);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn parses_camel_case_weixin_section() {
        let config: Config = serde_json::from_str(
            r#"{
                "gateway": { "port": 8080 },
                "weixin": {
                    "token": " tok ",
                    "expiresIn": 60,
                    "sendUrl": "http://127.0.0.1:9/send",
                    "replies": { "help": "try: news", "*": "hi" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(config.weixin.expires_in, 60);
        assert_eq!(config.weixin.replies.get("*").map(String::as_str), Some("hi"));
        assert_eq!(config.weixin.sender, None);
    }

    #[test]
    fn resolve_setting_trims_and_drops_blank() {
        let key = "WEIXIN_TEST_RESOLVE_SETTING_UNSET";
        assert_eq!(resolve_setting(key, Some(" tok ")), Some("tok".to_string()));
        assert_eq!(resolve_setting(key, Some("   ")), None);
        assert_eq!(resolve_setting(key, None), None);
    }

    #[test]
    fn resolve_setting_env_overrides_config() {
        let key = "WEIXIN_TEST_RESOLVE_SETTING_SET";
        std::env::set_var(key, "from-env");
        assert_eq!(resolve_setting(key, Some("from-config")), Some("from-env".to_string()));
        std::env::remove_var(key);
    }

    #[test]
    fn send_token_falls_back_to_shared_token() {
        let creds = Credentials::new("shared");
        assert_eq!(creds.send_token(), Some("shared"));
        let creds = Credentials {
            access_token: Some("access".into()),
            ..creds
        };
        assert_eq!(creds.send_token(), Some("access"));
        assert_eq!(creds.send_url, DEFAULT_SEND_URL);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let path = std::env::temp_dir().join("weixin-config-test-does-not-exist.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 15152);
        assert!(config.weixin.replies.is_empty());
    }
}
