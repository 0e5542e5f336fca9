//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The auth secret is loaded from the AUTH_SECRET env var or auth_secret_file,
//! never stored in the TOML directly to avoid leaking it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use postage_stamps::{AutobuyPolicy, AutoextendPolicy, BatchSpec, ManagementMode};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub stamps: StampsConfig,
    #[serde(default)]
    pub reupload: ReuploadConfig,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    /// Bee public API, target of proxied uploads and downloads
    pub bee_api_url: String,
    /// Bee debug API, used for stamp management and readiness
    pub bee_debug_api_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_true")]
    pub remove_pin_header: bool,
    #[serde(skip)]
    pub auth_secret: Option<Secret<String>>,
    /// Path to a file containing the auth secret (alternative to AUTH_SECRET env var)
    #[serde(default)]
    pub auth_secret_file: Option<PathBuf>,
}

/// Which stamp management mode the `[stamps]` section selects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampMode {
    #[default]
    Disabled,
    Hardcoded,
    Autobuy,
    Autoextend,
}

/// Postage stamp management settings
#[derive(Debug, Deserialize)]
pub struct StampsConfig {
    #[serde(default)]
    pub mode: StampMode,
    /// Batch id for hardcoded mode
    #[serde(default)]
    pub stamp: Option<String>,
    #[serde(default)]
    pub depth: Option<u8>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default = "default_usage_threshold")]
    pub usage_threshold: f64,
    #[serde(default = "default_usage_max")]
    pub usage_max: f64,
    #[serde(default = "default_ttl_min")]
    pub ttl_min_secs: u64,
    #[serde(default = "default_refresh_period")]
    pub refresh_period_secs: u64,
    #[serde(default = "default_usable_timeout")]
    pub usable_timeout_secs: u64,
}

/// Pinned content reupload job settings
#[derive(Debug, Deserialize)]
pub struct ReuploadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_refresh_period")]
    pub period_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_body_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_usage_threshold() -> f64 {
    0.7
}

fn default_usage_max() -> f64 {
    0.9
}

fn default_ttl_min() -> u64 {
    15 * 60
}

fn default_refresh_period() -> u64 {
    5 * 60
}

fn default_usable_timeout() -> u64 {
    120
}

impl Default for StampsConfig {
    fn default() -> Self {
        Self {
            mode: StampMode::default(),
            stamp: None,
            depth: None,
            amount: None,
            usage_threshold: default_usage_threshold(),
            usage_max: default_usage_max(),
            ttl_min_secs: default_ttl_min(),
            refresh_period_secs: default_refresh_period(),
            usable_timeout_secs: default_usable_timeout(),
        }
    }
}

impl Default for ReuploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_secs: default_refresh_period(),
        }
    }
}

impl StampsConfig {
    /// Build the management mode this section describes.
    ///
    /// Every parameter the selected mode needs is checked here, once.
    pub fn management_mode(&self) -> postage_stamps::Result<ManagementMode> {
        let ttl_min = Duration::from_secs(self.ttl_min_secs);
        let refresh_period = Duration::from_secs(self.refresh_period_secs);

        match self.mode {
            StampMode::Disabled => Ok(ManagementMode::Disabled),
            StampMode::Hardcoded => ManagementMode::hardcoded(self.stamp.clone()),
            StampMode::Autobuy => {
                let batch = BatchSpec::new(self.depth, self.amount.clone())?;
                let policy = AutobuyPolicy::new(
                    batch,
                    self.usage_threshold,
                    self.usage_max,
                    ttl_min,
                    refresh_period,
                )?;
                Ok(ManagementMode::Autobuy(policy))
            }
            StampMode::Autoextend => {
                let batch = BatchSpec::new(self.depth, self.amount.clone())?;
                let policy = AutoextendPolicy::new(batch, ttl_min, refresh_period)?;
                Ok(ManagementMode::Autoextend(policy))
            }
        }
    }

    pub fn usable_timeout(&self) -> Duration {
        Duration::from_secs(self.usable_timeout_secs)
    }
}

fn check_url(name: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Auth secret resolution order:
    /// 1. AUTH_SECRET env var
    /// 2. auth_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        check_url("bee_api_url", &config.proxy.bee_api_url)?;
        check_url("bee_debug_api_url", &config.proxy.bee_debug_api_url)?;

        if config.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.proxy.max_body_bytes == 0 {
            return Err(common::Error::Config(
                "max_body_bytes must be greater than 0".into(),
            ));
        }
        if config.stamps.usable_timeout_secs == 0 {
            return Err(common::Error::Config(
                "usable_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.reupload.enabled && config.reupload.period_secs == 0 {
            return Err(common::Error::Config(
                "reupload period_secs must be greater than 0".into(),
            ));
        }

        // Fail fast on a half-configured stamp mode
        config
            .stamps
            .management_mode()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        // Resolve auth secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("AUTH_SECRET") {
            if !secret.is_empty() {
                config.proxy.auth_secret = Some(Secret::new(secret));
            }
        } else if let Some(ref secret_file) = config.proxy.auth_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read auth_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.proxy.auth_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("gateway-proxy.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    const PROXY_SECTION: &str = r#"
[proxy]
listen_addr = "127.0.0.1:3000"
bee_api_url = "http://localhost:1633"
bee_debug_api_url = "http://localhost:1635"
"#;

    /// Write `contents` to a config file in a fresh temp dir.
    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway-proxy.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn load_with_stamps(stamps: &str) -> common::Result<Config> {
        let (_dir, path) = write_config(&format!("{PROXY_SECTION}\n{stamps}"));
        Config::load(&path)
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("AUTH_SECRET") };
        let (_dir, path) = write_config(PROXY_SECTION);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.proxy.bee_api_url, "http://localhost:1633");
        assert_eq!(config.proxy.timeout_secs, 60);
        assert_eq!(config.proxy.max_connections, 1000);
        assert_eq!(config.proxy.max_body_bytes, 100 * 1024 * 1024);
        assert!(config.proxy.remove_pin_header);
        assert!(config.proxy.auth_secret.is_none());

        assert_eq!(config.stamps.mode, StampMode::Disabled);
        assert_eq!(config.stamps.usage_threshold, 0.7);
        assert_eq!(config.stamps.usage_max, 0.9);
        assert_eq!(config.stamps.ttl_min_secs, 900);
        assert_eq!(config.stamps.refresh_period_secs, 300);
        assert_eq!(
            config.stamps.management_mode().unwrap(),
            ManagementMode::Disabled
        );

        assert!(!config.reupload.enabled);
        assert_eq!(config.reupload.period_secs, 300);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        let result = Config::load(&path);
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_autobuy_mode_from_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = load_with_stamps(
            r#"
[stamps]
mode = "autobuy"
depth = 20
amount = "1000"
usage_threshold = 0.75
refresh_period_secs = 60
"#,
        )
        .unwrap();

        let ManagementMode::Autobuy(policy) = config.stamps.management_mode().unwrap() else {
            panic!("expected autobuy mode");
        };
        assert_eq!(policy.batch.depth, 20);
        assert_eq!(policy.batch.amount, "1000");
        assert_eq!(policy.usage_threshold, 0.75);
        assert_eq!(policy.usage_max, 0.9);
        assert_eq!(policy.ttl_min, Duration::from_secs(900));
        assert_eq!(policy.refresh_period, Duration::from_secs(60));
    }

    #[test]
    fn test_autoextend_mode_from_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = load_with_stamps(
            r#"
[stamps]
mode = "autoextend"
depth = 22
amount = "5000"
ttl_min_secs = 3600
"#,
        )
        .unwrap();

        let ManagementMode::Autoextend(policy) = config.stamps.management_mode().unwrap() else {
            panic!("expected autoextend mode");
        };
        assert_eq!(policy.top_up_threshold(), Duration::from_secs(3600 + 300));
    }

    #[test]
    fn test_hardcoded_mode_from_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = load_with_stamps(
            r#"
[stamps]
mode = "hardcoded"
stamp = "f1e4ff753ea1cb923269ed0cda909d13a10d624719edf261e196584e9e764e50"
"#,
        )
        .unwrap();

        assert_eq!(
            config.stamps.management_mode().unwrap().label(),
            "hardcoded"
        );
    }

    #[test]
    fn test_managed_mode_without_depth_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let result = load_with_stamps(
            r#"
[stamps]
mode = "autobuy"
amount = "1000"
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(
            err.contains("depth and amount"),
            "error message should name the missing parameters, got: {err}"
        );
    }

    #[test]
    fn test_autoextend_without_amount_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let result = load_with_stamps(
            r#"
[stamps]
mode = "autoextend"
depth = 20
"#,
        );
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[test]
    fn test_hardcoded_without_stamp_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let result = load_with_stamps("[stamps]\nmode = \"hardcoded\"\n");
        assert!(result.is_err(), "hardcoded mode without a stamp must be rejected");
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let result = load_with_stamps("[stamps]\nmode = \"sometimes\"\n");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_usage_threshold_out_of_range_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let result = load_with_stamps(
            r#"
[stamps]
mode = "autobuy"
depth = 20
amount = "1000"
usage_threshold = 1.5
"#,
        );
        assert!(result.is_err(), "usage_threshold above 1 must be rejected");
    }

    #[test]
    fn test_auth_secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(PROXY_SECTION);

        unsafe { set_env("AUTH_SECRET", "env-secret") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("AUTH_SECRET") };

        assert_eq!(
            config.proxy.auth_secret.as_ref().unwrap().expose(),
            "env-secret"
        );
    }

    #[test]
    fn test_auth_secret_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "file-secret\n").unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                "{PROXY_SECTION}auth_secret_file = \"{}\"\n",
                secret_path.display()
            ),
        )
        .unwrap();

        unsafe { remove_env("AUTH_SECRET") };
        let config = Config::load(&config_path).unwrap();
        assert_eq!(
            config.proxy.auth_secret.as_ref().unwrap().expose(),
            "file-secret"
        );
    }

    #[test]
    fn test_auth_secret_env_overrides_nonexistent_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(&format!(
            "{PROXY_SECTION}auth_secret_file = \"/nonexistent/path/secret\"\n"
        ));

        unsafe { set_env("AUTH_SECRET", "env-wins") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("AUTH_SECRET") };

        assert_eq!(
            config.proxy.auth_secret.as_ref().unwrap().expose(),
            "env-wins",
            "AUTH_SECRET env var must take precedence over auth_secret_file"
        );
    }

    #[test]
    fn test_auth_secret_file_nonexistent_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(&format!(
            "{PROXY_SECTION}auth_secret_file = \"/nonexistent/path/secret\"\n"
        ));

        unsafe { remove_env("AUTH_SECRET") };
        let result = Config::load(&path);
        assert!(
            result.is_err(),
            "nonexistent auth_secret_file must return an error"
        );
    }

    #[test]
    fn test_invalid_bee_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(
            r#"
[proxy]
listen_addr = "127.0.0.1:3000"
bee_api_url = "localhost:1633"
bee_debug_api_url = "http://localhost:1635"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("bee_api_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_limits_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        for line in [
            "timeout_secs = 0",
            "max_connections = 0",
            "max_body_bytes = 0",
        ] {
            let (_dir, path) = write_config(&format!("{PROXY_SECTION}{line}\n"));
            assert!(Config::load(&path).is_err(), "{line} must be rejected");
        }

        let result = load_with_stamps("[stamps]\nusable_timeout_secs = 0\n");
        assert!(result.is_err(), "zero usable timeout must be rejected");
    }

    #[test]
    fn test_reupload_section() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let config = load_with_stamps("[reupload]\nenabled = true\nperiod_secs = 60\n").unwrap();
        assert!(config.reupload.enabled);
        assert_eq!(config.reupload.period_secs, 60);

        let result = load_with_stamps("[reupload]\nenabled = true\nperiod_secs = 0\n");
        assert!(result.is_err(), "zero reupload period must be rejected");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("gateway-proxy.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
