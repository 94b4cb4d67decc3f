//! TOML-backed settings store.
//!
//! The engine consumes configuration through typed accessors plus the generic
//! `get`/`is_enabled` pair. Domain black/white lists live as one-domain-per-row
//! CSV files next to the result data so operators can edit them by hand.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One sending/receiving account used by the bounce probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpAccount {
    pub smtp_host: String,
    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,
    pub imap_host: String,
    #[serde(default = "defaults::imap_port")]
    pub imap_port: u16,
    pub address: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotMode {
    None,
    Problems,
    Steps,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Workers share the engine's probe set.
    Shared,
    /// Each worker builds its own probe set with its own HTTP client and
    /// browser sessions.
    Isolated,
}

/// Typed view over the settings file. Unknown keys stay reachable through
/// [`Settings::get`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catch_all_detection: bool,
    pub microsoft_api: bool,
    pub microsoft_accept_on_no_rejection: bool,
    pub strict_rcpt_refusal: bool,
    pub browser_headless: bool,
    pub user_agent_rotation: bool,
    pub proxy_enabled: bool,
    pub proxies: Vec<String>,
    pub browsers: Vec<String>,
    pub webdriver_url: String,
    pub browser_wait_secs: u64,
    pub screenshot_mode: ScreenshotMode,
    pub screenshot_dir: String,
    pub screenshot_retention: usize,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    pub worker_count: usize,
    pub worker_mode: WorkerMode,
    pub max_cache_size: usize,
    pub cache_file: Option<String>,
    pub data_dir: String,
    pub history_dir: String,
    pub batches_dir: String,
    pub mail_from: String,
    pub helo_domain: String,
    pub smtp_timeout_secs: u64,
    pub bounce_wait_secs: u64,
    pub smtp_accounts: Vec<SmtpAccount>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catch_all_detection: true,
            microsoft_api: true,
            microsoft_accept_on_no_rejection: true,
            strict_rcpt_refusal: false,
            browser_headless: true,
            user_agent_rotation: true,
            proxy_enabled: false,
            proxies: Vec::new(),
            browsers: vec!["chrome".to_string()],
            webdriver_url: "http://localhost:4444".to_string(),
            browser_wait_secs: 3,
            screenshot_mode: ScreenshotMode::Problems,
            screenshot_dir: "./screenshots".to_string(),
            screenshot_retention: 200,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            worker_count: 1,
            worker_mode: WorkerMode::Shared,
            max_cache_size: 1000,
            cache_file: None,
            data_dir: "./data".to_string(),
            history_dir: "./statistics/history".to_string(),
            batches_dir: "./batches".to_string(),
            mail_from: "verify@example.com".to_string(),
            helo_domain: "localhost".to_string(),
            smtp_timeout_secs: 10,
            bounce_wait_secs: 120,
            smtp_accounts: Vec::new(),
        }
    }
}

mod defaults {
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn imap_port() -> u16 {
        993
    }
}

struct Inner {
    config: Config,
    raw: toml::Table,
}

/// Reloadable settings handle shared across workers.
pub struct Settings {
    path: Option<PathBuf>,
    inner: RwLock<Inner>,
}

impl Settings {
    /// Load from a TOML file. A missing file yields the defaults, so a fresh
    /// checkout runs without any setup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            read_file(&path)?
        } else {
            Inner {
                config: Config::default(),
                raw: toml::Table::new(),
            }
        };
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(inner),
        })
    }

    /// In-memory settings, used by tests and by callers that configure the
    /// engine programmatically.
    pub fn from_config(config: Config) -> Self {
        Self {
            path: None,
            inner: RwLock::new(Inner {
                config,
                raw: toml::Table::new(),
            }),
        }
    }

    /// Re-read the backing file, if any.
    pub fn reload(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let fresh = read_file(path)?;
        *self.inner.write() = fresh;
        Ok(())
    }

    pub fn config(&self) -> Config {
        self.inner.read().config.clone()
    }

    /// Raw string access for keys outside the typed [`Config`].
    pub fn get(&self, key: &str, default: &str) -> String {
        match self.inner.read().raw.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        match self.inner.read().raw.get(key) {
            Some(toml::Value::Boolean(b)) => *b,
            Some(toml::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn smtp_accounts(&self) -> Vec<SmtpAccount> {
        self.inner.read().config.smtp_accounts.clone()
    }

    pub fn proxies(&self) -> Vec<String> {
        let inner = self.inner.read();
        if inner.config.proxy_enabled {
            inner.config.proxies.clone()
        } else {
            Vec::new()
        }
    }

    pub fn browsers(&self) -> Vec<String> {
        let browsers = self.inner.read().config.browsers.clone();
        if browsers.is_empty() {
            vec!["chrome".to_string()]
        } else {
            browsers
        }
    }

    pub fn blacklisted_domains(&self) -> Vec<String> {
        self.read_domain_file("D-blacklist.csv")
    }

    pub fn whitelisted_domains(&self) -> Vec<String> {
        self.read_domain_file("D-WhiteList.csv")
    }

    fn read_domain_file(&self, name: &str) -> Vec<String> {
        let dir = PathBuf::from(&self.inner.read().config.data_dir);
        let path = dir.join(name);
        match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(|line| line.trim().to_ascii_lowercase())
                .filter(|line| !line.is_empty())
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(target: "settings", path = %path.display(), %err, "failed to read domain list");
                Vec::new()
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Inner, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: toml::Table = content.parse().map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config =
        toml::Value::Table(raw.clone())
            .try_into()
            .map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
    Ok(Inner { config, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(dir.path().join("absent.toml")).expect("load");
        let config = settings.config();
        assert!(config.catch_all_detection);
        assert_eq!(config.rate_limit_max_requests, 10);
        assert_eq!(config.worker_mode, WorkerMode::Shared);
    }

    #[test]
    fn file_values_override_defaults_and_raw_keys_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        let mut file = fs::File::create(&path).expect("create");
        writeln!(
            file,
            "rate_limit_max_requests = 3\nscreenshot_mode = \"all\"\ncustom_flag = true\nlabel = \"abc\""
        )
        .expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.config().rate_limit_max_requests, 3);
        assert_eq!(settings.config().screenshot_mode, ScreenshotMode::All);
        assert!(settings.is_enabled("custom_flag"));
        assert_eq!(settings.get("label", "def"), "abc");
        assert_eq!(settings.get("missing", "def"), "def");
    }

    #[test]
    fn domain_lists_are_lowercased_and_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("D-blacklist.csv"), "Spam.Example\n\n bad.test \n")
            .expect("write");
        let settings = Settings::from_config(Config {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..Config::default()
        });
        assert_eq!(
            settings.blacklisted_domains(),
            vec!["spam.example".to_string(), "bad.test".to_string()]
        );
        assert!(settings.whitelisted_domains().is_empty());
    }

    #[test]
    fn proxies_only_returned_when_enabled() {
        let mut config = Config::default();
        config.proxies = vec!["127.0.0.1:8080".to_string()];
        let settings = Settings::from_config(config.clone());
        assert!(settings.proxies().is_empty());

        config.proxy_enabled = true;
        let settings = Settings::from_config(config);
        assert_eq!(settings.proxies().len(), 1);
    }
}
