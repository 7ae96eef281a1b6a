//! Configuration loading and merging for the CLI.
//!
//! Precedence for every setting: command-line flag, then the config file,
//! then the built-in default.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sitewatch_core::check::{CONNECT_TIMEOUT_SECS, FetcherOptions, REQUEST_TIMEOUT_SECS};
use sitewatch_core::throttle::{DEFAULT_CONCURRENCY, DEFAULT_WAIT};

use crate::cli::CheckArgs;

const APP_DIR: &str = "sitewatch";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "db.sqlite";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Checks in flight per host.
    pub concurrency: Option<u8>,
    /// Minimum seconds between checks on one lane.
    pub wait_secs: Option<f64>,
    /// Upper bound on one whole check in seconds.
    pub check_timeout_secs: Option<u64>,
    /// Total HTTP request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Database file.
    pub db_path: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against the same ranges as the CLI.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }

        if let Some(wait) = self.wait_secs
            && !(0.0..=3600.0).contains(&wait)
        {
            bail!("Invalid config value for `wait_secs`: {wait}. Expected range: 0..=3600");
        }

        validate_timeout_secs("check_timeout_secs", self.check_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Settings for one `check` run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSettings {
    pub concurrency: usize,
    pub wait: Duration,
    pub check_timeout: Option<Duration>,
    pub fetcher: FetcherOptions,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/sitewatch/config.toml`
/// 2. `$HOME/.config/sitewatch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    xdg_path(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
        ".config",
        CONFIG_FILE,
    )
}

/// Resolves default database path.
///
/// Priority:
/// 1. `$XDG_DATA_HOME/sitewatch/db.sqlite`
/// 2. `$HOME/.local/share/sitewatch/db.sqlite`
#[must_use]
pub fn resolve_default_db_path() -> Option<PathBuf> {
    xdg_path(
        env_var_non_empty_os("XDG_DATA_HOME"),
        env_var_non_empty_os("HOME"),
        ".local/share",
        DB_FILE,
    )
}

fn xdg_path(
    xdg_home: Option<OsString>,
    home: Option<OsString>,
    home_fallback: &str,
    file: &str,
) -> Option<PathBuf> {
    if let Some(xdg_home) = xdg_home {
        return Some(PathBuf::from(xdg_home).join(APP_DIR).join(file));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(home_fallback)
            .join(APP_DIR)
            .join(file),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Picks the database path: `--db`/`SITEWATCH_DB`, then `db_path`, then the XDG default.
pub fn resolve_db_path(cli_db: Option<&Path>, file_config: Option<&FileConfig>) -> Result<PathBuf> {
    if let Some(path) = cli_db {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = file_config.and_then(|c| c.db_path.clone()) {
        return Ok(path);
    }
    resolve_default_db_path()
        .context("Cannot determine database location: set --db, SITEWATCH_DB or HOME")
}

/// Merges `check` flags over the config file and defaults.
pub fn resolve_check_settings(
    args: &CheckArgs,
    file_config: Option<&FileConfig>,
) -> Result<CheckSettings> {
    let file = file_config.cloned().unwrap_or_default();

    let concurrency = args
        .concurrency
        .or(file.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);

    let wait = match args.wait.or(file.wait_secs) {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid wait value: {secs}"))?,
        None => DEFAULT_WAIT,
    };

    let check_timeout = args
        .timeout
        .or(file.check_timeout_secs)
        .map(Duration::from_secs);

    let fetcher = FetcherOptions {
        connect_timeout: Duration::from_secs(
            file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        ),
        request_timeout: Duration::from_secs(
            file.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS),
        ),
        ..FetcherOptions::default()
    };

    Ok(CheckSettings {
        concurrency,
        wait,
        check_timeout,
        fetcher,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn check_args() -> CheckArgs {
        CheckArgs {
            site_id: None,
            concurrency: None,
            wait: None,
            timeout: None,
        }
    }

    // ==================== Parsing ====================

    #[test]
    fn test_parse_config_partial_fields() {
        let config = parse_config_str("concurrency = 4\nwait_secs = 2.5\n").unwrap();
        assert_eq!(config.concurrency, Some(4));
        assert_eq!(config.wait_secs, Some(2.5));
        assert_eq!(config.db_path, None);
    }

    #[test]
    fn test_parse_config_all_fields() {
        let config = parse_config_str(
            r#"
            # sitewatch settings
            concurrency = 3
            wait_secs = 0
            check_timeout_secs = 90
            request_timeout_secs = 45
            connect_timeout_secs = 10
            db_path = "/var/lib/sitewatch/db.sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.check_timeout_secs, Some(90));
        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/var/lib/sitewatch/db.sqlite"))
        );
    }

    #[test]
    fn test_parse_config_empty_is_default() {
        assert_eq!(parse_config_str("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_parse_config_unknown_key_rejected() {
        assert!(parse_config_str("rate_limit = 5").is_err());
    }

    #[test]
    fn test_parse_config_out_of_range_rejected() {
        let err = parse_config_str("concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("concurrency"));
        assert!(parse_config_str("wait_secs = -1.0").is_err());
        assert!(parse_config_str("connect_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_load_file_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "concurrency = \"many\"").unwrap();

        let err = load_file_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    // ==================== Paths ====================

    #[test]
    fn test_xdg_path_prefers_xdg_home() {
        let path = xdg_path(
            Some(OsString::from("/xdg")),
            Some(OsString::from("/home/u")),
            ".config",
            CONFIG_FILE,
        );
        assert_eq!(path, Some(PathBuf::from("/xdg/sitewatch/config.toml")));
    }

    #[test]
    fn test_xdg_path_falls_back_to_home() {
        let path = xdg_path(None, Some(OsString::from("/home/u")), ".local/share", DB_FILE);
        assert_eq!(
            path,
            Some(PathBuf::from("/home/u/.local/share/sitewatch/db.sqlite"))
        );
        assert_eq!(xdg_path(None, None, ".config", CONFIG_FILE), None);
    }

    #[test]
    fn test_resolve_db_path_precedence() {
        let file = FileConfig {
            db_path: Some(PathBuf::from("/from/file.sqlite")),
            ..FileConfig::default()
        };
        assert_eq!(
            resolve_db_path(Some(Path::new("/from/cli.sqlite")), Some(&file)).unwrap(),
            PathBuf::from("/from/cli.sqlite")
        );
        assert_eq!(
            resolve_db_path(None, Some(&file)).unwrap(),
            PathBuf::from("/from/file.sqlite")
        );
    }

    // ==================== Check settings ====================

    #[test]
    fn test_check_settings_defaults() {
        let settings = resolve_check_settings(&check_args(), None).unwrap();
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.wait, DEFAULT_WAIT);
        assert_eq!(settings.check_timeout, None);
        assert_eq!(settings.fetcher, FetcherOptions::default());
    }

    #[test]
    fn test_check_settings_file_overrides_defaults() {
        let file = FileConfig {
            concurrency: Some(5),
            wait_secs: Some(0.25),
            request_timeout_secs: Some(20),
            ..FileConfig::default()
        };
        let settings = resolve_check_settings(&check_args(), Some(&file)).unwrap();
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.wait, Duration::from_millis(250));
        assert_eq!(settings.fetcher.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_check_settings_cli_overrides_file() {
        let file = FileConfig {
            concurrency: Some(5),
            wait_secs: Some(3.0),
            check_timeout_secs: Some(100),
            ..FileConfig::default()
        };
        let args = CheckArgs {
            concurrency: Some(1),
            wait: Some(0.0),
            timeout: Some(10),
            ..check_args()
        };
        let settings = resolve_check_settings(&args, Some(&file)).unwrap();
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.wait, Duration::ZERO);
        assert_eq!(settings.check_timeout, Some(Duration::from_secs(10)));
    }
}
