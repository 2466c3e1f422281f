use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::paths;

pub const ENV_ARTIFACT_CACHE_DIR: &str = "COURIER_ARTIFACT_CACHE_DIR";
pub const ENV_ARTIFACT_SCRATCH_DIR: &str = "COURIER_ARTIFACT_SCRATCH_DIR";
pub const ENV_ARTIFACT_FILE_SIZE_LIMIT: &str = "COURIER_ARTIFACT_FILE_SIZE_LIMIT";
pub const ENV_MAX_CACHED_ARTIFACTS: &str = "COURIER_MAX_CACHED_ARTIFACTS";
pub const ENV_EVICTION_PERIOD_SECS: &str = "COURIER_EVICTION_PERIOD_SECS";

const SCRATCH_DIR_NAME: &str = ".scratch";

/// Root configuration structure for courier.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via courier.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_cache")]
    pub cache: CacheConfig,

    #[serde(default = "default_execution")]
    pub execution: ExecutionConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cache: default_cache(),
            execution: default_execution(),
        }
    }
}

/// Local artifact cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Unset means `~/.cache/courier/artifacts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    /// Unset means `<rootDir>/.scratch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_artifact_file_size_limit")]
    pub artifact_file_size_limit: u64,

    #[serde(default = "default_max_cached_artifacts")]
    pub max_cached_artifacts: usize,

    #[serde(default = "default_eviction_period_secs")]
    pub eviction_period_secs: u64,

    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl CacheConfig {
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::artifact_cache(),
        }
    }

    pub fn scratch_dir(&self) -> Result<PathBuf> {
        match &self.scratch_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.root_dir()?.join(SCRATCH_DIR_NAME)),
        }
    }

    /// Config rooted at `root`, everything else built in.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: Some(root.into()),
            ..default_cache()
        }
    }
}

/// Pipeline and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    #[serde(default = "default_staging_dir_root")]
    pub staging_dir_root: String,

    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,

    #[serde(default = "default_ssh_retry_attempts")]
    pub ssh_retry_attempts: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Handler-side ceiling; unset streams artifacts of any size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_max_artifact_size: Option<u64>,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_cache() -> CacheConfig {
    CacheConfig {
        root_dir: None,
        scratch_dir: None,
        artifact_file_size_limit: default_artifact_file_size_limit(),
        max_cached_artifacts: default_max_cached_artifacts(),
        eviction_period_secs: default_eviction_period_secs(),
        lock_ttl_secs: default_lock_ttl_secs(),
    }
}

fn default_artifact_file_size_limit() -> u64 {
    4 * 1024 * 1024 * 1024
}

fn default_max_cached_artifacts() -> usize {
    100
}

fn default_eviction_period_secs() -> u64 {
    300
}

fn default_lock_ttl_secs() -> u64 {
    3600
}

fn default_execution() -> ExecutionConfig {
    ExecutionConfig {
        staging_dir_root: default_staging_dir_root(),
        ssh_connect_timeout_secs: default_ssh_connect_timeout_secs(),
        ssh_retry_attempts: default_ssh_retry_attempts(),
        http_timeout_secs: default_http_timeout_secs(),
        handler_max_artifact_size: None,
    }
}

fn default_staging_dir_root() -> String {
    "/tmp/courier".to_string()
}

fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

fn default_ssh_retry_attempts() -> u32 {
    3
}

fn default_http_timeout_secs() -> u64 {
    300
}

// =============================================================================
// Environment overrides
// =============================================================================

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        Error::config_invalid_value(key, Some(raw.to_string()), "expected a non-negative integer")
    })
}

/// Apply `COURIER_*` overrides from `lookup` on top of `defaults`.
pub fn apply_overrides<F>(mut defaults: Defaults, lookup: F) -> Result<Defaults>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_ARTIFACT_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
        defaults.cache.root_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = lookup(ENV_ARTIFACT_SCRATCH_DIR).filter(|v| !v.trim().is_empty()) {
        defaults.cache.scratch_dir = Some(PathBuf::from(dir));
    }
    if let Some(raw) = lookup(ENV_ARTIFACT_FILE_SIZE_LIMIT) {
        defaults.cache.artifact_file_size_limit =
            parse_override(ENV_ARTIFACT_FILE_SIZE_LIMIT, &raw)?;
    }
    if let Some(raw) = lookup(ENV_MAX_CACHED_ARTIFACTS) {
        defaults.cache.max_cached_artifacts = parse_override(ENV_MAX_CACHED_ARTIFACTS, &raw)?;
    }
    if let Some(raw) = lookup(ENV_EVICTION_PERIOD_SECS) {
        let period: u64 = parse_override(ENV_EVICTION_PERIOD_SECS, &raw)?;
        if period == 0 {
            return Err(Error::config_invalid_value(
                ENV_EVICTION_PERIOD_SECS,
                Some(raw),
                "eviction period must be at least one second",
            ));
        }
        defaults.cache.eviction_period_secs = period;
    }
    Ok(defaults)
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If courier.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// File config plus process environment overrides.
pub fn resolve_defaults() -> Result<Defaults> {
    apply_overrides(load_defaults(), |key| std::env::var(key).ok())
}

/// Load the full courier.json config, falling back to defaults on any error.
pub fn load_config() -> CourierConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> Result<CourierConfig> {
    let path = paths::courier_json()?;

    if !path.exists() {
        return Err(Error::other("courier.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Save config to courier.json file (creates if missing).
pub fn save_config(config: &CourierConfig) -> Result<()> {
    let path = paths::courier_json()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| {
        Error::internal_json(e.to_string(), Some("serialize courier.json".to_string()))
    })?;

    fs::write(&path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })?;

    Ok(())
}

/// Check if courier.json file exists
pub fn config_exists() -> bool {
    paths::courier_json().map(|p| p.exists()).unwrap_or(false)
}

/// Delete courier.json file (reset to defaults)
pub fn reset_config() -> Result<bool> {
    let path = paths::courier_json()?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Get the path to courier.json (for display purposes)
pub fn config_path() -> Result<String> {
    Ok(paths::courier_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn builtin_cache_defaults() {
        let defaults = builtin_defaults();
        assert_eq!(defaults.cache.artifact_file_size_limit, 4 * 1024 * 1024 * 1024);
        assert_eq!(defaults.cache.max_cached_artifacts, 100);
        assert_eq!(defaults.cache.eviction_period_secs, 300);
        assert_eq!(defaults.cache.lock_ttl_secs, 3600);
        assert_eq!(defaults.execution.staging_dir_root, "/tmp/courier");
    }

    #[test]
    fn partial_file_config_keeps_other_defaults() {
        let config: CourierConfig =
            serde_json::from_str(r#"{"defaults":{"cache":{"maxCachedArtifacts":7}}}"#).unwrap();
        assert_eq!(config.defaults.cache.max_cached_artifacts, 7);
        assert_eq!(config.defaults.cache.eviction_period_secs, 300);
        assert_eq!(config.defaults.execution.ssh_retry_attempts, 3);
    }

    #[test]
    fn scratch_dir_defaults_under_root() {
        let cache = CacheConfig::rooted_at("/var/cache/courier");
        assert_eq!(
            cache.scratch_dir().unwrap(),
            PathBuf::from("/var/cache/courier/.scratch")
        );
    }

    #[test]
    fn env_overrides_apply() {
        let defaults = apply_overrides(
            builtin_defaults(),
            lookup(&[
                (ENV_ARTIFACT_CACHE_DIR, "/data/cache"),
                (ENV_ARTIFACT_FILE_SIZE_LIMIT, "1024"),
                (ENV_MAX_CACHED_ARTIFACTS, "5"),
                (ENV_EVICTION_PERIOD_SECS, "60"),
            ]),
        )
        .unwrap();
        assert_eq!(defaults.cache.root_dir, Some(PathBuf::from("/data/cache")));
        assert_eq!(defaults.cache.artifact_file_size_limit, 1024);
        assert_eq!(defaults.cache.max_cached_artifacts, 5);
        assert_eq!(defaults.cache.eviction_period_secs, 60);
    }

    #[test]
    fn invalid_override_is_config_error() {
        let err = apply_overrides(
            builtin_defaults(),
            lookup(&[(ENV_MAX_CACHED_ARTIFACTS, "lots")]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn zero_eviction_period_rejected() {
        let err = apply_overrides(
            builtin_defaults(),
            lookup(&[(ENV_EVICTION_PERIOD_SECS, "0")]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }
}
