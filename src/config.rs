//! Environment configuration
//!
//! Reads credentials and the optional `FIGMA_CACHING` setting.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Directory name used under the platform cache directory
const DEFAULT_CACHE_DIR_NAME: &str = "figma-mcp";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Either FIGMA_API_KEY or FIGMA_OAUTH_TOKEN is required")]
    MissingCredentials,

    #[error("FIGMA_CACHING must be a JSON object: {0}")]
    InvalidCachingJson(String),

    #[error("FIGMA_CACHING.ttl.value must be a positive number")]
    InvalidTtlValue,

    #[error("FIGMA_CACHING.ttl.unit must be one of ms, s, m, h, d (got '{0}')")]
    InvalidTtlUnit(String),

    #[error("Cannot resolve cache directory: {0}")]
    CacheDir(String),
}

/// Credentials for the Figma API
#[derive(Clone, Default)]
pub struct AuthOptions {
    /// Personal access token, sent as `X-Figma-Token`
    pub api_key: String,
    /// OAuth token, sent as `Authorization: Bearer`
    pub oauth_token: String,
    /// Prefer the OAuth token
    pub use_oauth: bool,
}

impl AuthOptions {
    /// Header name and value for API requests
    pub fn header(&self) -> (&'static str, String) {
        if self.use_oauth && !self.oauth_token.is_empty() {
            ("Authorization", format!("Bearer {}", self.oauth_token))
        } else {
            ("X-Figma-Token", self.api_key.clone())
        }
    }

    /// Active credential with all but the last four characters hidden
    pub fn masked(&self) -> String {
        if self.use_oauth {
            mask_key(&self.oauth_token)
        } else {
            mask_key(&self.api_key)
        }
    }
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("credential", &self.masked())
            .field("use_oauth", &self.use_oauth)
            .finish()
    }
}

/// Mask a secret for logging
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Disk cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingOptions {
    pub cache_dir: PathBuf,
    pub ttl: Duration,
}

/// Full runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthOptions,
    /// `None` disables the disk cache (pass-through mode)
    pub caching: Option<CachingOptions>,
    /// Override for the API root, mostly for testing against a local server
    pub api_base_url: Option<String>,
}

impl Config {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var("FIGMA_API_KEY").unwrap_or_default();
        let oauth_token = non_empty_var("FIGMA_OAUTH_TOKEN").unwrap_or_default();

        if api_key.is_empty() && oauth_token.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let caching = match non_empty_var("FIGMA_CACHING") {
            Some(raw) => Some(parse_caching_config(&raw)?),
            None => None,
        };

        Ok(Self {
            auth: AuthOptions {
                use_oauth: !oauth_token.is_empty(),
                api_key,
                oauth_token,
            },
            caching,
            api_base_url: non_empty_var("FIGMA_API_BASE_URL"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCachingConfig {
    cache_dir: Option<String>,
    ttl: RawTtl,
}

#[derive(Debug, Deserialize)]
struct RawTtl {
    value: f64,
    unit: String,
}

/// Parse the `FIGMA_CACHING` JSON value
///
/// Expected shape: `{"cacheDir": "~/cache", "ttl": {"value": 30, "unit": "m"}}`.
pub fn parse_caching_config(raw: &str) -> Result<CachingOptions, ConfigError> {
    let parsed: RawCachingConfig = serde_json::from_str(raw)
        .map_err(|e| ConfigError::InvalidCachingJson(e.to_string()))?;

    if !parsed.ttl.value.is_finite() || parsed.ttl.value <= 0.0 {
        return Err(ConfigError::InvalidTtlValue);
    }

    let unit_ms: f64 = match parsed.ttl.unit.as_str() {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        other => return Err(ConfigError::InvalidTtlUnit(other.to_string())),
    };
    let ttl = Duration::from_millis((parsed.ttl.value * unit_ms).round() as u64);

    let cache_dir = resolve_cache_dir(parsed.cache_dir.as_deref())?;

    Ok(CachingOptions { cache_dir, ttl })
}

/// Resolve the configured cache directory to an absolute path
fn resolve_cache_dir(input: Option<&str>) -> Result<PathBuf, ConfigError> {
    let input = match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(input) => input,
        None => return default_cache_dir(),
    };

    let expanded = expand_home_dir(input)?;
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    let cwd = env::current_dir().map_err(|e| ConfigError::CacheDir(e.to_string()))?;
    Ok(cwd.join(expanded))
}

fn expand_home_dir(path: &str) -> Result<PathBuf, ConfigError> {
    let home = || {
        dirs::home_dir().ok_or_else(|| ConfigError::CacheDir("no home directory".to_string()))
    };

    if path == "~" {
        return home();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(home()?.join(rest));
    }
    Ok(Path::new(path).to_path_buf())
}

fn default_cache_dir() -> Result<PathBuf, ConfigError> {
    if let Some(base) = dirs::cache_dir() {
        return Ok(base.join(DEFAULT_CACHE_DIR_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".cache").join(DEFAULT_CACHE_DIR_NAME))
        .ok_or_else(|| ConfigError::CacheDir("no cache or home directory".to_string()))
}
