use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_BUCKET: &str = "SUPABASE_BUCKET";
pub const ENV_ROOT: &str = "LOCAL_TEXTBOOKS_ROOT";

pub const DEFAULT_BUCKET: &str = "school_textbooks";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
}

/// Connection settings for the remote textbook store.
#[derive(Clone)]
pub struct StoreConfig {
    /// Project URL without the `/rest/v1` suffix and without a trailing slash.
    pub url: String,
    pub service_key: String,
    /// Storage bucket the PDFs are published to. Only reported, never written.
    pub bucket: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl StoreConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = non_empty(&lookup, ENV_URL).ok_or(ConfigError::Missing(ENV_URL))?;
        let service_key =
            non_empty(&lookup, ENV_SERVICE_KEY).ok_or(ConfigError::Missing(ENV_SERVICE_KEY))?;
        let bucket = non_empty(&lookup, ENV_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string());

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        })
    }

    pub fn rest_base(&self) -> String {
        format!("{}/rest/v1", self.url)
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub root: PathBuf,
    pub store: StoreConfig,
}

impl IndexerConfig {
    pub fn from_env(root_override: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::from_lookup(root_override, env_lookup)
    }

    pub fn from_lookup<F>(root_override: Option<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = StoreConfig::from_lookup(&lookup)?;
        Ok(Self {
            root: resolve_root(root_override, &lookup),
            store,
        })
    }
}

/// `--root` wins, then `LOCAL_TEXTBOOKS_ROOT`, then `~/Desktop/textbooks_src`.
pub fn resolve_root<F>(root_override: Option<PathBuf>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = root_override {
        return root;
    }
    if let Some(root) = non_empty(&lookup, ENV_ROOT) {
        return PathBuf::from(root);
    }

    let home = non_empty(&lookup, "HOME")
        .or_else(|| non_empty(&lookup, "USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("Desktop").join("textbooks_src")
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
