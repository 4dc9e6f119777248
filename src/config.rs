use crate::api::transport::DEFAULT_BASE_URL;
use crate::api::upload::{
    UploadOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
};
use crate::db::Database;
use std::path::PathBuf;
use std::time::Duration;

pub const API_URL_ENV: &str = "CHATBOT_API_URL";
pub const DATA_DIR_ENV: &str = "CHATBOT_DATA_DIR";

const APP_DIR_NAME: &str = "chatbot-console";

pub const API_BASE_URL_KEY: &str = "api_base_url";
pub const UPLOAD_CHUNK_SIZE_KEY: &str = "upload_chunk_size";
pub const UPLOAD_MAX_RETRIES_KEY: &str = "upload_max_retries";
pub const UPLOAD_RETRY_DELAY_KEY: &str = "upload_retry_delay_ms";

pub const SETTING_KEYS: &[&str] = &[
    API_BASE_URL_KEY,
    UPLOAD_CHUNK_SIZE_KEY,
    UPLOAD_MAX_RETRIES_KEY,
    UPLOAD_RETRY_DELAY_KEY,
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown setting key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Could not determine a data directory; pass --data-dir or set CHATBOT_DATA_DIR")]
    NoDataDir,
    #[error("Failed to read settings: {0}")]
    Store(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub upload: UploadOptions,
}

impl Config {
    /// Flag, then environment, then stored setting, then default.
    pub fn resolve(db: &Database, base_url_flag: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with(db, base_url_flag, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        db: &Database,
        base_url_flag: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = match base_url_flag {
            Some(url) => url.to_string(),
            None => match env(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
                Some(url) => url,
                None => db
                    .get_setting(API_BASE_URL_KEY)?
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
        };

        let upload = UploadOptions {
            chunk_size: stored_number(db, UPLOAD_CHUNK_SIZE_KEY)?.unwrap_or(DEFAULT_CHUNK_SIZE),
            max_retries: stored_number(db, UPLOAD_MAX_RETRIES_KEY)?
                .map(|n| n as u32)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: stored_number(db, UPLOAD_RETRY_DELAY_KEY)?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        };

        Ok(Self { base_url, upload })
    }
}

fn stored_number(db: &Database, key: &str) -> Result<Option<u64>, ConfigError> {
    match db.get_setting(key)? {
        Some(raw) => parse_number(key, &raw).map(Some),
        None => Ok(None),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Where the local store lives: flag, then environment, then the platform
/// data directory.
pub fn data_dir(flag: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    data_dir_with(flag, |key| std::env::var(key).ok())
}

fn data_dir_with(
    flag: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = env(DATA_DIR_ENV).filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoDataDir)
}

/// Check a value before it is stored under `key`.
pub fn validate_setting(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    match key {
        API_BASE_URL_KEY => {
            let url = reqwest::Url::parse(value).map_err(|e| invalid(&e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid("expected an http or https address"));
            }
            Ok(())
        }
        UPLOAD_CHUNK_SIZE_KEY => match parse_number(key, value)? {
            0 => Err(invalid("chunk size must be greater than zero")),
            _ => Ok(()),
        },
        UPLOAD_MAX_RETRIES_KEY => {
            let n = parse_number(key, value)?;
            if n > u32::MAX as u64 {
                return Err(invalid("too many retries"));
            }
            Ok(())
        }
        UPLOAD_RETRY_DELAY_KEY => parse_number(key, value).map(|_| ()),
        _ => Err(ConfigError::UnknownKey(key.to_string())),
    }
}

/// Shorten a secret for display, keeping only its ends.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let db = Database::open_in_memory().unwrap();
        let config = Config::resolve_with(&db, None, no_env).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.upload.chunk_size, 1024 * 1024);
        assert_eq!(config.upload.max_retries, 2);
        assert_eq!(config.upload.retry_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_base_url_precedence() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(API_BASE_URL_KEY, "http://stored/v1").unwrap();
        let env = |key: &str| (key == API_URL_ENV).then(|| "http://env/v1".to_string());

        let config = Config::resolve_with(&db, None, no_env).unwrap();
        assert_eq!(config.base_url, "http://stored/v1");

        let config = Config::resolve_with(&db, None, env).unwrap();
        assert_eq!(config.base_url, "http://env/v1");

        let config = Config::resolve_with(&db, Some("http://flag/v1"), env).unwrap();
        assert_eq!(config.base_url, "http://flag/v1");
    }

    #[test]
    fn test_upload_settings_are_read() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(UPLOAD_CHUNK_SIZE_KEY, "4096").unwrap();
        db.set_setting(UPLOAD_MAX_RETRIES_KEY, "5").unwrap();
        db.set_setting(UPLOAD_RETRY_DELAY_KEY, "250").unwrap();

        let config = Config::resolve_with(&db, None, no_env).unwrap();
        assert_eq!(config.upload.chunk_size, 4096);
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.upload.retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_corrupt_setting_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(UPLOAD_CHUNK_SIZE_KEY, "big").unwrap();
        let err = Config::resolve_with(&db, None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_setting() {
        assert!(validate_setting(API_BASE_URL_KEY, "https://bot.example.com/v1").is_ok());
        assert!(validate_setting(API_BASE_URL_KEY, "localhost:8000").is_err());
        assert!(validate_setting(UPLOAD_CHUNK_SIZE_KEY, "0").is_err());
        assert!(validate_setting(UPLOAD_MAX_RETRIES_KEY, "3").is_ok());
        assert!(matches!(
            validate_setting("theme", "dark"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_data_dir_precedence() {
        let env = |key: &str| (key == DATA_DIR_ENV).then(|| "/tmp/from-env".to_string());
        assert_eq!(
            data_dir_with(Some(PathBuf::from("/tmp/flag")), env).unwrap(),
            PathBuf::from("/tmp/flag")
        );
        assert_eq!(
            data_dir_with(None, env).unwrap(),
            PathBuf::from("/tmp/from-env")
        );
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("access_token=abcdef"), "acce...cdef");
        assert_eq!(mask_secret("short"), "*****");
    }
}
