use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 迟到宽限期上限，一周
pub const MAX_LATE_THRESHOLD_MINS: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// 未设置时使用内存存储
    pub database_url: Option<String>,
    /// 未设置时关闭限流
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub db_max_connections: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub late_threshold_mins: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            jwt_secret: optional("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "::".into()),
            server_port: parse_or("SERVER_PORT", 3000)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            rate_limit_window_secs: parse_or("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", 100)?,
            late_threshold_mins: in_range(
                "LATE_THRESHOLD_MINS",
                parse_or("LATE_THRESHOLD_MINS", 10)?,
                0..=MAX_LATE_THRESHOLD_MINS,
            )?,
        })
    }

    /// 测试和本地调试用的默认配置
    pub fn for_secret(jwt_secret: &str) -> Self {
        Config {
            database_url: None,
            redis_url: None,
            jwt_secret: jwt_secret.to_string(),
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            db_max_connections: 10,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            late_threshold_mins: 10,
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn late_threshold(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.late_threshold_mins).unwrap_or(chrono::Duration::MAX)
    }
}

fn in_range<T>(key: &'static str, value: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_threshold_defaults_to_ten_minutes() {
        let config = Config::for_secret("secret");
        assert_eq!(config.late_threshold(), chrono::Duration::minutes(10));
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
    }

    #[test]
    fn late_threshold_must_be_in_range() {
        let range = 0..=MAX_LATE_THRESHOLD_MINS;
        assert_eq!(in_range("LATE_THRESHOLD_MINS", 15, range.clone()).unwrap(), 15);
        assert!(matches!(
            in_range("LATE_THRESHOLD_MINS", -1, range.clone()),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            in_range("LATE_THRESHOLD_MINS", i64::MAX, range),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn extreme_threshold_does_not_panic() {
        let mut config = Config::for_secret("secret");
        config.late_threshold_mins = i64::MAX;
        assert_eq!(config.late_threshold(), chrono::Duration::MAX);
    }
}
