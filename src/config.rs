use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub scorer_url: String,
    pub scorer_secret: String,
    pub scorer_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub scoring_poll_ms: u64,
    pub scoring_max_attempts: i32,
    pub created_attempt_ttl_minutes: i64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let scorer_url = get_env("SCORER_URL")?;
        url::Url::parse(&scorer_url)
            .map_err(|e| Error::Config(format!("Invalid value for SCORER_URL: {}", e)))?;

        Ok(Self {
            database_url: get_env("DATABASE_URL")?,
            db_max_connections: get_env_parse_or("DB_MAX_CONNECTIONS", 20)?,
            scorer_url,
            scorer_secret: get_env("SCORER_SECRET")?,
            scorer_timeout_secs: get_env_parse_or("SCORER_TIMEOUT_SECS", 60)?,
            sweep_interval_secs: get_env_parse_or("SWEEP_INTERVAL_SECS", 60)?,
            scoring_poll_ms: get_env_parse_or("SCORING_POLL_MS", 750)?,
            scoring_max_attempts: get_env_parse_or("SCORING_MAX_ATTEMPTS", 5)?,
            created_attempt_ttl_minutes: get_env_parse_or("CREATED_ATTEMPT_TTL_MINUTES", 1440)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
