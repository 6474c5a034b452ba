use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Monthly price settlement task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Run one settlement pass right after startup, before waiting for the
    /// next month boundary.
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Empty list means any origin is accepted.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_true() -> bool {
    true
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 配置文件不存在时完全依赖环境变量
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env()?,
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Unable to read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(config_str: &str) -> AppResult<Self> {
        toml::from_str(config_str)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {e}")))
    }

    fn from_env() -> AppResult<Self> {
        let database_url = get_env("DATABASE_URL").ok_or_else(|| {
            AppError::ConfigError("DATABASE_URL is not set and no config.toml was found".into())
        })?;

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 8080u16),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                min_connections: get_env_parse("DB_MIN_CONNECTIONS", default_min_connections()),
                connect_timeout_secs: get_env_parse(
                    "DB_CONNECT_TIMEOUT_SECS",
                    default_connect_timeout_secs(),
                ),
            },
            sync: SyncConfig {
                enabled: get_env_parse("SYNC_ENABLED", true),
                run_on_startup: get_env_parse("SYNC_RUN_ON_STARTUP", true),
            },
            cors: CorsConfig {
                allowed_origins: get_env("CORS_ALLOWED_ORIGINS")
                    .map(|v| parse_origins(&v))
                    .unwrap_or_default(),
            },
        })
    }

    // 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("DB_MIN_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.min_connections = mc;
        }
        if let Ok(v) = env::var("DB_CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.database.connect_timeout_secs = secs;
        }
        if let Ok(v) = env::var("SYNC_ENABLED")
            && let Ok(b) = v.parse()
        {
            self.sync.enabled = b;
        }
        if let Ok(v) = env::var("SYNC_RUN_ON_STARTUP")
            && let Ok(b) = v.parse()
        {
            self.sync.run_on_startup = b;
        }
        if let Ok(v) = env::var("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = parse_origins(&v);
        }
    }
}
