use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://invoice_intake.db?mode=rwc";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// 发票上传与解析参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 上传文件大小上限 (字节)
    pub max_upload_bytes: usize,
    /// 单次解析超时 (毫秒)
    pub parse_timeout_ms: u64,
    /// 低于该置信度不给出匹配建议
    pub match_threshold: f64,
}

impl IngestConfig {
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            parse_timeout_ms: 5_000,
            match_threshold: 0.5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
            },
            ingest: IngestConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 < config/default.* < PVAPP__* 环境变量 < SERVER_HOST/SERVER_PORT/DATABASE_URL
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = IngestConfig::default();

        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .set_default("database.url", DEFAULT_DATABASE_URL)?
            .set_default("ingest.max_upload_bytes", defaults.max_upload_bytes as i64)?
            .set_default("ingest.parse_timeout_ms", defaults.parse_timeout_ms as i64)?
            .set_default("ingest.match_threshold", defaults.match_threshold)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("PVAPP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }
}
