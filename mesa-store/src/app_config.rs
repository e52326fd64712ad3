use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mercadopago: MercadoPagoConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MercadoPagoConfig {
    pub access_token: Option<String>,
    /// Shared secret for webhook HMAC verification. When unset, signature
    /// checks are skipped and a warning is logged at startup.
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    #[serde(default = "default_retry_limit")]
    pub retry_limit: i64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
        }
    }
}

fn default_retry_limit() -> i64 {
    10
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `MESA__SERVER__PORT=8080` overrides server.port
            .add_source(config::Environment::with_prefix("MESA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
