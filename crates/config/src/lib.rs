use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Service configuration. Loaded from `config/default.toml` (optional)
/// overlaid with `VITALIS__`-prefixed environment variables, e.g.
/// `VITALIS__DATABASE__URI` or `VITALIS__CHAT__TYPING_TTL_MS`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_db_name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the platform's auth service. Tokens are
    /// only verified here, never issued.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    /// How many recent messages ride along with a private-chat lookup.
    #[serde(default = "default_latest_limit")]
    pub latest_limit: i64,
    /// Typing indicators auto-expire after this long without a refresh.
    #[serde(default = "default_typing_ttl_ms")]
    pub typing_ttl_ms: u64,
    /// Upper bound on message persistence before the sender gets an error.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("VITALIS").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            name: default_db_name(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            latest_limit: default_latest_limit(),
            typing_ttl_ms: default_typing_ttl_ms(),
            persist_timeout_ms: default_persist_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_db_name() -> String {
    "vitalis_chat".to_string()
}

fn default_jwt_secret() -> String {
    "dev-secret-change-me".to_string()
}

fn default_max_message_length() -> usize {
    500
}

fn default_page_size() -> i64 {
    50
}

fn default_max_page_size() -> i64 {
    100
}

fn default_latest_limit() -> i64 {
    50
}

fn default_typing_ttl_ms() -> u64 {
    2500
}

fn default_persist_timeout_ms() -> u64 {
    5000
}
