use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub analytics: AnalyticsConfig,
    pub notify: Option<NotifyConfig>,
    pub static_files: StaticFilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_token_ttl_days")]
    pub token_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoProvider {
    /// Remote JSON lookup (`{base}/{address}/json/`)
    Http,
    /// Local MaxMind GeoLite2 City database
    Maxmind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub geo_provider: GeoProvider,
    /// Base URL of the remote lookup service
    pub geo_lookup_url: String,
    pub geo_timeout_ms: u64,
    /// Successful lookups are cached for this long; 0 disables the cache
    pub geo_cache_ttl_secs: u64,
    pub geo_cache_max_entries: u64,
    pub geoip_city_db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFilesConfig {
    /// Directory served under `/profile-pics`
    pub profile_pics_dir: String,
}

impl AuthConfig {
    const fn default_token_ttl_days() -> i64 {
        7
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            geo_provider: GeoProvider::Http,
            geo_lookup_url: "https://ipapi.co".to_string(),
            geo_timeout_ms: 3000,
            geo_cache_ttl_secs: 3600,
            geo_cache_max_entries: 10_000,
            geoip_city_db_path: None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Database settings alone, for tools that never serve HTTP
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        Self {
            backend,
            url: env_or("DATABASE_URL", "sqlite://./sessionlog.db?mode=rwc"),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10u32),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DatabaseConfig::from_env();

        let host = env_or("HOST", "0.0.0.0");
        let port = env_or("PORT", "3003")
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        let token_ttl_days = env_parse("JWT_TTL_DAYS", AuthConfig::default_token_ttl_days());

        let defaults = AnalyticsConfig::default();
        let geo_provider = match env_or("GEO_PROVIDER", "http").to_lowercase().as_str() {
            "http" => GeoProvider::Http,
            "maxmind" => GeoProvider::Maxmind,
            other => {
                tracing::warn!(
                    "Unknown GEO_PROVIDER '{other}', falling back to 'http'. Supported values: http, maxmind"
                );
                GeoProvider::Http
            }
        };
        let geoip_city_db_path = std::env::var("GEOIP_CITY_DB_PATH").ok();
        if matches!(geo_provider, GeoProvider::Maxmind) && geoip_city_db_path.is_none() {
            anyhow::bail!("GEOIP_CITY_DB_PATH must be set when GEO_PROVIDER=maxmind");
        }

        let analytics = AnalyticsConfig {
            geo_provider,
            geo_lookup_url: env_or("GEO_LOOKUP_URL", &defaults.geo_lookup_url),
            geo_timeout_ms: env_parse("GEO_TIMEOUT_MS", defaults.geo_timeout_ms),
            geo_cache_ttl_secs: env_parse("GEO_CACHE_TTL_SECS", defaults.geo_cache_ttl_secs),
            geo_cache_max_entries: env_parse(
                "GEO_CACHE_MAX_ENTRIES",
                defaults.geo_cache_max_entries,
            ),
            geoip_city_db_path,
        };

        // Notifications are only enabled when both a relay and a recipient are configured
        let notify = match (std::env::var("SMTP_HOST"), std::env::var("NOTIFY_EMAIL_TO")) {
            (Ok(smtp_host), Ok(to)) => Some(NotifyConfig {
                smtp_host,
                smtp_port: env_parse("SMTP_PORT", 587u16),
                smtp_username: std::env::var("SMTP_USERNAME").ok(),
                smtp_password: std::env::var("SMTP_PASSWORD").ok(),
                from: env_or("NOTIFY_EMAIL_FROM", "sessionlog@localhost"),
                to,
            }),
            _ => None,
        };

        let profile_pics_dir = env_or("PROFILE_PICS_DIR", "profile-pics");

        Ok(Config {
            database,
            server: ServerConfig { host, port },
            auth: AuthConfig {
                jwt_secret,
                token_ttl_days,
            },
            analytics,
            notify,
            static_files: StaticFilesConfig { profile_pics_dir },
        })
    }
}
