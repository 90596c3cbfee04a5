//! Service configuration loaded via OrthoConfig.
//!
//! Values layer command-line flags over `ACCOUNTS_*` environment variables
//! over built-in defaults. Accessors validate, so a bad value is reported
//! with the setting that carried it.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::outbound::store::StoreSettings;

const DEFAULT_HTTP_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

fn default_http_address() -> String {
    DEFAULT_HTTP_ADDRESS.to_owned()
}

fn default_public_base_url() -> String {
    DEFAULT_PUBLIC_BASE_URL.to_owned()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_owned()
}

/// Invalid or missing configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("a database URL is required (ACCOUNTS_DATABASE_URL or --database-url)")]
    MissingDatabaseUrl,
    #[error("invalid HTTP address `{value}`: {message}")]
    InvalidHttpAddress { value: String, message: String },
    #[error("invalid public base URL `{value}`: {message}")]
    InvalidPublicBaseUrl { value: String, message: String },
    #[error("max connections must be at least 1")]
    ZeroMaxConnections,
}

/// Settings for the account service process.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ACCOUNTS")]
pub struct AppConfig {
    /// Socket address the HTTP server binds to.
    #[ortho_config(default = default_http_address())]
    pub http_address: String,
    /// Origin clients use to reach the service; pagination links hang off it.
    #[ortho_config(default = default_public_base_url())]
    pub public_base_url: String,
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    pub max_connections: Option<u32>,
    /// Milliseconds to wait for a pooled connection.
    pub acquire_timeout_ms: Option<u64>,
    /// Log filter used when `RUST_LOG` is unset.
    #[ortho_config(default = default_log_level())]
    pub log_level: String,
}

impl AppConfig {
    /// Address to bind, defaulting to all interfaces on port 8080.
    ///
    /// # Errors
    /// [`ConfigError::InvalidHttpAddress`] when the value is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http_address
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigError::InvalidHttpAddress {
                value: self.http_address.clone(),
                message: err.to_string(),
            })
    }

    /// Public origin of the service.
    ///
    /// # Errors
    /// [`ConfigError::InvalidPublicBaseUrl`] when the value is not an
    /// absolute URL.
    pub fn public_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.public_base_url).map_err(|err| ConfigError::InvalidPublicBaseUrl {
            value: self.public_base_url.clone(),
            message: err.to_string(),
        })
    }

    /// Pool settings, with defaults for anything not configured.
    ///
    /// # Errors
    /// [`ConfigError::MissingDatabaseUrl`] without a connection URL and
    /// [`ConfigError::ZeroMaxConnections`] for an empty pool.
    pub fn store_settings(&self) -> Result<StoreSettings, ConfigError> {
        let url = self
            .database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let mut settings = StoreSettings::new(url);
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err(ConfigError::ZeroMaxConnections);
            }
            settings.max_connections = max;
        }
        if let Some(ms) = self.acquire_timeout_ms {
            settings.acquire_timeout = Duration::from_millis(ms);
        }
        Ok(settings)
    }

    /// Log filter directive, defaulting to `info`.
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 6] = [
        "ACCOUNTS_HTTP_ADDRESS",
        "ACCOUNTS_PUBLIC_BASE_URL",
        "ACCOUNTS_DATABASE_URL",
        "ACCOUNTS_MAX_CONNECTIONS",
        "ACCOUNTS_ACQUIRE_TIMEOUT_MS",
        "ACCOUNTS_LOG_LEVEL",
    ];

    fn load(args: &[&str]) -> AppConfig {
        let args = std::iter::once(OsString::from("accounts"))
            .chain(args.iter().map(OsString::from));
        AppConfig::load_from_iter(args).expect("config should load")
    }

    fn cleared() -> Vec<(&'static str, Option<String>)> {
        VARS.iter().map(|name| (*name, None::<String>)).collect()
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(cleared());

        let config = load(&[]);

        assert_eq!(
            config.bind_addr(),
            Ok("0.0.0.0:8080".parse().expect("socket address"))
        );
        assert_eq!(
            config.public_base_url().map(String::from),
            Ok("http://localhost:8080/".to_owned())
        );
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.store_settings(), Err(ConfigError::MissingDatabaseUrl));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("ACCOUNTS_HTTP_ADDRESS", Some("127.0.0.1:9090".to_owned())),
            (
                "ACCOUNTS_PUBLIC_BASE_URL",
                Some("https://accounts.example.com".to_owned()),
            ),
            (
                "ACCOUNTS_DATABASE_URL",
                Some("postgres://svc:secret@db:5432/accounts".to_owned()),
            ),
            ("ACCOUNTS_MAX_CONNECTIONS", Some("4".to_owned())),
            ("ACCOUNTS_ACQUIRE_TIMEOUT_MS", Some("250".to_owned())),
            ("ACCOUNTS_LOG_LEVEL", Some("debug".to_owned())),
        ]);

        let config = load(&[]);
        let settings = config.store_settings().expect("store settings");

        assert_eq!(
            config.bind_addr(),
            Ok("127.0.0.1:9090".parse().expect("socket address"))
        );
        assert_eq!(
            config.public_base_url().map(String::from),
            Ok("https://accounts.example.com/".to_owned())
        );
        assert_eq!(settings.database_url, "postgres://svc:secret@db:5432/accounts");
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.log_level(), "debug");
    }

    #[rstest]
    fn command_line_flags_win_over_environment() {
        let vars = VARS.iter().map(|name| {
            let value = (*name == "ACCOUNTS_HTTP_ADDRESS").then(|| "127.0.0.1:9090".to_owned());
            (*name, value)
        });
        let _guard = lock_env(vars);

        let config = load(&["--http-address", "127.0.0.1:7070"]);

        assert_eq!(
            config.bind_addr(),
            Ok("127.0.0.1:7070".parse().expect("socket address"))
        );
    }

    #[rstest]
    fn unparsable_addresses_are_rejected() {
        let config = AppConfig {
            http_address: "localhost".to_owned(),
            ..blank()
        };

        assert!(matches!(
            config.bind_addr(),
            Err(ConfigError::InvalidHttpAddress { value, .. }) if value == "localhost"
        ));
    }

    #[rstest]
    fn relative_base_urls_are_rejected() {
        let config = AppConfig {
            public_base_url: "/accounts".to_owned(),
            ..blank()
        };

        assert!(matches!(
            config.public_base_url(),
            Err(ConfigError::InvalidPublicBaseUrl { .. })
        ));
    }

    #[rstest]
    #[case(Some(""), None, Err(ConfigError::MissingDatabaseUrl))]
    #[case(Some("postgres://localhost/accounts"), Some(0), Err(ConfigError::ZeroMaxConnections))]
    fn invalid_pool_settings_are_rejected(
        #[case] url: Option<&str>,
        #[case] max_connections: Option<u32>,
        #[case] expected: Result<StoreSettings, ConfigError>,
    ) {
        let config = AppConfig {
            database_url: url.map(str::to_owned),
            max_connections,
            ..blank()
        };

        assert_eq!(config.store_settings(), expected);
    }

    #[rstest]
    fn pool_defaults_fill_unset_values() {
        let config = AppConfig {
            database_url: Some("postgres://localhost/accounts".to_owned()),
            ..blank()
        };

        assert_eq!(
            config.store_settings(),
            Ok(StoreSettings::new("postgres://localhost/accounts"))
        );
    }

    fn blank() -> AppConfig {
        AppConfig {
            http_address: default_http_address(),
            public_base_url: default_public_base_url(),
            database_url: None,
            max_connections: None,
            acquire_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}
