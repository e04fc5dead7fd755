//! Configuration for the keyed store connection pool
//!
//! Provides a builder pattern for configuring the backing MySQL database and
//! a reader for the flat `mysql_*` property keys supplied by a host process.

use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::MySqlConnectOptions;

use crate::error::{Result, StoreError};

/// Default MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// Connection pool tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of concurrent leases
    pub max_connections: u32,
    /// How long a caller waits for a lease before failing
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long
    pub idle_timeout: Duration,
    /// Connections are recycled after this long
    pub max_lifetime: Duration,
    /// Prepared statements cached per connection
    pub statement_cache_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
            statement_cache_capacity: 250,
        }
    }
}

/// Configuration for the keyed store
#[derive(Clone)]
pub struct StoreConfig {
    /// MySQL server host
    pub host: String,
    /// MySQL server port (default: 3306)
    pub port: u16,
    /// Database holding the namespace tables
    pub database: String,
    /// Extra URL query options, e.g. `ssl-mode=DISABLED&charset=utf8mb4`
    pub connection_options: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Pool tuning
    pub pool: PoolSettings,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("connection_options", &self.connection_options)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pool", &self.pool)
            .finish()
    }
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(host: impl Into<String>, database: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(host, database)
    }

    /// Read a configuration from `mysql_*` properties
    ///
    /// Recognized keys are `mysql_host`, `mysql_port`, `mysql_database`,
    /// `mysql_connection_options`, `mysql_user` and `mysql_password`; other
    /// keys are ignored. Host and database are required.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut host = None;
        let mut port = None;
        let mut database = None;
        let mut options = None;
        let mut user = None;
        let mut password = None;

        for (key, value) in properties {
            let value = value.into();
            match key.as_ref() {
                "mysql_host" => host = Some(value),
                "mysql_port" => {
                    port = Some(value.trim().parse::<u16>().map_err(|e| {
                        StoreError::validation(format!("Invalid mysql_port '{}': {}", value, e))
                    })?)
                }
                "mysql_database" => database = Some(value),
                "mysql_connection_options" => options = Some(value),
                "mysql_user" => user = Some(value),
                "mysql_password" => password = Some(value),
                _ => {}
            }
        }

        let host = host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| StoreError::validation("Missing required property 'mysql_host'"))?;
        let database = database
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| StoreError::validation("Missing required property 'mysql_database'"))?;

        let mut builder = StoreConfig::builder(host, database).port(port.unwrap_or(DEFAULT_PORT));
        if let Some(options) = options {
            builder = builder.connection_options(options);
        }
        if let Some(user) = user {
            builder = builder.user(user);
        }
        if let Some(password) = password {
            builder = builder.password(password);
        }
        Ok(builder.build())
    }

    /// Connection URL without credentials
    pub fn url(&self) -> String {
        match &self.connection_options {
            Some(options) => format!(
                "mysql://{}:{}/{}?{}",
                self.host, self.port, self.database, options
            ),
            None => format!("mysql://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    /// Driver connect options for this configuration
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::from_str(&self.url())
            .map_err(|e| StoreError::connection(format!("Invalid connection settings: {}", e)))?
            .statement_cache_capacity(self.pool.statement_cache_capacity);

        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Create a new builder with the server host and database name
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            config: StoreConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                database: database.into(),
                connection_options: None,
                user: None,
                password: None,
                pool: PoolSettings::default(),
            },
        }
    }

    /// Set the server port (default: 3306)
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set URL query options; a leading `?` is stripped
    pub fn connection_options(mut self, options: impl Into<String>) -> Self {
        let options = options.into();
        let options = options.strip_prefix('?').unwrap_or(&options).trim().to_string();
        self.config.connection_options = if options.is_empty() {
            None
        } else {
            Some(options)
        };
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the maximum number of concurrent leases (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.pool.max_connections = max;
        self
    }

    /// Set the lease wait timeout (default: 30s)
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout (default: 10min)
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime (default: 30min)
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.pool.max_lifetime = lifetime;
        self
    }

    /// Set the per-connection prepared statement cache size (default: 250)
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.pool.statement_cache_capacity = capacity;
        self
    }

    /// Replace every pool setting at once
    pub fn pool(mut self, pool: PoolSettings) -> Self {
        self.config.pool = pool;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // PoolSettings Tests
    // =========================================================================

    #[test]
    fn test_pool_settings_default() {
        let pool = PoolSettings::default();
        assert_eq!(pool.max_connections, 10);
        assert_eq!(pool.acquire_timeout, Duration::from_secs(30));
        assert_eq!(pool.idle_timeout, Duration::from_secs(600));
        assert_eq!(pool.max_lifetime, Duration::from_secs(1800));
        assert_eq!(pool.statement_cache_capacity, 250);
    }

    // =========================================================================
    // Builder Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = StoreConfig::builder("localhost", "store").build();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.database, "store");
        assert!(config.connection_options.is_none());
        assert!(config.user.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.pool, PoolSettings::default());
    }

    #[test]
    fn test_full_custom_config() {
        let config = StoreConfig::builder("db.internal", "store")
            .port(3307)
            .user("app")
            .password("secret")
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .max_lifetime(Duration::from_secs(120))
            .statement_cache_capacity(16)
            .build();

        assert_eq!(config.port, 3307);
        assert_eq!(config.user.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.pool.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.pool.max_lifetime, Duration::from_secs(120));
        assert_eq!(config.pool.statement_cache_capacity, 16);
    }

    #[test]
    fn test_connection_options_strip_question_mark() {
        let config = StoreConfig::builder("localhost", "store")
            .connection_options("?ssl-mode=DISABLED")
            .build();
        assert_eq!(config.connection_options.as_deref(), Some("ssl-mode=DISABLED"));

        let config = StoreConfig::builder("localhost", "store")
            .connection_options("?")
            .build();
        assert!(config.connection_options.is_none());
    }

    #[test]
    fn test_url() {
        let config = StoreConfig::builder("localhost", "store").build();
        assert_eq!(config.url(), "mysql://localhost:3306/store");

        let config = StoreConfig::builder("localhost", "store")
            .port(3307)
            .connection_options("ssl-mode=DISABLED")
            .build();
        assert_eq!(config.url(), "mysql://localhost:3307/store?ssl-mode=DISABLED");
    }

    #[test]
    fn test_connect_options_parse() {
        let config = StoreConfig::builder("localhost", "store")
            .user("app")
            .password("p@ss/word")
            .build();
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = StoreConfig::builder("localhost", "store")
            .password("secret")
            .build();
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("StoreConfig"));
        assert!(!debug_str.contains("secret"));
    }

    // =========================================================================
    // Property Tests
    // =========================================================================

    #[test]
    fn test_from_properties() {
        let config = StoreConfig::from_properties([
            ("mysql_host", "db"),
            ("mysql_port", "3310"),
            ("mysql_database", "keyed"),
            ("mysql_connection_options", "?useSSL=false"),
            ("mysql_user", "root"),
            ("mysql_password", "pw"),
            ("unrelated", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.host, "db");
        assert_eq!(config.port, 3310);
        assert_eq!(config.database, "keyed");
        assert_eq!(config.connection_options.as_deref(), Some("useSSL=false"));
        assert_eq!(config.user.as_deref(), Some("root"));
        assert_eq!(config.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_from_properties_default_port() {
        let config =
            StoreConfig::from_properties([("mysql_host", "db"), ("mysql_database", "keyed")])
                .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_from_properties_requires_host_and_database() {
        let err = StoreConfig::from_properties([("mysql_database", "keyed")]).unwrap_err();
        assert!(err.to_string().contains("mysql_host"));

        let err = StoreConfig::from_properties([("mysql_host", "db")]).unwrap_err();
        assert!(err.to_string().contains("mysql_database"));
    }

    #[test]
    fn test_from_properties_rejects_bad_port() {
        let err = StoreConfig::from_properties([
            ("mysql_host", "db"),
            ("mysql_database", "keyed"),
            ("mysql_port", "not-a-port"),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
