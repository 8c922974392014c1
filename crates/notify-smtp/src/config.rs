//! Client configuration.

use std::time::Duration;

use notify_pool::PoolConfig;

use crate::auth::Credentials;
use crate::error::SmtpError;
use crate::tls::{TlsConfig, TlsMode};

/// Configuration for connecting to an SMTP server.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 25).
    pub port: u16,

    /// Name announced in EHLO.
    pub hello_name: String,

    /// Authentication credentials. AUTH is attempted only when set and the
    /// server advertises it.
    pub credentials: Option<Credentials>,

    /// TLS configuration.
    pub tls: TlsConfig,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Timeout for each command round trip.
    pub command_timeout: Duration,

    /// Connection pool settings.
    pub pool: PoolConfig,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            hello_name: "localhost".to_string(),
            credentials: None,
            tls: TlsConfig::default(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

fn parse_secs(value: &str, what: &str) -> Result<Duration, SmtpError> {
    let secs: u64 = value
        .parse()
        .map_err(|_| SmtpError::Config(format!("invalid {what}: {value}")))?;
    Ok(Duration::from_secs(secs))
}

fn parse_count(value: &str, what: &str) -> Result<usize, SmtpError> {
    value
        .parse()
        .map_err(|_| SmtpError::Config(format!("invalid {what}: {value}")))
}

impl SmtpConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// Supports ADO.NET-style connection strings:
    /// ```text
    /// Server=smtp.example.com:587;User Id=app;Password=secret;Tls=required;Pool Size=10;
    /// ```
    ///
    /// Durations are given in whole seconds.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, SmtpError> {
        let mut config = Self::default();
        let mut username: Option<String> = None;
        let mut password: Option<String> = None;

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| SmtpError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "host" | "address" => {
                    // Handle host:port or host,port format
                    match value.rsplit_once([':', ',']) {
                        Some((host, port)) => {
                            config.host = host.to_string();
                            config.port = port.parse().map_err(|_| {
                                SmtpError::Config(format!("invalid port: {port}"))
                            })?;
                        }
                        None => config.host = value.to_string(),
                    }
                }
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| SmtpError::Config(format!("invalid port: {value}")))?;
                }
                "user id" | "uid" | "user" | "username" => {
                    username = Some(value.to_string());
                }
                "password" | "pwd" => {
                    password = Some(value.to_string());
                }
                "hello name" | "helo" | "ehlo" => {
                    config.hello_name = value.to_string();
                }
                "tls" | "starttls" | "encrypt" => {
                    config.tls.mode = value.parse()?;
                }
                "ca file" | "root certificate" => {
                    config.tls.ca_file = Some(value.into());
                }
                "tls server name" => {
                    config.tls.server_name = Some(value.to_string());
                }
                "connect timeout" | "connection timeout" => {
                    config.connect_timeout = parse_secs(value, "timeout")?;
                }
                "command timeout" => {
                    config.command_timeout = parse_secs(value, "timeout")?;
                }
                "pool size" | "max pool size" => {
                    config.pool.pool_size = parse_count(value, "pool size")?;
                }
                "pool timeout" => {
                    config.pool.pool_timeout = parse_secs(value, "pool timeout")?;
                }
                "min idle" | "min idle conns" => {
                    config.pool.min_idle_conns = parse_count(value, "min idle")?;
                }
                "max idle" | "max idle conns" => {
                    config.pool.max_idle_conns = parse_count(value, "max idle")?;
                }
                "idle timeout" | "conn max idle time" => {
                    config.pool.conn_max_idle_time = Some(parse_secs(value, "idle timeout")?);
                }
                "max lifetime" | "conn max lifetime" => {
                    config.pool.conn_max_lifetime = Some(parse_secs(value, "max lifetime")?);
                }
                _ => {
                    // Ignore unknown options for forward compatibility
                    tracing::debug!(key = key, "ignoring unknown connection string option");
                }
            }
        }

        match (username, password) {
            (Some(user), password) => {
                config.credentials = Some(Credentials::new(user, password.unwrap_or_default()));
            }
            (None, Some(_)) => {
                return Err(SmtpError::Config("password given without user id".into()));
            }
            (None, None) => {}
        }

        Ok(config)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the EHLO name.
    #[must_use]
    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = name.into();
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the TLS configuration.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the STARTTLS policy.
    #[must_use]
    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls.mode = mode;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SmtpError> {
        if self.host.is_empty() {
            return Err(SmtpError::Config("host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(SmtpError::Config("port cannot be 0".into()));
        }
        if self.hello_name.is_empty() || self.hello_name.contains(char::is_whitespace) {
            return Err(SmtpError::Config(format!(
                "invalid hello name: {:?}",
                self.hello_name
            )));
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(SmtpError::Config("timeouts must be greater than 0".into()));
        }
        self.pool.validate()?;
        Ok(())
    }

    /// `host:port`, for logging.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_parsing() {
        let config = SmtpConfig::from_connection_string(
            "Server=smtp.example.com;User Id=app@example.com;Password=secret;Hello Name=worker-1;",
        )
        .unwrap();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 25);
        assert_eq!(config.hello_name, "worker-1");
        let creds = config.credentials.unwrap();
        assert_eq!(creds.username(), "app@example.com");
        assert_eq!(creds.password(), "secret");
    }

    #[test]
    fn test_connection_string_with_port() {
        let config = SmtpConfig::from_connection_string("Server=smtp.example.com:587").unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);

        let config = SmtpConfig::from_connection_string("Server=mx,2525").unwrap();
        assert_eq!(config.host, "mx");
        assert_eq!(config.port, 2525);
    }

    #[test]
    fn test_connection_string_pool_options() {
        let config = SmtpConfig::from_connection_string(
            "Server=mx;Pool Size=20;Pool Timeout=5;Min Idle=2;Max Idle=4;Idle Timeout=300;Max Lifetime=3600;Tls=required",
        )
        .unwrap();

        assert_eq!(config.pool.pool_size, 20);
        assert_eq!(config.pool.pool_timeout, Duration::from_secs(5));
        assert_eq!(config.pool.min_idle_conns, 2);
        assert_eq!(config.pool.max_idle_conns, 4);
        assert_eq!(config.pool.conn_max_idle_time, Some(Duration::from_secs(300)));
        assert_eq!(config.pool.conn_max_lifetime, Some(Duration::from_secs(3600)));
        assert_eq!(config.tls.mode, TlsMode::Required);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_string_errors() {
        assert!(SmtpConfig::from_connection_string("Server").is_err());
        assert!(SmtpConfig::from_connection_string("Server=mx:notaport").is_err());
        assert!(SmtpConfig::from_connection_string("Pool Size=many").is_err());
        assert!(SmtpConfig::from_connection_string("Tls=maybe").is_err());
        assert!(SmtpConfig::from_connection_string("Password=orphan").is_err());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = SmtpConfig::from_connection_string("Server=mx;Flavor=vanilla;").unwrap();
        assert_eq!(config.host, "mx");
    }

    #[test]
    fn test_validate() {
        assert!(SmtpConfig::new().validate().is_ok());
        assert!(SmtpConfig::new().host("").validate().is_err());
        assert!(SmtpConfig::new().hello_name("two words").validate().is_err());
        assert!(
            SmtpConfig::new()
                .pool(PoolConfig::new().pool_size(0))
                .validate()
                .is_err()
        );
    }
}
