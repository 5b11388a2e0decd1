//! Store connection descriptors.
//!
//! A DSN has the form `host[:port]|user|password|database`. With the SQLite
//! backend the `database` component is the path of the database file, or
//! `:memory:` for a private in-memory store.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Name of the in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

const FORMAT_HINT: &str = "expected 'host[:port]|user|password|database'";

/// A parsed store connection descriptor.
///
/// The password is never printed: both `Display` and `Debug` redact it.
///
/// ```
/// use tracker_store::Dsn;
///
/// let dsn: Dsn = "localhost:3306|tracker|secret|/var/lib/gps/track.db".parse()?;
/// assert_eq!(dsn.host, "localhost");
/// assert_eq!(dsn.port, Some(3306));
/// assert_eq!(dsn.to_string(), "localhost:3306|tracker|***|/var/lib/gps/track.db");
/// # Ok::<(), tracker_store::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Dsn {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    password: String,
    pub database: String,
}

impl Dsn {
    /// The password component.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether the descriptor names an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }

    /// Path of the database file.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }
}

impl FromStr for Dsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        let [host_port, user, password, database] = parts.as_slice() else {
            return Err(Error::InvalidDsn(format!(
                "{} components found, {FORMAT_HINT}",
                parts.len()
            )));
        };

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::InvalidDsn(format!("invalid port '{port}', {FORMAT_HINT}"))
                })?;
                (host.trim(), Some(port))
            }
            None => (host_port.trim(), None),
        };

        if host.is_empty() {
            return Err(Error::InvalidDsn(format!("missing host, {FORMAT_HINT}")));
        }
        if user.trim().is_empty() {
            return Err(Error::InvalidDsn(format!("missing user, {FORMAT_HINT}")));
        }
        if database.trim().is_empty() {
            return Err(Error::InvalidDsn(format!("missing database, {FORMAT_HINT}")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            user: user.trim().to_string(),
            password: (*password).to_string(),
            database: database.trim().to_string(),
        })
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "|{}|***|{}", self.user, self.database)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}
