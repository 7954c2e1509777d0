/// Connection Management Module
///
/// This module builds the connection descriptor from validated settings and
/// owns the single shared connection, created lazily on first demand.

use crate::config::{DbSettings, Environment, DEFAULT_CHARSET, DEFAULT_PORT};
use crate::core::{GateError, Result};
use crate::log_sink::LogSink;
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Everything needed to open a session with the database engine.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub charset: String,
}

impl ConnectionDescriptor {
    /// Builds a descriptor, defaulting an unparseable port to 3306 and an
    /// empty charset to `utf8mb4`.
    pub fn from_settings(settings: &DbSettings) -> Self {
        let charset = if settings.charset.is_empty() {
            DEFAULT_CHARSET.to_string()
        } else {
            settings.charset.clone()
        };
        ConnectionDescriptor {
            host: settings.host.clone(),
            port: settings.port.trim().parse().unwrap_or(DEFAULT_PORT),
            database: settings.name.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            charset,
        }
    }

    /// Renders a DSN for logs and diagnostics. Credentials are never included.
    pub fn dsn(&self, scheme: &str) -> String {
        format!(
            "{}:host={};port={};dbname={};charset={}",
            scheme, self.host, self.port, self.database, self.charset
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("charset", &self.charset)
            .finish()
    }
}

/// Error text reported by a connector; always logged, shown to callers only in
/// development mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ConnectError(pub String);

impl From<rusqlite::Error> for ConnectError {
    fn from(e: rusqlite::Error) -> Self {
        ConnectError(e.to_string())
    }
}

/// Opens sessions with the database engine.
pub trait Connector: Send + Sync {
    /// DSN scheme used when describing connections in logs
    fn scheme(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, descriptor: &ConnectionDescriptor) -> std::result::Result<Connection, ConnectError>;
}

/// Connector for the bundled SQLite engine.
///
/// `database` is a file path resolved against `base_dir`, or `:memory:`.
/// Host, port and credentials are validated upstream but unused by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    base_dir: PathBuf,
}

impl SqliteConnector {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Connector for SqliteConnector {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> std::result::Result<Connection, ConnectError> {
        let encoding = sqlite_encoding(&descriptor.charset).ok_or_else(|| {
            ConnectError(format!("unsupported character set '{}'", descriptor.charset))
        })?;

        let conn = if descriptor.database == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(self.base_dir.join(&descriptor.database))?
        };

        // Also forces the file open, so an unusable path fails here.
        conn.execute_batch(&format!(
            "
            PRAGMA encoding = '{}';
            PRAGMA foreign_keys = ON;
        ",
            encoding
        ))?;

        Ok(conn)
    }
}

/// Maps a MySQL-style character set name to a SQLite text encoding.
pub fn sqlite_encoding(charset: &str) -> Option<&'static str> {
    match charset.to_ascii_lowercase().as_str() {
        "utf8mb4" | "utf8mb3" | "utf8" | "utf-8" => Some("UTF-8"),
        "utf16" | "utf-16" => Some("UTF-16"),
        "utf16le" | "utf-16le" => Some("UTF-16le"),
        "utf16be" | "utf-16be" => Some("UTF-16be"),
        _ => None,
    }
}

/// The single session shared by every query.
///
/// Use is serialized: callers hold the lock for a whole statement.
#[derive(Debug)]
pub struct SharedConnection {
    conn: Mutex<Connection>,
    descriptor: ConnectionDescriptor,
}

impl SharedConnection {
    pub fn new(conn: Connection, descriptor: ConnectionDescriptor) -> Self {
        Self {
            conn: Mutex::new(conn),
            descriptor,
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| GateError::LockPoisoned)
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }
}

/// Connection manager owning the lazily created shared connection
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    handle: OnceCell<Arc<SharedConnection>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("scheme", &self.connector.scheme())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager that opens sessions with `connector`
    pub fn new<C: Connector + 'static>(connector: C) -> Self {
        ConnectionManager {
            connector: Box::new(connector),
            handle: OnceCell::new(),
        }
    }

    /// Returns the shared connection, creating it on the first call.
    ///
    /// Concurrent first callers block until the winner finishes, so the
    /// connector runs at most once per successful connection. A failed attempt
    /// leaves nothing cached.
    ///
    /// # Errors
    ///
    /// `ConfigurationMissing` when a required key is empty (no connection is
    /// attempted), `ConnectionFailure` when the connector fails. Both are
    /// written to `sink` with full detail.
    pub fn get_or_connect(&self, env: &Environment, sink: &LogSink) -> Result<Arc<SharedConnection>> {
        self.handle
            .get_or_try_init(|| self.connect(env, sink))
            .map(Arc::clone)
    }

    fn connect(&self, env: &Environment, sink: &LogSink) -> Result<Arc<SharedConnection>> {
        let settings = env.db_settings().map_err(|e| {
            if let GateError::ConfigurationMissing(key) = &e {
                warn!(key = %key, "Missing database configuration");
                sink.write(&format!("Missing env var: {}", key));
            }
            e
        })?;

        let descriptor = ConnectionDescriptor::from_settings(&settings);
        let dsn = descriptor.dsn(self.connector.scheme());
        debug!(dsn = %dsn, "Opening database connection");

        match self.connector.connect(&descriptor) {
            Ok(conn) => {
                info!(dsn = %dsn, "Database connection established");
                Ok(Arc::new(SharedConnection::new(conn, descriptor)))
            }
            Err(e) => {
                error!(dsn = %dsn, error = %e, "Database connection failed");
                sink.write(&format!("DB Connection failed: {}", e));
                let detail = env.run_mode().is_development().then(|| e.to_string());
                Err(GateError::ConnectionFailure { detail })
            }
        }
    }

    /// Checks if the shared connection has been created
    pub fn is_connected(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Descriptor of the live connection, if any
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.handle.get().map(|shared| shared.descriptor())
    }
}
