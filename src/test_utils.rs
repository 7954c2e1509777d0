/// # Test Utilities Module
///
/// Shared testing infrastructure for dbgate:
/// - In-memory database fixtures with a sample schema
/// - Environment maps with every required key populated
/// - Connectors that count calls or fail on demand
/// - Temporary project roots for end-to-end gate tests
/// - Error assertion macros

use crate::config::{GateConfig, REQUIRED_DB_KEYS};
use crate::core::db::{ConnectError, ConnectionDescriptor, Connector};
use crate::core::{GateError, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Isolated in-memory database fixture
pub struct DatabaseFixture {
    pub name: String,
    pub connection: Connection,
}

impl DatabaseFixture {
    /// Create a new empty in-memory database
    pub fn new(name: &str) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(DatabaseFixture {
            name: name.to_string(),
            connection,
        })
    }

    /// Create fixture with sample data schema
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.connection.execute_batch(SAMPLE_SCHEMA)?;
        Ok(fixture)
    }
}

/// Users, categories and posts with a handful of rows.
pub const SAMPLE_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        active BOOLEAN DEFAULT TRUE
    );

    CREATE TABLE categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        published BOOLEAN DEFAULT FALSE,
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
    );

    INSERT INTO users (username, email) VALUES ('alice', 'alice@example.com');
    INSERT INTO users (username, email) VALUES ('bob', 'bob@example.com');
    INSERT INTO users (username, email) VALUES ('charlie', 'charlie@example.com');

    INSERT INTO categories (name) VALUES ('Technology'), ('Travel'), ('Food');

    INSERT INTO posts (user_id, title, published) VALUES (1, 'Welcome to Rust', 1);
    INSERT INTO posts (user_id, title, published) VALUES (2, 'My Trip to Paris', 0);
";

/// A complete environment pointing at an in-memory database, with `overrides`
/// applied on top. Passing an empty value blanks a key.
pub fn env_with(overrides: &[(&str, &str)]) -> HashMap<String, String> {
    let mut values: HashMap<String, String> = [
        ("DB_HOST", "localhost"),
        ("DB_PORT", "3306"),
        ("DB_NAME", ":memory:"),
        ("DB_USER", "app_user"),
        ("DB_PASS", "s3cret"),
        ("DB_CHARSET", "utf8mb4"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (key, value) in overrides {
        values.insert(key.to_string(), value.to_string());
    }
    values
}

/// Same as `env_with`, but with `key` removed entirely.
pub fn env_without(key: &str) -> HashMap<String, String> {
    assert!(REQUIRED_DB_KEYS.contains(&key), "unknown key {}", key);
    let mut values = env_with(&[]);
    values.remove(key);
    values
}

/// Shared view of how many times a connector ran
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connector that counts calls, optionally sleeping or failing
pub struct CountingConnector {
    calls: CallCounter,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl CountingConnector {
    /// Opens in-memory databases regardless of the descriptor
    pub fn in_memory() -> Self {
        CountingConnector {
            calls: CallCounter::default(),
            failure: None,
            delay: None,
        }
    }

    /// Fails every attempt with `message` as the driver error
    pub fn failing(message: &str) -> Self {
        CountingConnector {
            failure: Some(message.to_string()),
            ..Self::in_memory()
        }
    }

    /// Sleeps before connecting to widen race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl Connector for CountingConnector {
    fn connect(&self, _descriptor: &ConnectionDescriptor) -> std::result::Result<Connection, ConnectError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match &self.failure {
            Some(message) => Err(ConnectError(message.clone())),
            None => Ok(Connection::open_in_memory()?),
        }
    }
}

/// A temporary project: `<tmp>/app` is the root, logs land in `<tmp>/env_logs`.
pub struct ProjectFixture {
    _dir: TempDir,
    pub root: PathBuf,
}

impl ProjectFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("app");
        fs::create_dir_all(&root).expect("Failed to create project root");
        ProjectFixture { _dir: dir, root }
    }

    /// Writes `.env` with the given `KEY=value` lines.
    pub fn with_env_file(self, lines: &[(&str, &str)]) -> Self {
        let content: String = lines
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect();
        fs::write(self.root.join(".env"), content).expect("Failed to write .env");
        self
    }

    pub fn config(&self) -> GateConfig {
        GateConfig::default_for(&self.root)
    }

    pub fn log_path(&self) -> PathBuf {
        self.config().log_path
    }

    pub fn log_contents(&self) -> String {
        fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }
}

/// Asserts that a result is a specific `GateError` variant
#[macro_export]
macro_rules! assert_gate_error {
    ($result:expr, $pattern:pat, $context:expr) => {
        match $result {
            Err($pattern) => {}
            Ok(_) => panic!("Expected {} but got Ok in {}", stringify!($pattern), $context),
            Err(other) => panic!(
                "Expected {} but got {:?} in {}",
                stringify!($pattern),
                other,
                $context
            ),
        }
    };
}

/// Error message checks shared by the policy tests
pub mod error_testing {
    use super::*;

    /// Asserts the caller-facing text leaks none of `secrets`
    pub fn assert_no_leak(error: &GateError, secrets: &[&str]) {
        let shown = error.to_string();
        for secret in secrets {
            assert!(
                !shown.contains(secret),
                "'{}' leaked into caller-visible message '{}'",
                secret,
                shown
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();
        assert_eq!(fixture.name, "test_sample");

        let count: i64 = fixture
            .connection
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("Failed to count users");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_env_helpers() {
        assert_eq!(env_with(&[]).len(), REQUIRED_DB_KEYS.len());
        assert_eq!(env_with(&[("DB_PASS", "")])["DB_PASS"], "");
        assert!(!env_without("DB_HOST").contains_key("DB_HOST"));
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<()> = Err(GateError::ConfigurationMissing("DB_HOST".to_string()));
        assert_gate_error!(result, GateError::ConfigurationMissing(_), "macro test");
    }

    #[test]
    fn test_counting_connector() {
        let connector = CountingConnector::failing("nope");
        let calls = connector.calls();
        let descriptor = ConnectionDescriptor {
            host: "h".into(),
            port: 1,
            database: "d".into(),
            user: "u".into(),
            password: "p".into(),
            charset: "utf8".into(),
        };
        assert_eq!(connector.connect(&descriptor).unwrap_err().0, "nope");
        assert_eq!(calls.get(), 1);
    }
}
