use crate::core::{GateError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment keys that must be present and non-empty before connecting,
/// in the order they are checked.
pub const REQUIRED_DB_KEYS: [&str; 6] = [
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASS",
    "DB_CHARSET",
];

/// Deployment-mode key; only the value `development` enables detailed errors.
pub const APP_ENV_KEY: &str = "APP_ENV";

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_CHARSET: &str = "utf8mb4";
pub const DEFAULT_MAX_LOG_SIZE: u64 = 5_000_000;
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_LOG_DIR: &str = "../env_logs";
pub const DEFAULT_LOG_FILE: &str = "error.log";
pub const SETTINGS_FILE_NAME: &str = "dbgate.toml";

/// Gate settings as written in `dbgate.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    pub env_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_file: Option<String>,
    pub max_log_size: Option<u64>,
    pub database_dir: Option<PathBuf>,
}

/// Loads gate settings from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let settings = dbgate::config::load_config("dbgate.toml").expect("Failed to load config");
/// println!("{:?}", settings);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SettingsFile> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        GateError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
    })?;
    toml::from_str(&content).map_err(|e| GateError::Config(e.to_string()))
}

/// Where environment values come from.
#[derive(Clone)]
pub enum EnvSource {
    /// A dotenv file; process environment variables take precedence over it
    DotenvFile(PathBuf),
    /// Values supplied directly by the host
    Map(HashMap<String, String>),
}

impl std::fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvSource::DotenvFile(path) => f.debug_tuple("DotenvFile").field(path).finish(),
            EnvSource::Map(values) => f.debug_tuple("Map").field(&values.len()).finish(),
        }
    }
}

/// Resolved gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub env_source: EnvSource,
    pub log_path: PathBuf,
    pub max_log_size: u64,
    /// Base directory the SQLite connector resolves `DB_NAME` against
    pub database_dir: PathBuf,
}

impl GateConfig {
    /// Defaults for a project rooted at `root`: `.env` in the root and the log
    /// directory beside it, outside the serving root.
    pub fn default_for<P: AsRef<Path>>(root: P) -> Self {
        Self::from_settings(root, SettingsFile::default())
    }

    /// Resolves a settings file against `root`.
    pub fn from_settings<P: AsRef<Path>>(root: P, settings: SettingsFile) -> Self {
        let root = root.as_ref();
        let env_file = settings
            .env_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
        let log_dir = settings
            .log_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let log_file = settings
            .log_file
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        let database_dir = settings.database_dir.unwrap_or_else(|| PathBuf::from("."));

        GateConfig {
            env_source: EnvSource::DotenvFile(root.join(env_file)),
            log_path: root.join(log_dir).join(log_file),
            max_log_size: settings.max_log_size.unwrap_or(DEFAULT_MAX_LOG_SIZE),
            database_dir: root.join(database_dir),
        }
    }

    /// Reads `dbgate.toml` from `root` when present, defaults otherwise.
    pub fn discover<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(SETTINGS_FILE_NAME);
        if path.is_file() {
            debug!("Loading gate settings from {:?}", path);
            Ok(Self::from_settings(root, load_config(&path)?))
        } else {
            Ok(Self::default_for(root))
        }
    }

    /// Replaces the environment source with explicit values.
    pub fn with_env_map<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_source = EnvSource::Map(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_path.parent()
    }
}

/// Whether detailed errors are shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn is_development(self) -> bool {
        self == RunMode::Development
    }
}

/// Environment values loaded once at initialization.
#[derive(Clone, Default)]
pub struct Environment {
    values: HashMap<String, String>,
}

// Values may hold credentials; only key names are printed.
impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Environment").field("keys", &keys).finish()
    }
}

impl Environment {
    /// Loads values from `source`.
    ///
    /// A missing dotenv file is fatal: there is no configuration at all.
    pub fn load(source: &EnvSource) -> Result<Self> {
        match source {
            EnvSource::DotenvFile(path) => Self::from_dotenv(path),
            EnvSource::Map(values) => Ok(Environment {
                values: values.clone(),
            }),
        }
    }

    fn from_dotenv(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(GateError::InitializationMissing {
                path: path.to_path_buf(),
            });
        }

        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| GateError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item
                .map_err(|e| GateError::Config(format!("malformed {}: {}", path.display(), e)))?;
            values.insert(key, value);
        }

        // Existing process variables are never overwritten by the file.
        let known = REQUIRED_DB_KEYS.iter().copied().chain([APP_ENV_KEY]);
        let keys: Vec<String> = values.keys().cloned().chain(known.map(String::from)).collect();
        for key in keys {
            if let Ok(value) = std::env::var(&key) {
                values.insert(key, value);
            }
        }

        debug!("Loaded {} environment values from {:?}", values.len(), path);
        Ok(Environment { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// `development` when `APP_ENV` says so, production for anything else.
    pub fn run_mode(&self) -> RunMode {
        match self.get(APP_ENV_KEY) {
            Some("development") => RunMode::Development,
            _ => RunMode::Production,
        }
    }

    /// Checks the required database keys in order and returns them.
    ///
    /// Fails on the first key that is absent, empty or `"0"`, naming only
    /// that key.
    pub fn db_settings(&self) -> Result<DbSettings> {
        for key in REQUIRED_DB_KEYS {
            if self.get(key).map_or(true, is_blank) {
                return Err(GateError::ConfigurationMissing(key.to_string()));
            }
        }

        let value = |key: &str| self.get(key).unwrap_or_default().to_string();
        Ok(DbSettings {
            host: value("DB_HOST"),
            port: value("DB_PORT"),
            name: value("DB_NAME"),
            user: value("DB_USER"),
            password: value("DB_PASS"),
            charset: value("DB_CHARSET"),
        })
    }
}

/// Empty strings and a lone `0` count as unset.
fn is_blank(value: &str) -> bool {
    value.is_empty() || value == "0"
}

/// Validated database settings, still in their raw string form.
#[derive(Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub charset: String,
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("charset", &self.charset)
            .finish()
    }
}
