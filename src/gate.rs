//! The `Gate` context object: configuration, log sink, the shared connection
//! and the query helpers behind one injectable value.
use crate::config::{Environment, GateConfig, RunMode};
use crate::core::db::{
    ConnectionManager, Connector, Params, QueryExecutor, ResultSet, Row, SharedConnection,
    SqliteConnector, Value,
};
use crate::core::{GateError, Result};
use crate::log_sink::LogSink;
use crate::policy::{self, FailureNotice};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, info};

/// Process-wide database access helper.
///
/// Construct one per process (or per test) and share it as `Arc<Gate>`.
/// Initialization and the connection are both created lazily, exactly once.
#[derive(Debug)]
pub struct Gate {
    config: GateConfig,
    sink: Arc<LogSink>,
    env: OnceCell<Environment>,
    connections: ConnectionManager,
}

impl Gate {
    /// A gate backed by the bundled SQLite engine.
    pub fn new(config: GateConfig) -> Self {
        let connector = SqliteConnector::new(config.database_dir.clone());
        Self::with_connector(config, connector)
    }

    /// A gate that opens its connection through `connector`.
    pub fn with_connector<C: Connector + 'static>(config: GateConfig, connector: C) -> Self {
        let sink = Arc::new(LogSink::new(config.log_path.clone()));
        Gate {
            config,
            sink,
            env: OnceCell::new(),
            connections: ConnectionManager::new(connector),
        }
    }

    /// Loads the environment, prepares the log directory and rotates an
    /// oversized log. Runs once; later calls return the loaded environment.
    ///
    /// # Errors
    ///
    /// `InitializationMissing` when the configuration source does not exist.
    /// Log directory and rotation problems are ignored.
    pub fn initialize(&self) -> Result<&Environment> {
        self.env.get_or_try_init(|| {
            let env = Environment::load(&self.config.env_source)?;

            self.sink.ensure_dir();
            match self.sink.rotate_if_oversized(self.config.max_log_size) {
                Ok(Some(backup)) => info!("Rotated oversized log to {:?}", backup),
                Ok(None) => {}
                Err(e) => debug!("Log rotation skipped: {}", e),
            }

            info!(mode = ?env.run_mode(), "dbgate initialized");
            Ok(env)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.env.get().is_some()
    }

    /// Production until initialized with `APP_ENV=development`.
    pub fn run_mode(&self) -> RunMode {
        self.env
            .get()
            .map_or(RunMode::Production, Environment::run_mode)
    }

    /// The shared connection, initializing and connecting on first use.
    pub fn connection(&self) -> Result<Arc<SharedConnection>> {
        let env = self.initialize()?;
        self.connections.get_or_connect(env, &self.sink)
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    /// Runs one statement and returns its materialized result.
    ///
    /// Statement errors are returned as is; map them at the host boundary with
    /// [`Gate::render_failure`].
    pub fn query(&self, sql: &str, params: &Params) -> Result<ResultSet> {
        let shared = self.connection()?;
        let conn = shared.lock()?;
        QueryExecutor::new(&conn).run(sql, params)
    }

    /// Every row; an empty vec when nothing matched.
    pub fn fetch_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        Ok(self.query(sql, params)?.fetch_all())
    }

    /// The first row, or `None`.
    pub fn fetch_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.fetch())
    }

    /// First column of the first row, or `None` when no row matched.
    pub fn fetch_scalar(&self, sql: &str, params: &Params) -> Result<Option<Value>> {
        Ok(self.query(sql, params)?.fetch_column())
    }

    /// Number of rows the statement changed.
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        Ok(self.query(sql, params)?.row_count())
    }

    /// Appends a timestamped line to the error log.
    pub fn log(&self, message: &str) {
        self.sink.write(message);
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Logs `error` and returns what the caller may see in the current mode.
    pub fn render_failure(&self, error: &GateError) -> FailureNotice {
        policy::render_failure(error, self.run_mode(), &self.sink)
    }
}
