/// Core Module for dbgate
///
/// This module contains the database-facing components: the shared error
/// type, the connection manager and the query executor.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{GateError, Result};
