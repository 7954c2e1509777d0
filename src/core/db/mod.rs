/// Database Module
///
/// This module provides the database layer of dbgate, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): connection descriptor, the
///   `Connector` seam and the lazily created shared connection
/// - **Parameters** (`params.rs`): parameter keys, typed values and IN-clause
///   expansion
/// - **Query Execution** (`query.rs`): binding, execution and result shaping
///
/// ## Error Handling
///
/// All database operations use the standardized `GateError` type.
pub mod connection;
pub mod params;
pub mod query;

pub use connection::*;
pub use params::*;
pub use query::*;
