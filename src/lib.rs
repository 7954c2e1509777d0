//! # dbgate
//!
//! A process-wide database access helper: one lazily created shared
//! connection, parameterized query helpers and a single failure policy that
//! decides what callers see and what goes to the error log.
//!
//! ```no_run
//! use dbgate::{Gate, GateConfig, Params};
//!
//! let gate = Gate::new(GateConfig::default_for("."));
//! match gate.fetch_one("SELECT * FROM users WHERE id = :id", &Params::new().named("id", 5)) {
//!     Ok(user) => println!("{:?}", user),
//!     Err(e) => eprintln!("{}", gate.render_failure(&e)),
//! }
//! ```

// Core infrastructure modules
pub mod core;

// Gate, configuration and failure policy
pub mod config;
pub mod gate;
pub mod log_sink;
pub mod policy;

#[cfg(test)]
mod test_utils;

pub use crate::config::{GateConfig, RunMode};
pub use crate::core::db::{
    build_in_clause, InClause, ParamKey, ParamValue, Params, ResultSet, Row, Value,
};
pub use crate::core::{GateError, Result};
pub use crate::gate::Gate;
pub use crate::policy::FailureNotice;
