//! # domains
//!
//! Entities, errors and port traits for the moments archive.
//! No I/O lives here; adapters implement the ports.

pub mod errors;
pub mod models;
pub mod ports;
pub mod rate_limit;

// Adapters and services import everything from the crate root
pub use errors::*;
pub use models::*;
pub use ports::*;
pub use rate_limit::*;
