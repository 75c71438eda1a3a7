//! # auth-adapters
//!
//! Curator authentication. The only scheme is a shared admin secret sent
//! with each request.

mod shared_secret;

pub use shared_secret::SharedSecretGate;
