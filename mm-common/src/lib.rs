//! Shared library for the Measure Master services
//!
//! Carries the pieces that are independent of any one HTTP surface:
//! error types, configuration resolution, and the declarative SQLite
//! schema maintenance machinery.

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
