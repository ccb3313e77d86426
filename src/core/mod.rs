//! Core constants, configuration, and error types.

mod config;
mod constants;
mod error;

pub use config::*;
pub use constants::*;
pub use error::*;
