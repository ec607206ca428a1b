//! Common configuration, constants and errors shared by the feed services

pub mod config;
pub mod constants;
pub mod errors;

pub use config::*;
pub use constants::*;
pub use errors::*;
