//! # hookhost-core
//!
//! Core crate for hookhost. Contains the configuration schema, system
//! event types, and the unified error system shared by the runtime,
//! the server binary, and the CLI.
//!
//! This crate has **no** internal dependencies on other hookhost crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
