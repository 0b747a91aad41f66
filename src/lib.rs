// ABOUTME: Library root for promoter - exposes the promotion engine for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod environment;
pub mod error;
pub mod health;
pub mod output;
pub mod promotion;
pub mod remote;
pub mod rollback;
pub mod runtime;
pub mod ssh;
pub mod types;
