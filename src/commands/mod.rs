//! CLI command implementations.

pub mod build;
pub mod check;
pub mod classify;
pub mod init;
