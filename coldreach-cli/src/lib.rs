//! # Coldreach Admin CLI Library
//!
//! Operator commands for the auth database: invite management, manual email
//! verification and schema migration.
//!
//! ## Modules
//!
//! - `cli`: argument definitions
//! - `commands`: command execution
//! - `config`: configuration from the environment

pub mod cli;
pub mod commands;
pub mod config;
