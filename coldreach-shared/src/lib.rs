//! # Coldreach Shared Library
//!
//! Identity store and auth service used by the Coldreach CLI and any server
//! built on top of it.
//!
//! ## Module Organization
//!
//! - `db`: SQLite pool and embedded migrations
//! - `models`: Database models and data structures
//! - `auth`: Invite-gated signup, login, email verification and profiles

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the Coldreach shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
