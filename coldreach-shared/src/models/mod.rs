/// Database models for the identity and invite store
///
/// One module per table (invite usages live with invites). Every operation
/// takes any SQLite executor, so the same call works against the pool or
/// inside a transaction via `&mut *tx`.
///
/// # Models
///
/// - `user`: user accounts
/// - `auth_identity`: password and google logins attached to a user
/// - `email_verification`: one-time verification tokens
/// - `invite`: invite codes and their redemption log
/// - `login_event`: append-only authentication audit trail
/// - `user_profile`: sender profile and preferences documents

pub mod auth_identity;
pub mod email_verification;
pub mod invite;
pub mod login_event;
pub mod user;
pub mod user_profile;
