/// Errors returned by the auth service
use crate::auth::password::PasswordError;

/// Why an invite code was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteRejection {
    /// No invite matches the code
    Unknown,
    /// The invite has been revoked
    Revoked,
    /// The invite is past its expiry
    Expired,
    /// The invite is bound to a different email, or no email was supplied
    EmailMismatch,
    /// Every permitted use has been consumed
    Exhausted,
}

impl InviteRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteRejection::Unknown => "unknown",
            InviteRejection::Revoked => "revoked",
            InviteRejection::Expired => "expired",
            InviteRejection::EmailMismatch => "email_mismatch",
            InviteRejection::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for InviteRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            InviteRejection::Unknown => "invite code not recognized",
            InviteRejection::Revoked => "invite code has been revoked",
            InviteRejection::Expired => "invite code has expired",
            InviteRejection::EmailMismatch => "invite code is not valid for this email",
            InviteRejection::Exhausted => "invite code has already been used",
        };
        f.write_str(message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("An account with this email already exists")]
    AccountExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("No password account exists for this email")]
    NoPasswordAccount,

    #[error("Email address is already verified")]
    AlreadyVerified,

    #[error("An invite code is required")]
    InviteRequired,

    #[error("Invalid invite code: {0}")]
    InviteInvalid(InviteRejection),

    #[error("Signups are disabled: no invite codes are configured")]
    SignupDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl AuthError {
    /// Stable machine-readable code for callers that map errors to responses
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::AccountExists => "account_exists",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailNotVerified => "email_not_verified",
            AuthError::NoPasswordAccount => "no_password_account",
            AuthError::AlreadyVerified => "already_verified",
            AuthError::InviteRequired => "invite_required",
            AuthError::InviteInvalid(_) => "invite_invalid",
            AuthError::SignupDisabled => "signup_disabled",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Database(_) => "database_error",
            AuthError::Password(_) => "password_error",
        }
    }

    /// Whether the error was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::Database(_) | AuthError::Password(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
