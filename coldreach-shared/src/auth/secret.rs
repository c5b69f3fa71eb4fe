/// Invite codes, verification tokens and their keyed hashes
///
/// Neither invite codes nor verification tokens are stored in plaintext. The
/// database keeps `HMAC-SHA256(server_secret, value)` as lowercase hex, and
/// lookups recompute the digest from what the user presents.
///
/// # Formats
///
/// - Invite code: `INV-` followed by 10 characters from an alphabet without
///   look-alike glyphs (no `I`, `O`, `0`, `1`), e.g. `INV-7KQ2MZP9WA`
/// - Verification token: 43 URL-safe characters (about 256 bits)
///
/// # Example
///
/// ```
/// use coldreach_shared::auth::secret::{generate_invite_code, SecretHasher};
///
/// let hasher = SecretHasher::new("server-secret");
/// let code = generate_invite_code();
/// assert!(code.starts_with("INV-"));
/// assert_eq!(hasher.digest(&code).len(), 64);
/// ```

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every generated invite code
pub const INVITE_CODE_PREFIX: &str = "INV-";

/// Number of random characters after the prefix
pub const INVITE_CODE_RANDOM_LENGTH: usize = 10;

const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a verification token in characters
pub const VERIFICATION_TOKEN_LENGTH: usize = 43;

const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

fn random_string(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Generates a new plaintext invite code
pub fn generate_invite_code() -> String {
    format!(
        "{}{}",
        INVITE_CODE_PREFIX,
        random_string(INVITE_CODE_ALPHABET, INVITE_CODE_RANDOM_LENGTH)
    )
}

/// Generates a new plaintext email verification token
pub fn generate_verification_token() -> String {
    random_string(TOKEN_ALPHABET, VERIFICATION_TOKEN_LENGTH)
}

/// Computes keyed digests of secrets before they touch the database
#[derive(Clone)]
pub struct SecretHasher {
    key: Vec<u8>,
}

impl SecretHasher {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `value` (64 characters)
    pub fn digest(&self, value: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(value.as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher").finish_non_exhaustive()
    }
}
