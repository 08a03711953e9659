//! One-time codes for email verification and password resets.
//!
//! Only a SHA-256 of each code is stored.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use sha2::{Digest, Sha256};

/// How long a code stays valid.
pub const OTP_TTL_MINUTES: i64 = 10;
/// Unexpired codes a user may hold per kind before sends are refused.
pub const MAX_ACTIVE_CODES: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpKind {
    Email,
    Phone,
    PasswordReset,
}

impl OtpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpKind::Email => "email",
            OtpKind::Phone => "phone",
            OtpKind::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(OtpKind::Email),
            "phone" => Ok(OtpKind::Phone),
            "password_reset" => Ok(OtpKind::PasswordReset),
            other => Err(format!("unknown verification type '{other}'")),
        }
    }
}

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

pub fn hash_code(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.trim().as_bytes()))
}

/// Subject and plain-text body of the mail carrying `code`.
pub fn render(kind: OtpKind, username: &str, code: &str) -> (String, String) {
    let purpose = match kind {
        OtpKind::PasswordReset => "reset your password",
        OtpKind::Email | OtpKind::Phone => "verify your account",
    };
    let subject = format!("Your verification code: {code}");
    let body = format!(
        "Hi {username},\n\nUse the code {code} to {purpose}. It expires in {OTP_TTL_MINUTES} minutes.\n\n\
         If you did not request this, you can ignore this message.\n"
    );
    (subject, body)
}
