//! bcrypt hashing, run on actix's blocking pool.

use actix_web::web;
use tracing::error;

use crate::error::ApiError;

pub async fn hash(plain: String, cost: u32) -> Result<String, ApiError> {
    web::block(move || bcrypt::hash(plain, cost)).await?.map_err(|e| {
        error!(error = %e, "bcrypt hash failed");
        ApiError::Internal
    })
}

/// `false` for a mismatch and for a stored value that is not a bcrypt hash.
pub async fn verify(plain: String, hashed: String) -> Result<bool, ApiError> {
    Ok(web::block(move || bcrypt::verify(plain, &hashed)).await?.unwrap_or(false))
}

/// A random password nobody knows, for accounts created through Google.
pub fn unusable() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect()
}
