use std::future::{ready, Ready};
use std::time::Duration;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Id, User};
use crate::routes::AppState;

/// Access-token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub admin: bool,
    #[serde(rename = "type")]
    pub account_type: String,
    pub exp: usize,
}

/// Refresh-token payload. Carries only the user id; everything else is
/// re-read from storage when a new access token is minted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub id: Id,
    pub exp: usize,
}

/// Signs and validates both token kinds. Each kind has its own secret.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn expiry(ttl: Duration) -> usize {
    (chrono::Utc::now().timestamp() as u64).saturating_add(ttl.as_secs()) as usize
}

fn validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v
}

impl TokenIssuer {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_token(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            admin: user.admin,
            account_type: user.account_type.clone(),
            exp: expiry(self.access_ttl),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.access_secret.as_bytes()))
    }

    pub fn refresh_token(&self, user_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = RefreshClaims { id: user_id, exp: expiry(self.refresh_ttl) };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.refresh_secret.as_bytes()))
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &DecodingKey::from_secret(self.access_secret.as_bytes()), &validation())
            .map(|d| d.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        decode::<RefreshClaims>(token, &DecodingKey::from_secret(self.refresh_secret.as_bytes()), &validation())
            .map(|d| d.claims)
    }
}

/// Extractor yielding validated access-token `Claims`.
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        self.0.id
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(ApiError::Internal));
        };
        // Delegate to BearerAuth to parse the header.
        match BearerAuth::from_request(req, pl).into_inner() {
            Ok(bearer) => match state.tokens.verify_access(bearer.token()) {
                Ok(claims) => ready(Ok(Auth(claims))),
                Err(_) => ready(Err(ApiError::Unauthenticated("invalid or expired token".into()))),
            },
            Err(_) => ready(Err(ApiError::unauthenticated())),
        }
    }
}

/// Return 403 from the enclosing handler unless the caller is an admin.
#[macro_export]
macro_rules! require_admin {
    ($auth:expr) => {
        if !$auth.0.admin {
            return Err($crate::error::ApiError::forbidden());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            "access-secret-access-secret-access-secret",
            "refresh-secret-refresh-secret-refresh-sec",
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
    }

    fn user() -> User {
        User {
            id: 7,
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: String::new(),
            avatar: None,
            cover: None,
            description: None,
            admin: true,
            account_type: "basic".into(),
            verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_round_trip_carries_profile() {
        let t = issuer();
        let claims = t.verify_access(&t.access_token(&user()).unwrap()).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.username, "bob");
        assert!(claims.admin);
        assert_eq!(claims.account_type, "basic");
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let t = issuer();
        let refresh = t.refresh_token(7).unwrap();
        assert_eq!(t.verify_refresh(&refresh).unwrap().id, 7);
        assert!(t.verify_access(&refresh).is_err());
        let access = t.access_token(&user()).unwrap();
        assert!(t.verify_refresh(&access).is_err());
    }
}
