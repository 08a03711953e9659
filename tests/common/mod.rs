#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::web;
use async_trait::async_trait;
use karma::auth::TokenIssuer;
use karma::google::{GoogleAuthError, GoogleProfile, GoogleVerifier};
use karma::image_host::{HostedImage, ImageHost, ImageHostError};
use karma::mailer::{MailError, Mailer};
use karma::models::{NewUser, User};
use karma::rate_limit::RateLimiterFacade;
use karma::repo::inmem::InMemRepo;
use karma::repo::UserRepo;
use karma::AppState;

pub const ACCESS_SECRET: &str = "test-access-secret-must-be-32-bytes!!";
pub const REFRESH_SECRET: &str = "test-refresh-secret-must-be-32-bytes!";

/// Records every mail instead of sending it.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl CapturingMailer {
    /// The six-digit code from the latest mail.
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, _, body) = sent.last()?;
        body.split(|c: char| !c.is_ascii_digit())
            .find(|w| w.len() == 6)
            .map(str::to_string)
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, to: &str, subject: &str, text_body: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), text_body.to_string()));
        Ok(())
    }
}

/// Accepts `good-token` for ada@example.com and rejects anything else.
pub struct StubGoogle;

#[async_trait]
impl GoogleVerifier for StubGoogle {
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, GoogleAuthError> {
        match id_token {
            "good-token" => Ok(GoogleProfile {
                email: "ada@example.com".into(),
                name: Some("Ada Lovelace".into()),
                picture: Some("https://pics.test/ada.png".into()),
            }),
            "down" => Err(GoogleAuthError::Request("connection refused".into())),
            _ => Err(GoogleAuthError::Rejected("token audience mismatch".into())),
        }
    }
}

/// Pretends to host every upload under img.test.
pub struct StubImageHost;

#[async_trait]
impl ImageHost for StubImageHost {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<HostedImage, ImageHostError> {
        Ok(HostedImage {
            url: format!("https://img.test/{filename}"),
            display_url: format!("https://img.test/view/{filename}"),
            size: bytes.len() as u64,
        })
    }
}

pub struct Harness {
    pub repo: Arc<InMemRepo>,
    pub mailer: Arc<CapturingMailer>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(RateLimiterFacade::disabled())
    }

    pub fn with_limits(limits: RateLimiterFacade) -> Self {
        let repo = Arc::new(InMemRepo::new());
        let mailer = Arc::new(CapturingMailer::default());
        let state = AppState {
            repo: repo.clone(),
            image_host: Arc::new(StubImageHost),
            google: Arc::new(StubGoogle),
            mailer: mailer.clone(),
            tokens: issuer(),
            limits,
            bcrypt_cost: 4,
        };
        Self { repo, mailer, state }
    }

    pub fn data(&self) -> web::Data<AppState> {
        web::Data::new(self.state.clone())
    }

    /// Insert a user directly; the password is `pw-<username>`.
    pub async fn user(&self, username: &str) -> User {
        let hash = bcrypt::hash(format!("pw-{username}"), 4).unwrap();
        self.repo
            .create_user(NewUser {
                username: username.into(),
                email: format!("{username}@example.com"),
                password_hash: hash,
                account_type: "basic".into(),
                avatar: None,
                cover: None,
            })
            .await
            .unwrap()
    }

    pub fn bearer(&self, user: &User) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.state.tokens.access_token(user).unwrap()))
    }
}

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new(ACCESS_SECRET, REFRESH_SECRET, Duration::from_secs(600), Duration::from_secs(3600))
}

/// Smallest valid PNG header followed by padding.
pub fn png_bytes() -> Vec<u8> {
    let mut v = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];
    v.extend_from_slice(&[0u8; 64]);
    v
}

/// A multipart body with one file part named `field`.
pub fn multipart(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "karmaboundary7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
