pub mod auth;
pub mod comment_tree;
pub mod config;
pub mod crypto;
pub mod error;
pub mod google;
pub mod image_host;
pub mod mailer;
pub mod models;
pub mod openapi;
pub mod otp;
pub mod password;
pub mod rate_limit; // in-memory rate limiting
pub mod reaction;
pub mod repo;
pub mod routes;
pub mod security;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
