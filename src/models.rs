use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::reaction::Polarity;

pub type Id = i64;

// ---------------- Users -------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub password: String, // bcrypt hash, never serialized
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub description: Option<String>,
    pub admin: bool,
    #[serde(rename = "type")]
    pub account_type: String, // "basic" | "google"
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub account_type: String,
    pub avatar: Option<String>,
    pub cover: Option<String>,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub description: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password_hash.is_none()
            && self.avatar.is_none()
            && self.cover.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow, PartialEq, Eq)]
pub struct UserStats {
    pub user_id: Id,
    pub username: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
}

// ---------------- Posts -------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub owner_id: Id,
    pub title: String,
    pub caption: String,
    pub content: String, // ciphertext while `is_locked`
    pub slug: String,
    pub cover: Option<String>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post joined with its author and its reaction aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub owner: String,
    pub email: String,
    pub avatar: Option<String>,
    pub admin: bool,
    pub total_likes: i64,
    pub total_dislikes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<i16>)]
    pub user_reaction: Option<Polarity>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner_id: Id,
    pub title: String,
    pub caption: String,
    pub content: String,
    pub slug: String,
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub content: Option<String>,
    pub cover: Option<String>,
    pub is_locked: Option<bool>,
    /// Apply only while the stored lock flag equals this value; a mismatch
    /// fails with `Conflict` and leaves the post untouched.
    pub when_locked: Option<bool>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.caption.is_none()
            && self.content.is_none()
            && self.cover.is_none()
            && self.is_locked.is_none()
    }
}

// ---------------- Comments ----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow, PartialEq, Eq)]
pub struct Comment {
    pub id: Id,
    pub content: String,
    pub post_id: Id,
    pub user_id: Id,
    pub parent_comment_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub user_id: Id,
    pub parent_comment_id: Option<Id>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReactionUser {
    pub id: Id,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReactionDetail {
    pub id: Id,
    #[schema(value_type = i16)]
    pub reaction: Polarity,
    pub created_at: DateTime<Utc>,
    /// Moves when the reaction flips polarity in place.
    pub updated_at: DateTime<Utc>,
    pub user: ReactionUser,
}

/// One row of the comments-by-post listing: the comment, its author and
/// its reaction aggregate denormalised onto the row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub admin: bool,
    pub reaction_count: i64,
    pub likes: i64,
    pub dislikes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<i16>)]
    pub user_reaction: Option<Polarity>,
    pub reactions: Vec<ReactionDetail>,
}

// ---------------- Verification ------------------------------------------

#[derive(Debug, Clone)]
pub struct NewVerification {
    pub user_id: Id,
    pub code_hash: String,
    pub kind: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------- Pagination --------------------------------------------

pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    /// Clamp raw query values: page defaults to 1, size to 10, capped at 100.
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    /// Rows to skip. Saturates, so an absurd page number yields an empty page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_caps() {
        assert_eq!(Page::new(None, None), Page { page: 1, page_size: 10 });
        assert_eq!(Page::new(Some(0), Some(500)), Page { page: 1, page_size: 100 });
        let p = Page::new(Some(3), Some(20));
        assert_eq!(p.offset(), 40);
        let far = Page::new(Some(i64::MAX), Some(100));
        assert_eq!(far.offset(), i64::MAX);
    }
}
