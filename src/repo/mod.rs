use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;
use crate::reaction::{Aggregate, Polarity, Target, ToggleOutcome};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid: {0}")] Invalid(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the email or the username is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn update_user(&self, id: Id, upd: UserUpdate) -> RepoResult<User>;
    async fn toggle_admin(&self, id: Id) -> RepoResult<User>;
    async fn mark_verified(&self, id: Id) -> RepoResult<()>;
    async fn user_stats(&self, username: &str) -> RepoResult<UserStats>;
    async fn all_user_stats(&self) -> RepoResult<Vec<UserStats>>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Fails with `Conflict` when the edge already exists.
    async fn follow(&self, user_id: Id, followed_id: Id) -> RepoResult<()>;
    /// Fails with `NotFound` when there was nothing to remove.
    async fn unfollow(&self, user_id: Id, followed_id: Id) -> RepoResult<()>;
    async fn list_following(&self, user_id: Id) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView>;
    /// Newest first.
    async fn list_posts(&self, page: Page, viewer: Option<Id>) -> RepoResult<Vec<PostView>>;
    async fn search_posts_by_slug(&self, fragment: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>>;
    async fn get_post_by_slug(&self, slug: &str, viewer: Option<Id>) -> RepoResult<PostView>;
    async fn list_posts_by_username(&self, username: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>>;
    /// Fails with `Conflict` when `upd.when_locked` disagrees with the stored flag.
    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// The post must exist (`NotFound`); a parent must exist on the same
    /// post (`Invalid`).
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn list_comments(&self) -> RepoResult<Vec<Comment>>;
    /// Comments of one post in creation order, with author and reactions.
    async fn list_comment_views(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>>;
    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment>;
    /// Removes the comment, its replies and their reactions.
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReactionRepo: Send + Sync {
    /// Owner of the reacted-to post or comment; `NotFound` when absent.
    async fn target_owner(&self, target: Target) -> RepoResult<Id>;
    /// Apply one step of the like/dislike state machine atomically.
    async fn toggle_reaction(&self, target: Target, actor: Id, desired: Polarity) -> RepoResult<ToggleOutcome>;
    async fn aggregate(&self, target: Target, viewer: Option<Id>) -> RepoResult<Aggregate>;
}

#[async_trait]
pub trait VerificationRepo: Send + Sync {
    /// Delete the user's expired codes; returns how many went.
    async fn purge_expired_codes(&self, user_id: Id, now: DateTime<Utc>) -> RepoResult<u64>;
    async fn count_active_codes(&self, user_id: Id, kind: &str, now: DateTime<Utc>) -> RepoResult<i64>;
    async fn insert_code(&self, new: NewVerification) -> RepoResult<()>;
    /// Delete a matching unexpired code. `false` when none matched.
    async fn consume_code(&self, user_id: Id, kind: &str, code_hash: &str, now: DateTime<Utc>) -> RepoResult<bool>;
}

pub trait Repo: UserRepo + FollowRepo + PostRepo + CommentRepo + ReactionRepo + VerificationRepo {}

impl<T> Repo for T where T: UserRepo + FollowRepo + PostRepo + CommentRepo + ReactionRepo + VerificationRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem;

#[cfg(feature = "postgres-store")]
pub mod pg;
