//! Postgres backend. Schema lives in `migrations/`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::error;

use super::*;
use crate::reaction::{plan, Mutation};

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => RepoError::NotFound,
        sqlx::Error::Database(ref db) if db.is_check_violation() => RepoError::Invalid(db.message().to_string()),
        other => {
            error!(error = %other, "database error");
            RepoError::Internal(other.to_string())
        }
    }
}

const USER_COLS: &str =
    "id, username, email, password, avatar, cover, description, admin, account_type, verified, created_at, updated_at";

const POST_COLS: &str =
    "id, owner_id, title, caption, content, slug, cover, is_locked, created_at, updated_at";

const COMMENT_COLS: &str = "id, content, post_id, user_id, parent_comment_id, created_at, updated_at";

// $1 is always the (nullable) viewer id.
const POST_VIEW_SELECT: &str = r#"
    SELECT p.id, p.owner_id, p.title, p.caption, p.content, p.slug, p.cover, p.is_locked,
           p.created_at, p.updated_at,
           u.username AS owner, u.email, u.avatar, u.admin,
           r.likes AS total_likes, r.dislikes AS total_dislikes, r.viewer AS user_reaction
    FROM posts p
    JOIN users u ON u.id = p.owner_id
    LEFT JOIN LATERAL (
        SELECT COUNT(*) FILTER (WHERE pr.reaction = 1) AS likes,
               COUNT(*) FILTER (WHERE pr.reaction = 0) AS dislikes,
               MAX(pr.reaction) FILTER (WHERE pr.user_id = $1) AS viewer
        FROM post_reactions pr WHERE pr.post_id = p.id
    ) r ON TRUE
"#;

#[derive(sqlx::FromRow)]
struct PostViewRow {
    #[sqlx(flatten)]
    post: Post,
    owner: String,
    email: String,
    avatar: Option<String>,
    admin: bool,
    total_likes: i64,
    total_dislikes: i64,
    user_reaction: Option<i16>,
}

impl TryFrom<PostViewRow> for PostView {
    type Error = RepoError;

    fn try_from(r: PostViewRow) -> RepoResult<Self> {
        Ok(PostView {
            post: r.post,
            owner: r.owner,
            email: r.email,
            avatar: r.avatar,
            admin: r.admin,
            total_likes: r.total_likes,
            total_dislikes: r.total_dislikes,
            user_reaction: r.user_reaction.map(Polarity::try_from).transpose()?,
        })
    }
}

fn post_views(rows: Vec<PostViewRow>) -> RepoResult<Vec<PostView>> {
    rows.into_iter().map(PostView::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct CommentViewRow {
    #[sqlx(flatten)]
    comment: Comment,
    username: String,
    email: String,
    avatar: Option<String>,
    cover: Option<String>,
    admin: bool,
    likes: i64,
    dislikes: i64,
    user_reaction: Option<i16>,
}

#[derive(sqlx::FromRow)]
struct ReactionDetailRow {
    id: Id,
    comment_id: Id,
    reaction: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user_id: Id,
    username: String,
    avatar: Option<String>,
}

/// (reaction table, target column)
fn table_for(target: Target) -> (&'static str, &'static str) {
    match target {
        Target::Post(_) => ("post_reactions", "post_id"),
        Target::Comment(_) => ("comment_reactions", "comment_id"),
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password, account_type, avatar, cover)
             VALUES ($1,$2,$3,$4,$5,$6) RETURNING {USER_COLS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.account_type)
        .bind(&new.avatar)
        .bind(&new.cover)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn update_user(&self, id: Id, upd: UserUpdate) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET
                username = COALESCE($2, username),
                password = COALESCE($3, password),
                avatar = COALESCE($4, avatar),
                cover = COALESCE($5, cover),
                description = COALESCE($6, description),
                updated_at = now()
             WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(upd.username.as_ref())
        .bind(upd.password_hash.as_ref())
        .bind(upd.avatar.as_ref())
        .bind(upd.cover.as_ref())
        .bind(upd.description.as_ref())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn toggle_admin(&self, id: Id) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET admin = NOT admin, updated_at = now() WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn mark_verified(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("UPDATE users SET verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn user_stats(&self, username: &str) -> RepoResult<UserStats> {
        sqlx::query_as::<_, UserStats>(
            r#"SELECT u.id AS user_id, u.username,
                      (SELECT COUNT(*) FROM follows f WHERE f.followed_user_id = u.id) AS follower_count,
                      (SELECT COUNT(*) FROM follows f WHERE f.user_id = u.id) AS following_count,
                      (SELECT COUNT(*) FROM posts p WHERE p.owner_id = u.id) AS post_count
               FROM users u WHERE u.username = $1"#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn all_user_stats(&self) -> RepoResult<Vec<UserStats>> {
        sqlx::query_as::<_, UserStats>(
            r#"SELECT u.id AS user_id, u.username,
                      (SELECT COUNT(*) FROM follows f WHERE f.followed_user_id = u.id) AS follower_count,
                      (SELECT COUNT(*) FROM follows f WHERE f.user_id = u.id) AS following_count,
                      (SELECT COUNT(*) FROM posts p WHERE p.owner_id = u.id) AS post_count
               FROM users u ORDER BY u.id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl FollowRepo for PgRepo {
    async fn follow(&self, user_id: Id, followed_id: Id) -> RepoResult<()> {
        if user_id == followed_id {
            return Err(RepoError::Invalid("cannot follow yourself".into()));
        }
        sqlx::query("INSERT INTO follows (user_id, followed_user_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn unfollow(&self, user_id: Id, followed_id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND followed_user_id = $2")
            .bind(user_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_following(&self, user_id: Id) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"SELECT u.id, u.username, u.email, u.password, u.avatar, u.cover, u.description,
                      u.admin, u.account_type, u.verified, u.created_at, u.updated_at
               FROM follows f JOIN users u ON u.id = f.followed_user_id
               WHERE f.user_id = $1 ORDER BY f.id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (owner_id, title, caption, content, slug, cover)
             VALUES ($1,$2,$3,$4,$5,$6) RETURNING {POST_COLS}"
        ))
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(&new.caption)
        .bind(&new.content)
        .bind(&new.slug)
        .bind(&new.cover)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
        let row = sqlx::query_as::<_, PostViewRow>(&format!("{POST_VIEW_SELECT} WHERE p.id = $2"))
            .bind(viewer)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_into()
    }

    async fn list_posts(&self, page: Page, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        let rows = sqlx::query_as::<_, PostViewRow>(&format!(
            "{POST_VIEW_SELECT} ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(viewer)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        post_views(rows)
    }

    async fn search_posts_by_slug(&self, fragment: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        let rows = sqlx::query_as::<_, PostViewRow>(&format!(
            "{POST_VIEW_SELECT} WHERE strpos(p.slug, $2) > 0 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(viewer)
        .bind(fragment)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        post_views(rows)
    }

    async fn get_post_by_slug(&self, slug: &str, viewer: Option<Id>) -> RepoResult<PostView> {
        let row = sqlx::query_as::<_, PostViewRow>(&format!("{POST_VIEW_SELECT} WHERE p.slug = $2"))
            .bind(viewer)
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_into()
    }

    async fn list_posts_by_username(&self, username: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        // Distinguish an unknown author from one without posts.
        self.find_user_by_username(username).await?;
        let rows = sqlx::query_as::<_, PostViewRow>(&format!(
            "{POST_VIEW_SELECT} WHERE u.username = $2 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(viewer)
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        post_views(rows)
    }

    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
        let updated = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET
                title = COALESCE($2, title),
                caption = COALESCE($3, caption),
                content = COALESCE($4, content),
                cover = COALESCE($5, cover),
                is_locked = COALESCE($6, is_locked),
                updated_at = now()
             WHERE id = $1 AND ($7::BOOLEAN IS NULL OR is_locked = $7)
             RETURNING {POST_COLS}"
        ))
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.caption.as_ref())
        .bind(upd.content.as_ref())
        .bind(upd.cover.as_ref())
        .bind(upd.is_locked)
        .bind(upd.when_locked)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match updated {
            Some(post) => Ok(post),
            // Either the post is gone or its lock flag moved under us.
            None => {
                sqlx::query_scalar::<_, Id>("SELECT id FROM posts WHERE id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_err)?;
                Err(RepoError::Conflict)
            }
        }
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        sqlx::query_scalar::<_, Id>("SELECT id FROM posts WHERE id = $1")
            .bind(new.post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if let Some(parent) = new.parent_comment_id {
            let parent_post = sqlx::query_scalar::<_, Id>("SELECT post_id FROM comments WHERE id = $1")
                .bind(parent)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            if parent_post != Some(new.post_id) {
                return Err(RepoError::Invalid("parent comment not found on this post".into()));
            }
        }
        sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (content, post_id, user_id, parent_comment_id)
             VALUES ($1,$2,$3,$4) RETURNING {COMMENT_COLS}"
        ))
        .bind(&new.content)
        .bind(new.post_id)
        .bind(new.user_id)
        .bind(new.parent_comment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(&format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_comments(&self) -> RepoResult<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!("SELECT {COMMENT_COLS} FROM comments ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_comment_views(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>> {
        let rows = sqlx::query_as::<_, CommentViewRow>(
            r#"SELECT c.id, c.content, c.post_id, c.user_id, c.parent_comment_id, c.created_at, c.updated_at,
                      u.username, u.email, u.avatar, u.cover, u.admin,
                      r.likes, r.dislikes, r.viewer AS user_reaction
               FROM comments c
               JOIN users u ON u.id = c.user_id
               LEFT JOIN LATERAL (
                   SELECT COUNT(*) FILTER (WHERE cr.reaction = 1) AS likes,
                          COUNT(*) FILTER (WHERE cr.reaction = 0) AS dislikes,
                          MAX(cr.reaction) FILTER (WHERE cr.user_id = $2) AS viewer
                   FROM comment_reactions cr WHERE cr.comment_id = c.id
               ) r ON TRUE
               WHERE c.post_id = $1
               ORDER BY c.created_at ASC, c.id ASC"#,
        )
        .bind(post_id)
        .bind(viewer)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let details = sqlx::query_as::<_, ReactionDetailRow>(
            r#"SELECT cr.id, cr.comment_id, cr.reaction, cr.created_at, cr.updated_at,
                      u.id AS user_id, u.username, u.avatar
               FROM comment_reactions cr
               JOIN comments c ON c.id = cr.comment_id
               JOIN users u ON u.id = cr.user_id
               WHERE c.post_id = $1
               ORDER BY cr.created_at ASC, cr.id ASC"#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut by_comment: HashMap<Id, Vec<ReactionDetail>> = HashMap::new();
        for d in details {
            by_comment.entry(d.comment_id).or_default().push(ReactionDetail {
                id: d.id,
                reaction: Polarity::try_from(d.reaction)?,
                created_at: d.created_at,
                updated_at: d.updated_at,
                user: ReactionUser { id: d.user_id, name: d.username, avatar: d.avatar },
            });
        }

        rows.into_iter()
            .map(|r| -> RepoResult<CommentView> {
                let id = r.comment.id;
                Ok(CommentView {
                    comment: r.comment,
                    username: r.username,
                    email: r.email,
                    avatar: r.avatar,
                    cover: r.cover,
                    admin: r.admin,
                    reaction_count: r.likes + r.dislikes,
                    likes: r.likes,
                    dislikes: r.dislikes,
                    user_reaction: r.user_reaction.map(Polarity::try_from).transpose()?,
                    reactions: by_comment.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 RETURNING {COMMENT_COLS}"
        ))
        .bind(id)
        .bind(&content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        // Replies and reactions go via ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ReactionRepo for PgRepo {
    async fn target_owner(&self, target: Target) -> RepoResult<Id> {
        let sql = match target {
            Target::Post(_) => "SELECT owner_id FROM posts WHERE id = $1",
            Target::Comment(_) => "SELECT user_id FROM comments WHERE id = $1",
        };
        sqlx::query_scalar::<_, Id>(sql)
            .bind(target.id())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn toggle_reaction(&self, target: Target, actor: Id, desired: Polarity) -> RepoResult<ToggleOutcome> {
        let (table, fk) = table_for(target);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serialise toggles of the same (target, actor) pair, including the
        // case where no row exists yet and FOR UPDATE has nothing to lock.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}:{}", target.kind(), target.id(), actor))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let existing = sqlx::query_as::<_, (Id, i16)>(&format!(
            "SELECT id, reaction FROM {table} WHERE user_id = $1 AND {fk} = $2 FOR UPDATE"
        ))
        .bind(actor)
        .bind(target.id())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let current = match existing {
            Some((row_id, raw)) => Some((row_id, Polarity::try_from(raw)?)),
            None => None,
        };
        let (mutation, action) = plan(current.map(|(_, p)| p), desired);

        let (affected_rows, insert_id) = match (mutation, current) {
            (Mutation::Insert, _) => {
                let id = sqlx::query_scalar::<_, Id>(&format!(
                    "INSERT INTO {table} (user_id, {fk}, reaction) VALUES ($1, $2, $3) RETURNING id"
                ))
                .bind(actor)
                .bind(target.id())
                .bind(desired.as_i16())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
                (1, Some(id))
            }
            (Mutation::Update, Some((row_id, _))) => {
                let res = sqlx::query(&format!(
                    "UPDATE {table} SET reaction = $1, updated_at = now() WHERE id = $2"
                ))
                .bind(desired.as_i16())
                .bind(row_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                (res.rows_affected(), None)
            }
            (Mutation::Delete, Some((row_id, _))) => {
                let res = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                    .bind(row_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                (res.rows_affected(), None)
            }
            // plan() only yields Update/Delete when a row exists.
            (_, None) => return Err(RepoError::Internal("reaction row vanished".into())),
        };

        tx.commit().await.map_err(db_err)?;
        Ok(ToggleOutcome { success: true, action, affected_rows, insert_id })
    }

    async fn aggregate(&self, target: Target, viewer: Option<Id>) -> RepoResult<Aggregate> {
        let (table, fk) = table_for(target);
        let (likes, dislikes, viewer_raw) = sqlx::query_as::<_, (i64, i64, Option<i16>)>(&format!(
            "SELECT COUNT(*) FILTER (WHERE reaction = 1),
                    COUNT(*) FILTER (WHERE reaction = 0),
                    MAX(reaction) FILTER (WHERE user_id = $2)
             FROM {table} WHERE {fk} = $1"
        ))
        .bind(target.id())
        .bind(viewer)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(Aggregate {
            likes,
            dislikes,
            viewer_reaction: viewer_raw.map(Polarity::try_from).transpose()?,
        })
    }
}

#[async_trait]
impl VerificationRepo for PgRepo {
    async fn purge_expired_codes(&self, user_id: Id, now: DateTime<Utc>) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM user_verifications WHERE user_id = $1 AND expires_at <= $2")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn count_active_codes(&self, user_id: Id, kind: &str, now: DateTime<Utc>) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_verifications WHERE user_id = $1 AND kind = $2 AND expires_at > $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn insert_code(&self, new: NewVerification) -> RepoResult<()> {
        sqlx::query("INSERT INTO user_verifications (user_id, code_hash, kind, expires_at) VALUES ($1,$2,$3,$4)")
            .bind(new.user_id)
            .bind(&new.code_hash)
            .bind(&new.kind)
            .bind(new.expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn consume_code(&self, user_id: Id, kind: &str, code_hash: &str, now: DateTime<Utc>) -> RepoResult<bool> {
        let res = sqlx::query(
            r#"DELETE FROM user_verifications
               WHERE id = (
                   SELECT id FROM user_verifications
                   WHERE user_id = $1 AND kind = $2 AND code_hash = $3 AND expires_at > $4
                   ORDER BY id LIMIT 1
               )"#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(code_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }
}
