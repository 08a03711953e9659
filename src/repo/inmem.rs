//! Process-local store used for development and tests.
//!
//! Everything lives behind one `RwLock`, so each operation (a reaction
//! toggle included) observes and mutates a consistent snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::*;
use crate::reaction::{plan, Mutation};

#[derive(Debug, Clone)]
struct ReactionRow {
    id: Id,
    polarity: Polarity,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct VerificationRow {
    user_id: Id,
    code_hash: String,
    kind: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<Id, User>,
    follows: BTreeSet<(Id, Id)>, // (follower, followed)
    posts: BTreeMap<Id, Post>,
    comments: BTreeMap<Id, Comment>,
    // (target id, user id) -> row
    post_reactions: HashMap<(Id, Id), ReactionRow>,
    comment_reactions: HashMap<(Id, Id), ReactionRow>,
    verifications: Vec<VerificationRow>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn reactions(&self, target: Target) -> &HashMap<(Id, Id), ReactionRow> {
        match target {
            Target::Post(_) => &self.post_reactions,
            Target::Comment(_) => &self.comment_reactions,
        }
    }

    fn reactions_mut(&mut self, target: Target) -> &mut HashMap<(Id, Id), ReactionRow> {
        match target {
            Target::Post(_) => &mut self.post_reactions,
            Target::Comment(_) => &mut self.comment_reactions,
        }
    }

    fn aggregate(&self, target: Target, viewer: Option<Id>) -> Aggregate {
        let id = target.id();
        let mut agg = Aggregate::default();
        for ((target_id, user_id), row) in self.reactions(target) {
            if *target_id != id {
                continue;
            }
            match row.polarity {
                Polarity::Like => agg.likes += 1,
                Polarity::Dislike => agg.dislikes += 1,
            }
            if Some(*user_id) == viewer {
                agg.viewer_reaction = Some(row.polarity);
            }
        }
        agg
    }

    fn post_view(&self, post: &Post, viewer: Option<Id>) -> RepoResult<PostView> {
        let owner = self.users.get(&post.owner_id).ok_or(RepoError::NotFound)?;
        let agg = self.aggregate(Target::Post(post.id), viewer);
        Ok(PostView {
            post: post.clone(),
            owner: owner.username.clone(),
            email: owner.email.clone(),
            avatar: owner.avatar.clone(),
            admin: owner.admin,
            total_likes: agg.likes,
            total_dislikes: agg.dislikes,
            user_reaction: agg.viewer_reaction,
        })
    }

    fn post_views<'a, I>(&self, posts: I, viewer: Option<Id>) -> RepoResult<Vec<PostView>>
    where
        I: Iterator<Item = &'a Post>,
    {
        let mut v: Vec<&Post> = posts.collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        v.into_iter().map(|p| self.post_view(p, viewer)).collect()
    }

    fn stats_for(&self, user: &User) -> UserStats {
        UserStats {
            user_id: user.id,
            username: user.username.clone(),
            follower_count: self.follows.iter().filter(|(_, f)| *f == user.id).count() as i64,
            following_count: self.follows.iter().filter(|(u, _)| *u == user.id).count() as i64,
            post_count: self.posts.values().filter(|p| p.owner_id == user.id).count() as i64,
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|e| RepoError::Internal(e.to_string()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|e| RepoError::Internal(e.to_string()))
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        if s.users.values().any(|u| u.email == new.email || u.username == new.username) {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let id = s.next_id();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password: new.password_hash,
            avatar: new.avatar,
            cover: new.cover,
            description: None,
            admin: false,
            account_type: new.account_type,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        s.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        let s = self.read()?;
        s.users.values().find(|u| u.email == email).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
        let s = self.read()?;
        s.users.values().find(|u| u.username == username).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn update_user(&self, id: Id, upd: UserUpdate) -> RepoResult<User> {
        let mut s = self.write()?;
        if let Some(ref name) = upd.username {
            if s.users.values().any(|u| u.username == *name && u.id != id) {
                return Err(RepoError::Conflict);
            }
        }
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = upd.username { user.username = v; }
        if let Some(v) = upd.password_hash { user.password = v; }
        if let Some(v) = upd.avatar { user.avatar = Some(v); }
        if let Some(v) = upd.cover { user.cover = Some(v); }
        if let Some(v) = upd.description { user.description = Some(v); }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn toggle_admin(&self, id: Id) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.admin = !user.admin;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn mark_verified(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.verified = true;
        Ok(())
    }

    async fn user_stats(&self, username: &str) -> RepoResult<UserStats> {
        let s = self.read()?;
        let user = s.users.values().find(|u| u.username == username).ok_or(RepoError::NotFound)?;
        Ok(s.stats_for(user))
    }

    async fn all_user_stats(&self) -> RepoResult<Vec<UserStats>> {
        let s = self.read()?;
        Ok(s.users.values().map(|u| s.stats_for(u)).collect())
    }
}

#[async_trait]
impl FollowRepo for InMemRepo {
    async fn follow(&self, user_id: Id, followed_id: Id) -> RepoResult<()> {
        if user_id == followed_id {
            return Err(RepoError::Invalid("cannot follow yourself".into()));
        }
        let mut s = self.write()?;
        if !s.users.contains_key(&user_id) || !s.users.contains_key(&followed_id) {
            return Err(RepoError::NotFound);
        }
        if !s.follows.insert((user_id, followed_id)) {
            return Err(RepoError::Conflict);
        }
        Ok(())
    }

    async fn unfollow(&self, user_id: Id, followed_id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        if s.follows.remove(&(user_id, followed_id)) { Ok(()) } else { Err(RepoError::NotFound) }
    }

    async fn list_following(&self, user_id: Id) -> RepoResult<Vec<User>> {
        let s = self.read()?;
        Ok(s.follows
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, f)| s.users.get(f).cloned())
            .collect())
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let mut s = self.write()?;
        if !s.users.contains_key(&new.owner_id) {
            return Err(RepoError::NotFound);
        }
        if s.posts.values().any(|p| p.slug == new.slug) {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let id = s.next_id();
        let post = Post {
            id,
            owner_id: new.owner_id,
            title: new.title,
            caption: new.caption,
            content: new.content,
            slug: new.slug,
            cover: new.cover,
            is_locked: false,
            created_at: now,
            updated_at: now,
        };
        s.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_post_view(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
        let s = self.read()?;
        let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
        s.post_view(post, viewer)
    }

    async fn list_posts(&self, page: Page, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        let s = self.read()?;
        let all = s.post_views(s.posts.values(), viewer)?;
        Ok(all
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.page_size).unwrap_or(0))
            .collect())
    }

    async fn search_posts_by_slug(&self, fragment: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        let s = self.read()?;
        s.post_views(s.posts.values().filter(|p| p.slug.contains(fragment)), viewer)
    }

    async fn get_post_by_slug(&self, slug: &str, viewer: Option<Id>) -> RepoResult<PostView> {
        let s = self.read()?;
        let post = s.posts.values().find(|p| p.slug == slug).ok_or(RepoError::NotFound)?;
        s.post_view(post, viewer)
    }

    async fn list_posts_by_username(&self, username: &str, viewer: Option<Id>) -> RepoResult<Vec<PostView>> {
        let s = self.read()?;
        let owner = s.users.values().find(|u| u.username == username).ok_or(RepoError::NotFound)?.id;
        s.post_views(s.posts.values().filter(|p| p.owner_id == owner), viewer)
    }

    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if upd.when_locked.is_some_and(|l| l != post.is_locked) {
            return Err(RepoError::Conflict);
        }
        if let Some(v) = upd.title { post.title = v; }
        if let Some(v) = upd.caption { post.caption = v; }
        if let Some(v) = upd.content { post.content = v; }
        if let Some(v) = upd.cover { post.cover = Some(v); }
        if let Some(v) = upd.is_locked { post.is_locked = v; }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&new.post_id) {
            return Err(RepoError::NotFound);
        }
        if let Some(parent) = new.parent_comment_id {
            match s.comments.get(&parent) {
                Some(p) if p.post_id == new.post_id => {}
                _ => return Err(RepoError::Invalid("parent comment not found on this post".into())),
            }
        }
        let now = Utc::now();
        let id = s.next_id();
        let comment = Comment {
            id,
            content: new.content,
            post_id: new.post_id,
            user_id: new.user_id,
            parent_comment_id: new.parent_comment_id,
            created_at: now,
            updated_at: now,
        };
        s.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_comments(&self) -> RepoResult<Vec<Comment>> {
        Ok(self.read()?.comments.values().cloned().collect())
    }

    async fn list_comment_views(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<Vec<CommentView>> {
        let s = self.read()?;
        let mut comments: Vec<&Comment> = s.comments.values().filter(|c| c.post_id == post_id).collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut out = Vec::with_capacity(comments.len());
        for c in comments {
            let author = s.users.get(&c.user_id).ok_or(RepoError::NotFound)?;
            let agg = s.aggregate(Target::Comment(c.id), viewer);
            let mut reactions: Vec<ReactionDetail> = s
                .comment_reactions
                .iter()
                .filter(|((target, _), _)| *target == c.id)
                .filter_map(|((_, user_id), row)| {
                    let u = s.users.get(user_id)?;
                    Some(ReactionDetail {
                        id: row.id,
                        reaction: row.polarity,
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                        user: ReactionUser { id: u.id, name: u.username.clone(), avatar: u.avatar.clone() },
                    })
                })
                .collect();
            reactions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            out.push(CommentView {
                comment: c.clone(),
                username: author.username.clone(),
                email: author.email.clone(),
                avatar: author.avatar.clone(),
                cover: author.cover.clone(),
                admin: author.admin,
                reaction_count: agg.likes + agg.dislikes,
                likes: agg.likes,
                dislikes: agg.dislikes,
                user_reaction: agg.viewer_reaction,
                reactions,
            });
        }
        Ok(out)
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let c = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        c.content = content;
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        if !s.comments.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        // Collect the whole reply subtree first.
        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            doomed.extend(
                s.comments
                    .values()
                    .filter(|c| c.parent_comment_id == Some(parent))
                    .map(|c| c.id),
            );
            i += 1;
        }
        for cid in &doomed {
            s.comments.remove(cid);
        }
        s.comment_reactions.retain(|(target, _), _| !doomed.contains(target));
        Ok(())
    }
}

#[async_trait]
impl ReactionRepo for InMemRepo {
    async fn target_owner(&self, target: Target) -> RepoResult<Id> {
        let s = self.read()?;
        match target {
            Target::Post(id) => s.posts.get(&id).map(|p| p.owner_id),
            Target::Comment(id) => s.comments.get(&id).map(|c| c.user_id),
        }
        .ok_or(RepoError::NotFound)
    }

    async fn toggle_reaction(&self, target: Target, actor: Id, desired: Polarity) -> RepoResult<ToggleOutcome> {
        let mut s = self.write()?;
        let exists = match target {
            Target::Post(id) => s.posts.contains_key(&id),
            Target::Comment(id) => s.comments.contains_key(&id),
        };
        if !exists {
            return Err(RepoError::NotFound);
        }
        let key = (target.id(), actor);
        let existing = s.reactions(target).get(&key).map(|r| r.polarity);
        let (mutation, action) = plan(existing, desired);
        let now = Utc::now();
        let insert_id = match mutation {
            Mutation::Insert => {
                let id = s.next_id();
                s.reactions_mut(target).insert(
                    key,
                    ReactionRow { id, polarity: desired, created_at: now, updated_at: now },
                );
                Some(id)
            }
            Mutation::Update => {
                if let Some(row) = s.reactions_mut(target).get_mut(&key) {
                    row.polarity = desired;
                    row.updated_at = now;
                }
                None
            }
            Mutation::Delete => {
                s.reactions_mut(target).remove(&key);
                None
            }
        };
        Ok(ToggleOutcome { success: true, action, affected_rows: 1, insert_id })
    }

    async fn aggregate(&self, target: Target, viewer: Option<Id>) -> RepoResult<Aggregate> {
        Ok(self.read()?.aggregate(target, viewer))
    }
}

#[async_trait]
impl VerificationRepo for InMemRepo {
    async fn purge_expired_codes(&self, user_id: Id, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut s = self.write()?;
        let before = s.verifications.len();
        s.verifications.retain(|v| !(v.user_id == user_id && v.expires_at <= now));
        Ok((before - s.verifications.len()) as u64)
    }

    async fn count_active_codes(&self, user_id: Id, kind: &str, now: DateTime<Utc>) -> RepoResult<i64> {
        let s = self.read()?;
        Ok(s.verifications
            .iter()
            .filter(|v| v.user_id == user_id && v.kind == kind && v.expires_at > now)
            .count() as i64)
    }

    async fn insert_code(&self, new: NewVerification) -> RepoResult<()> {
        let mut s = self.write()?;
        s.verifications.push(VerificationRow {
            user_id: new.user_id,
            code_hash: new.code_hash,
            kind: new.kind,
            expires_at: new.expires_at,
        });
        Ok(())
    }

    async fn consume_code(&self, user_id: Id, kind: &str, code_hash: &str, now: DateTime<Utc>) -> RepoResult<bool> {
        let mut s = self.write()?;
        let pos = s.verifications.iter().position(|v| {
            v.user_id == user_id && v.kind == kind && v.code_hash == code_hash && v.expires_at > now
        });
        match pos {
            Some(i) => {
                s.verifications.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
