//! Like/dislike toggling shared by posts and comments.
//!
//! A user holds at most one reaction per target. Asking for the polarity the
//! user already holds removes it, asking for the other one flips it in place.
//! Counts are never stored; they are derived from the reaction rows.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::models::Id;
use crate::repo::{ReactionRepo, RepoError, RepoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Dislike = 0,
    Like = 1,
}

impl Polarity {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid reaction value {0}")]
pub struct InvalidPolarity(pub i16);

impl TryFrom<i16> for Polarity {
    type Error = InvalidPolarity;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Polarity::Dislike),
            1 => Ok(Polarity::Like),
            other => Err(InvalidPolarity(other)),
        }
    }
}

impl From<InvalidPolarity> for RepoError {
    fn from(e: InvalidPolarity) -> Self {
        RepoError::Invalid(e.to_string())
    }
}

// Stored and rendered as 0/1, not as a name.
impl Serialize for Polarity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i16(self.as_i16())
    }
}

impl<'de> Deserialize<'de> for Polarity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = i16::deserialize(d)?;
        Polarity::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Liked,
    Unliked,
    Disliked,
    Undisliked,
}

/// The single row change a toggle performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Insert,
    Update,
    Delete,
}

/// Decide the mutation and reported action from the current row (if any).
pub fn plan(existing: Option<Polarity>, desired: Polarity) -> (Mutation, ReactionAction) {
    use Polarity::*;
    match (existing, desired) {
        (None, Like) => (Mutation::Insert, ReactionAction::Liked),
        (None, Dislike) => (Mutation::Insert, ReactionAction::Disliked),
        (Some(Like), Like) => (Mutation::Delete, ReactionAction::Unliked),
        (Some(Dislike), Dislike) => (Mutation::Delete, ReactionAction::Undisliked),
        (Some(Dislike), Like) => (Mutation::Update, ReactionAction::Liked),
        (Some(Like), Dislike) => (Mutation::Update, ReactionAction::Disliked),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Post(Id),
    Comment(Id),
}

impl Target {
    pub fn id(&self) -> Id {
        match self {
            Target::Post(id) | Target::Comment(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Post(_) => "post",
            Target::Comment(_) => "comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub success: bool,
    pub action: ReactionAction,
    pub affected_rows: u64,
    /// Id of the inserted row; `None` for updates and deletes.
    pub insert_id: Option<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub likes: i64,
    pub dislikes: i64,
    #[schema(value_type = Option<i16>)]
    pub viewer_reaction: Option<Polarity>,
}

/// Body returned by the react endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReactionResponse {
    #[serde(flatten)]
    pub outcome: ToggleOutcome,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

fn check_actor(actor: Id) -> RepoResult<()> {
    if actor <= 0 {
        return Err(RepoError::Invalid("missing or invalid user id".into()));
    }
    Ok(())
}

/// Toggle `actor`'s reaction on `target` and return the refreshed counts.
///
/// The actor id is checked before any storage access and the target's
/// existence before the mutation starts.
pub async fn toggle<R>(repo: &R, target: Target, actor: Id, desired: Polarity) -> RepoResult<ReactionResponse>
where
    R: ReactionRepo + ?Sized,
{
    check_actor(actor)?;
    if target.id() <= 0 {
        return Err(RepoError::Invalid(format!("invalid {} id", target.kind())));
    }
    let owner = repo.target_owner(target).await?;
    if owner == actor {
        debug!(kind = target.kind(), target = target.id(), actor, "self reaction");
    }
    let outcome = repo.toggle_reaction(target, actor, desired).await?;
    info!(
        kind = target.kind(),
        target = target.id(),
        actor,
        action = ?outcome.action,
        "reaction toggled"
    );
    let aggregate = repo.aggregate(target, Some(actor)).await?;
    Ok(ReactionResponse { outcome, aggregate })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        use Polarity::*;
        assert_eq!(plan(None, Like), (Mutation::Insert, ReactionAction::Liked));
        assert_eq!(plan(None, Dislike), (Mutation::Insert, ReactionAction::Disliked));
        assert_eq!(plan(Some(Like), Like), (Mutation::Delete, ReactionAction::Unliked));
        assert_eq!(plan(Some(Dislike), Dislike), (Mutation::Delete, ReactionAction::Undisliked));
        assert_eq!(plan(Some(Dislike), Like), (Mutation::Update, ReactionAction::Liked));
        assert_eq!(plan(Some(Like), Dislike), (Mutation::Update, ReactionAction::Disliked));
    }

    #[test]
    fn polarity_wire_format() {
        assert_eq!(serde_json::to_string(&Polarity::Like).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Polarity>("0").unwrap(), Polarity::Dislike);
        assert!(serde_json::from_str::<Polarity>("2").is_err());
        assert_eq!(Polarity::try_from(7), Err(InvalidPolarity(7)));
    }

    #[test]
    fn response_is_flat_camel_case() {
        let r = ReactionResponse {
            outcome: ToggleOutcome {
                success: true,
                action: ReactionAction::Undisliked,
                affected_rows: 1,
                insert_id: None,
            },
            aggregate: Aggregate { likes: 3, dislikes: 1, viewer_reaction: None },
        };
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["action"], "undisliked");
        assert_eq!(v["affectedRows"], 1);
        assert!(v["insertId"].is_null());
        assert_eq!(v["likes"], 3);
        assert_eq!(v["dislikes"], 1);
        assert!(v["viewerReaction"].is_null());
    }
}
