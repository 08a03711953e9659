use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{positive, react, AppState};
use crate::auth::Auth;
use crate::comment_tree::build_tree;
use crate::error::ApiError;
use crate::models::{CommentView, Id, NewComment};
use crate::reaction::{Polarity, Target};
use crate::repo::RepoError;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::get().to(list_comments)))
        .service(web::resource("/react/like/{id}").route(web::post().to(like_comment)))
        .service(web::resource("/react/dislike/{id}").route(web::post().to(dislike_comment)))
        .service(web::resource("/comment/like/{id}").route(web::post().to(like_comment)))
        .service(web::resource("/comment/dislike/{id}").route(web::post().to(dislike_comment)))
        .service(
            web::resource("/comment/{id}")
                .route(web::get().to(get_comment))
                .route(web::patch().to(update_comment)),
        )
        .service(
            web::resource("/post/{post_id}")
                .route(web::get().to(comments_for_post))
                .route(web::post().to(create_comment)),
        )
        .service(web::resource("/post/{post_id}/{comment_id}").route(web::delete().to(delete_comment)));
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub content: Option<String>,
    #[serde(default, alias = "parentComment_id", alias = "parentCommentId")]
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Tree,
    Flat,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LayoutQuery {
    /// `tree` (default) or `flat`.
    #[param(value_type = Option<String>)]
    pub layout: Option<Layout>,
}

fn comment_missing(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::NotFound("comment not found".into()),
        other => other.into(),
    }
}

fn required_content(content: Option<String>) -> Result<String, ApiError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("content is required"))
}

#[utoipa::path(
    get,
    path = "/api/comments",
    responses((status = 200, description = "Every comment", body = [crate::models::Comment]))
)]
pub async fn list_comments(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_comments().await?))
}

#[utoipa::path(
    get,
    path = "/api/comments/comment/{id}",
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "The comment", body = crate::models::Comment),
        (status = 404, description = "No such comment")
    )
)]
pub async fn get_comment(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = positive(path.into_inner(), "comment")?;
    let comment = data.repo.get_comment(id).await.map_err(comment_missing)?;
    Ok(HttpResponse::Ok().json(comment))
}

#[utoipa::path(
    patch,
    path = "/api/comments/comment/{id}",
    params(("id" = i64, Path, description = "Comment id")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated comment", body = crate::models::Comment),
        (status = 400, description = "Empty content"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such comment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = positive(path.into_inner(), "comment")?;
    let content = required_content(payload.into_inner().content)?;
    let existing = data.repo.get_comment(id).await.map_err(comment_missing)?;
    if existing.user_id != auth.user_id() {
        return Err(ApiError::forbidden());
    }
    let updated = data.repo.update_comment(id, content).await.map_err(comment_missing)?;
    info!(comment_id = id, "comment edited");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    post,
    path = "/api/comments/post/{post_id}",
    params(("post_id" = i64, Path, description = "Post id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = crate::models::Comment),
        (status = 400, description = "Empty content or parent on another post"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = positive(path.into_inner(), "post")?;
    let body = payload.into_inner();
    let content = required_content(body.content)?;
    if let Some(parent) = body.parent_comment_id {
        positive(parent, "parent comment")?;
    }
    let comment = data
        .repo
        .create_comment(NewComment {
            post_id,
            user_id: auth.user_id(),
            parent_comment_id: body.parent_comment_id,
            content,
        })
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("post not found".into()),
            other => other.into(),
        })?;
    info!(comment_id = comment.id, post_id, parent = ?comment.parent_comment_id, "comment created");
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/comments/post/{post_id}",
    params(("post_id" = i64, Path, description = "Post id"), LayoutQuery),
    responses(
        (status = 200, description = "Reply forest, each node with `children`; flat rows with `layout=flat`", body = [CommentView]),
        (status = 400, description = "Bad id or layout")
    )
)]
pub async fn comments_for_post(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    q: web::Query<LayoutQuery>,
) -> Result<HttpResponse, ApiError> {
    let post_id = positive(path.into_inner(), "post")?;
    let viewer = auth.as_ref().map(Auth::user_id);
    let rows: Vec<CommentView> = data.repo.list_comment_views(post_id, viewer).await?;
    match q.into_inner().layout.unwrap_or_default() {
        Layout::Flat => Ok(HttpResponse::Ok().json(rows)),
        Layout::Tree => Ok(HttpResponse::Ok().json(build_tree(&rows))),
    }
}

#[utoipa::path(
    delete,
    path = "/api/comments/post/{post_id}/{comment_id}",
    params(
        ("post_id" = i64, Path, description = "Post id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Comment, replies and reactions removed"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such comment on that post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, comment_id) = path.into_inner();
    let post_id = positive(post_id, "post")?;
    let comment_id = positive(comment_id, "comment")?;
    let comment = data.repo.get_comment(comment_id).await.map_err(comment_missing)?;
    if comment.post_id != post_id {
        return Err(ApiError::NotFound("comment not found".into()));
    }
    if comment.user_id != auth.user_id() {
        return Err(ApiError::forbidden());
    }
    data.repo.delete_comment(comment_id).await.map_err(comment_missing)?;
    info!(comment_id, post_id, "comment deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/comments/react/like/{id}",
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Toggle result and fresh counts", body = crate::reaction::ReactionResponse),
        (status = 400, description = "Bad id"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such comment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn like_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    react(auth, &data, Target::Comment(path.into_inner()), Polarity::Like).await
}

#[utoipa::path(
    post,
    path = "/api/comments/react/dislike/{id}",
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Toggle result and fresh counts", body = crate::reaction::ReactionResponse),
        (status = 400, description = "Bad id"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such comment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dislike_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    react(auth, &data, Target::Comment(path.into_inner()), Polarity::Dislike).await
}
