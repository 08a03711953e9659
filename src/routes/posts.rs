use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{non_blank, positive, react, AppState};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, NewPost, Page, PostUpdate, PostView};
use crate::reaction::{Polarity, Target};
use crate::repo::RepoError;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_posts))
            .route(web::post().to(create_post)),
    )
    .service(web::resource("/slug/one/{slug}").route(web::get().to(get_post_by_slug)))
    .service(web::resource("/slug/{slug}").route(web::get().to(search_posts)))
    .service(web::resource("/username/{username}").route(web::get().to(posts_by_username)))
    .service(web::resource("/react/like/{id}").route(web::post().to(like_post)))
    .service(web::resource("/react/dislike/{id}").route(web::post().to(dislike_post)))
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_post))
            .route(web::patch().to(update_post)),
    );
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub title: String,
    pub caption: Option<String>,
    pub content: String,
    pub cover: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub content: Option<String>,
    pub cover: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// A post fetched by its exact slug, with the viewer's own reaction.
#[derive(Debug, Serialize, ToSchema)]
pub struct SlugPost {
    #[serde(flatten)]
    pub post: PostView,
    #[schema(value_type = Option<i16>)]
    pub react: Option<Polarity>,
}

/// `title` lowercased with runs of anything but ASCII alphanumerics
/// collapsed to one `-`.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn unique_slug(title: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    match slugify(title) {
        base if base.is_empty() => suffix[..12].to_string(),
        base => format!("{base}-{}", &suffix[..8]),
    }
}

/// Anonymous listings carry everything but the body.
fn strip_content(views: Vec<PostView>) -> Result<Vec<serde_json::Value>, ApiError> {
    views
        .into_iter()
        .map(|v| {
            let mut value = serde_json::to_value(v).map_err(|_| ApiError::Internal)?;
            if let Some(obj) = value.as_object_mut() {
                obj.remove("content");
            }
            Ok(value)
        })
        .collect()
}

fn post_missing(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::NotFound("post not found".into()),
        other => other.into(),
    }
}

fn viewer(auth: &Option<Auth>) -> Option<Id> {
    auth.as_ref().map(Auth::user_id)
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = crate::models::Post),
        (status = 400, description = "Missing title or content"),
        (status = 401, description = "Not logged in"),
        (status = 429, description = "Posting too fast")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_post(&auth.user_id().to_string()) {
        return Err(ApiError::TooManyRequests("posting too fast, try again later".into()));
    }
    let body = payload.into_inner();
    let title = body.title.trim().to_string();
    if title.is_empty() || body.content.trim().is_empty() {
        return Err(ApiError::bad_request("title and content are required"));
    }
    let post = data
        .repo
        .create_post(NewPost {
            owner_id: auth.user_id(),
            slug: unique_slug(&title),
            title,
            caption: body.caption.unwrap_or_default(),
            content: body.content,
            cover: non_blank(body.cover),
        })
        .await?;
    info!(post_id = post.id, owner = post.owner_id, "post created");
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/posts",
    params(PageQuery),
    responses((status = 200, description = "Newest posts first", body = [PostView]))
)]
pub async fn list_posts(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    q: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = q.into_inner();
    let page = Page::new(q.page, q.page_size);
    let views = data.repo.list_posts(page, viewer(&auth)).await?;
    if auth.is_some() {
        return Ok(HttpResponse::Ok().json(views));
    }
    Ok(HttpResponse::Ok().json(strip_content(views)?))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with reaction counts", body = PostView),
        (status = 400, description = "Bad id"),
        (status = 404, description = "No such post")
    )
)]
pub async fn get_post(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = positive(path.into_inner(), "post")?;
    let view = data.repo.get_post_view(id, viewer(&auth)).await.map_err(post_missing)?;
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    patch,
    path = "/api/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated post", body = crate::models::Post),
        (status = 400, description = "Nothing to update"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = positive(path.into_inner(), "post")?;
    let body = payload.into_inner();
    let upd = PostUpdate {
        title: non_blank(body.title).map(|t| t.trim().to_string()),
        caption: body.caption,
        content: non_blank(body.content),
        cover: non_blank(body.cover),
        is_locked: None,
        when_locked: None,
    };
    if upd.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    let post = data.repo.get_post(id).await.map_err(post_missing)?;
    if post.owner_id != auth.user_id() {
        return Err(ApiError::forbidden());
    }
    const LOCKED: &str = "decrypt the post before editing its content";
    if post.is_locked && upd.content.is_some() {
        return Err(ApiError::bad_request(LOCKED));
    }
    let upd = PostUpdate { when_locked: upd.content.as_ref().map(|_| false), ..upd };
    let post = data.repo.update_post(id, upd).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::bad_request(LOCKED),
        other => post_missing(other),
    })?;
    info!(post_id = id, "post updated");
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/api/posts/slug/{slug}",
    params(("slug" = String, Path, description = "Part of a slug")),
    responses(
        (status = 200, description = "Posts whose slug contains the fragment", body = [PostView]),
        (status = 404, description = "Nothing matched")
    )
)]
pub async fn search_posts(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let found = data.repo.search_posts_by_slug(&path.into_inner(), None).await?;
    if found.is_empty() {
        return Err(ApiError::NotFound("no post matches that slug".into()));
    }
    Ok(HttpResponse::Ok().json(found))
}

#[utoipa::path(
    get,
    path = "/api/posts/slug/one/{slug}",
    params(("slug" = String, Path, description = "Exact slug")),
    responses(
        (status = 200, description = "Post with the viewer's reaction", body = SlugPost),
        (status = 404, description = "No such post")
    )
)]
pub async fn get_post_by_slug(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data
        .repo
        .get_post_by_slug(&path.into_inner(), viewer(&auth))
        .await
        .map_err(post_missing)?;
    let react = post.user_reaction;
    Ok(HttpResponse::Ok().json(SlugPost { post, react }))
}

#[utoipa::path(
    get,
    path = "/api/posts/username/{username}",
    params(("username" = String, Path, description = "Author")),
    responses(
        (status = 200, description = "That author's posts", body = [PostView]),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn posts_by_username(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let posts = data
        .repo
        .list_posts_by_username(&path.into_inner(), viewer(&auth))
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("user not found".into()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/posts/react/like/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Toggle result and fresh counts", body = crate::reaction::ReactionResponse),
        (status = 400, description = "Bad id"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn like_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    react(auth, &data, Target::Post(path.into_inner()), Polarity::Like).await
}

#[utoipa::path(
    post,
    path = "/api/posts/react/dislike/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Toggle result and fresh counts", body = crate::reaction::ReactionResponse),
        (status = 400, description = "Bad id"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dislike_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    react(auth, &data, Target::Post(path.into_inner()), Polarity::Dislike).await
}
