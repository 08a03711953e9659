use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::{positive, AppState};
use crate::auth::Auth;
use crate::crypto::{self, CryptoError};
use crate::error::ApiError;
use crate::models::{Id, Post, PostUpdate};
use crate::repo::RepoError;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/encrypt/{post_id}").route(web::patch().to(encrypt_post)))
        .service(web::resource("/decrypt/{post_id}").route(web::patch().to(decrypt_post)))
        .service(web::resource("/reveal/{post_id}").route(web::post().to(reveal_post)));
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct KeyRequest {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevealResponse {
    pub id: Id,
    pub content: String,
}

fn key_of(req: KeyRequest) -> Result<String, ApiError> {
    req.key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("key is required"))
}

async fn load_post(data: &AppState, id: Id) -> Result<Post, ApiError> {
    data.repo.get_post(positive(id, "post")?).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("post not found".into()),
        other => other.into(),
    })
}

// A concurrent encrypt or decrypt flipped the flag while the cipher ran.
fn lock_moved(e: RepoError, msg: &str) -> ApiError {
    match e {
        RepoError::Conflict => ApiError::bad_request(msg),
        RepoError::NotFound => ApiError::NotFound("post not found".into()),
        other => other.into(),
    }
}

// Key derivation runs on the blocking pool.
async fn run_cipher<F>(f: F) -> Result<String, ApiError>
where
    F: FnOnce() -> Result<String, CryptoError> + Send + 'static,
{
    Ok(web::block(f).await??)
}

#[utoipa::path(
    patch,
    path = "/api/crypto/post/encrypt/{post_id}",
    params(("post_id" = i64, Path, description = "Post id")),
    request_body = KeyRequest,
    responses(
        (status = 200, description = "Content encrypted", body = Post),
        (status = 400, description = "Missing key or already encrypted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn encrypt_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<KeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let key = key_of(payload.into_inner())?;
    let post = load_post(&data, path.into_inner()).await?;
    if post.owner_id != auth.user_id() {
        return Err(ApiError::forbidden());
    }
    if post.is_locked {
        return Err(ApiError::bad_request("post is already encrypted"));
    }
    let content = post.content;
    let locked = run_cipher(move || crypto::lock(&content, &key)).await?;
    let upd = PostUpdate {
        content: Some(locked),
        is_locked: Some(true),
        when_locked: Some(false),
        ..Default::default()
    };
    let post = data.repo.update_post(post.id, upd).await.map_err(|e| lock_moved(e, "post is already encrypted"))?;
    info!(post_id = post.id, "post encrypted");
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    patch,
    path = "/api/crypto/post/decrypt/{post_id}",
    params(("post_id" = i64, Path, description = "Post id")),
    request_body = KeyRequest,
    responses(
        (status = 200, description = "Content restored", body = Post),
        (status = 400, description = "Missing or wrong key, or not encrypted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    ),
    security(("bearer_auth" = []))
)]
pub async fn decrypt_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<KeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let key = key_of(payload.into_inner())?;
    let post = load_post(&data, path.into_inner()).await?;
    if post.owner_id != auth.user_id() {
        return Err(ApiError::forbidden());
    }
    if !post.is_locked {
        return Err(ApiError::bad_request("post is not encrypted"));
    }
    let content = post.content;
    let plain = run_cipher(move || crypto::unlock(&content, &key)).await?;
    let upd = PostUpdate {
        content: Some(plain),
        is_locked: Some(false),
        when_locked: Some(true),
        ..Default::default()
    };
    let post = data.repo.update_post(post.id, upd).await.map_err(|e| lock_moved(e, "post is not encrypted"))?;
    info!(post_id = post.id, "post decrypted");
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/api/crypto/post/reveal/{post_id}",
    params(("post_id" = i64, Path, description = "Post id")),
    request_body = KeyRequest,
    responses(
        (status = 200, description = "Decrypted content; the post stays encrypted", body = RevealResponse),
        (status = 400, description = "Missing or wrong key, or not encrypted"),
        (status = 404, description = "No such post")
    )
)]
pub async fn reveal_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<KeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let key = key_of(payload.into_inner())?;
    let post = load_post(&data, path.into_inner()).await?;
    if !post.is_locked {
        return Err(ApiError::bad_request("post is not encrypted"));
    }
    let locked = post.content;
    let content = run_cipher(move || crypto::unlock(&locked, &key)).await?;
    Ok(HttpResponse::Ok().json(RevealResponse { id: post.id, content }))
}
