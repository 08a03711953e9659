use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::auth::{Auth, TokenIssuer};
use crate::error::{json_error, path_error, query_error, ApiError};
use crate::google::GoogleVerifier;
use crate::image_host::ImageHost;
use crate::mailer::Mailer;
use crate::models::Id;
use crate::rate_limit::RateLimiterFacade;
use crate::reaction::{self, Polarity, Target};
use crate::repo::{Repo, RepoError};

pub mod comments;
pub mod crypto;
pub mod media;
pub mod posts;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_host: Arc<dyn ImageHost>,
    pub google: Arc<dyn GoogleVerifier>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: TokenIssuer,
    pub limits: RateLimiterFacade,
    pub bcrypt_cost: u32,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(1 << 20).error_handler(json_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .app_data(web::QueryConfig::default().error_handler(query_error));

    cfg.service(
        web::scope("/api")
            .service(web::scope("/users").configure(users::config))
            .service(web::scope("/posts").configure(posts::config))
            .service(web::scope("/comments").configure(comments::config))
            .service(web::scope("/crypto/post").configure(crypto::config))
            .service(web::resource("/token/refresh").route(web::post().to(users::refresh_token)))
            .service(web::resource("/admin/set-admin").route(web::post().to(users::set_admin)))
            .service(web::resource("/getUrl").route(web::post().to(media::get_url))),
    );
}

/// Reject non-positive ids before touching storage.
pub(crate) fn positive(id: Id, what: &str) -> Result<Id, ApiError> {
    if id <= 0 {
        return Err(ApiError::bad_request(format!("invalid {what} id")));
    }
    Ok(id)
}

/// Treat blank strings as absent.
pub(crate) fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Shared body of the post and comment react endpoints.
pub(crate) async fn react(
    auth: Auth,
    data: &AppState,
    target: Target,
    desired: Polarity,
) -> Result<HttpResponse, ApiError> {
    positive(target.id(), target.kind())?;
    let res = reaction::toggle(data.repo.as_ref(), target, auth.user_id(), desired)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound(format!("{} not found", target.kind())),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(res))
}
