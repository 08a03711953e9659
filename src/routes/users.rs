use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::media::read_image;
use super::{non_blank, positive, AppState};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, NewUser, NewVerification, User, UserUpdate};
use crate::otp::{self, OtpKind, MAX_ACTIVE_CODES, OTP_TTL_MINUTES};
use crate::password;
use crate::rate_limit::client_ip;
use crate::repo::RepoError;
use crate::require_admin;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::get().to(list_users)))
        .service(web::resource("/sign-up").route(web::post().to(sign_up)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/auth/google-auth").route(web::post().to(google_auth)))
        .service(web::resource("/profile/{username}").route(web::get().to(get_profile)))
        .service(web::resource("/edit-profile").route(web::patch().to(edit_profile)))
        .service(web::resource("/change-password").route(web::patch().to(change_password)))
        .service(web::resource("/stats").route(web::get().to(user_stats)))
        .service(
            web::resource("/follow/{username}")
                .route(web::post().to(follow_user))
                .route(web::delete().to(unfollow_user)),
        )
        .service(web::resource("/following").route(web::get().to(list_following)))
        .service(web::resource("/upload-avatar").route(web::post().to(upload_avatar)))
        .service(web::resource("/upload-cover").route(web::post().to(upload_cover)))
        .service(web::resource("/OTP/{kind}/send").route(web::post().to(send_otp)))
        .service(web::resource("/OTP/{kind}/verify").route(web::post().to(verify_otp)))
        .service(web::resource("/reset-password").route(web::post().to(reset_password)));
}

// ---------------- Request / response bodies ----------------

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignUpRequest {
    #[validate(length(min = 1, max = 64, message = "username is required"))]
    pub username: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EditProfileRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "old password is required"))]
    pub old_password: String,
    #[validate(length(min = 1, message = "new password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpSendRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    #[validate(length(min = 1, message = "new password is required"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub user_id: Id,
}

/// A user plus the tokens minted for this session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionUser {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub message: String,
    pub user: SessionUser,
}

/// What other people may see of an account.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicProfile {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub description: Option<String>,
    pub admin: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            avatar: u.avatar,
            cover: u.cover,
            description: u.description,
            admin: u.admin,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn message(m: impl Into<String>) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse { message: m.into() })
}

fn session(data: &AppState, user: User, with_refresh: bool, msg: &str) -> Result<SessionResponse, ApiError> {
    let token = data.tokens.access_token(&user)?;
    let refresh_token = if with_refresh { Some(data.tokens.refresh_token(user.id)?) } else { None };
    Ok(SessionResponse {
        message: msg.to_string(),
        user: SessionUser { user, token, refresh_token },
    })
}

/// Map `NotFound` from a lookup to a message naming what was missing.
fn missing(what: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::NotFound(format!("{what} not found")),
        other => other.into(),
    }
}

// ---------------- Accounts ----------------

#[utoipa::path(
    post,
    path = "/api/users/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = PublicProfile),
        (status = 400, description = "Missing or invalid fields"),
        (status = 409, description = "Email or username already used"),
        (status = 429, description = "Too many sign-ups")
    )
)]
pub async fn sign_up(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SignUpRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_signup(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests("too many sign-ups, try again later".into()));
    }
    let body = payload.into_inner();
    body.validate()?;
    let email = body.email.trim().to_lowercase();
    let username = body.username.trim().to_string();

    let hash = password::hash(body.password, data.bcrypt_cost).await?;
    let user = data
        .repo
        .create_user(NewUser {
            username,
            email,
            password_hash: hash,
            account_type: "basic".into(),
            avatar: None,
            cover: None,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::Conflict("email or username already used".into()),
            other => other.into(),
        })?;
    info!(user_id = user.id, "user registered");
    Ok(HttpResponse::Created().json(PublicProfile::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown email"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_login(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests("too many login attempts, try again later".into()));
    }
    let body = payload.into_inner();
    body.validate()?;
    let user = data
        .repo
        .find_user_by_email(&body.email.trim().to_lowercase())
        .await
        .map_err(missing("user"))?;
    if !password::verify(body.password, user.password.clone()).await? {
        return Err(ApiError::Unauthenticated("invalid password".into()));
    }
    info!(user_id = user.id, "user logged in");
    Ok(HttpResponse::Ok().json(session(&data, user, true, "login successful")?))
}

#[utoipa::path(
    post,
    path = "/api/users/auth/google-auth",
    params(("x-google-token" = String, Header, description = "Google ID token")),
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 400, description = "Missing token"),
        (status = 401, description = "Token rejected"),
        (status = 502, description = "Google unavailable")
    )
)]
pub async fn google_auth(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let token = req
        .headers()
        .get("x-google-token")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("google token is required"))?;

    let profile = data.google.verify(token).await?;
    let email = profile.email.trim().to_lowercase();
    let user = match data.repo.find_user_by_email(&email).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => {
            let hash = password::hash(password::unusable(), data.bcrypt_cost).await?;
            let base = profile
                .name
                .as_deref()
                .map(|n| n.split_whitespace().collect::<Vec<_>>().join("_"))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or("user").to_string());
            // Display names collide; the email is the identity.
            let username = match data.repo.find_user_by_username(&base).await {
                Err(RepoError::NotFound) => base,
                _ => format!("{base}_{}", &uuid::Uuid::new_v4().simple().to_string()[..6]),
            };
            let u = data
                .repo
                .create_user(NewUser {
                    username,
                    email,
                    password_hash: hash,
                    account_type: "google".into(),
                    avatar: profile.picture,
                    cover: None,
                })
                .await?;
            info!(user_id = u.id, "user registered through google");
            u
        }
        Err(e) => return Err(e.into()),
    };
    Ok(HttpResponse::Ok().json(session(&data, user, true, "login successful")?))
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = [PublicProfile]))
)]
pub async fn list_users(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let users: Vec<PublicProfile> = data.repo.list_users().await?.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/users/profile/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Profile", body = PublicProfile),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_profile(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.find_user_by_username(&path.into_inner()).await.map_err(missing("user"))?;
    Ok(HttpResponse::Ok().json(PublicProfile::from(user)))
}

#[utoipa::path(
    patch,
    path = "/api/users/edit-profile",
    request_body = EditProfileRequest,
    responses(
        (status = 200, description = "Updated", body = SessionResponse),
        (status = 400, description = "Nothing to update"),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Username taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn edit_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<EditProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let mut upd = UserUpdate {
        username: non_blank(body.username).map(|u| u.trim().to_string()),
        password_hash: None,
        avatar: non_blank(body.avatar),
        cover: non_blank(body.cover),
        description: body.description,
    };
    if let Some(pw) = non_blank(body.password) {
        upd.password_hash = Some(password::hash(pw, data.bcrypt_cost).await?);
    }
    if upd.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    let user = data.repo.update_user(auth.user_id(), upd).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict("username already used".into()),
        other => missing("user")(other),
    })?;
    info!(user_id = user.id, "profile updated");
    Ok(HttpResponse::Ok().json(session(&data, user, false, "user updated")?))
}

#[utoipa::path(
    patch,
    path = "/api/users/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Changed", body = MessageResponse),
        (status = 401, description = "Old password is wrong")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    body.validate()?;
    let user = data.repo.get_user(auth.user_id()).await.map_err(missing("user"))?;
    if !password::verify(body.old_password, user.password.clone()).await? {
        return Err(ApiError::Unauthenticated("old password is incorrect".into()));
    }
    let hash = password::hash(body.new_password, data.bcrypt_cost).await?;
    data.repo
        .update_user(user.id, UserUpdate { password_hash: Some(hash), ..Default::default() })
        .await?;
    info!(user_id = user.id, "password changed");
    Ok(message("password changed"))
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    params(("username" = Option<String>, Query, description = "Restrict to one user")),
    responses(
        (status = 200, description = "Follower, following and post counts", body = [crate::models::UserStats]),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn user_stats(data: web::Data<AppState>, q: web::Query<StatsQuery>) -> Result<HttpResponse, ApiError> {
    match non_blank(q.into_inner().username) {
        Some(name) => {
            let stats = data.repo.user_stats(&name).await.map_err(missing("user"))?;
            Ok(HttpResponse::Ok().json(stats))
        }
        None => Ok(HttpResponse::Ok().json(data.repo.all_user_stats().await?)),
    }
}

// ---------------- Follows ----------------

#[utoipa::path(
    post,
    path = "/api/users/follow/{username}",
    params(("username" = String, Path, description = "User to follow")),
    responses(
        (status = 200, description = "Now following", body = MessageResponse),
        (status = 400, description = "Cannot follow yourself"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Already following")
    ),
    security(("bearer_auth" = []))
)]
pub async fn follow_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    let target = data.repo.find_user_by_username(&username).await.map_err(missing("user to follow"))?;
    if target.id == auth.user_id() {
        return Err(ApiError::bad_request("you cannot follow yourself"));
    }
    data.repo.follow(auth.user_id(), target.id).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict(format!("already following {username}")),
        other => other.into(),
    })?;
    info!(follower = auth.user_id(), followed = target.id, "follow added");
    Ok(message(format!("you are now following {username}")))
}

#[utoipa::path(
    delete,
    path = "/api/users/follow/{username}",
    params(("username" = String, Path, description = "User to unfollow")),
    responses(
        (status = 200, description = "Unfollowed", body = MessageResponse),
        (status = 404, description = "Unknown user or not following")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unfollow_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    let target = data.repo.find_user_by_username(&username).await.map_err(missing("user"))?;
    data.repo
        .unfollow(auth.user_id(), target.id)
        .await
        .map_err(missing("follow"))?;
    info!(follower = auth.user_id(), followed = target.id, "follow removed");
    Ok(message(format!("you unfollowed {username}")))
}

#[utoipa::path(
    get,
    path = "/api/users/following",
    responses((status = 200, description = "Users the caller follows", body = [PublicProfile])),
    security(("bearer_auth" = []))
)]
pub async fn list_following(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let users: Vec<PublicProfile> = data
        .repo
        .list_following(auth.user_id())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(HttpResponse::Ok().json(users))
}

// ---------------- Avatar / cover ----------------

enum ProfileImage {
    Avatar,
    Cover,
}

async fn upload_profile_image(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
    which: ProfileImage,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await.map_err(missing("user"))?;
    let upload = read_image(payload).await?;
    let hosted = data.image_host.upload(upload.bytes, &upload.filename).await?;
    let upd = match which {
        ProfileImage::Avatar => UserUpdate { avatar: Some(hosted.url), ..Default::default() },
        ProfileImage::Cover => UserUpdate { cover: Some(hosted.url), ..Default::default() },
    };
    let user = data.repo.update_user(user.id, upd).await?;
    info!(user_id = user.id, "profile image updated");
    Ok(HttpResponse::Ok().json(session(&data, user, false, "image uploaded")?))
}

#[utoipa::path(
    post,
    path = "/api/users/upload-avatar",
    request_body(content = super::media::ImageUpload, content_type = "multipart/form-data", description = "Image in a `source` or `file` part"),
    responses(
        (status = 200, description = "Avatar stored", body = SessionResponse),
        (status = 413, description = "Too large"),
        (status = 415, description = "Not an image"),
        (status = 502, description = "Image host failure")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_avatar(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    upload_profile_image(auth, data, payload, ProfileImage::Avatar).await
}

#[utoipa::path(
    post,
    path = "/api/users/upload-cover",
    request_body(content = super::media::ImageUpload, content_type = "multipart/form-data", description = "Image in a `source` or `file` part"),
    responses(
        (status = 200, description = "Cover stored", body = SessionResponse),
        (status = 413, description = "Too large"),
        (status = 415, description = "Not an image"),
        (status = 502, description = "Image host failure")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_cover(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    upload_profile_image(auth, data, payload, ProfileImage::Cover).await
}

// ---------------- One-time codes ----------------

fn otp_kind(raw: &str) -> Result<OtpKind, ApiError> {
    raw.parse::<OtpKind>().map_err(ApiError::InvalidArgument)
}

#[utoipa::path(
    post,
    path = "/api/users/OTP/{kind}/send",
    params(("kind" = String, Path, description = "email, phone or password_reset")),
    request_body = OtpSendRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Unknown kind"),
        (status = 404, description = "Unknown email"),
        (status = 429, description = "Too many active codes")
    )
)]
pub async fn send_otp(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<OtpSendRequest>,
) -> Result<HttpResponse, ApiError> {
    let kind = otp_kind(&path.into_inner())?;
    let email = payload.into_inner().email.trim().to_lowercase();
    if !data.limits.allow_otp(&email) {
        return Err(ApiError::TooManyRequests("too many codes requested, try again later".into()));
    }
    let user = data.repo.find_user_by_email(&email).await.map_err(missing("user"))?;

    let now = Utc::now();
    let purged = data.repo.purge_expired_codes(user.id, now).await?;
    if purged > 0 {
        info!(user_id = user.id, purged, "expired codes removed");
    }
    if data.repo.count_active_codes(user.id, kind.as_str(), now).await? >= MAX_ACTIVE_CODES {
        warn!(user_id = user.id, %kind, "active code limit reached");
        return Err(ApiError::TooManyRequests("too many active codes, wait for one to expire".into()));
    }

    let code = otp::generate_code();
    data.repo
        .insert_code(NewVerification {
            user_id: user.id,
            code_hash: otp::hash_code(&code),
            kind: kind.as_str().to_string(),
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        })
        .await?;
    let (subject, body) = otp::render(kind, &user.username, &code);
    data.mailer.send(&user.email, &subject, &body).await?;
    info!(user_id = user.id, %kind, "verification code sent");
    Ok(message("OTP sent successfully"))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OtpVerifyResponse {
    pub message: String,
    pub credential: String,
}

#[utoipa::path(
    post,
    path = "/api/users/OTP/{kind}/verify",
    params(("kind" = String, Path, description = "email, phone or password_reset")),
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Verified", body = OtpVerifyResponse),
        (status = 400, description = "Invalid or expired code")
    )
)]
pub async fn verify_otp(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<OtpVerifyRequest>,
) -> Result<HttpResponse, ApiError> {
    let kind = otp_kind(&path.into_inner())?;
    let body = payload.into_inner();
    let invalid = || ApiError::bad_request("invalid OTP");
    let user = match data.repo.find_user_by_email(&body.email.trim().to_lowercase()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !data
        .repo
        .consume_code(user.id, kind.as_str(), &otp::hash_code(&body.otp), Utc::now())
        .await?
    {
        return Err(invalid());
    }
    data.repo.mark_verified(user.id).await?;
    let user = data.repo.get_user(user.id).await?;
    info!(user_id = user.id, %kind, "code verified");
    Ok(HttpResponse::Ok().json(OtpVerifyResponse {
        message: "OTP verified successfully".into(),
        credential: data.tokens.access_token(&user)?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Invalid or expired code")
    )
)]
pub async fn reset_password(
    data: web::Data<AppState>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    body.validate()?;
    let invalid = || ApiError::bad_request("invalid OTP");
    let user = match data.repo.find_user_by_email(&body.email.trim().to_lowercase()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    let kind = OtpKind::PasswordReset.as_str();
    if !data.repo.consume_code(user.id, kind, &otp::hash_code(&body.otp), Utc::now()).await? {
        return Err(invalid());
    }
    let hash = password::hash(body.new_password, data.bcrypt_cost).await?;
    data.repo
        .update_user(user.id, UserUpdate { password_hash: Some(hash), ..Default::default() })
        .await?;
    info!(user_id = user.id, "password reset");
    Ok(message("password reset"))
}

// ---------------- Tokens / admin ----------------

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/token/refresh",
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 400, description = "No refresh token"),
        (status = 401, description = "Invalid refresh token"),
        (status = 404, description = "User gone")
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let raw = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().nth(1))
        .ok_or_else(|| ApiError::bad_request("refresh token is required"))?;
    let claims = data
        .tokens
        .verify_refresh(raw)
        .map_err(|_| ApiError::Unauthenticated("invalid refresh token".into()))?;
    let user = data.repo.get_user(claims.id).await.map_err(missing("user"))?;
    Ok(HttpResponse::Ok().json(RefreshResponse { token: data.tokens.access_token(&user)? }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetAdminResponse {
    pub message: String,
    pub user: PublicProfile,
}

#[utoipa::path(
    post,
    path = "/api/admin/set-admin",
    request_body = SetAdminRequest,
    responses(
        (status = 200, description = "Admin flag toggled", body = SetAdminResponse),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_admin(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<SetAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin!(auth);
    let user_id = positive(payload.user_id, "user")?;
    let user = data.repo.toggle_admin(user_id).await.map_err(missing("user"))?;
    info!(by = auth.user_id(), user_id, admin = user.admin, "admin flag toggled");
    Ok(HttpResponse::Ok().json(SetAdminResponse {
        message: "admin status updated".into(),
        user: user.into(),
    }))
}
