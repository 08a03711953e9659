use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::image_host::HostedImage;
use crate::models::{Comment, CommentView, Post, PostView, ReactionDetail, ReactionUser, User, UserStats};
use crate::reaction::{Aggregate, ReactionAction, ReactionResponse, ToggleOutcome};
use crate::routes::{comments, crypto, media, posts, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        users::sign_up,
        users::login,
        users::google_auth,
        users::list_users,
        users::get_profile,
        users::edit_profile,
        users::change_password,
        users::user_stats,
        users::follow_user,
        users::unfollow_user,
        users::list_following,
        users::upload_avatar,
        users::upload_cover,
        users::send_otp,
        users::verify_otp,
        users::reset_password,
        users::refresh_token,
        users::set_admin,
        posts::create_post,
        posts::list_posts,
        posts::get_post,
        posts::update_post,
        posts::search_posts,
        posts::get_post_by_slug,
        posts::posts_by_username,
        posts::like_post,
        posts::dislike_post,
        comments::list_comments,
        comments::get_comment,
        comments::update_comment,
        comments::create_comment,
        comments::comments_for_post,
        comments::delete_comment,
        comments::like_comment,
        comments::dislike_comment,
        crypto::encrypt_post,
        crypto::decrypt_post,
        crypto::reveal_post,
        media::get_url,
    ),
    components(schemas(
        User, UserStats, Post, PostView, Comment, CommentView, ReactionDetail, ReactionUser,
        ToggleOutcome, Aggregate, ReactionAction, ReactionResponse, HostedImage,
        users::SignUpRequest, users::LoginRequest, users::EditProfileRequest,
        users::ChangePasswordRequest, users::OtpSendRequest, users::OtpVerifyRequest,
        users::ResetPasswordRequest, users::SetAdminRequest, users::SessionUser,
        users::SessionResponse, users::PublicProfile, users::MessageResponse,
        users::OtpVerifyResponse, users::RefreshResponse, users::SetAdminResponse,
        posts::CreatePostRequest, posts::UpdatePostRequest, posts::SlugPost,
        comments::CreateCommentRequest, comments::UpdateCommentRequest, comments::Layout,
        crypto::KeyRequest, crypto::RevealResponse,
        media::ImageUpload, media::UploadedFile, media::GetUrlResponse,
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "users", description = "Accounts, follows and one-time codes"),
        (name = "posts", description = "Posts and post reactions"),
        (name = "comments", description = "Threaded comments and comment reactions"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
