#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use common::{multipart, png_bytes, Harness};
use karma::config;
use karma::repo::UserRepo;
use serde_json::{json, Value};

macro_rules! app {
    ($h:expr) => {
        test::init_service(App::new().app_data($h.data()).configure(config)).await
    };
}

#[actix_web::test]
async fn sign_up_then_login() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "carol", "email": "Carol@Example.com", "password": "hunter22"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["email"], "carol@example.com");
    assert!(created.get("password").is_none());
    assert!(created.get("type").is_none());

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "carol2", "email": "carol@example.com", "password": "x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "", "email": "not-an-email", "password": ""}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "dave"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "carol@example.com", "password": "hunter22"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "login successful");
    assert_eq!(body["user"]["username"], "carol");
    assert_eq!(body["user"]["type"], "basic");
    assert!(body["user"].get("password").is_none());
    assert!(body["user"]["token"].is_string());
    assert!(body["user"]["refreshToken"].is_string());

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "carol@example.com", "password": "wrong"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "nobody@example.com", "password": "x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "", "password": ""}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn refresh_token_flow() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let refresh = h.state.tokens.refresh_token(alice.id).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/token/refresh")
        .insert_header(("Authorization", format!("Bearer {refresh}")))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap();
    assert_eq!(h.state.tokens.verify_access(token).unwrap().id, alice.id);

    // an access token is not a refresh token
    let req = test::TestRequest::post().uri("/api/token/refresh").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post().uri("/api/token/refresh").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let ghost = h.state.tokens.refresh_token(9999).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/token/refresh")
        .insert_header(("Authorization", format!("Bearer {ghost}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn profiles_and_edits() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.user("bob").await;
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/users/profile/alice").to_request();
    let profile: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(profile["username"], "alice");
    assert!(profile.get("password").is_none());
    assert!(profile.get("type").is_none());

    let req = test::TestRequest::get().uri("/api/users/profile/ghost").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/users").to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let req = test::TestRequest::patch()
        .uri("/api/users/edit-profile")
        .insert_header(h.bearer(&alice))
        .set_json(json!({"username": "  "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch()
        .uri("/api/users/edit-profile")
        .insert_header(h.bearer(&alice))
        .set_json(json!({"username": "bob"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::patch()
        .uri("/api/users/edit-profile")
        .insert_header(h.bearer(&alice))
        .set_json(json!({"username": "alicia", "description": "hi there"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["username"], "alicia");
    assert_eq!(body["user"]["description"], "hi there");
    let token = body["user"]["token"].as_str().unwrap();
    assert_eq!(h.state.tokens.verify_access(token).unwrap().username, "alicia");

    let req = test::TestRequest::patch()
        .uri("/api/users/edit-profile")
        .set_json(json!({"username": "x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn change_password() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let req = test::TestRequest::patch()
        .uri("/api/users/change-password")
        .insert_header(h.bearer(&alice))
        .set_json(json!({"oldPassword": "nope", "newPassword": "fresh-one"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::patch()
        .uri("/api/users/change-password")
        .insert_header(h.bearer(&alice))
        .set_json(json!({"oldPassword": "pw-alice", "newPassword": "fresh-one"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "alice@example.com", "password": "fresh-one"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn follow_unfollow_and_stats() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    h.user("bob").await;
    let app = app!(h);

    let req = test::TestRequest::post().uri("/api/users/follow/alice").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post().uri("/api/users/follow/ghost").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post().uri("/api/users/follow/bob").insert_header(h.bearer(&alice)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["message"].as_str().unwrap().contains("bob"));

    let req = test::TestRequest::post().uri("/api/users/follow/bob").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::get().uri("/api/users/following").insert_header(h.bearer(&alice)).to_request();
    let following: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(following[0]["username"], "bob");

    let req = test::TestRequest::get().uri("/api/users/stats?username=bob").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["follower_count"], 1);
    assert_eq!(stats["following_count"], 0);
    assert_eq!(stats["post_count"], 0);

    let req = test::TestRequest::get().uri("/api/users/stats").to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let req = test::TestRequest::get().uri("/api/users/stats?username=ghost").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri("/api/users/follow/bob").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::delete().uri("/api/users/follow/bob").insert_header(h.bearer(&alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn google_sign_in() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post().uri("/api/users/auth/google-auth").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/auth/google-auth")
        .insert_header(("x-google-token", "forged"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/users/auth/google-auth")
        .insert_header(("x-google-token", "down"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 502);

    let req = test::TestRequest::post()
        .uri("/api/users/auth/google-auth")
        .insert_header(("x-google-token", "good-token"))
        .to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first["user"]["type"], "google");
    assert_eq!(first["user"]["username"], "Ada_Lovelace");
    assert_eq!(first["user"]["avatar"], "https://pics.test/ada.png");
    assert!(first["user"]["refreshToken"].is_string());

    // second sign-in finds the same account
    let req = test::TestRequest::post()
        .uri("/api/users/auth/google-auth")
        .insert_header(("x-google-token", "good-token"))
        .to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["user"]["id"], first["user"]["id"]);
    assert_eq!(h.repo.list_users().await.unwrap().len(), 1);
}

#[actix_web::test]
async fn otp_send_and_verify() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/carrier-pigeon/send")
        .set_json(json!({"email": "alice@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/send")
        .set_json(json!({"email": "ghost@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/send")
        .set_json(json!({"email": "alice@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert_eq!(h.mailer.count(), 1);
    let code = h.mailer.last_code().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/verify")
        .set_json(json!({"email": "alice@example.com", "otp": "000000x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/verify")
        .set_json(json!({"email": "alice@example.com", "otp": code}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let credential = body["credential"].as_str().unwrap();
    assert_eq!(h.state.tokens.verify_access(credential).unwrap().id, alice.id);
    assert!(h.repo.get_user(alice.id).await.unwrap().verified);

    // codes are single use
    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/verify")
        .set_json(json!({"email": "alice@example.com", "otp": code}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn otp_active_code_cap() {
    let h = Harness::new();
    h.user("alice").await;
    let app = app!(h);

    for expected in [200, 200, 200, 429] {
        let req = test::TestRequest::post()
            .uri("/api/users/OTP/phone/send")
            .set_json(json!({"email": "alice@example.com"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), expected);
    }
    assert_eq!(h.mailer.count(), 3);

    // the cap is per kind
    let req = test::TestRequest::post()
        .uri("/api/users/OTP/email/send")
        .set_json(json!({"email": "alice@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn password_reset_with_code() {
    let h = Harness::new();
    h.user("alice").await;
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/users/OTP/password_reset/send")
        .set_json(json!({"email": "alice@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let code = h.mailer.last_code().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/users/reset-password")
        .set_json(json!({"email": "alice@example.com", "otp": "123", "newPassword": "brand-new"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/users/reset-password")
        .set_json(json!({"email": "alice@example.com", "otp": code, "newPassword": "brand-new"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({"email": "alice@example.com", "password": "brand-new"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn avatar_upload_and_get_url() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let (ct, body) = multipart("source", "me.png", &png_bytes());
    let req = test::TestRequest::post()
        .uri("/api/users/upload-avatar")
        .insert_header(h.bearer(&alice))
        .insert_header(("content-type", ct))
        .set_payload(body)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["user"]["avatar"], "https://img.test/me.png");
    assert!(resp["user"]["token"].is_string());

    let (ct, body) = multipart("file", "cover.png", &png_bytes());
    let req = test::TestRequest::post()
        .uri("/api/users/upload-cover")
        .insert_header(h.bearer(&alice))
        .insert_header(("content-type", ct))
        .set_payload(body)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["user"]["cover"], "https://img.test/cover.png");

    let (ct, body) = multipart("source", "notes.txt", b"just some text, not an image");
    let req = test::TestRequest::post()
        .uri("/api/getUrl")
        .insert_header(("content-type", ct))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 415);

    let (ct, body) = multipart("source", "pic.png", &png_bytes());
    let req = test::TestRequest::post()
        .uri("/api/getUrl")
        .insert_header(("content-type", ct))
        .set_payload(body)
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["url"], "https://img.test/pic.png");
    assert_eq!(resp["data"]["filename"], "pic.png");
    assert_eq!(resp["data"]["mimetype"], "image/png");
}

#[actix_web::test]
async fn set_admin_requires_admin() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/admin/set-admin")
        .insert_header(h.bearer(&bob))
        .set_json(json!({"userId": alice.id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let root = h.repo.toggle_admin(alice.id).await.unwrap();
    assert!(root.admin);
    let req = test::TestRequest::post()
        .uri("/api/admin/set-admin")
        .insert_header(h.bearer(&root))
        .set_json(json!({"userId": bob.id}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["admin"], true);

    let req = test::TestRequest::post()
        .uri("/api/admin/set-admin")
        .insert_header(h.bearer(&root))
        .set_json(json!({"userId": 4040}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
