#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use common::Harness;
use karma::config;
use karma::rate_limit::{InMemoryRateLimiter, Quota, RateLimitConfig, RateLimiterFacade};
use serde_json::json;
use serial_test::serial;

fn tight(cfg: RateLimitConfig) -> RateLimiterFacade {
    RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg)
}

#[actix_web::test]
async fn login_attempts_are_limited_per_ip() {
    let h = Harness::with_limits(tight(RateLimitConfig { login: Quota::new(2, 60), ..Default::default() }));
    h.user("alice").await;
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;

    let attempt = |ip: &str| {
        test::TestRequest::post()
            .uri("/api/users/login")
            .insert_header(("x-forwarded-for", ip.to_string()))
            .peer_addr(format!("{ip}:5000").parse().unwrap())
            .set_json(json!({"email": "alice@example.com", "password": "wrong"}))
            .to_request()
    };

    assert_eq!(test::call_service(&app, attempt("10.0.0.1")).await.status(), 401);
    assert_eq!(test::call_service(&app, attempt("10.0.0.1")).await.status(), 401);
    let resp = test::call_service(&app, attempt("10.0.0.1")).await;
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("too many"));

    // someone else is unaffected
    assert_eq!(test::call_service(&app, attempt("10.0.0.2")).await.status(), 401);
}

#[actix_web::test]
async fn sign_ups_are_limited() {
    let h = Harness::with_limits(tight(RateLimitConfig { signup: Quota::new(1, 3600), ..Default::default() }));
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "one", "email": "one@example.com", "password": "pw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/users/sign-up")
        .set_json(json!({"username": "two", "email": "two@example.com", "password": "pw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);
}

#[actix_web::test]
async fn otp_sends_are_limited_per_email() {
    let h = Harness::with_limits(tight(RateLimitConfig { otp: Quota::new(1, 600), ..Default::default() }));
    h.user("alice").await;
    let app = test::init_service(App::new().app_data(h.data()).configure(config)).await;

    for expected in [200, 429] {
        let req = test::TestRequest::post()
            .uri("/api/users/OTP/email/send")
            .set_json(json!({"email": "alice@example.com"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), expected);
    }
}

#[::core::prelude::v1::test]
#[serial]
fn quotas_come_from_env() {
    std::env::set_var("RL_LOGIN_LIMIT", "3");
    std::env::set_var("RL_LOGIN_WINDOW", "15");
    std::env::set_var("RL_POST_LIMIT", "not-a-number");
    let cfg = RateLimitConfig::from_env();
    assert_eq!(cfg.login, Quota::new(3, 15));
    assert_eq!(cfg.post, RateLimitConfig::default().post);
    std::env::remove_var("RL_LOGIN_LIMIT");
    std::env::remove_var("RL_LOGIN_WINDOW");
    std::env::remove_var("RL_POST_LIMIT");
}
