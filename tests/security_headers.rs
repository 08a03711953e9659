#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App, HttpResponse};
use common::Harness;
use karma::{config, SecurityHeaders};

#[actix_web::test]
async fn test_security_headers_present() {
    let h = Harness::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(false))
            .app_data(h.data())
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    let csp = headers.get("content-security-policy").unwrap().to_str().unwrap();
    assert!(csp.starts_with("default-src 'none'"));
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
async fn test_errors_get_headers_too() {
    let h = Harness::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(false))
            .app_data(h.data())
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/posts/0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(resp.headers().get("content-security-policy").is_some());
}

#[actix_web::test]
async fn test_hsts_enabled_via_builder() {
    let h = Harness::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(false).with_hsts(true))
            .app_data(h.data())
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
async fn test_docs_get_the_looser_policy() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::new(false).with_docs("/docs"))
            .route("/docs/index.html", web::get().to(|| async { HttpResponse::Ok().body("<html></html>") }))
            .route("/api/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let req = test::TestRequest::get().uri("/docs/index.html").to_request();
    let resp = test::call_service(&app, req).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert!(csp.contains("'unsafe-inline'"));

    let req = test::TestRequest::get().uri("/api/ping").to_request();
    let resp = test::call_service(&app, req).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert!(!csp.contains("'unsafe-inline'"));
}

#[actix_web::test]
async fn test_existing_csp_header_preserved() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .route("/custom", web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                    .finish()
            })),
    )
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
}
