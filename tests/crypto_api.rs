#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, App};
use common::Harness;
use karma::config;
use karma::models::PostUpdate;
use karma::repo::{PostRepo, RepoError};
use serde_json::{json, Value};

macro_rules! app {
    ($h:expr) => {
        test::init_service(App::new().app_data($h.data()).configure(config)).await
    };
}

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status().as_u16();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn encrypt_reveal_and_decrypt() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let app = app!(h);

    let (status, post) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(h.bearer(&alice))
            .set_json(json!({"title": "diary", "content": "dear diary"}))
    );
    assert_eq!(status, 201);
    let id = post["id"].as_i64().unwrap();

    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/crypto/post/encrypt/{id}"))
            .insert_header(h.bearer(&bob))
            .set_json(json!({"key": "k1"}))
    );
    assert_eq!(status, 403);

    let (status, locked) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/crypto/post/encrypt/{id}"))
            .insert_header(h.bearer(&alice))
            .set_json(json!({"key": "k1"}))
    );
    assert_eq!(status, 200);
    assert_eq!(locked["is_locked"], true);
    assert_ne!(locked["content"], "dear diary");

    // a second encrypt must not wrap the ciphertext again
    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/crypto/post/encrypt/{id}"))
            .insert_header(h.bearer(&alice))
            .set_json(json!({"key": "k2"}))
    );
    assert_eq!(status, 400);

    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/posts/{id}"))
            .insert_header(h.bearer(&alice))
            .set_json(json!({"content": "overwrite"}))
    );
    assert_eq!(status, 400);

    let (status, _) = call!(
        app,
        test::TestRequest::post().uri(&format!("/api/crypto/post/reveal/{id}")).set_json(json!({"key": "nope"}))
    );
    assert_eq!(status, 400);

    let (status, revealed) = call!(
        app,
        test::TestRequest::post().uri(&format!("/api/crypto/post/reveal/{id}")).set_json(json!({"key": "k1"}))
    );
    assert_eq!(status, 200);
    assert_eq!(revealed["content"], "dear diary");
    assert!(h.repo.get_post(id).await.unwrap().is_locked);

    let (status, plain) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/crypto/post/decrypt/{id}"))
            .insert_header(h.bearer(&alice))
            .set_json(json!({"key": "k1"}))
    );
    assert_eq!(status, 200);
    assert_eq!(plain["is_locked"], false);
    assert_eq!(plain["content"], "dear diary");

    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/crypto/post/decrypt/{id}"))
            .insert_header(h.bearer(&alice))
            .set_json(json!({"key": "k1"}))
    );
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn crypto_input_errors() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri("/api/crypto/post/encrypt/999")
            .insert_header(h.bearer(&alice))
            .set_json(json!({"key": "k"}))
    );
    assert_eq!(status, 404);

    let (status, _) = call!(
        app,
        test::TestRequest::patch()
            .uri("/api/crypto/post/encrypt/1")
            .insert_header(h.bearer(&alice))
            .set_json(json!({}))
    );
    assert_eq!(status, 400);

    let (status, _) = call!(
        app,
        test::TestRequest::patch().uri("/api/crypto/post/encrypt/1").set_json(json!({"key": "k"}))
    );
    assert_eq!(status, 401);
}

#[actix_web::test]
async fn stale_lock_flag_is_rejected_by_the_store() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let app = app!(h);

    let (_, post) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(h.bearer(&alice))
            .set_json(json!({"title": "t", "content": "plain"}))
    );
    let id = post["id"].as_i64().unwrap();
    let lock = |content: &str| PostUpdate {
        content: Some(content.into()),
        is_locked: Some(true),
        when_locked: Some(false),
        ..Default::default()
    };

    // Two writers that both read the post unlocked: only the first lands.
    h.repo.update_post(id, lock("first")).await.unwrap();
    assert_eq!(h.repo.update_post(id, lock("second")).await.unwrap_err(), RepoError::Conflict);
    assert_eq!(h.repo.get_post(id).await.unwrap().content, "first");
}
