#![cfg(feature = "postgres-store")]

//! Runs against a live Postgres when DATABASE_URL is set; skipped otherwise.

use std::time::Duration;

use actix_web::{test, web, App};
use board::models::{NewReply, NewThread, DELETED_TEXT, THREAD_LIST_LIMIT};
use board::repo::pg::PgRepo;
use board::repo::{ReplyRepo, RepoError, ThreadRepo};
use board::{config, AppState};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

// Boards are unique per test run so parallel runs against one database don't collide.
fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn thread(board: &str, text: &str) -> NewThread {
    NewThread { board: board.into(), text: text.into(), delete_password: "pw".into() }
}

#[actix_web::test]
#[serial_test::serial]
async fn pg_thread_lifecycle() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };
    let board = uniq("pg");

    let t = r.create_thread(thread(&board, "op")).await.unwrap();
    assert_eq!(t.created_on, t.bumped_on);
    let fetched = r.get_thread(t.id).await.unwrap();
    assert_eq!(fetched.text, "op");
    assert!(fetched.replies.is_empty());

    r.report_thread(t.id).await.unwrap();
    r.report_thread(t.id).await.unwrap();
    assert!(r.get_thread(t.id).await.unwrap().reported);
    assert!(matches!(r.report_thread(Uuid::new_v4()).await, Err(RepoError::NotFound)));

    assert!(matches!(r.delete_thread(t.id, "wrong").await, Err(RepoError::IncorrectPassword)));
    r.delete_thread(t.id, "pw").await.unwrap();
    assert!(matches!(r.get_thread(t.id).await, Err(RepoError::NotFound)));
}

#[actix_web::test]
#[serial_test::serial]
async fn pg_embedded_replies() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };
    let board = uniq("pg");
    let t = r.create_thread(thread(&board, "op")).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..4 {
        let new = NewReply { thread_id: t.id, text: format!("r{i}"), delete_password: format!("p{i}") };
        let (updated, reply) = r.create_reply(new).await.unwrap();
        assert_eq!(updated.bumped_on, reply.created_on);
        assert_eq!(updated.replies.len(), i + 1);
        ids.push(reply.id);
    }

    // wrong password, and the thread's password, both miss
    assert!(matches!(r.delete_reply(t.id, ids[1], "p2").await, Err(RepoError::IncorrectPassword)));
    assert!(matches!(r.delete_reply(t.id, ids[1], "pw").await, Err(RepoError::IncorrectPassword)));
    r.report_reply(t.id, ids[1]).await.unwrap();
    r.delete_reply(t.id, ids[1], "p1").await.unwrap();
    assert!(matches!(r.delete_reply(t.id, ids[1], "p1").await, Err(RepoError::IncorrectPassword)));

    let stored = r.get_thread(t.id).await.unwrap();
    let texts: Vec<&str> = stored.replies.iter().map(|x| x.text.as_str()).collect();
    assert_eq!(texts, ["r0", DELETED_TEXT, "r2", "r3"]);
    assert!(stored.replies[1].reported);
    assert!(!stored.replies[0].reported);

    assert!(matches!(r.report_reply(t.id, Uuid::new_v4()).await, Err(RepoError::NotFound)));
    let missing = NewReply { thread_id: Uuid::new_v4(), text: "x".into(), delete_password: "y".into() };
    assert!(matches!(r.create_reply(missing).await, Err(RepoError::NotFound)));
    r.delete_thread(t.id, "pw").await.unwrap();
}

#[actix_web::test]
#[serial_test::serial]
async fn pg_listing_order_and_limit() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };
    let board = uniq("pg");
    let mut created = Vec::new();
    for i in 0..12 {
        created.push(r.create_thread(thread(&board, &format!("t{i}"))).await.unwrap());
    }
    let new = NewReply { thread_id: created[0].id, text: "bump".into(), delete_password: "x".into() };
    r.create_reply(new).await.unwrap();

    let listed = r.list_threads(&board, THREAD_LIST_LIMIT).await.unwrap();
    assert_eq!(listed.len(), THREAD_LIST_LIMIT);
    assert_eq!(listed[0].id, created[0].id);
    assert!(listed.windows(2).all(|w| w[0].bumped_on >= w[1].bumped_on));

    for t in created {
        r.delete_thread(t.id, "pw").await.unwrap();
    }
}

#[actix_web::test]
#[serial_test::serial]
async fn pg_routes_hide_secrets() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };
    let board = uniq("pg");
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState { repo: Arc::new(r) }))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/threads/{board}"))
        .set_json(&json!({ "text": "op", "delete_password": "pw" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 302);

    let req = test::TestRequest::get().uri(&format!("/api/threads/{board}")).to_request();
    let threads: Value = test::call_and_read_body_json(&app, req).await;
    let first = &threads[0];
    assert!(first.get("delete_password").is_none());
    assert_eq!(first["replycount"], 0);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/threads/{board}"))
        .set_json(&json!({ "thread_id": first["_id"], "delete_password": "pw" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, "success");
}
