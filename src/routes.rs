use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, Either, HttpResponse};
use serde::Deserialize;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/threads/{board}")
                    .route(web::post().to(create_thread))
                    .route(web::get().to(list_threads))
                    .route(web::put().to(report_thread))
                    .route(web::delete().to(delete_thread)),
            )
            .service(
                web::resource("/replies/{board}")
                    .route(web::post().to(create_reply))
                    .route(web::get().to(list_replies))
                    .route(web::put().to(report_reply))
                    .route(web::delete().to(delete_reply)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
}

pub const SUCCESS: &str = "success";
pub const REPORT_FAILED: &str = "err";
pub const INCORRECT_PASSWORD: &str = "incorrect password";

/// Bodies arrive either as JSON or as an urlencoded HTML form. Extraction
/// failures reach the handler so each route can answer with its own literal.
type Body<T> = Result<Either<web::Json<T>, web::Form<T>>, actix_web::Error>;

fn body<T>(b: Body<T>) -> Result<T, String> {
    match b {
        Ok(Either::Left(json)) => Ok(json.into_inner()),
        Ok(Either::Right(form)) => Ok(form.into_inner()),
        Err(e) => {
            debug!(error = %e, "unreadable request body");
            Err(e.to_string())
        }
    }
}

/// Ids are opaque to clients; anything that is not one of ours matches nothing.
fn parse_id(raw: Option<&str>) -> Option<Id> {
    raw.and_then(|s| s.trim().parse().ok())
}

// Every field is optional at the wire level; presence is the store's call.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NewThreadForm {
    pub text: Option<String>,
    pub delete_password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NewReplyForm {
    pub thread_id: Option<String>,
    pub text: Option<String>,
    pub delete_password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ThreadActionForm {
    pub thread_id: Option<String>,
    pub delete_password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReplyActionForm {
    pub thread_id: Option<String>,
    pub reply_id: Option<String>,
    pub delete_password: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreadQuery {
    /// Thread to fetch.
    pub thread_id: Option<String>,
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, location)).finish()
}

fn literal(s: &'static str) -> HttpResponse {
    HttpResponse::Ok().json(s)
}

#[utoipa::path(
    post,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = NewThreadForm,
    responses(
        (status = 302, description = "Thread created; Location points at /b/{board}/?threadId={id}"),
        (status = 400, description = "Missing text or delete_password, or an unreadable body"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn create_thread(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Body<NewThreadForm>,
) -> Result<HttpResponse, ApiError> {
    let form = body(payload).map_err(ApiError::Validation)?;
    let new = NewThread {
        board: path.into_inner(),
        text: form.text.unwrap_or_default(),
        delete_password: form.delete_password.unwrap_or_default(),
    };
    let thread = data.repo.create_thread(new).await.map_err(|e| {
        warn!(error = %e, "thread creation failed");
        ApiError::from(e)
    })?;
    info!(board = %thread.board, thread_id = %thread.id, "thread created");
    Ok(redirect(format!("/b/{}/?threadId={}", urlencoding::encode(&thread.board), thread.id)))
}

#[utoipa::path(
    post,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name (informational; the thread id decides)")),
    request_body = NewReplyForm,
    responses(
        (status = 302, description = "Reply created; Location points at /b/{board}/{thread_id}/?replyId={id}"),
        (status = 200, description = "No such thread; body is null"),
        (status = 400, description = "Missing text or delete_password, or an unreadable body"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn create_reply(
    data: web::Data<AppState>,
    _board: web::Path<String>,
    payload: Body<NewReplyForm>,
) -> Result<HttpResponse, ApiError> {
    let form = body(payload).map_err(ApiError::Validation)?;
    let thread_id = parse_id(form.thread_id.as_deref()).ok_or(ApiError::NotFound)?;
    let new = NewReply {
        thread_id,
        text: form.text.unwrap_or_default(),
        delete_password: form.delete_password.unwrap_or_default(),
    };
    let (thread, reply) = data.repo.create_reply(new).await.map_err(|e| {
        warn!(error = %e, %thread_id, "reply creation failed");
        ApiError::from(e)
    })?;
    info!(board = %thread.board, %thread_id, reply_id = %reply.id, "reply created");
    Ok(redirect(format!(
        "/b/{}/{}/?replyId={}",
        urlencoding::encode(&thread.board),
        thread.id,
        reply.id
    )))
}

#[utoipa::path(
    get,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    responses(
        (status = 200, description = "Ten most recently bumped threads, three newest replies each", body = [ThreadView]),
        (status = 500, description = "Store failure")
    )
)]
pub async fn list_threads(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let board = path.into_inner();
    let threads = data.repo.list_threads(&board, THREAD_LIST_LIMIT).await?;
    let views: Vec<ThreadView> = threads.into_iter().map(Thread::into_board_view).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name (informational)"), ThreadQuery),
    responses(
        (status = 200, description = "The thread with every reply, newest first; null if unknown", body = ThreadView),
        (status = 500, description = "Store failure")
    )
)]
pub async fn list_replies(
    data: web::Data<AppState>,
    _board: web::Path<String>,
    query: web::Query<ThreadQuery>,
) -> Result<HttpResponse, ApiError> {
    let thread_id = parse_id(query.thread_id.as_deref()).ok_or(ApiError::NotFound)?;
    let thread = data.repo.get_thread(thread_id).await?;
    Ok(HttpResponse::Ok().json(thread.into_full_view()))
}

#[utoipa::path(
    put,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ThreadActionForm,
    responses((status = 200, description = "\"success\" or \"err\"", body = String))
)]
pub async fn report_thread(data: web::Data<AppState>, payload: Body<ThreadActionForm>) -> HttpResponse {
    let Ok(form) = body(payload) else {
        return literal(REPORT_FAILED);
    };
    let Some(thread_id) = parse_id(form.thread_id.as_deref()) else {
        return literal(REPORT_FAILED);
    };
    match data.repo.report_thread(thread_id).await {
        Ok(()) => {
            info!(%thread_id, "thread reported");
            literal(SUCCESS)
        }
        Err(e) => {
            warn!(error = %e, %thread_id, "thread report failed");
            literal(REPORT_FAILED)
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReplyActionForm,
    responses((status = 200, description = "\"success\" or \"err\"", body = String))
)]
pub async fn report_reply(data: web::Data<AppState>, payload: Body<ReplyActionForm>) -> HttpResponse {
    let Ok(form) = body(payload) else {
        return literal(REPORT_FAILED);
    };
    let (Some(thread_id), Some(reply_id)) =
        (parse_id(form.thread_id.as_deref()), parse_id(form.reply_id.as_deref()))
    else {
        return literal(REPORT_FAILED);
    };
    match data.repo.report_reply(thread_id, reply_id).await {
        Ok(()) => {
            info!(%thread_id, %reply_id, "reply reported");
            literal(SUCCESS)
        }
        Err(e) => {
            warn!(error = %e, %thread_id, %reply_id, "reply report failed");
            literal(REPORT_FAILED)
        }
    }
}

fn delete_outcome(result: Result<(), RepoError>) -> HttpResponse {
    match result {
        Ok(()) => literal(SUCCESS),
        Err(RepoError::IncorrectPassword) => literal(INCORRECT_PASSWORD),
        Err(e) => {
            // still reported as a password failure; only the log tells them apart
            warn!(error = %e, "delete failed");
            literal(INCORRECT_PASSWORD)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/threads/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ThreadActionForm,
    responses((status = 200, description = "\"success\" or \"incorrect password\"", body = String))
)]
pub async fn delete_thread(data: web::Data<AppState>, payload: Body<ThreadActionForm>) -> HttpResponse {
    let Ok(form) = body(payload) else {
        return literal(INCORRECT_PASSWORD);
    };
    let Some(thread_id) = parse_id(form.thread_id.as_deref()) else {
        return literal(INCORRECT_PASSWORD);
    };
    let password = form.delete_password.unwrap_or_default();
    let result = data.repo.delete_thread(thread_id, &password).await;
    if result.is_ok() {
        info!(%thread_id, "thread deleted");
    }
    delete_outcome(result)
}

#[utoipa::path(
    delete,
    path = "/api/replies/{board}",
    params(("board" = String, Path, description = "Board name")),
    request_body = ReplyActionForm,
    responses((status = 200, description = "\"success\" or \"incorrect password\"", body = String))
)]
pub async fn delete_reply(data: web::Data<AppState>, payload: Body<ReplyActionForm>) -> HttpResponse {
    let Ok(form) = body(payload) else {
        return literal(INCORRECT_PASSWORD);
    };
    let (Some(thread_id), Some(reply_id)) =
        (parse_id(form.thread_id.as_deref()), parse_id(form.reply_id.as_deref()))
    else {
        return literal(INCORRECT_PASSWORD);
    };
    let password = form.delete_password.unwrap_or_default();
    let result = data.repo.delete_reply(thread_id, reply_id, &password).await;
    if result.is_ok() {
        info!(%thread_id, %reply_id, "reply deleted");
    }
    delete_outcome(result)
}
