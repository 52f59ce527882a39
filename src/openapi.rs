use crate::models::{ReplyView, ThreadView};
use crate::routes::{NewReplyForm, NewThreadForm, ReplyActionForm, ThreadActionForm};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_thread,
        crate::routes::list_threads,
        crate::routes::report_thread,
        crate::routes::delete_thread,
        crate::routes::create_reply,
        crate::routes::list_replies,
        crate::routes::report_reply,
        crate::routes::delete_reply,
    ),
    components(schemas(
        ThreadView, ReplyView,
        NewThreadForm, NewReplyForm, ThreadActionForm, ReplyActionForm
    )),
    tags(
        (name = "threads", description = "Thread operations"),
        (name = "replies", description = "Reply operations"),
    )
)]
pub struct ApiDoc;
