use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = Uuid;

/// Most recently bumped threads returned by a board listing.
pub const THREAD_LIST_LIMIT: usize = 10;
/// Newest replies previewed per thread in a board listing.
pub const REPLY_PREVIEW_LIMIT: usize = 3;
/// Text a reply is overwritten with when its author deletes it.
pub const DELETED_TEXT: &str = "DELETED";

/// Stored thread document. Replies are embedded and owned by the thread.
///
/// This is the persisted shape and carries the secrets (`delete_password`,
/// reply `reported` flags). Never hand it to a client directly; go through
/// [`Thread::into_board_view`] or [`Thread::into_full_view`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    #[serde(rename = "_id")]
    pub id: Id,
    pub board: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub reported: bool,
    pub delete_password: String,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "_id")]
    pub id: Id,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub reported: bool,
    pub delete_password: String,
}

#[derive(Debug, Clone)]
pub struct NewThread {
    pub board: String,
    pub text: String,
    pub delete_password: String,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub thread_id: Id,
    pub text: String,
    pub delete_password: String,
}

impl Thread {
    pub fn new(new: NewThread, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            board: new.board,
            text: new.text,
            created_on: now,
            bumped_on: now,
            reported: false,
            delete_password: new.delete_password,
            replies: Vec::new(),
        }
    }

    /// Board listing shape: total reply count plus the newest few replies.
    pub fn into_board_view(self) -> ThreadView {
        let replycount = self.replies.len();
        let mut view = self.into_full_view();
        view.replies.truncate(REPLY_PREVIEW_LIMIT);
        view.replycount = Some(replycount);
        view
    }

    /// Single-thread shape: every reply, newest first.
    pub fn into_full_view(self) -> ThreadView {
        let mut replies = self.replies;
        replies.sort_by(|a, b| b.created_on.cmp(&a.created_on));
        ThreadView {
            id: self.id,
            board: self.board,
            text: self.text,
            created_on: self.created_on,
            bumped_on: self.bumped_on,
            reported: self.reported,
            replycount: None,
            replies: replies.into_iter().map(ReplyView::from).collect(),
        }
    }
}

impl Reply {
    pub fn new(text: String, delete_password: String, now: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), text, created_on: now, reported: false, delete_password }
    }
}

/// Thread as clients see it. No password.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadView {
    #[serde(rename = "_id")]
    #[schema(value_type = uuid::Uuid)]
    pub id: Id,
    pub board: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub reported: bool,
    /// Present on board listings only; counts every reply, not just the preview.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replycount: Option<usize>,
    pub replies: Vec<ReplyView>,
}

/// Reply as clients see it. Password and report flag are stripped.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplyView {
    #[serde(rename = "_id")]
    #[schema(value_type = uuid::Uuid)]
    pub id: Id,
    pub text: String,
    pub created_on: DateTime<Utc>,
}

impl From<Reply> for ReplyView {
    fn from(r: Reply) -> Self {
        Self { id: r.id, text: r.text, created_on: r.created_on }
    }
}
