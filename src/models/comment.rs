use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::models::user::Author;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: i32,
    pub post_id: i32,
    pub author: Author,
    pub text: String,
    pub created: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i32,
    pub author_id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommentQuery {
    pub post_id: Option<i32>,
    pub text_contains: Option<String>,
    pub created_since: Option<NaiveDateTime>,
}

impl CommentQuery {
    pub fn on_post(post_id: i32) -> Self {
        Self { post_id: Some(post_id), ..Self::default() }
    }

    pub fn matches(&self, comment: &Comment) -> bool {
        self.post_id.is_none_or(|id| comment.post_id == id)
            && self
                .text_contains
                .as_ref()
                .is_none_or(|needle| comment.text.to_lowercase().contains(&needle.to_lowercase()))
            && self.created_since.is_none_or(|since| comment.created >= since)
    }
}
