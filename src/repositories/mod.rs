pub mod memory_repository;
pub mod pg_repository;

use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::models::comment::{Comment, CommentQuery, NewComment};
use crate::models::follow::{Follow, FollowCounts};
use crate::models::group::{Group, GroupQuery, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges, PostQuery};
use crate::models::user::{NewUser, User, UserQuery};

/// `limit` for listings that are not paginated.
pub const UNBOUNDED: i64 = i64::MAX;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database error: {0}")]
    Database(tokio_postgres::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
}

impl From<tokio_postgres::Error> for RepoError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db) = err.as_db_error() {
            if *db.code() == SqlState::UNIQUE_VIOLATION {
                return RepoError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        RepoError::Database(err)
    }
}

/// Storage for every entity of the site.
///
/// Listings come back newest first (`pub_date`/`created`, then id, both
/// descending). `offset`/`limit` slice the ordered listing; `count_*`
/// returns the size of the whole filtered set.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    async fn count_users(&self, query: &UserQuery) -> Result<i64, RepoError>;
    /// Ordered by username.
    async fn list_users(
        &self,
        query: &UserQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<User>, RepoError>;
    /// Cascades to the user's posts, comments and follow edges.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn create_group(&self, group: NewGroup) -> Result<Group, RepoError>;
    async fn group_by_slug(&self, slug: &str) -> Result<Option<Group>, RepoError>;
    /// Ordered by title.
    async fn list_groups(&self, query: &GroupQuery) -> Result<Vec<Group>, RepoError>;
    /// Posts of the group survive with their group cleared.
    async fn delete_group(&self, id: i32) -> Result<bool, RepoError>;

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError>;
    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Post, RepoError>;
    async fn post_by_id(&self, id: i32) -> Result<Option<Post>, RepoError>;
    async fn count_posts(&self, query: &PostQuery) -> Result<i64, RepoError>;
    async fn list_posts(
        &self,
        query: &PostQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>, RepoError>;
    /// Cascades to the post's comments.
    async fn delete_post(&self, id: i32) -> Result<bool, RepoError>;

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError>;
    async fn count_comments(&self, query: &CommentQuery) -> Result<i64, RepoError>;
    async fn list_comments(
        &self,
        query: &CommentQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, RepoError>;
    async fn delete_comment(&self, id: i32) -> Result<bool, RepoError>;

    /// Returns whether a new edge was created. Existing edges and
    /// self-follows are left alone.
    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError>;
    /// Returns whether an edge was removed.
    async fn unfollow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError>;
    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError>;
    async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, RepoError>;
    async fn count_follows(&self) -> Result<i64, RepoError>;
    /// Ordered by id, newest first.
    async fn list_follows(&self, offset: i64, limit: i64) -> Result<Vec<Follow>, RepoError>;
    async fn delete_follow(&self, id: i32) -> Result<bool, RepoError>;
}
