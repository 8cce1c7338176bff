use serde::Serialize;

use crate::models::user::Author;

/// A `user -> author` subscription edge. Unique per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Follow {
    pub id: i32,
    pub user: Author,
    pub author: Author,
}

/// Follower/following totals shown on a profile.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}
