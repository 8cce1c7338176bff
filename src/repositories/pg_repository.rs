// src/repositories/pg_repository.rs
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::models::comment::{Comment, CommentQuery, NewComment};
use crate::models::follow::{Follow, FollowCounts};
use crate::models::group::{Group, GroupQuery, GroupRef, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges, PostQuery};
use crate::models::user::{Author, NewUser, User, UserQuery};
use crate::repositories::{RepoError, Repository};

const SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/schema.sql"));

const POST_SELECT: &str = "SELECT p.id, p.text, p.pub_date, p.image, \
     u.id AS author_id, u.username AS author_username, \
     u.first_name AS author_first_name, u.last_name AS author_last_name, \
     g.id AS group_id, g.title AS group_title, g.slug AS group_slug \
     FROM posts_post p \
     JOIN auth_user u ON u.id = p.author_id \
     LEFT JOIN posts_group g ON g.id = p.group_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.text, c.created, \
     u.id AS author_id, u.username AS author_username, \
     u.first_name AS author_first_name, u.last_name AS author_last_name \
     FROM posts_comment c \
     JOIN auth_user u ON u.id = c.author_id";

const FOLLOW_SELECT: &str = "SELECT f.id, \
     fu.id AS user_id, fu.username AS user_username, \
     fu.first_name AS user_first_name, fu.last_name AS user_last_name, \
     a.id AS author_id, a.username AS author_username, \
     a.first_name AS author_first_name, a.last_name AS author_last_name \
     FROM posts_follow f \
     JOIN auth_user fu ON fu.id = f.user_id \
     JOIN auth_user a ON a.id = f.author_id";

type Params<'a> = Vec<&'a (dyn ToSql + Sync)>;

/// PostgreSQL storage over a deadpool connection pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates missing tables and indexes.
    pub async fn migrate(&self) -> Result<(), RepoError> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        Ok(())
    }
}

fn where_clause(clauses: Vec<String>) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn post_filter<'a>(query: &'a PostQuery, params: &mut Params<'a>) -> String {
    let mut clauses = Vec::new();
    if let Some(group_id) = &query.group_id {
        params.push(group_id);
        clauses.push(format!("p.group_id = ${}", params.len()));
    }
    if let Some(author_id) = &query.author_id {
        params.push(author_id);
        clauses.push(format!("p.author_id = ${}", params.len()));
    }
    if let Some(user_id) = &query.followed_by {
        params.push(user_id);
        clauses.push(format!(
            "p.author_id IN (SELECT author_id FROM posts_follow WHERE user_id = ${})",
            params.len()
        ));
    }
    if let Some(needle) = &query.text_contains {
        params.push(needle);
        clauses.push(format!("strpos(lower(p.text), lower(${})) > 0", params.len()));
    }
    if let Some(since) = &query.published_since {
        params.push(since);
        clauses.push(format!("p.pub_date >= ${}", params.len()));
    }
    where_clause(clauses)
}

fn user_filter<'a>(query: &'a UserQuery, params: &mut Params<'a>) -> String {
    let mut clauses = Vec::new();
    if let Some(needle) = &query.username_contains {
        params.push(needle);
        clauses.push(format!("strpos(lower(username), lower(${})) > 0", params.len()));
    }
    where_clause(clauses)
}

fn comment_filter<'a>(query: &'a CommentQuery, params: &mut Params<'a>) -> String {
    let mut clauses = Vec::new();
    if let Some(post_id) = &query.post_id {
        params.push(post_id);
        clauses.push(format!("c.post_id = ${}", params.len()));
    }
    if let Some(needle) = &query.text_contains {
        params.push(needle);
        clauses.push(format!("strpos(lower(c.text), lower(${})) > 0", params.len()));
    }
    if let Some(since) = &query.created_since {
        params.push(since);
        clauses.push(format!("c.created >= ${}", params.len()));
    }
    where_clause(clauses)
}

fn author_from_row(row: &Row, prefix: &str) -> Result<Author, RepoError> {
    Ok(Author {
        id: row.try_get(format!("{prefix}_id").as_str())?,
        username: row.try_get(format!("{prefix}_username").as_str())?,
        first_name: row.try_get(format!("{prefix}_first_name").as_str())?,
        last_name: row.try_get(format!("{prefix}_last_name").as_str())?,
    })
}

fn user_from_row(row: &Row) -> Result<User, RepoError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        date_joined: row.try_get("date_joined")?,
    })
}

fn group_from_row(row: &Row) -> Result<Group, RepoError> {
    Ok(Group {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
    })
}

fn post_from_row(row: &Row) -> Result<Post, RepoError> {
    let group_id: Option<i32> = row.try_get("group_id")?;
    let group = match group_id {
        Some(id) => Some(GroupRef {
            id,
            title: row.try_get("group_title")?,
            slug: row.try_get("group_slug")?,
        }),
        None => None,
    };

    Ok(Post {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        pub_date: row.try_get("pub_date")?,
        author: author_from_row(row, "author")?,
        group,
        image: row.try_get("image")?,
    })
}

fn comment_from_row(row: &Row) -> Result<Comment, RepoError> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author: author_from_row(row, "author")?,
        text: row.try_get("text")?,
        created: row.try_get("created")?,
    })
}

fn follow_from_row(row: &Row) -> Result<Follow, RepoError> {
    Ok(Follow {
        id: row.try_get("id")?,
        user: author_from_row(row, "user")?,
        author: author_from_row(row, "author")?,
    })
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let date_joined = Utc::now().naive_utc();
        let row = client
            .query_one(
                "INSERT INTO auth_user \
                 (id, username, first_name, last_name, email, password_hash, date_joined) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
                &[
                    &id,
                    &user.username,
                    &user.first_name,
                    &user.last_name,
                    &user.email,
                    &user.password_hash,
                    &date_joined,
                ],
            )
            .await?;
        user_from_row(&row)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM auth_user WHERE id = $1", &[&id])
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM auth_user WHERE username = $1", &[&username])
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn count_users(&self, query: &UserQuery) -> Result<i64, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let sql = format!("SELECT COUNT(*) FROM auth_user{}", user_filter(query, &mut params));
        let row = client.query_one(sql.as_str(), &params).await?;
        Ok(row.try_get(0)?)
    }

    async fn list_users(
        &self,
        query: &UserQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<User>, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let filter = user_filter(query, &mut params);
        params.push(&limit);
        params.push(&offset);
        let sql = format!(
            "SELECT * FROM auth_user{} ORDER BY username LIMIT ${} OFFSET ${}",
            filter,
            params.len() - 1,
            params.len()
        );
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM auth_user WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO posts_group (title, slug, description) VALUES ($1, $2, $3) \
                 RETURNING id, title, slug, description",
                &[&group.title, &group.slug, &group.description],
            )
            .await?;
        group_from_row(&row)
    }

    async fn group_by_slug(&self, slug: &str) -> Result<Option<Group>, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM posts_group WHERE slug = $1", &[&slug])
            .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn list_groups(&self, query: &GroupQuery) -> Result<Vec<Group>, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let mut clauses = Vec::new();
        if let Some(needle) = &query.title_contains {
            params.push(needle);
            clauses.push(format!("strpos(lower(title), lower(${})) > 0", params.len()));
        }
        if let Some(slug) = &query.slug {
            params.push(slug);
            clauses.push(format!("slug = ${}", params.len()));
        }
        let sql = format!(
            "SELECT * FROM posts_group{} ORDER BY title, id",
            where_clause(clauses)
        );
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn delete_group(&self, id: i32) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM posts_group WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        let pub_date = Utc::now().naive_utc();
        let id: i32 = {
            let client = self.pool.get().await?;
            let row = client
                .query_one(
                    "INSERT INTO posts_post (text, pub_date, author_id, group_id, image) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING id",
                    &[&post.text, &pub_date, &post.author_id, &post.group_id, &post.image],
                )
                .await?;
            row.try_get("id")?
        };
        self.post_by_id(id).await?.ok_or(RepoError::NotFound)
    }

    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Post, RepoError> {
        {
            let client = self.pool.get().await?;
            let updated = client
                .execute(
                    "UPDATE posts_post SET text = $1, group_id = $2, image = $3 WHERE id = $4",
                    &[&changes.text, &changes.group_id, &changes.image, &id],
                )
                .await?;
            if updated == 0 {
                return Err(RepoError::NotFound);
            }
        }
        self.post_by_id(id).await?.ok_or(RepoError::NotFound)
    }

    async fn post_by_id(&self, id: i32) -> Result<Option<Post>, RepoError> {
        let client = self.pool.get().await?;
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        let row = client.query_opt(sql.as_str(), &[&id]).await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<i64, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let filter = post_filter(query, &mut params);
        let sql = format!("SELECT COUNT(*) FROM posts_post p{filter}");
        let row = client.query_one(sql.as_str(), &params).await?;
        Ok(row.try_get(0)?)
    }

    async fn list_posts(
        &self,
        query: &PostQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let filter = post_filter(query, &mut params);
        params.push(&limit);
        params.push(&offset);
        let sql = format!(
            "{POST_SELECT}{filter} ORDER BY p.pub_date DESC, p.id DESC LIMIT ${} OFFSET ${}",
            params.len() - 1,
            params.len()
        );
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn delete_post(&self, id: i32) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM posts_post WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let client = self.pool.get().await?;
        let created = Utc::now().naive_utc();
        let row = client
            .query_one(
                "INSERT INTO posts_comment (post_id, author_id, text, created) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&comment.post_id, &comment.author_id, &comment.text, &created],
            )
            .await?;
        let id: i32 = row.try_get("id")?;
        let sql = format!("{COMMENT_SELECT} WHERE c.id = $1");
        let row = client.query_one(sql.as_str(), &[&id]).await?;
        comment_from_row(&row)
    }

    async fn count_comments(&self, query: &CommentQuery) -> Result<i64, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let filter = comment_filter(query, &mut params);
        let sql = format!("SELECT COUNT(*) FROM posts_comment c{filter}");
        let row = client.query_one(sql.as_str(), &params).await?;
        Ok(row.try_get(0)?)
    }

    async fn list_comments(
        &self,
        query: &CommentQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, RepoError> {
        let client = self.pool.get().await?;
        let mut params: Params<'_> = Vec::new();
        let filter = comment_filter(query, &mut params);
        params.push(&limit);
        params.push(&offset);
        let sql = format!(
            "{COMMENT_SELECT}{filter} ORDER BY c.created DESC, c.id DESC LIMIT ${} OFFSET ${}",
            params.len() - 1,
            params.len()
        );
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn delete_comment(&self, id: i32) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM posts_comment WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        if user_id == author_id {
            return Ok(false);
        }
        let client = self.pool.get().await?;
        let created = client
            .execute(
                "INSERT INTO posts_follow (user_id, author_id) VALUES ($1, $2) \
                 ON CONFLICT ON CONSTRAINT unique_follow DO NOTHING",
                &[&user_id, &author_id],
            )
            .await?;
        Ok(created > 0)
    }

    async fn unfollow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM posts_follow WHERE user_id = $1 AND author_id = $2",
                &[&user_id, &author_id],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM posts_follow WHERE user_id = $1 AND author_id = $2)",
                &[&user_id, &author_id],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT \
                 (SELECT COUNT(*) FROM posts_follow WHERE author_id = $1) AS followers, \
                 (SELECT COUNT(*) FROM posts_follow WHERE user_id = $1) AS following",
                &[&user_id],
            )
            .await?;
        Ok(FollowCounts {
            followers: row.try_get("followers")?,
            following: row.try_get("following")?,
        })
    }

    async fn count_follows(&self) -> Result<i64, RepoError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM posts_follow", &[])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn list_follows(&self, offset: i64, limit: i64) -> Result<Vec<Follow>, RepoError> {
        let client = self.pool.get().await?;
        let sql = format!("{FOLLOW_SELECT} ORDER BY f.id DESC LIMIT $1 OFFSET $2");
        let rows = client.query(sql.as_str(), &[&limit, &offset]).await?;
        rows.iter().map(follow_from_row).collect()
    }

    async fn delete_follow(&self, id: i32) -> Result<bool, RepoError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM posts_follow WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }
}
