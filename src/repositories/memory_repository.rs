// src/repositories/memory_repository.rs
use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::comment::{Comment, CommentQuery, NewComment};
use crate::models::follow::{Follow, FollowCounts};
use crate::models::group::{Group, GroupQuery, GroupRef, NewGroup};
use crate::models::post::{NewPost, Post, PostChanges, PostQuery};
use crate::models::user::{NewUser, User, UserQuery};
use crate::repositories::{RepoError, Repository};

struct PostRow {
    id: i32,
    text: String,
    pub_date: NaiveDateTime,
    author_id: Uuid,
    group_id: Option<i32>,
    image: Option<String>,
}

struct CommentRow {
    id: i32,
    post_id: i32,
    author_id: Uuid,
    text: String,
    created: NaiveDateTime,
}

struct FollowRow {
    id: i32,
    user_id: Uuid,
    author_id: Uuid,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    posts: Vec<PostRow>,
    comments: Vec<CommentRow>,
    follows: Vec<FollowRow>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: Uuid) -> Result<&User, RepoError> {
        self.users.iter().find(|u| u.id == id).ok_or(RepoError::NotFound)
    }

    fn hydrate_post(&self, row: &PostRow) -> Result<Post, RepoError> {
        let group = match row.group_id {
            Some(id) => {
                let group = self.groups.iter().find(|g| g.id == id).ok_or(RepoError::NotFound)?;
                Some(GroupRef { id: group.id, title: group.title.clone(), slug: group.slug.clone() })
            }
            None => None,
        };

        Ok(Post {
            id: row.id,
            text: row.text.clone(),
            pub_date: row.pub_date,
            author: self.user(row.author_id)?.as_author(),
            group,
            image: row.image.clone(),
        })
    }

    fn hydrate_comment(&self, row: &CommentRow) -> Result<Comment, RepoError> {
        Ok(Comment {
            id: row.id,
            post_id: row.post_id,
            author: self.user(row.author_id)?.as_author(),
            text: row.text.clone(),
            created: row.created,
        })
    }

    fn filtered_posts(&self, query: &PostQuery) -> Result<Vec<Post>, RepoError> {
        let follows: Vec<Uuid> = match query.followed_by {
            Some(user_id) => self
                .follows
                .iter()
                .filter(|f| f.user_id == user_id)
                .map(|f| f.author_id)
                .collect(),
            None => Vec::new(),
        };

        let mut posts = Vec::new();
        for row in &self.posts {
            let post = self.hydrate_post(row)?;
            if query.matches(&post, &follows) {
                posts.push(post);
            }
        }
        posts.sort_by_key(|p| Reverse((p.pub_date, p.id)));
        Ok(posts)
    }

    fn filtered_comments(&self, query: &CommentQuery) -> Result<Vec<Comment>, RepoError> {
        let mut comments = Vec::new();
        for row in &self.comments {
            let comment = self.hydrate_comment(row)?;
            if query.matches(&comment) {
                comments.push(comment);
            }
        }
        comments.sort_by_key(|c| Reverse((c.created, c.id)));
        Ok(comments)
    }

    fn remove_post_rows(&mut self, keep: impl Fn(&PostRow) -> bool) {
        let removed: Vec<i32> = self.posts.iter().filter(|p| !keep(p)).map(|p| p.id).collect();
        self.posts.retain(|p| keep(p));
        self.comments.retain(|c| !removed.contains(&c.post_id));
    }
}

fn window<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

/// Process-local storage with the same semantics as the PostgreSQL schema:
/// unique usernames, slugs and follow pairs, cascading deletes, and
/// set-null on group removal. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict("auth_user_username_key".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            date_joined: Utc::now().naive_utc(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn count_users(&self, query: &UserQuery) -> Result<i64, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| query.matches(u)).count() as i64)
    }

    async fn list_users(
        &self,
        query: &UserQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<User>, RepoError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.iter().filter(|u| query.matches(u)).cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(window(users, offset, limit))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        tables.remove_post_rows(|p| p.author_id != id);
        tables.comments.retain(|c| c.author_id != id);
        tables.follows.retain(|f| f.user_id != id && f.author_id != id);
        Ok(true)
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group, RepoError> {
        let mut tables = self.tables.write().await;
        if tables.groups.iter().any(|g| g.slug == group.slug) {
            return Err(RepoError::Conflict("posts_group_slug_key".to_string()));
        }
        let group = Group {
            id: tables.next_id(),
            title: group.title,
            slug: group.slug,
            description: group.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn group_by_slug(&self, slug: &str) -> Result<Option<Group>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn list_groups(&self, query: &GroupQuery) -> Result<Vec<Group>, RepoError> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> =
            tables.groups.iter().filter(|g| query.matches(g)).cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&self, id: i32) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.groups.len();
        tables.groups.retain(|g| g.id != id);
        if tables.groups.len() == before {
            return Ok(false);
        }
        for post in tables.posts.iter_mut().filter(|p| p.group_id == Some(id)) {
            post.group_id = None;
        }
        Ok(true)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        let mut tables = self.tables.write().await;
        tables.user(post.author_id)?;
        if let Some(group_id) = post.group_id {
            if !tables.groups.iter().any(|g| g.id == group_id) {
                return Err(RepoError::NotFound);
            }
        }
        let row = PostRow {
            id: tables.next_id(),
            text: post.text,
            pub_date: Utc::now().naive_utc(),
            author_id: post.author_id,
            group_id: post.group_id,
            image: post.image,
        };
        let post = tables.hydrate_post(&row)?;
        tables.posts.push(row);
        Ok(post)
    }

    async fn update_post(&self, id: i32, changes: PostChanges) -> Result<Post, RepoError> {
        let mut tables = self.tables.write().await;
        if let Some(group_id) = changes.group_id {
            if !tables.groups.iter().any(|g| g.id == group_id) {
                return Err(RepoError::NotFound);
            }
        }
        let row = tables.posts.iter_mut().find(|p| p.id == id).ok_or(RepoError::NotFound)?;
        row.text = changes.text;
        row.group_id = changes.group_id;
        row.image = changes.image;

        let tables = tables.downgrade();
        let row = tables.posts.iter().find(|p| p.id == id).ok_or(RepoError::NotFound)?;
        tables.hydrate_post(row)
    }

    async fn post_by_id(&self, id: i32) -> Result<Option<Post>, RepoError> {
        let tables = self.tables.read().await;
        tables
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|row| tables.hydrate_post(row))
            .transpose()
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<i64, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.filtered_posts(query)?.len() as i64)
    }

    async fn list_posts(
        &self,
        query: &PostQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>, RepoError> {
        let tables = self.tables.read().await;
        Ok(window(tables.filtered_posts(query)?, offset, limit))
    }

    async fn delete_post(&self, id: i32) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.posts.len();
        tables.remove_post_rows(|p| p.id != id);
        Ok(tables.posts.len() != before)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let mut tables = self.tables.write().await;
        tables.user(comment.author_id)?;
        if !tables.posts.iter().any(|p| p.id == comment.post_id) {
            return Err(RepoError::NotFound);
        }
        let row = CommentRow {
            id: tables.next_id(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            text: comment.text,
            created: Utc::now().naive_utc(),
        };
        let comment = tables.hydrate_comment(&row)?;
        tables.comments.push(row);
        Ok(comment)
    }

    async fn count_comments(&self, query: &CommentQuery) -> Result<i64, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.filtered_comments(query)?.len() as i64)
    }

    async fn list_comments(
        &self,
        query: &CommentQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, RepoError> {
        let tables = self.tables.read().await;
        Ok(window(tables.filtered_comments(query)?, offset, limit))
    }

    async fn delete_comment(&self, id: i32) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        Ok(tables.comments.len() != before)
    }

    async fn follow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        if user_id == author_id {
            return Ok(false);
        }
        let mut tables = self.tables.write().await;
        tables.user(user_id)?;
        tables.user(author_id)?;
        if tables.follows.iter().any(|f| f.user_id == user_id && f.author_id == author_id) {
            return Ok(false);
        }
        let id = tables.next_id();
        tables.follows.push(FollowRow { id, user_id, author_id });
        Ok(true)
    }

    async fn unfollow(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.follows.len();
        tables.follows.retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() != before)
    }

    async fn is_following(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.follows.iter().any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, RepoError> {
        let tables = self.tables.read().await;
        Ok(FollowCounts {
            followers: tables.follows.iter().filter(|f| f.author_id == user_id).count() as i64,
            following: tables.follows.iter().filter(|f| f.user_id == user_id).count() as i64,
        })
    }

    async fn count_follows(&self) -> Result<i64, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.follows.len() as i64)
    }

    async fn list_follows(&self, offset: i64, limit: i64) -> Result<Vec<Follow>, RepoError> {
        let tables = self.tables.read().await;
        let mut follows = Vec::with_capacity(tables.follows.len());
        for row in tables.follows.iter().rev() {
            follows.push(Follow {
                id: row.id,
                user: tables.user(row.user_id)?.as_author(),
                author: tables.user(row.author_id)?.as_author(),
            });
        }
        Ok(window(follows, offset, limit))
    }

    async fn delete_follow(&self, id: i32) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().await;
        let before = tables.follows.len();
        tables.follows.retain(|f| f.id != id);
        Ok(tables.follows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(repo: &MemoryRepository, username: &str) -> User {
        repo.create_user(NewUser {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap()
    }

    async fn group(repo: &MemoryRepository, slug: &str) -> Group {
        repo.create_group(NewGroup {
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            description: "about".to_string(),
        })
        .await
        .unwrap()
    }

    async fn post(repo: &MemoryRepository, author: &User, group_id: Option<i32>, text: &str) -> Post {
        repo.create_post(NewPost {
            text: text.to_string(),
            author_id: author.id,
            group_id,
            image: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn usernames_and_slugs_are_unique() {
        let repo = MemoryRepository::new();
        user(&repo, "leo").await;
        group(&repo, "books").await;

        let dup_user = repo
            .create_user(NewUser {
                username: "leo".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
                password_hash: "hash".to_string(),
            })
            .await;
        assert!(matches!(dup_user, Err(RepoError::Conflict(_))));

        let dup_group = repo
            .create_group(NewGroup {
                title: "Other".to_string(),
                slug: "books".to_string(),
                description: String::new(),
            })
            .await;
        assert!(matches!(dup_group, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn listings_are_newest_first_and_windowed() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        for i in 0..5 {
            post(&repo, &leo, None, &format!("post {i}")).await;
        }

        let all = repo.list_posts(&PostQuery::default(), 0, 10).await.unwrap();
        let texts: Vec<_> = all.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["post 4", "post 3", "post 2", "post 1", "post 0"]);

        let second = repo.list_posts(&PostQuery::default(), 2, 2).await.unwrap();
        let texts: Vec<_> = second.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["post 2", "post 1"]);
    }

    #[tokio::test]
    async fn follow_edges_are_unique_and_never_self() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        let anna = user(&repo, "anna").await;

        assert!(repo.follow(leo.id, anna.id).await.unwrap());
        assert!(!repo.follow(leo.id, anna.id).await.unwrap());
        assert!(!repo.follow(leo.id, leo.id).await.unwrap());
        assert_eq!(repo.count_follows().await.unwrap(), 1);

        let counts = repo.follow_counts(anna.id).await.unwrap();
        assert_eq!((counts.followers, counts.following), (1, 0));

        assert!(repo.unfollow(leo.id, anna.id).await.unwrap());
        assert!(!repo.unfollow(leo.id, anna.id).await.unwrap());
        assert!(!repo.is_following(leo.id, anna.id).await.unwrap());
    }

    #[tokio::test]
    async fn followed_by_lists_only_followed_authors() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        let anna = user(&repo, "anna").await;
        let ivan = user(&repo, "ivan").await;
        post(&repo, &anna, None, "from anna").await;
        post(&repo, &ivan, None, "from ivan").await;
        repo.follow(leo.id, anna.id).await.unwrap();

        let feed = repo.list_posts(&PostQuery::followed_by(leo.id), 0, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].author.username, "anna");
    }

    #[tokio::test]
    async fn deleting_a_group_keeps_its_posts() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        let books = group(&repo, "books").await;
        let p = post(&repo, &leo, Some(books.id), "in a group").await;

        assert!(repo.delete_group(books.id).await.unwrap());

        let p = repo.post_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(p.group, None);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        let anna = user(&repo, "anna").await;
        let leos_post = post(&repo, &leo, None, "by leo").await;
        let annas_post = post(&repo, &anna, None, "by anna").await;
        for (post_id, author_id) in [(leos_post.id, anna.id), (annas_post.id, leo.id)] {
            repo.create_comment(NewComment { post_id, author_id, text: "hi".to_string() })
                .await
                .unwrap();
        }
        repo.follow(anna.id, leo.id).await.unwrap();

        assert!(repo.delete_user(leo.id).await.unwrap());

        assert_eq!(repo.count_posts(&PostQuery::default()).await.unwrap(), 1);
        assert_eq!(repo.count_comments(&CommentQuery::default()).await.unwrap(), 0);
        assert_eq!(repo.count_follows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_comments() {
        let repo = MemoryRepository::new();
        let leo = user(&repo, "leo").await;
        let p = post(&repo, &leo, None, "text").await;
        repo.create_comment(NewComment { post_id: p.id, author_id: leo.id, text: "c".to_string() })
            .await
            .unwrap();

        assert!(repo.delete_post(p.id).await.unwrap());
        assert_eq!(repo.count_comments(&CommentQuery::on_post(p.id)).await.unwrap(), 0);
    }
}
