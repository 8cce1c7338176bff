use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::models::group::GroupRef;
use crate::models::user::Author;

/// How many characters of the text a post shows as its label.
const LABEL_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i32,
    pub text: String,
    pub pub_date: NaiveDateTime,
    pub author: Author,
    pub group: Option<GroupRef>,
    /// Path relative to the media root, e.g. `posts/<uuid>.gif`.
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub text: String,
    pub author_id: Uuid,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// Fields a post edit may change. The author and publication date are fixed.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub text: String,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// Composable post filter. Every criterion that is set must hold.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub group_id: Option<i32>,
    pub author_id: Option<Uuid>,
    /// Only posts by authors this user follows.
    pub followed_by: Option<Uuid>,
    /// Case-insensitive substring of the text.
    pub text_contains: Option<String>,
    pub published_since: Option<NaiveDateTime>,
}

impl PostQuery {
    pub fn in_group(group_id: i32) -> Self {
        Self { group_id: Some(group_id), ..Self::default() }
    }

    pub fn by_author(author_id: Uuid) -> Self {
        Self { author_id: Some(author_id), ..Self::default() }
    }

    pub fn followed_by(user_id: Uuid) -> Self {
        Self { followed_by: Some(user_id), ..Self::default() }
    }

    /// In-process evaluation of the filter. `follows` lists the author ids
    /// followed by `followed_by`, when that criterion is set.
    pub fn matches(&self, post: &Post, follows: &[Uuid]) -> bool {
        if let Some(group_id) = self.group_id {
            if post.group.as_ref().map(|g| g.id) != Some(group_id) {
                return false;
            }
        }
        if let Some(author_id) = self.author_id {
            if post.author.id != author_id {
                return false;
            }
        }
        if self.followed_by.is_some() && !follows.contains(&post.author.id) {
            return false;
        }
        if let Some(needle) = &self.text_contains {
            if !post.text.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(since) = self.published_since {
            if post.pub_date < since {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label: String = self.text.chars().take(LABEL_LEN).collect();
        f.write_str(&label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str, author: &Author, group: Option<GroupRef>) -> Post {
        Post {
            id: 1,
            text: text.to_string(),
            pub_date: chrono::Utc::now().naive_utc(),
            author: author.clone(),
            group,
            image: None,
        }
    }

    fn author(username: &str) -> Author {
        Author {
            id: Uuid::new_v4(),
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn label_is_first_fifteen_characters() {
        let leo = author("leo");
        assert_eq!(post("Привет, это длинный пост", &leo, None).to_string(), "Привет, это дли");
        assert_eq!(post("crush", &leo, None).to_string(), "crush");
    }

    #[test]
    fn criteria_are_combined() {
        let leo = author("leo");
        let group = GroupRef { id: 7, title: "Books".to_string(), slug: "books".to_string() };
        let p = post("War and Peace", &leo, Some(group));

        let query = PostQuery {
            group_id: Some(7),
            author_id: Some(leo.id),
            text_contains: Some("peace".to_string()),
            ..PostQuery::default()
        };
        assert!(query.matches(&p, &[]));

        let wrong_group = PostQuery { group_id: Some(8), ..query.clone() };
        assert!(!wrong_group.matches(&p, &[]));

        let wrong_text = PostQuery { text_contains: Some("anna".to_string()), ..query };
        assert!(!wrong_text.matches(&p, &[]));
    }

    #[test]
    fn followed_by_uses_follow_list() {
        let leo = author("leo");
        let p = post("text", &leo, None);
        let query = PostQuery::followed_by(Uuid::new_v4());
        assert!(!query.matches(&p, &[]));
        assert!(query.matches(&p, &[leo.id]));
    }
}
