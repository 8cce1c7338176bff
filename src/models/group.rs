use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_LEN: usize = 200;
pub const SLUG_MAX_LEN: usize = 50;

static SLUG_STRIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-\s]+").unwrap());
static SLUG_VALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap());

/// A community posts can be filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// What a post carries about its group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: i32,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default)]
pub struct GroupQuery {
    pub title_contains: Option<String>,
    pub slug: Option<String>,
}

impl GroupQuery {
    pub fn matches(&self, group: &Group) -> bool {
        self.title_contains
            .as_ref()
            .is_none_or(|needle| group.title.to_lowercase().contains(&needle.to_lowercase()))
            && self.slug.as_ref().is_none_or(|slug| &group.slug == slug)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

impl NewGroup {
    /// Checks the fields and fills a blank slug from the title.
    pub fn validate(&mut self) -> Result<(), Vec<(&'static str, String)>> {
        let mut errors = Vec::new();

        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            errors.push(("title", "This field is required.".to_string()));
        } else if self.title.chars().count() > TITLE_MAX_LEN {
            errors.push((
                "title",
                format!("Ensure this value has at most {TITLE_MAX_LEN} characters."),
            ));
        }

        self.slug = self.slug.trim().to_string();
        if self.slug.is_empty() {
            self.slug = slugify(&self.title);
        }
        if self.slug.is_empty() {
            errors.push(("slug", "This field is required.".to_string()));
        } else if !SLUG_VALID.is_match(&self.slug) {
            errors.push((
                "slug",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens."
                    .to_string(),
            ));
        } else if self.slug.len() > SLUG_MAX_LEN {
            errors.push((
                "slug",
                format!("Ensure this value has at most {SLUG_MAX_LEN} characters."),
            ));
        }

        if self.description.trim().is_empty() {
            errors.push(("description", "This field is required.".to_string()));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// ASCII slug: lowercase, punctuation dropped, whitespace runs become `-`.
pub fn slugify(value: &str) -> String {
    let ascii: String = value.chars().filter(char::is_ascii).collect();
    let stripped = SLUG_STRIP.replace_all(&ascii.to_lowercase(), "").into_owned();
    let dashed = SLUG_DASHES.replace_all(stripped.trim(), "-").into_owned();
    let slug = dashed.trim_matches(|c| c == '-' || c == '_');
    slug.chars().take(SLUG_MAX_LEN).collect::<String>().trim_end_matches('-').to_string()
}
