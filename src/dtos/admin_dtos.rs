use serde::{Deserialize, Serialize};

use crate::dtos::post_dtos::FormErrors;
use crate::models::group::NewGroup;

/// Changelist query string: search, page and the per-model filters.
#[derive(Debug, Default, Deserialize)]
pub struct ChangelistQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    pub pub_date: Option<String>,
    pub created: Option<String>,
    pub slug: Option<String>,
}

impl ChangelistQuery {
    /// The search term, if there is a non-blank one.
    pub fn search(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }

    /// The non-blank parameters that select rows. `page` is not one of them.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        [
            ("q", &self.q),
            ("pub_date", &self.pub_date),
            ("created", &self.created),
            ("slug", &self.slug),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }

    /// Encoded query string for the current selection, without `except`.
    pub fn query_string(&self, except: Option<&str>) -> String {
        self.params()
            .into_iter()
            .filter(|(name, _)| Some(*name) != except)
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupForm {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl GroupForm {
    pub fn validate(&self) -> Result<NewGroup, FormErrors> {
        let mut group = NewGroup {
            title: self.title.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
        };

        group.validate().map_err(|problems| {
            let mut errors = FormErrors::default();
            for (field, message) in problems {
                errors.add(field, message);
            }
            errors
        })?;
        Ok(group)
    }
}
