//! Staff-facing list/search/filter configuration for each model.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Placeholder rendered for blank cells.
pub const EMPTY_VALUE: &str = "-empty-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminModel {
    Posts,
    Groups,
    Comments,
    Follows,
    Users,
}

/// How a model shows up in its changelist.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelAdmin {
    pub model: AdminModel,
    /// URL segment under `/admin/`.
    pub slug: &'static str,
    pub verbose_name_plural: &'static str,
    pub list_display: &'static [&'static str],
    pub list_display_links: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub empty_value_display: &'static str,
    /// Target field and the fields it is filled from.
    pub prepopulated_fields: &'static [(&'static str, &'static [&'static str])],
    pub can_add: bool,
}

pub const REGISTRY: &[ModelAdmin] = &[
    ModelAdmin {
        model: AdminModel::Posts,
        slug: "posts",
        verbose_name_plural: "Posts",
        list_display: &["pk", "text", "pub_date", "author"],
        list_display_links: &["pk", "text", "author"],
        search_fields: &["text"],
        list_filter: &["pub_date"],
        empty_value_display: EMPTY_VALUE,
        prepopulated_fields: &[],
        can_add: false,
    },
    ModelAdmin {
        model: AdminModel::Groups,
        slug: "groups",
        verbose_name_plural: "Groups",
        list_display: &["pk", "title", "slug", "description"],
        list_display_links: &["pk", "title", "slug", "description"],
        search_fields: &["title"],
        list_filter: &["slug"],
        empty_value_display: EMPTY_VALUE,
        prepopulated_fields: &[("slug", &["title"])],
        can_add: true,
    },
    ModelAdmin {
        model: AdminModel::Comments,
        slug: "comments",
        verbose_name_plural: "Comments",
        list_display: &["pk", "post", "author", "text", "created"],
        list_display_links: &["pk", "post", "author", "text"],
        search_fields: &["text"],
        list_filter: &["created"],
        empty_value_display: EMPTY_VALUE,
        prepopulated_fields: &[],
        can_add: false,
    },
    ModelAdmin {
        model: AdminModel::Follows,
        slug: "follows",
        verbose_name_plural: "Follows",
        list_display: &["pk", "user", "author"],
        list_display_links: &["pk"],
        search_fields: &[],
        list_filter: &[],
        empty_value_display: EMPTY_VALUE,
        prepopulated_fields: &[],
        can_add: false,
    },
    ModelAdmin {
        model: AdminModel::Users,
        slug: "users",
        verbose_name_plural: "Users",
        list_display: &["pk", "username", "first_name", "last_name", "email"],
        list_display_links: &["pk", "username"],
        search_fields: &["username"],
        list_filter: &[],
        empty_value_display: EMPTY_VALUE,
        prepopulated_fields: &[],
        can_add: false,
    },
];

pub fn lookup(slug: &str) -> Option<&'static ModelAdmin> {
    REGISTRY.iter().find(|admin| admin.slug == slug)
}

/// One changelist cell.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub value: String,
    /// Link target, set for `list_display_links` columns.
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Row {
    /// Rendered primary key, used in the delete URL.
    pub pk: String,
    pub cells: Vec<Cell>,
}

impl ModelAdmin {
    /// Builds a changelist row from `(column, value, link target)` triples,
    /// in `list_display` order.
    pub fn row(&self, pk: impl fmt::Display, values: &[(&str, String, Option<String>)]) -> Row {
        let pk = pk.to_string();
        let cells = self
            .list_display
            .iter()
            .map(|column| {
                let (value, target) = values
                    .iter()
                    .find(|(name, _, _)| name == column)
                    .map(|(_, value, target)| (value.clone(), target.clone()))
                    .unwrap_or_default();
                let value = if value.trim().is_empty() {
                    self.empty_value_display.to_string()
                } else {
                    value
                };
                let link = self
                    .list_display_links
                    .contains(column)
                    .then(|| target.unwrap_or_else(|| format!("/admin/{}/#{}", self.slug, pk)));
                Cell { value, link }
            })
            .collect();
        Row { pk, cells }
    }
}

/// Date filters offered for `pub_date` and `created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Past7Days,
    ThisMonth,
    ThisYear,
}

impl DateFilter {
    pub const ALL: [DateFilter; 4] = [
        DateFilter::Today,
        DateFilter::Past7Days,
        DateFilter::ThisMonth,
        DateFilter::ThisYear,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.param() == raw)
    }

    pub fn param(self) -> &'static str {
        match self {
            DateFilter::Today => "today",
            DateFilter::Past7Days => "past_7_days",
            DateFilter::ThisMonth => "this_month",
            DateFilter::ThisYear => "this_year",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DateFilter::Today => "Today",
            DateFilter::Past7Days => "Past 7 days",
            DateFilter::ThisMonth => "This month",
            DateFilter::ThisYear => "This year",
        }
    }

    /// Lower bound (inclusive) of the range the filter selects.
    pub fn since(self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        let start = match self {
            DateFilter::Today => today,
            DateFilter::Past7Days => today - Duration::days(7),
            DateFilter::ThisMonth => today.with_day(1).unwrap_or(today),
            DateFilter::ThisYear => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        start.and_time(chrono::NaiveTime::MIN)
    }
}

/// Choice shown in the filter sidebar.
#[derive(Debug, Clone, Serialize)]
pub struct FilterChoice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub fn date_choices(selected: Option<DateFilter>) -> Vec<FilterChoice> {
    DateFilter::ALL
        .into_iter()
        .map(|f| FilterChoice {
            value: f.param().to_string(),
            label: f.label().to_string(),
            selected: selected == Some(f),
        })
        .collect()
}
