use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dtos::post_dtos::{FormErrors, REQUIRED};
use crate::models::user::User;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").unwrap());

fn looks_like_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password1: String,
    #[serde(skip_serializing)]
    pub password2: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub next: String,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl SignupForm {
    /// Field checks that need no storage; username uniqueness is decided
    /// when the row is inserted.
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();

        if let Err(msg) = User::validate_username(self.username.trim()) {
            errors.add("username", msg);
        }

        let email = self.email.trim();
        if !email.is_empty() && !looks_like_email(email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        } else if let Err(msg) = User::validate_password(&self.password1) {
            errors.add("password1", msg);
        }

        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        } else if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        if self.username.trim().is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Keeps post-login redirects on this site: only absolute paths that are
/// not protocol-relative are accepted.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> SignupForm {
        SignupForm {
            first_name: "Leo".to_string(),
            last_name: "Tolstoy".to_string(),
            username: "leo".to_string(),
            email: "leo@example.com".to_string(),
            password1: "war-and-peace".to_string(),
            password2: "war-and-peace".to_string(),
        }
    }

    #[test]
    fn valid_signup() {
        assert!(signup().validate().is_ok());
        assert!(SignupForm { email: String::new(), ..signup() }.validate().is_ok());
    }

    #[test]
    fn signup_errors_are_per_field() {
        let form = SignupForm {
            username: "bad name".to_string(),
            email: "not-an-email".to_string(),
            password2: "different".to_string(),
            ..signup()
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.get("username").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("password2").is_some());
        assert!(errors.get("password1").is_none());
    }

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/new/")), "/new/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
