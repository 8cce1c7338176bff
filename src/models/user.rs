use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Path segments that are routed before `/{username}/`, so no account may
/// take them as a username.
const RESERVED_USERNAMES: &[&str] = &[
    "about", "admin", "auth", "follow", "group", "media", "new", "static",
];

/// Row of the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: NaiveDateTime,
}

/// Data needed to insert a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

/// The slice of a user embedded in posts, comments and follow rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Admin search over users.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub username_contains: Option<String>,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        self.username_contains
            .as_ref()
            .is_none_or(|needle| user.username.to_lowercase().contains(&needle.to_lowercase()))
    }
}

/// Session token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// subject / user id
    pub sub: String,
    pub username: String,
    pub exp: usize,
    pub iat: usize,
}

impl User {
    /// Uses argon2 to verify the password hash against the provided password.
    pub fn verify_password(&self, password: &str) -> bool {
        let hash = match PasswordHash::new(&self.password_hash) {
            Ok(hash) => hash,
            Err(err) => {
                log::error!("failed to parse password hash for {}: {}", self.username, err);
                return false;
            }
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn as_author(&self) -> Author {
        Author {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    /// Generates a new password hash using argon2.
    pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;

        Ok(hash.to_string())
    }

    /// Validates a username: 1-150 characters of letters, digits and `@.+-_`.
    pub fn validate_username(username: &str) -> Result<(), &'static str> {
        if username.is_empty() {
            return Err("This field is required.");
        }

        if username.chars().count() > 150 {
            return Err("Ensure this value has at most 150 characters.");
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
        {
            return Err(
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
            return Err("This username is reserved.");
        }

        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<(), &'static str> {
        if password.chars().count() < 8 {
            return Err("This password is too short. It must contain at least 8 characters.");
        }

        if password.chars().all(|c| c.is_ascii_digit()) {
            return Err("This password is entirely numeric.");
        }

        Ok(())
    }
}
