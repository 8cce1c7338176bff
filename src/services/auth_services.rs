// src/services/auth_services.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::dtos::auth_dtos::SignupForm;
use crate::models::user::{JwtClaims, NewUser, User};
use crate::repositories::{RepoError, Repository};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("invalid token")]
    InvalidToken,
    #[error("session user {0} no longer exists")]
    UnknownUser(Uuid),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("a user with that username already exists")]
    UsernameTaken,
}

/// Identity carried by a valid session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
}

/// Registration, login and session tokens.
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn Repository>,
    jwt_secret: String,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(repo: Arc<dyn Repository>, jwt_secret: String, session_ttl: Duration) -> Self {
        Self { repo, jwt_secret, session_ttl }
    }

    /// Creates the account described by an already validated form.
    pub async fn signup(&self, form: &SignupForm) -> Result<User, AuthError> {
        let password_hash =
            User::hash_password(&form.password1).map_err(|e| AuthError::Hash(e.to_string()))?;

        let new_user = NewUser {
            username: form.username.trim().to_string(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_lowercase(),
            password_hash,
        };

        match self.repo.create_user(new_user).await {
            Ok(user) => {
                log::info!("registered user {}", user.username);
                Ok(user)
            }
            Err(RepoError::Conflict(_)) => Err(AuthError::UsernameTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks the credentials and returns the user with a fresh session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<(User, String), AuthError> {
        let user = self
            .repo
            .user_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.verify_password(password) {
            log::debug!("password mismatch for {}", user.username);
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now.timestamp() as usize,
            exp: (now + self.session_ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Session, AuthError> {
        let data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Session { user_id })
    }

    /// Verifies the token and loads the user it was issued to.
    pub async fn session_user(&self, token: &str) -> Result<User, AuthError> {
        let session = self.verify_token(token)?;
        self.repo
            .user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::UnknownUser(session.user_id))
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}
