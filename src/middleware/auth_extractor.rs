// src/middleware/auth_extractor.rs
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::handlers::AppError;
use crate::services::auth_services::AuthService;

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE: &str = "access_token";

/// The logged-in visitor. Extracting it from an anonymous request redirects
/// to the login page; use `Option<AuthenticatedUser>` where anonymous
/// visitors are allowed.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<AuthenticatedUser, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            match authenticate(&req).await {
                Some(user) => Ok(user),
                None => Err(AppError::LoginRequired {
                    next: requested_path(&req),
                    clear_session: req.cookie(SESSION_COOKIE).is_some(),
                }
                .into()),
            }
        })
    }
}

/// Resolves the session token to a user that still exists. Tokens that fail
/// to verify, or whose user is gone, count as anonymous.
pub async fn authenticate(req: &HttpRequest) -> Option<AuthenticatedUser> {
    let svc = req.app_data::<web::Data<AuthService>>()?;
    let token = bearer_token(req).or_else(|| {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
    })?;

    match svc.session_user(&token).await {
        Ok(user) => Some(AuthenticatedUser {
            user_id: user.id,
            username: user.username,
        }),
        Err(e) => {
            log::debug!("rejected session token: {}", e);
            None
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Path plus query string of the current request.
pub fn requested_path(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

/// Expired copy of the session cookie, telling the browser to drop it.
pub fn session_removal_cookie() -> Cookie<'static> {
    let mut removal = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    removal.make_removal();
    removal
}
