pub mod about_handlers;
pub mod admin_handlers;
pub mod auth_handlers;
pub mod error_handlers;
pub mod media_handlers;
pub mod post_handlers;
pub mod profile_handlers;

use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use tera::Context;
use thiserror::Error;

use crate::middleware::auth_extractor::{session_removal_cookie, AuthenticatedUser};
use crate::repositories::RepoError;
use crate::services::auth_services::AuthError;
use crate::AppState;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    /// `clear_session` is set when the request carried a session cookie
    /// that no longer resolves to a user.
    #[error("login required for {next}")]
    LoginRequired { next: String, clear_session: bool },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("template error: {0:?}")]
    Template(#[from] tera::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Repo(RepoError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::LoginRequired { .. } => StatusCode::FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::LoginRequired { next, clear_session } = self {
            let mut response = redirect(&login_url(next));
            if *clear_session {
                if let Err(e) = response.add_cookie(&session_removal_cookie()) {
                    log::error!("failed to clear session cookie: {}", e);
                }
            }
            return response;
        }

        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(status)
            .content_type(ContentType::plaintext())
            .body(status.canonical_reason().unwrap_or("error"))
    }
}

pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next))
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn post_url(username: &str, post_id: i32) -> String {
    format!("/{}/{}/", urlencoding::encode(username), post_id)
}

pub fn profile_url(username: &str) -> String {
    format!("/{}/", urlencoding::encode(username))
}

/// Context every page starts from: the visitor and whether they are staff.
pub fn base_context(state: &AppState, viewer: Option<&AuthenticatedUser>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("user", &viewer);
    ctx.insert(
        "is_staff",
        &viewer.is_some_and(|u| state.settings.is_staff(&u.username)),
    );
    ctx
}

pub fn render(state: &AppState, template: &str, ctx: &Context) -> Result<HttpResponse, AppError> {
    render_with_status(state, StatusCode::OK, template, ctx)
}

pub fn render_with_status(
    state: &AppState,
    status: StatusCode,
    template: &str,
    ctx: &Context,
) -> Result<HttpResponse, AppError> {
    let body = state.templates.render(template, ctx)?;
    Ok(HttpResponse::build(status)
        .content_type(ContentType::html())
        .body(body))
}

/// Route table. Fixed paths come first so that `/{username}/...` only sees
/// what is left.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(post_handlers::index)
        .service(post_handlers::new_post_form)
        .service(post_handlers::new_post)
        .service(profile_handlers::follow_index)
        .service(post_handlers::group_posts)
        .service(about_handlers::about_author)
        .service(about_handlers::about_tech)
        .service(auth_handlers::signup_form)
        .service(auth_handlers::signup)
        .service(auth_handlers::login_form)
        .service(auth_handlers::login)
        .service(auth_handlers::logout)
        .service(media_handlers::serve_media)
        .service(admin_handlers::admin_index)
        .service(admin_handlers::group_add_form)
        .service(admin_handlers::group_add)
        .service(admin_handlers::changelist)
        .service(admin_handlers::delete_object)
        .service(profile_handlers::profile)
        .service(profile_handlers::profile_follow)
        .service(profile_handlers::profile_unfollow)
        .service(post_handlers::post_view)
        .service(post_handlers::post_comment)
        .service(post_handlers::add_comment)
        .service(post_handlers::post_edit_form)
        .service(post_handlers::post_edit)
        .default_service(web::to(error_handlers::fallback));
}
