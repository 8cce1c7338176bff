// src/handlers/media_handlers.rs
use actix_web::{get, web, HttpResponse};

use crate::handlers::AppError;
use crate::services::media_service::{content_type_for, POSTS_DIR};
use crate::AppState;

/// GET /media/posts/{filename}
/// Serves an uploaded post image.
#[get("/media/posts/{filename}")]
pub async fn serve_media(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let filename = path.into_inner();
    let file_path = state
        .media
        .resolve(&format!("{POSTS_DIR}/{filename}"))
        .ok_or(AppError::NotFound)?;

    match tokio::fs::read(&file_path).await {
        Ok(data) => Ok(HttpResponse::Ok()
            .content_type(content_type_for(&filename))
            .body(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound),
        Err(e) => Err(e.into()),
    }
}
