// src/handlers/about_handlers.rs
use actix_web::{get, web, HttpResponse};

use crate::handlers::{base_context, render, AppError};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::AppState;

#[get("/about/author/")]
pub async fn about_author(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
) -> Result<HttpResponse, AppError> {
    render(&state, "about/author.html", &base_context(&state, viewer.as_ref()))
}

#[get("/about/tech/")]
pub async fn about_tech(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
) -> Result<HttpResponse, AppError> {
    render(&state, "about/tech.html", &base_context(&state, viewer.as_ref()))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;

    use crate::test_support::TestContext;

    #[actix_web::test]
    async fn about_pages_render() {
        let ctx = TestContext::new().await;
        let app = crate::test_app!(ctx);

        for uri in ["/about/author/", "/about/tech/"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        }
    }
}
