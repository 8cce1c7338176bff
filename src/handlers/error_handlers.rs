// src/handlers/error_handlers.rs
use actix_web::body::EitherBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::middleware::{ErrorHandlerResponse, ErrorHandlers};
use actix_web::{web, HttpRequest, HttpResponse, Result};

use crate::handlers::base_context;
use crate::middleware::auth_extractor::{authenticate, AuthenticatedUser};
use crate::AppState;

/// Renders the site's own 404 and 500 pages in place of whatever body the
/// failing handler produced.
pub fn error_handlers<B: 'static>() -> ErrorHandlers<B> {
    ErrorHandlers::new()
        .handler(StatusCode::NOT_FOUND, |res| page(res, "misc/404.html"))
        .handler(StatusCode::INTERNAL_SERVER_ERROR, |res| page(res, "misc/500.html"))
}

/// Unmatched routes.
pub async fn fallback() -> HttpResponse {
    HttpResponse::NotFound().finish()
}

fn page<B: 'static>(res: ServiceResponse<B>, template: &'static str) -> Result<ErrorHandlerResponse<B>> {
    Ok(ErrorHandlerResponse::Future(Box::pin(replace_body(res, template))))
}

async fn replace_body<B>(
    res: ServiceResponse<B>,
    template: &'static str,
) -> Result<ServiceResponse<EitherBody<B>>> {
    let req = res.request().clone();
    let viewer = authenticate(&req).await;
    let response = error_page(&req, res.status(), viewer.as_ref(), template);
    Ok(ServiceResponse::new(
        res.into_parts().0,
        response.map_into_right_body(),
    ))
}

fn error_page(
    req: &HttpRequest,
    status: StatusCode,
    viewer: Option<&AuthenticatedUser>,
    template: &str,
) -> HttpResponse {
    let fallback = || {
        HttpResponse::build(status)
            .content_type(ContentType::plaintext())
            .body(status.canonical_reason().unwrap_or("error"))
    };

    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        return fallback();
    };

    let mut ctx = base_context(state, viewer);
    ctx.insert("path", req.path());

    match state.templates.render(template, &ctx) {
        Ok(body) => HttpResponse::build(status)
            .content_type(ContentType::html())
            .body(body),
        Err(e) => {
            log::error!("failed to render {}: {:?}", template, e);
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::test;

    use crate::services::media_service::POSTS_DIR;
    use crate::test_support::TestContext;

    #[actix_web::test]
    async fn unknown_route_renders_the_404_page() {
        let ctx = TestContext::new().await;
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/Yarik/not-a-post/").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("Page not found"));
    }

    #[actix_web::test]
    async fn failing_handler_renders_the_500_page() {
        let ctx = TestContext::new().await;
        let viewer = ctx.user("Ya").await;
        let cookie = ctx.session_cookie(&viewer);
        // a directory where an image is expected makes the read fail
        std::fs::create_dir_all(ctx.state.media.root().join(POSTS_DIR).join("broken.gif")).unwrap();
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/media/posts/broken.gif").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("Server error"));
        assert!(body.contains("Signed in as"));
    }
}
