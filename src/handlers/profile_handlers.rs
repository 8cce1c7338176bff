// src/handlers/profile_handlers.rs
use actix_web::{get, route, web, HttpResponse};

use crate::dtos::post_dtos::PageQuery;
use crate::handlers::post_handlers::paginate_posts;
use crate::handlers::{base_context, redirect, render, AppError};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::models::post::PostQuery;
use crate::models::user::User;
use crate::AppState;

async fn user_or_404(state: &AppState, username: &str) -> Result<User, AppError> {
    state
        .repo
        .user_by_username(username)
        .await?
        .ok_or(AppError::NotFound)
}

/// Posts by the authors the current user follows.
#[get("/follow/")]
pub async fn follow_index(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = paginate_posts(&state, &PostQuery::followed_by(user.user_id), query.page.as_deref()).await?;

    let mut ctx = base_context(&state, Some(&user));
    ctx.insert("page", &page);
    render(&state, "follow.html", &ctx)
}

#[get("/{username}/")]
pub async fn profile(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let author = user_or_404(&state, &path.into_inner()).await?;
    let page = paginate_posts(&state, &PostQuery::by_author(author.id), query.page.as_deref()).await?;
    let counts = state.repo.follow_counts(author.id).await?;
    let following = match &viewer {
        Some(v) => state.repo.is_following(v.user_id, author.id).await?,
        None => false,
    };

    let mut ctx = base_context(&state, viewer.as_ref());
    ctx.insert("author", &author.as_author());
    ctx.insert("full_name", &author.full_name());
    ctx.insert("page", &page);
    ctx.insert("posts_count", &page.count);
    ctx.insert("follow_counts", &counts);
    ctx.insert("following", &following);
    ctx.insert("is_self", &viewer.as_ref().is_some_and(|v| v.user_id == author.id));
    render(&state, "profile.html", &ctx)
}

#[route("/{username}/follow/", method = "GET", method = "POST")]
pub async fn profile_follow(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let author = user_or_404(&state, &path.into_inner()).await?;

    if state.repo.follow(user.user_id, author.id).await? {
        log::info!("{} now follows {}", user.username, author.username);
    } else {
        log::debug!("{} -> {} follow left unchanged", user.username, author.username);
    }
    Ok(redirect("/"))
}

#[route("/{username}/unfollow/", method = "GET", method = "POST")]
pub async fn profile_unfollow(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let author = user_or_404(&state, &path.into_inner()).await?;

    if state.repo.unfollow(user.user_id, author.id).await? {
        log::info!("{} unfollowed {}", user.username, author.username);
    }
    Ok(redirect("/"))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::test;

    use crate::test_support::TestContext;

    #[actix_web::test]
    async fn profile_shows_counts_and_posts() {
        let ctx = TestContext::new().await;
        let author = ctx.user("YaBobyor").await;
        let reader = ctx.user("Yarik").await;
        ctx.post(&author, None, "first words").await;
        ctx.repo.follow(reader.id, author.id).await.unwrap();
        let app = crate::test_app!(ctx);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/YaBobyor/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("first words"));
        assert!(body.contains("<h1>YaBobyor</h1>"));
        assert!(body.contains("Posts: 1"));
        assert!(body.contains("Followers: 1"));

        let missing = test::call_service(&app, test::TestRequest::get().uri("/nobody/").to_request()).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn user_can_follow_and_unfollow() {
        let ctx = TestContext::new().await;
        let author = ctx.user("YaBobyor").await;
        let reader = ctx.user("Yarik").await;
        let cookie = ctx.session_cookie(&reader);
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/YaBobyor/follow/").cookie(cookie.clone()).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
        assert!(ctx.repo.is_following(reader.id, author.id).await.unwrap());

        // a second follow keeps the single edge
        test::call_service(
            &app,
            test::TestRequest::get().uri("/YaBobyor/follow/").cookie(cookie.clone()).to_request(),
        )
        .await;
        assert_eq!(ctx.repo.count_follows().await.unwrap(), 1);

        test::call_service(
            &app,
            test::TestRequest::get().uri("/YaBobyor/unfollow/").cookie(cookie).to_request(),
        )
        .await;
        assert!(!ctx.repo.is_following(reader.id, author.id).await.unwrap());
    }

    #[actix_web::test]
    async fn self_follow_is_ignored() {
        let ctx = TestContext::new().await;
        let me = ctx.user("Ya").await;
        let cookie = ctx.session_cookie(&me);
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/Ya/follow/").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(ctx.repo.count_follows().await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn follow_feed_only_has_followed_authors() {
        let ctx = TestContext::new().await;
        let author = ctx.user("YaBobyor").await;
        let stranger = ctx.user("Stranger").await;
        let reader = ctx.user("Yarik").await;
        let loner = ctx.user("Loner").await;
        ctx.post(&author, None, "subscribed text").await;
        ctx.post(&stranger, None, "stranger danger").await;
        ctx.repo.follow(reader.id, author.id).await.unwrap();
        let reader_cookie = ctx.session_cookie(&reader);
        let loner_cookie = ctx.session_cookie(&loner);
        let app = crate::test_app!(ctx);

        let feed = test::call_and_read_body(
            &app,
            test::TestRequest::get().uri("/follow/").cookie(reader_cookie).to_request(),
        )
        .await;
        let feed = String::from_utf8(feed.to_vec()).unwrap();
        assert!(feed.contains("subscribed text"));
        assert!(!feed.contains("stranger danger"));

        let empty = test::call_and_read_body(
            &app,
            test::TestRequest::get().uri("/follow/").cookie(loner_cookie).to_request(),
        )
        .await;
        assert!(!String::from_utf8(empty.to_vec()).unwrap().contains("subscribed text"));
    }

    #[actix_web::test]
    async fn following_unknown_user_is_404() {
        let ctx = TestContext::new().await;
        let me = ctx.user("Ya").await;
        let cookie = ctx.session_cookie(&me);
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/ghost/follow/").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
