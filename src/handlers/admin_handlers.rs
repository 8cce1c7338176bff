// src/handlers/admin_handlers.rs
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::admin::{self, date_choices, AdminModel, DateFilter, FilterChoice, ModelAdmin, Row};
use crate::config::ADMIN_PAGE_SIZE;
use crate::dtos::admin_dtos::{ChangelistQuery, GroupForm};
use crate::dtos::post_dtos::FormErrors;
use crate::handlers::{base_context, post_url, profile_url, redirect, render, AppError};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::models::comment::CommentQuery;
use crate::models::group::GroupQuery;
use crate::models::post::PostQuery;
use crate::models::user::UserQuery;
use crate::repositories::{RepoError, UNBOUNDED};
use crate::services::paginator::{Page, Paginator};
use crate::AppState;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn require_staff(state: &AppState, user: &AuthenticatedUser) -> Result<(), AppError> {
    if state.settings.is_staff(&user.username) {
        Ok(())
    } else {
        log::debug!("{} is not staff", user.username);
        Err(AppError::Forbidden)
    }
}

fn model_or_404(slug: &str) -> Result<&'static ModelAdmin, AppError> {
    admin::lookup(slug).ok_or(AppError::NotFound)
}

#[derive(Serialize)]
struct IndexEntry {
    admin: &'static ModelAdmin,
    count: i64,
}

#[get("/admin/")]
pub async fn admin_index(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_staff(&state, &user)?;

    let mut entries = Vec::with_capacity(admin::REGISTRY.len());
    for admin in admin::REGISTRY {
        let count = match admin.model {
            AdminModel::Posts => state.repo.count_posts(&PostQuery::default()).await?,
            AdminModel::Groups => state.repo.list_groups(&GroupQuery::default()).await?.len() as i64,
            AdminModel::Comments => state.repo.count_comments(&CommentQuery::default()).await?,
            AdminModel::Follows => state.repo.count_follows().await?,
            AdminModel::Users => state.repo.count_users(&UserQuery::default()).await?,
        };
        entries.push(IndexEntry { admin, count });
    }

    let mut ctx = base_context(&state, Some(&user));
    ctx.insert("entries", &entries);
    render(&state, "admin/index.html", &ctx)
}

/// A `list_filter` parameter with its sidebar choices. `query` carries the
/// rest of the current selection so picking a choice keeps it.
#[derive(Serialize)]
struct ListFilter {
    param: &'static str,
    query: String,
    choices: Vec<FilterChoice>,
}

impl ListFilter {
    fn new(param: &'static str, query: &ChangelistQuery, choices: Vec<FilterChoice>) -> Self {
        Self { param, query: query.query_string(Some(param)), choices }
    }
}

/// Rows of one changelist page plus the filters that produced it.
async fn changelist_rows(
    state: &AppState,
    admin: &ModelAdmin,
    query: &ChangelistQuery,
) -> Result<(Page<Row>, Vec<ListFilter>), AppError> {
    let now = Utc::now().naive_utc();
    let search = query.search();
    let page = query.page.as_deref();

    match admin.model {
        AdminModel::Posts => {
            let filter = query.pub_date.as_deref().and_then(DateFilter::parse);
            let posts_query = PostQuery {
                text_contains: search,
                published_since: filter.map(|f| f.since(now)),
                ..PostQuery::default()
            };
            let count = state.repo.count_posts(&posts_query).await?;
            let window = Paginator::new(count, ADMIN_PAGE_SIZE).get_page(page);
            let rows = state
                .repo
                .list_posts(&posts_query, window.offset, window.limit)
                .await?
                .into_iter()
                .map(|p| {
                    let link = post_url(&p.author.username, p.id);
                    admin.row(
                        p.id,
                        &[
                            ("pk", p.id.to_string(), Some(link.clone())),
                            ("text", p.text.clone(), Some(link)),
                            ("pub_date", p.pub_date.format(DATE_FORMAT).to_string(), None),
                            ("author", p.author.username.clone(), Some(profile_url(&p.author.username))),
                        ],
                    )
                })
                .collect();
            let filters = vec![ListFilter::new("pub_date", query, date_choices(filter))];
            Ok((window.into_page(rows), filters))
        }
        AdminModel::Groups => {
            let slug = query.slug.clone().filter(|s| !s.is_empty());
            let all = state.repo.list_groups(&GroupQuery::default()).await?;
            let slug_choices = all
                .iter()
                .map(|g| FilterChoice {
                    value: g.slug.clone(),
                    label: g.slug.clone(),
                    selected: slug.as_deref() == Some(g.slug.as_str()),
                })
                .collect();

            let groups_query = GroupQuery { title_contains: search, slug };
            let groups: Vec<_> = all.into_iter().filter(|g| groups_query.matches(g)).collect();
            let window = Paginator::new(groups.len() as i64, ADMIN_PAGE_SIZE).get_page(page);
            let rows = groups
                .into_iter()
                .skip(window.offset as usize)
                .take(window.limit as usize)
                .map(|g| {
                    let link = format!("/group/{}/", urlencoding::encode(&g.slug));
                    admin.row(
                        g.id,
                        &[
                            ("pk", g.id.to_string(), Some(link.clone())),
                            ("title", g.title, Some(link.clone())),
                            ("slug", g.slug, Some(link.clone())),
                            ("description", g.description, Some(link)),
                        ],
                    )
                })
                .collect();
            let filters = vec![ListFilter::new("slug", query, slug_choices)];
            Ok((window.into_page(rows), filters))
        }
        AdminModel::Comments => {
            let filter = query.created.as_deref().and_then(DateFilter::parse);
            let comments_query = CommentQuery {
                text_contains: search,
                created_since: filter.map(|f| f.since(now)),
                ..CommentQuery::default()
            };
            let count = state.repo.count_comments(&comments_query).await?;
            let window = Paginator::new(count, ADMIN_PAGE_SIZE).get_page(page);
            let comments = state
                .repo
                .list_comments(&comments_query, window.offset, window.limit)
                .await?;

            let mut rows = Vec::with_capacity(comments.len());
            for c in comments {
                let post = state.repo.post_by_id(c.post_id).await?;
                let post_label = post.as_ref().map(|p| p.to_string()).unwrap_or_default();
                let post_link = post.as_ref().map(|p| post_url(&p.author.username, p.id));
                rows.push(admin.row(
                    c.id,
                    &[
                        ("pk", c.id.to_string(), post_link.clone()),
                        ("post", post_label, post_link.clone()),
                        ("author", c.author.username.clone(), Some(profile_url(&c.author.username))),
                        ("text", c.text.clone(), post_link),
                        ("created", c.created.format(DATE_FORMAT).to_string(), None),
                    ],
                ));
            }
            let filters = vec![ListFilter::new("created", query, date_choices(filter))];
            Ok((window.into_page(rows), filters))
        }
        AdminModel::Follows => {
            let count = state.repo.count_follows().await?;
            let window = Paginator::new(count, ADMIN_PAGE_SIZE).get_page(page);
            let rows = state
                .repo
                .list_follows(window.offset, window.limit)
                .await?
                .into_iter()
                .map(|f| {
                    admin.row(
                        f.id,
                        &[
                            ("pk", f.id.to_string(), None),
                            ("user", f.user.username, None),
                            ("author", f.author.username, None),
                        ],
                    )
                })
                .collect();
            Ok((window.into_page(rows), Vec::new()))
        }
        AdminModel::Users => {
            let users_query = UserQuery { username_contains: search };
            let count = state.repo.count_users(&users_query).await?;
            let window = Paginator::new(count, ADMIN_PAGE_SIZE).get_page(page);
            let rows = state
                .repo
                .list_users(&users_query, window.offset, window.limit)
                .await?
                .into_iter()
                .map(|u| {
                    let link = profile_url(&u.username);
                    admin.row(
                        u.id,
                        &[
                            ("pk", u.id.to_string(), Some(link.clone())),
                            ("username", u.username, Some(link)),
                            ("first_name", u.first_name, None),
                            ("last_name", u.last_name, None),
                            ("email", u.email, None),
                        ],
                    )
                })
                .collect();
            Ok((window.into_page(rows), Vec::new()))
        }
    }
}

#[get("/admin/{model}/")]
pub async fn changelist(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    query: web::Query<ChangelistQuery>,
) -> Result<HttpResponse, AppError> {
    require_staff(&state, &user)?;
    let admin = model_or_404(&path.into_inner())?;

    let (page, filters) = changelist_rows(&state, admin, &query).await?;

    let mut ctx = base_context(&state, Some(&user));
    ctx.insert("admin", admin);
    ctx.insert("page", &page);
    ctx.insert("filters", &filters);
    ctx.insert("q", &query.search().unwrap_or_default());
    ctx.insert("page_query", &query.query_string(None));
    let hidden: Vec<_> = query.params().into_iter().filter(|(name, _)| *name != "q").collect();
    ctx.insert("hidden_params", &hidden);
    render(&state, "admin/changelist.html", &ctx)
}

fn group_form_page(
    state: &AppState,
    user: &AuthenticatedUser,
    form: &GroupForm,
    errors: &FormErrors,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(state, Some(user));
    ctx.insert("admin", model_or_404("groups")?);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    render(state, "admin/group_form.html", &ctx)
}

#[get("/admin/groups/add/")]
pub async fn group_add_form(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    require_staff(&state, &user)?;
    group_form_page(&state, &user, &GroupForm::default(), &FormErrors::default())
}

#[post("/admin/groups/add/")]
pub async fn group_add(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    form: web::Form<GroupForm>,
) -> Result<HttpResponse, AppError> {
    require_staff(&state, &user)?;
    let form = form.into_inner();

    let new_group = match form.validate() {
        Ok(group) => group,
        Err(errors) => return group_form_page(&state, &user, &form, &errors),
    };

    match state.repo.create_group(new_group).await {
        Ok(group) => {
            log::info!("{} created group {}", user.username, group.slug);
            Ok(redirect("/admin/groups/"))
        }
        Err(RepoError::Conflict(_)) => {
            let mut errors = FormErrors::default();
            errors.add("slug", "Group with this Slug already exists.");
            group_form_page(&state, &user, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

fn int_pk(raw: &str) -> Result<i32, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

async fn remove_images(state: &AppState, images: impl IntoIterator<Item = String>) {
    for image in images {
        if let Err(e) = state.media.remove(&image).await {
            log::error!("failed to remove image {}: {}", image, e);
        }
    }
}

#[post("/admin/{model}/{id}/delete/")]
pub async fn delete_object(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    require_staff(&state, &user)?;
    let (model, id) = path.into_inner();
    let admin = model_or_404(&model)?;

    let deleted = match admin.model {
        AdminModel::Posts => {
            let id = int_pk(&id)?;
            let image = state.repo.post_by_id(id).await?.and_then(|p| p.image);
            let deleted = state.repo.delete_post(id).await?;
            if deleted {
                remove_images(&state, image).await;
            }
            deleted
        }
        AdminModel::Groups => state.repo.delete_group(int_pk(&id)?).await?,
        AdminModel::Comments => state.repo.delete_comment(int_pk(&id)?).await?,
        AdminModel::Follows => state.repo.delete_follow(int_pk(&id)?).await?,
        AdminModel::Users => {
            let user_id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
            // the cascade drops the posts, their files have to go separately
            let images: Vec<String> = state
                .repo
                .list_posts(&PostQuery::by_author(user_id), 0, UNBOUNDED)
                .await?
                .into_iter()
                .filter_map(|p| p.image)
                .collect();
            let deleted = state.repo.delete_user(user_id).await?;
            if deleted {
                remove_images(&state, images).await;
            }
            deleted
        }
    };

    if !deleted {
        return Err(AppError::NotFound);
    }
    log::info!("{} deleted {} #{}", user.username, admin.slug, id);
    Ok(redirect(&format!("/admin/{}/", admin.slug)))
}

#[cfg(test)]
mod tests {
    use actix_web::http::{header, StatusCode};
    use actix_web::test;

    use crate::models::group::GroupQuery;
    use crate::models::post::PostQuery;
    use crate::test_support::{TestContext, STAFF};

    #[actix_web::test]
    async fn admin_is_for_staff_only() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        let visitor = ctx.user("leo").await;
        let staff_cookie = ctx.session_cookie(&staff);
        let visitor_cookie = ctx.session_cookie(&visitor);
        let app = crate::test_app!(ctx);

        let anonymous = test::call_service(&app, test::TestRequest::get().uri("/admin/").to_request()).await;
        assert_eq!(anonymous.status(), StatusCode::FOUND);

        let forbidden = test::call_service(
            &app,
            test::TestRequest::get().uri("/admin/").cookie(visitor_cookie).to_request(),
        )
        .await;
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        for uri in [
            "/admin/",
            "/admin/posts/",
            "/admin/groups/",
            "/admin/comments/",
            "/admin/follows/",
            "/admin/users/",
        ] {
            let resp = test::call_service(
                &app,
                test::TestRequest::get().uri(uri).cookie(staff_cookie.clone()).to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        }

        let unknown = test::call_service(
            &app,
            test::TestRequest::get().uri("/admin/permissions/").cookie(staff_cookie).to_request(),
        )
        .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn post_changelist_searches_and_filters() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        ctx.post(&staff, None, "about yo-yos").await;
        ctx.post(&staff, None, "about kites").await;
        let cookie = ctx.session_cookie(&staff);
        let app = crate::test_app!(ctx);

        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri("/admin/posts/?q=YO&pub_date=today")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("about yo-yos"));
        assert!(!body.contains("about kites"));
    }

    #[actix_web::test]
    async fn staff_can_add_group_with_prepopulated_slug() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        let cookie = ctx.session_cookie(&staff);
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/groups/add/")
                .cookie(cookie.clone())
                .set_form([("title", "Yo-Yo Club"), ("slug", ""), ("description", "spinning")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin/groups/");
        assert!(ctx.repo.group_by_slug("yo-yo-club").await.unwrap().is_some());

        let duplicate = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/groups/add/")
                .cookie(cookie)
                .set_form([("title", "Other"), ("slug", "yo-yo-club"), ("description", "again")])
                .to_request(),
        )
        .await;
        assert_eq!(duplicate.status(), StatusCode::OK);
        assert_eq!(ctx.repo.list_groups(&GroupQuery::default()).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn deleting_a_group_keeps_its_posts() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        let group = ctx.group("yoyo", "Yo-Yo").await;
        let post = ctx.post(&staff, Some(group.id), "grouped").await;
        let cookie = ctx.session_cookie(&staff);
        let app = crate::test_app!(ctx);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/admin/groups/{}/delete/", group.id))
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let survivor = ctx.repo.post_by_id(post.id).await.unwrap().unwrap();
        assert!(survivor.group.is_none());

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/admin/posts/{}/delete/", post.id))
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(ctx.repo.count_posts(&PostQuery::default()).await.unwrap(), 0);

        let again = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/admin/posts/{}/delete/", post.id))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn changelist_pages_keep_search_and_filters() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        for i in 0..105 {
            ctx.post(&staff, None, &format!("numbered {i}")).await;
        }
        for i in 0..3 {
            ctx.post(&staff, None, &format!("unrelated {i}")).await;
        }
        let cookie = ctx.session_cookie(&staff);
        let app = crate::test_app!(ctx);

        let first = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri("/admin/posts/?q=numbered&pub_date=today")
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert_eq!(first.matches("<button type=\"submit\">Delete</button>").count(), 100);
        assert!(first.contains("href=\"?q=numbered&amp;pub_date=today&amp;page=2\""));
        assert!(first.contains("?q=numbered&amp;pub_date=this_month"));
        assert!(first.contains("<input type=\"hidden\" name=\"pub_date\" value=\"today\">"));

        let second = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri("/admin/posts/?q=numbered&pub_date=today&page=2")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        let second = String::from_utf8(second.to_vec()).unwrap();
        assert_eq!(second.matches("<button type=\"submit\">Delete</button>").count(), 5);
        assert!(!second.contains("unrelated"));
        assert!(second.contains("href=\"?q=numbered&amp;pub_date=today&amp;page=1\""));
    }

    #[actix_web::test]
    async fn deleting_a_user_removes_everything_they_made() {
        let ctx = TestContext::new().await;
        let staff = ctx.user(STAFF).await;
        let leo = ctx.user("leo").await;
        let post = ctx.post(&leo, None, "leo's post").await;
        let staff_post = ctx.post(&staff, None, "staff post").await;
        ctx.repo
            .create_comment(crate::models::comment::NewComment {
                post_id: staff_post.id,
                author_id: leo.id,
                text: "leo's comment".to_string(),
            })
            .await
            .unwrap();
        ctx.repo.follow(leo.id, staff.id).await.unwrap();
        let cookie = ctx.session_cookie(&staff);
        let app = crate::test_app!(ctx);

        let listed = test::call_and_read_body(
            &app,
            test::TestRequest::get().uri("/admin/users/?q=LE").cookie(cookie.clone()).to_request(),
        )
        .await;
        let listed = String::from_utf8(listed.to_vec()).unwrap();
        assert!(listed.contains(&format!("/admin/users/{}/delete/", leo.id)));
        assert!(!listed.contains(&format!("/admin/users/{}/delete/", staff.id)));

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/admin/users/{}/delete/", leo.id))
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin/users/");

        assert!(ctx.repo.user_by_username("leo").await.unwrap().is_none());
        assert!(ctx.repo.post_by_id(post.id).await.unwrap().is_none());
        assert_eq!(ctx.repo.count_posts(&PostQuery::default()).await.unwrap(), 1);
        assert_eq!(
            ctx.repo
                .count_comments(&crate::models::comment::CommentQuery::default())
                .await
                .unwrap(),
            0
        );
        assert_eq!(ctx.repo.count_follows().await.unwrap(), 0);

        let malformed = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/users/not-a-uuid/delete/")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
    }
}
