// src/handlers/post_handlers.rs
use actix_multipart::{Field, Multipart};
use actix_web::{get, post, route, web, HttpResponse};
use futures::TryStreamExt;
use tera::Context;

use crate::config::PAGE_SIZE;
use crate::dtos::post_dtos::{
    CommentForm, FormErrors, PageQuery, PostForm, UploadedImage,
};
use crate::handlers::{base_context, post_url, redirect, render, AppError};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::models::comment::{CommentQuery, NewComment};
use crate::models::group::{Group, GroupQuery};
use crate::models::post::{NewPost, Post, PostChanges, PostQuery};
use crate::repositories::UNBOUNDED;
use crate::services::paginator::{Page, Paginator};
use crate::AppState;

/// Counts, windows and fetches one page of posts.
pub async fn paginate_posts(
    state: &AppState,
    query: &PostQuery,
    page: Option<&str>,
) -> Result<Page<Post>, AppError> {
    let count = state.repo.count_posts(query).await?;
    let window = Paginator::new(count, PAGE_SIZE).get_page(page);
    let posts = state.repo.list_posts(query, window.offset, window.limit).await?;
    Ok(window.into_page(posts))
}

/// The post `post_id`, provided it was written by `username`.
async fn author_post(state: &AppState, username: &str, post_id: i32) -> Result<Post, AppError> {
    state
        .repo
        .post_by_id(post_id)
        .await?
        .filter(|post| post.author.username == username)
        .ok_or(AppError::NotFound)
}

#[get("/")]
pub async fn index(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = paginate_posts(&state, &PostQuery::default(), query.page.as_deref()).await?;

    let mut ctx = base_context(&state, viewer.as_ref());
    ctx.insert("page", &page);
    render(&state, "index.html", &ctx)
}

#[get("/group/{slug}/")]
pub async fn group_posts(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .repo
        .group_by_slug(&path.into_inner())
        .await?
        .ok_or(AppError::NotFound)?;
    let page = paginate_posts(&state, &PostQuery::in_group(group.id), query.page.as_deref()).await?;

    let mut ctx = base_context(&state, viewer.as_ref());
    ctx.insert("group", &group);
    ctx.insert("page", &page);
    render(&state, "group.html", &ctx)
}

/// Reads a post form from a multipart body. File bytes beyond
/// `max_upload_bytes` are dropped and the upload is flagged as too large.
async fn read_post_form(mut payload: Multipart, max_upload_bytes: usize) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                let content_type = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .unwrap_or_default();
                let mut upload = UploadedImage { file_name, content_type, ..UploadedImage::default() };

                while let Some(chunk) = field.try_next().await.map_err(bad_upload)? {
                    if upload.bytes.len() + chunk.len() > max_upload_bytes {
                        upload.too_large = true;
                    } else {
                        upload.bytes.extend_from_slice(&chunk);
                    }
                }

                // an empty, nameless part means no file was chosen
                if !upload.file_name.is_empty() || !upload.bytes.is_empty() {
                    form.image = Some(upload);
                }
            }
            "text" => form.text = read_text(&mut field, max_upload_bytes).await?,
            "group" => form.group = read_text(&mut field, max_upload_bytes).await?,
            "image-clear" => {
                read_text(&mut field, max_upload_bytes).await?;
                form.clear_image = true;
            }
            _ => {
                while field.try_next().await.map_err(bad_upload)?.is_some() {}
            }
        }
    }

    Ok(form)
}

async fn read_text(field: &mut Field, limit: usize) -> Result<String, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(bad_upload)? {
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::BadRequest("form field is not utf-8".to_string()))
}

fn bad_upload(e: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(e.to_string())
}

async fn all_groups(state: &AppState) -> Result<Vec<Group>, AppError> {
    Ok(state.repo.list_groups(&GroupQuery::default()).await?)
}

fn post_form_context(
    state: &AppState,
    viewer: &AuthenticatedUser,
    form: &PostForm,
    errors: &FormErrors,
    groups: &[Group],
) -> Context {
    let mut ctx = base_context(state, Some(viewer));
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    ctx.insert("fields", &PostForm::fields());
    ctx.insert("groups", groups);
    ctx
}

#[get("/new/")]
pub async fn new_post_form(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let groups = all_groups(&state).await?;
    let ctx = post_form_context(&state, &user, &PostForm::default(), &FormErrors::default(), &groups);
    render(&state, "new_post.html", &ctx)
}

#[post("/new/")]
pub async fn new_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let form = read_post_form(payload, state.settings.max_upload_bytes).await?;
    let groups = all_groups(&state).await?;

    let valid = match form.validate(&groups) {
        Ok(valid) => valid,
        Err(errors) => {
            let ctx = post_form_context(&state, &user, &form, &errors, &groups);
            return render(&state, "new_post.html", &ctx);
        }
    };

    let image = match &valid.image {
        Some((bytes, ext)) => Some(state.media.save_post_image(bytes, ext).await?),
        None => None,
    };

    let created = state
        .repo
        .create_post(NewPost {
            text: valid.text,
            author_id: user.user_id,
            group_id: valid.group_id,
            image: image.clone(),
        })
        .await;
    let post = match created {
        Ok(post) => post,
        Err(e) => {
            discard_upload(&state, image.as_deref()).await;
            return Err(e.into());
        }
    };
    log::info!("{} published post {}", user.username, post.id);

    Ok(redirect("/"))
}

/// Removes a freshly stored upload whose post never got saved.
async fn discard_upload(state: &AppState, image: Option<&str>) {
    let Some(image) = image else { return };
    match state.media.remove(image).await {
        Ok(()) => log::debug!("discarded unsaved upload {}", image),
        Err(e) => log::error!("failed to discard upload {}: {}", image, e),
    }
}

/// Everything the post page shows besides the comment form.
async fn post_page_context(
    state: &AppState,
    viewer: Option<&AuthenticatedUser>,
    post: &Post,
) -> Result<Context, AppError> {
    let comments = state
        .repo
        .list_comments(&CommentQuery::on_post(post.id), 0, UNBOUNDED)
        .await?;
    let posts_count = state.repo.count_posts(&PostQuery::by_author(post.author.id)).await?;
    let counts = state.repo.follow_counts(post.author.id).await?;
    let following = match viewer {
        Some(v) => state.repo.is_following(v.user_id, post.author.id).await?,
        None => false,
    };

    let mut ctx = base_context(state, viewer);
    ctx.insert("post", post);
    ctx.insert("author", &post.author);
    ctx.insert("comments", &comments);
    ctx.insert("posts_count", &posts_count);
    ctx.insert("follow_counts", &counts);
    ctx.insert("following", &following);
    ctx.insert("is_author", &viewer.is_some_and(|v| v.user_id == post.author.id));
    ctx.insert("comment_fields", &CommentForm::fields());
    Ok(ctx)
}

#[get("/{username}/{post_id:\\d+}/")]
pub async fn post_view(
    state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
    path: web::Path<(String, i32)>,
) -> Result<HttpResponse, AppError> {
    let (username, post_id) = path.into_inner();
    let post = author_post(&state, &username, post_id).await?;

    let mut ctx = post_page_context(&state, viewer.as_ref(), &post).await?;
    ctx.insert("form", &CommentForm::default());
    ctx.insert("errors", &FormErrors::default());
    render(&state, "post.html", &ctx)
}

/// Comment submitted from the post page itself.
#[post("/{username}/{post_id:\\d+}/")]
pub async fn post_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, i32)>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, AppError> {
    let (username, post_id) = path.into_inner();
    let post = author_post(&state, &username, post_id).await?;

    match form.validate() {
        Ok(text) => {
            create_comment(&state, &user, &post, text).await?;
            Ok(redirect(&post_url(&username, post_id)))
        }
        Err(errors) => {
            let mut ctx = post_page_context(&state, Some(&user), &post).await?;
            ctx.insert("form", &form.into_inner());
            ctx.insert("errors", &errors);
            render(&state, "post.html", &ctx)
        }
    }
}

async fn create_comment(
    state: &AppState,
    user: &AuthenticatedUser,
    post: &Post,
    text: String,
) -> Result<(), AppError> {
    let comment = state
        .repo
        .create_comment(NewComment { post_id: post.id, author_id: user.user_id, text })
        .await?;
    log::info!("{} commented on post {} (comment {})", user.username, post.id, comment.id);
    Ok(())
}

/// Bare comment endpoint: a GET renders the empty form, a valid POST adds
/// the comment and returns to the post.
#[route("/{username}/{post_id:\\d+}/comment/", method = "GET", method = "POST")]
pub async fn add_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, i32)>,
    form: Option<web::Form<CommentForm>>,
) -> Result<HttpResponse, AppError> {
    let (username, post_id) = path.into_inner();
    let post = author_post(&state, &username, post_id).await?;

    let (form, errors) = match form {
        Some(form) => match form.validate() {
            Ok(text) => {
                create_comment(&state, &user, &post, text).await?;
                return Ok(redirect(&post_url(&username, post_id)));
            }
            Err(errors) => (form.into_inner(), errors),
        },
        None => (CommentForm::default(), FormErrors::default()),
    };

    let comments = state
        .repo
        .list_comments(&CommentQuery::on_post(post.id), 0, UNBOUNDED)
        .await?;

    let mut ctx = base_context(&state, Some(&user));
    ctx.insert("post", &post);
    ctx.insert("comments", &comments);
    ctx.insert("form", &form);
    ctx.insert("errors", &errors);
    ctx.insert("comment_fields", &CommentForm::fields());
    render(&state, "includes/comments.html", &ctx)
}

fn post_edit_context(
    state: &AppState,
    user: &AuthenticatedUser,
    post: &Post,
    form: &PostForm,
    errors: &FormErrors,
    groups: &[Group],
) -> Context {
    let mut ctx = post_form_context(state, user, form, errors, groups);
    ctx.insert("post", post);
    ctx.insert("group", &post.group);
    ctx
}

#[get("/{username}/{post_id:\\d+}/edit/")]
pub async fn post_edit_form(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, i32)>,
) -> Result<HttpResponse, AppError> {
    let (username, post_id) = path.into_inner();
    let post = author_post(&state, &username, post_id).await?;
    if post.author.id != user.user_id {
        return Ok(redirect(&post_url(&username, post_id)));
    }

    let groups = all_groups(&state).await?;
    let ctx = post_edit_context(
        &state,
        &user,
        &post,
        &PostForm::from_post(&post),
        &FormErrors::default(),
        &groups,
    );
    render(&state, "post_edit.html", &ctx)
}

#[post("/{username}/{post_id:\\d+}/edit/")]
pub async fn post_edit(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, i32)>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let (username, post_id) = path.into_inner();
    let post = author_post(&state, &username, post_id).await?;
    if post.author.id != user.user_id {
        log::debug!("{} may not edit post {}", user.username, post.id);
        return Ok(redirect(&post_url(&username, post_id)));
    }

    let form = read_post_form(payload, state.settings.max_upload_bytes).await?;
    let groups = all_groups(&state).await?;

    let valid = match form.validate(&groups) {
        Ok(valid) => valid,
        Err(errors) => {
            let ctx = post_edit_context(&state, &user, &post, &form, &errors, &groups);
            return render(&state, "post_edit.html", &ctx);
        }
    };

    let uploaded = match &valid.image {
        Some((bytes, ext)) => Some(state.media.save_post_image(bytes, ext).await?),
        None => None,
    };
    let image = match (&uploaded, valid.clear_image) {
        (Some(new), _) => Some(new.clone()),
        (None, true) => None,
        (None, false) => post.image.clone(),
    };
    let replaced = post.image.clone().filter(|old| image.as_ref() != Some(old));

    let changed = state
        .repo
        .update_post(
            post.id,
            PostChanges { text: valid.text, group_id: valid.group_id, image },
        )
        .await;
    let updated = match changed {
        Ok(updated) => updated,
        Err(e) => {
            discard_upload(&state, uploaded.as_deref()).await;
            return Err(e.into());
        }
    };
    log::info!("{} edited post {}", user.username, updated.id);

    if let Some(old) = replaced {
        if let Err(e) = state.media.remove(&old).await {
            log::error!("failed to remove replaced image {}: {}", old, e);
        }
    }

    Ok(redirect(&post_url(&updated.author.username, updated.id)))
}
