// src/handlers/auth_handlers.rs
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{get, post, route, web, HttpResponse};

use crate::dtos::auth_dtos::{safe_next, LoginForm, NextQuery, SignupForm};
use crate::dtos::post_dtos::FormErrors;
use crate::handlers::{base_context, redirect, render, AppError};
use crate::middleware::auth_extractor::{session_removal_cookie, AuthenticatedUser, SESSION_COOKIE};
use crate::services::auth_services::{AuthError, AuthService};
use crate::AppState;

fn signup_page(
    state: &AppState,
    form: &SignupForm,
    errors: &FormErrors,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(state, None);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    render(state, "signup.html", &ctx)
}

fn login_page(
    state: &AppState,
    form: &LoginForm,
    errors: &FormErrors,
) -> Result<HttpResponse, AppError> {
    let mut ctx = base_context(state, None);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    render(state, "login.html", &ctx)
}

#[get("/auth/signup/")]
pub async fn signup_form(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    signup_page(&state, &SignupForm::default(), &FormErrors::default())
}

/// Creates the account and sends the visitor on to log in.
#[post("/auth/signup/")]
pub async fn signup(
    state: web::Data<AppState>,
    svc: web::Data<AuthService>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        return signup_page(&state, &form, &errors);
    }

    match svc.signup(&form).await {
        Ok(_) => Ok(redirect("/auth/login/")),
        Err(AuthError::UsernameTaken) => {
            let mut errors = FormErrors::default();
            errors.add("username", AuthError::UsernameTaken.to_string());
            signup_page(&state, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

#[get("/auth/login/")]
pub async fn login_form(
    state: web::Data<AppState>,
    query: web::Query<NextQuery>,
) -> Result<HttpResponse, AppError> {
    let form = LoginForm {
        next: query.into_inner().next.unwrap_or_default(),
        ..LoginForm::default()
    };
    login_page(&state, &form, &FormErrors::default())
}

#[post("/auth/login/")]
pub async fn login(
    state: web::Data<AppState>,
    svc: web::Data<AuthService>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if let Err(errors) = form.validate() {
        return login_page(&state, &form, &errors);
    }

    let (user, token) = match svc.login(&form.username, &form.password).await {
        Ok(session) => session,
        Err(AuthError::InvalidCredentials) => {
            let mut errors = FormErrors::default();
            errors.add(
                "credentials",
                "Please enter a correct username and password. Note that both fields may be case-sensitive.",
            );
            return login_page(&state, &form, &errors);
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("{} logged in", user.username);

    let cookie = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(svc.session_ttl().num_seconds()))
        .finish();

    let mut response = redirect(&safe_next(Some(&form.next)));
    response.add_cookie(&cookie).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(response)
}

/// Drops the session cookie and returns to the index.
#[route("/auth/logout/", method = "GET", method = "POST")]
pub async fn logout(user: Option<AuthenticatedUser>) -> Result<HttpResponse, AppError> {
    if let Some(user) = &user {
        log::info!("{} logged out", user.username);
    }

    let mut response = redirect("/");
    response.add_cookie(&session_removal_cookie()).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(response)
}
