// src/main.rs
mod admin;
mod config;
mod dtos;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod templates;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use tera::Tera;

use crate::config::Settings;
use crate::handlers::error_handlers::error_handlers;
use crate::repositories::memory_repository::MemoryRepository;
use crate::repositories::pg_repository::PgRepository;
use crate::repositories::Repository;
use crate::services::auth_services::AuthService;
use crate::services::media_service::MediaStorage;

fn mask_key(k: &str) -> String {
    let chars: Vec<char> = k.chars().collect();
    if chars.len() <= 8 {
        return "[REDACTED]".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

/// What every handler can reach through `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub templates: Arc<Tera>,
    pub media: MediaStorage,
    pub settings: Settings,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    info!("JWT secret: {}", mask_key(&settings.jwt_secret));

    let repo: Arc<dyn Repository> = match config::get_pg_pool()? {
        Some(pool) => {
            let pg = PgRepository::new(pool);
            pg.migrate().await.context("failed to apply the database schema")?;
            info!("using PostgreSQL storage");
            Arc::new(pg)
        }
        None => {
            warn!("PG_HOST not set, data is kept in memory and lost on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    let templates = Arc::new(templates::load().context("failed to load templates")?);

    let auth_service = AuthService::new(
        repo.clone(),
        settings.jwt_secret.clone(),
        chrono::Duration::hours(settings.session_ttl_hours),
    );
    let auth_data = web::Data::new(auth_service);

    let bind_address = settings.bind_address.clone();
    let allowed_origins = settings.allowed_origins.clone();
    let state = web::Data::new(AppState {
        repo,
        templates,
        media: MediaStorage::new(settings.media_root.clone()),
        settings,
    });
    info!("media stored under {}", state.media.root().display());
    info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["authorization", "content-type", "accept"])
            .supports_credentials()
            .max_age(3600);

        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(error_handlers())
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(auth_data.clone())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
