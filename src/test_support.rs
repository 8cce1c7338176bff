use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use actix_web::cookie::Cookie;
use tera::Tera;
use uuid::Uuid;

use crate::config::Settings;
use crate::middleware::auth_extractor::SESSION_COOKIE;
use crate::models::group::{Group, NewGroup};
use crate::models::post::{NewPost, Post};
use crate::models::user::{NewUser, User};
use crate::repositories::memory_repository::MemoryRepository;
use crate::repositories::Repository;
use crate::services::auth_services::AuthService;
use crate::services::media_service::MediaStorage;
use crate::AppState;

pub const PASSWORD: &str = "correct-horse-battery";
pub const STAFF: &str = "moderator";

pub const SMALL_GIF: &[u8] = b"\x47\x49\x46\x38\x39\x61\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\
\xFF\xFF\xFF\x21\xF9\x04\x00\x00\x00\x00\x00\x2C\x00\x00\x00\x00\x02\x00\x01\x00\x00\x02\x02\x0C\x0A\x00\x3B";

const BOUNDARY: &str = "postboard-test-boundary";

// hashing is slow in debug builds, every fixture user shares one hash
static PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| User::hash_password(PASSWORD).unwrap());

static TEMPLATES: LazyLock<Arc<Tera>> = LazyLock::new(|| Arc::new(crate::templates::load().unwrap()));

/// An app state over a fresh in-memory store, with fixture helpers.
pub struct TestContext {
    pub repo: Arc<dyn Repository>,
    pub state: AppState,
    pub auth: AuthService,
    media_root: PathBuf,
}

impl TestContext {
    pub async fn new() -> Self {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let media_root = std::env::temp_dir().join(format!("postboard-test-{}", Uuid::new_v4()));

        let settings = Settings {
            bind_address: "127.0.0.1:0".to_string(),
            jwt_secret: "test-secret".to_string(),
            session_ttl_hours: 1,
            media_root: media_root.clone(),
            max_upload_bytes: 1024 * 1024,
            staff_usernames: vec![STAFF.to_string()],
            allowed_origins: Vec::new(),
        };
        let auth = AuthService::new(
            repo.clone(),
            settings.jwt_secret.clone(),
            chrono::Duration::hours(settings.session_ttl_hours),
        );
        let state = AppState {
            repo: repo.clone(),
            templates: TEMPLATES.clone(),
            media: MediaStorage::new(media_root.clone()),
            settings,
        };

        Self { repo, state, auth, media_root }
    }

    pub async fn user(&self, username: &str) -> User {
        self.repo
            .create_user(NewUser {
                username: username.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
                password_hash: PASSWORD_HASH.clone(),
            })
            .await
            .unwrap()
    }

    pub async fn group(&self, slug: &str, title: &str) -> Group {
        self.repo
            .create_group(NewGroup {
                title: title.to_string(),
                slug: slug.to_string(),
                description: format!("{title} description"),
            })
            .await
            .unwrap()
    }

    pub async fn post(&self, author: &User, group_id: Option<i32>, text: &str) -> Post {
        self.repo
            .create_post(NewPost {
                text: text.to_string(),
                author_id: author.id,
                group_id,
                image: None,
            })
            .await
            .unwrap()
    }

    pub fn session_cookie(&self, user: &User) -> Cookie<'static> {
        Cookie::new(SESSION_COOKIE, self.auth.issue_token(user).unwrap())
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}

/// Encodes text fields and an optional `(name, file name, content type,
/// bytes)` file part as `multipart/form-data`. Returns the content type
/// header value and the body.
pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &str, &[u8])>,
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Builds the service the way `main` does, over a [`TestContext`].
#[macro_export]
macro_rules! test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap($crate::handlers::error_handlers::error_handlers())
                .app_data(actix_web::web::Data::new($ctx.state.clone()))
                .app_data(actix_web::web::Data::new($ctx.auth.clone()))
                .configure($crate::handlers::configure),
        )
        .await
    };
}
