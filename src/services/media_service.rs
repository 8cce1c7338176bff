// src/services/media_service.rs
use std::path::{Path, PathBuf};

use mime::Mime;
use uuid::Uuid;

/// Directory under the media root where post images live.
pub const POSTS_DIR: &str = "posts";

/// Image formats a post may carry: content type, extension, magic prefix.
const IMAGE_FORMATS: &[(&str, &str, &[u8])] = &[
    ("image/gif", "gif", b"GIF8"),
    ("image/jpeg", "jpg", b"\xFF\xD8\xFF"),
    ("image/png", "png", b"\x89PNG\r\n\x1a\n"),
    ("image/webp", "webp", b"RIFF"),
];

/// Files uploaded with posts, stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes an image under `posts/` and returns its path relative to the
    /// media root.
    pub async fn save_post_image(&self, bytes: &[u8], extension: &str) -> std::io::Result<String> {
        let dir = self.root.join(POSTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        tokio::fs::write(dir.join(&file_name), bytes).await?;

        log::info!("stored post image {}/{}", POSTS_DIR, file_name);
        Ok(format!("{POSTS_DIR}/{file_name}"))
    }

    /// Removes a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> std::io::Result<()> {
        let Some(path) = self.resolve(relative) else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Maps `posts/<file>` onto the filesystem. Anything that tries to leave
    /// the posts directory resolves to `None`.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let file_name = relative.strip_prefix(&format!("{POSTS_DIR}/"))?;
        let safe_name = Path::new(file_name).file_name()?.to_str()?;
        if safe_name != file_name {
            return None;
        }
        Some(self.root.join(POSTS_DIR).join(safe_name))
    }
}

/// Returns the file extension for an accepted image, checking both the
/// declared content type and the leading bytes.
pub fn image_extension(content_type: &str, bytes: &[u8]) -> Option<&'static str> {
    let content_type = match content_type {
        "image/jpg" | "image/pjpeg" => "image/jpeg",
        other => other,
    };

    IMAGE_FORMATS
        .iter()
        .find(|(mime, _, magic)| *mime == content_type && bytes.starts_with(magic))
        .filter(|(mime, _, _)| *mime != "image/webp" || bytes.get(8..12) == Some(&b"WEBP"[..]))
        .map(|(_, ext, _)| *ext)
}

/// Content type to serve a stored file with.
pub fn content_type_for(file_name: &str) -> Mime {
    match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("png") => mime::IMAGE_PNG,
        Some("gif") => mime::IMAGE_GIF,
        Some("webp") => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = b"\x47\x49\x46\x38\x39\x61\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\
\xFF\xFF\xFF\x21\xF9\x04\x00\x00\x00\x00\x00\x2C\x00\x00\x00\x00\x02\x00\x01\x00\x00\x02\x02\x0C\x0A\x00\x3B";

    #[test]
    fn accepts_matching_type_and_bytes() {
        assert_eq!(image_extension("image/gif", SMALL_GIF), Some("gif"));
        assert_eq!(image_extension("image/jpg", b"\xFF\xD8\xFF\xE0rest"), Some("jpg"));
        assert_eq!(image_extension("image/webp", b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
    }

    #[test]
    fn rejects_mismatches() {
        assert_eq!(image_extension("image/png", SMALL_GIF), None);
        assert_eq!(image_extension("text/plain", b"hello"), None);
        assert_eq!(image_extension("image/webp", b"RIFF\0\0\0\0WAVEfmt "), None);
    }

    #[test]
    fn served_content_types() {
        assert_eq!(content_type_for("a.gif"), mime::IMAGE_GIF);
        assert_eq!(content_type_for("a.webp").essence_str(), "image/webp");
        assert_eq!(content_type_for("a.exe"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn resolve_stays_inside_posts_dir() {
        let storage = MediaStorage::new("/srv/media");
        assert_eq!(
            storage.resolve("posts/a.gif"),
            Some(PathBuf::from("/srv/media/posts/a.gif"))
        );
        assert_eq!(storage.resolve("posts/../secret"), None);
        assert_eq!(storage.resolve("posts/sub/a.gif"), None);
        assert_eq!(storage.resolve("other/a.gif"), None);
    }

    #[tokio::test]
    async fn save_and_remove() {
        let root = std::env::temp_dir().join(format!("postboard-media-{}", Uuid::new_v4()));
        let storage = MediaStorage::new(&root);

        let relative = storage.save_post_image(SMALL_GIF, "gif").await.unwrap();
        let path = storage.resolve(&relative).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), SMALL_GIF);

        storage.remove(&relative).await.unwrap();
        assert!(!path.exists());
        storage.remove(&relative).await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }
}
