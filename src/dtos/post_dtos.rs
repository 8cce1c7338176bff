use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::group::Group;
use crate::services::media_service::image_extension;

pub const REQUIRED: &str = "This field is required.";
pub const IMAGE_CONTRADICTION: &str =
    "Please either submit a file or check the clear checkbox, not both.";

/// Label and help text rendered next to a form field.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldMeta {
    pub label: &'static str,
    pub help_text: &'static str,
}

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// A file field as it arrived in a multipart body.
#[derive(Debug, Clone, Default)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Set when the body exceeded the upload limit and was truncated.
    pub too_large: bool,
}

/// Create/edit form for a post, bound from `group`, `text`, `image` and
/// the `image-clear` checkbox.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostForm {
    pub text: String,
    /// Raw group id as submitted; empty means "no group".
    pub group: String,
    #[serde(skip)]
    pub image: Option<UploadedImage>,
    #[serde(skip)]
    pub clear_image: bool,
}

/// Outcome of a valid [`PostForm`].
#[derive(Debug, Clone)]
pub struct ValidPost {
    pub text: String,
    pub group_id: Option<i32>,
    /// Image bytes with the file extension to store them under.
    pub image: Option<(Vec<u8>, &'static str)>,
    pub clear_image: bool,
}

impl PostForm {
    pub fn fields() -> BTreeMap<&'static str, FieldMeta> {
        BTreeMap::from([
            ("text", FieldMeta { label: "Text", help_text: "Post text" }),
            ("group", FieldMeta { label: "Group", help_text: "Link to group" }),
            ("image", FieldMeta { label: "", help_text: "" }),
        ])
    }

    /// Pre-fills the form for editing.
    pub fn from_post(post: &crate::models::post::Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group.as_ref().map(|g| g.id.to_string()).unwrap_or_default(),
            image: None,
            clear_image: false,
        }
    }

    /// Checks the submitted values against the available groups.
    pub fn validate(&self, groups: &[Group]) -> Result<ValidPost, FormErrors> {
        let mut errors = FormErrors::default();

        let text = self.text.trim();
        if text.is_empty() {
            errors.add("text", REQUIRED);
        }

        let group_id = match self.group.trim() {
            "" => None,
            raw => match raw.parse::<i32>() {
                Ok(id) if groups.iter().any(|g| g.id == id) => Some(id),
                _ => {
                    errors.add(
                        "group",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            },
        };

        let image = match &self.image {
            Some(_) if self.clear_image => {
                errors.add("image", IMAGE_CONTRADICTION);
                None
            }
            Some(upload) if upload.too_large => {
                errors.add("image", "The uploaded file is too large.");
                None
            }
            Some(upload) => match image_extension(&upload.content_type, &upload.bytes) {
                Some(ext) => Some((upload.bytes.clone(), ext)),
                None => {
                    errors.add(
                        "image",
                        "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                    );
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidPost {
            text: text.to_string(),
            group_id,
            image,
            clear_image: self.clear_image,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn fields() -> BTreeMap<&'static str, FieldMeta> {
        BTreeMap::from([("text", FieldMeta { label: "Comment", help_text: "Comment text" })])
    }

    pub fn validate(&self) -> Result<String, FormErrors> {
        let text = self.text.trim();
        if text.is_empty() {
            let mut errors = FormErrors::default();
            errors.add("text", REQUIRED);
            return Err(errors);
        }
        Ok(text.to_string())
    }
}
