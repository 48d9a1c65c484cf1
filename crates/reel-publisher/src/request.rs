//! Upload request accepted by the publish path.

use std::fmt;
use std::path::Path;

use validator::Validate;

use reel_models::UserId;

/// Longest title the metadata row can hold, in characters.
pub const MAX_TITLE_CHARS: usize = 128;

/// Longest description the metadata row can hold, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 255;

/// A video upload forwarded by the HTTP layer.
#[derive(Clone, Validate)]
pub struct UploadRequest {
    /// Authenticated uploader
    #[validate(range(min = 1, message = "User id must be positive"))]
    pub user_id: UserId,

    /// Original filename of the upload
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub file_name: String,

    /// Raw asset bytes
    #[validate(length(min = 1, message = "Upload is empty"))]
    pub bytes: Vec<u8>,

    /// MIME type declared by the client
    pub content_type: Option<String>,

    #[validate(length(max = 128, message = "Title must be at most 128 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 255, message = "Description must be at most 255 characters"))]
    pub description: Option<String>,

    #[validate(nested)]
    pub cover: Option<CoverUpload>,
}

/// Optional cover image sent with the upload.
#[derive(Clone, Validate)]
pub struct CoverUpload {
    #[validate(length(min = 1, message = "Cover is empty"))]
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(user_id: UserId, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            user_id,
            file_name: file_name.into(),
            bytes,
            content_type: None,
            title: None,
            description: None,
            cover: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cover(mut self, bytes: Vec<u8>) -> Self {
        self.cover = Some(CoverUpload { bytes });
        self
    }

    /// Lowercased extension of the uploaded filename, without the dot.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Title to store: the caller's, or the filename when none was given.
    pub fn effective_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => self.file_name.chars().take(MAX_TITLE_CHARS).collect(),
        }
    }

    /// Declared content type, else guessed from the filename.
    pub fn effective_content_type(&self) -> String {
        self.content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            })
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("user_id", &self.user_id)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("cover_bytes", &self.cover.as_ref().map(|c| c.bytes.len()))
            .finish()
    }
}

impl fmt::Debug for CoverUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverUpload")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_falls_back_to_filename() {
        let req = UploadRequest::new(1, "holiday.MP4", vec![1]);
        assert_eq!(req.effective_title(), "holiday.MP4");

        let req = req.with_title("   ");
        assert_eq!(req.effective_title(), "holiday.MP4");

        let req = UploadRequest::new(1, "a.mp4", vec![1]).with_title("Beach");
        assert_eq!(req.effective_title(), "Beach");
    }

    #[test]
    fn test_long_filename_title_is_truncated() {
        let name = format!("{}.mp4", "x".repeat(300));
        let req = UploadRequest::new(1, name, vec![1]);
        assert_eq!(req.effective_title().chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_extension_and_content_type() {
        let req = UploadRequest::new(1, "clip.MP4", vec![1]);
        assert_eq!(req.extension(), "mp4");
        assert_eq!(req.effective_content_type(), "video/mp4");

        let req = UploadRequest::new(1, "noext", vec![1]);
        assert_eq!(req.extension(), "");
        assert_eq!(req.effective_content_type(), "application/octet-stream");

        let req = UploadRequest::new(1, "clip.mp4", vec![1]).with_content_type("video/quicktime");
        assert_eq!(req.effective_content_type(), "video/quicktime");
    }

    #[test]
    fn test_validation() {
        assert!(UploadRequest::new(1, "a.mp4", vec![1]).validate().is_ok());
        assert!(UploadRequest::new(0, "a.mp4", vec![1]).validate().is_err());
        assert!(UploadRequest::new(1, "", vec![1]).validate().is_err());
        assert!(UploadRequest::new(1, "a.mp4", vec![]).validate().is_err());
        assert!(UploadRequest::new(1, "a.mp4", vec![1])
            .with_title("t".repeat(129))
            .validate()
            .is_err());
        assert!(UploadRequest::new(1, "a.mp4", vec![1])
            .with_description("d".repeat(256))
            .validate()
            .is_err());
        assert!(UploadRequest::new(1, "a.mp4", vec![1])
            .with_cover(vec![])
            .validate()
            .is_err());
    }
}
