//! Object key generation.
//!
//! Keys have the form `<kind>/<owner>/<YYYY-MM-DD>/<uuid>.<ext>`. Uniqueness
//! comes from the random UUID; no coordination between publishers is needed.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use reel_models::UserId;

/// Extension every cover object is stored with.
pub const COVER_EXTENSION: &str = "jpg";

/// Class of stored object. Each class lives under its own key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Video,
    Cover,
    Image,
    Audio,
}

impl ObjectKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::Video => "videos",
            ObjectKind::Cover => "covers",
            ObjectKind::Image => "images",
            ObjectKind::Audio => "audios",
        }
    }
}

/// Build an object key for `owner` on `date`.
pub fn object_key(kind: ObjectKind, owner: UserId, date: NaiveDate, ext: &str) -> String {
    let ext = normalize_extension(ext);
    let stem = Uuid::new_v4();
    if ext.is_empty() {
        format!("{}/{}/{}/{}", kind.prefix(), owner, date.format("%Y-%m-%d"), stem)
    } else {
        format!(
            "{}/{}/{}/{}.{}",
            kind.prefix(),
            owner,
            date.format("%Y-%m-%d"),
            stem,
            ext
        )
    }
}

/// Key for a primary video asset, dated today (UTC).
pub fn video_object_key(owner: UserId, ext: &str) -> String {
    object_key(ObjectKind::Video, owner, Utc::now().date_naive(), ext)
}

/// Key for a cover image, dated today (UTC).
pub fn cover_object_key(owner: UserId) -> String {
    object_key(ObjectKind::Cover, owner, Utc::now().date_naive(), COVER_EXTENSION)
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
