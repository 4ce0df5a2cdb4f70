//! Represents an uploaded video and its hosting metadata.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A video document in the `videos` collection.
///
/// The media payload itself lives in the media library; this document only
/// stores the durable URLs handed back at upload time. `owner` is a weak
/// reference to the uploading user.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: ObjectId,

    /// User who published the video. Immutable after creation.
    pub owner: ObjectId,

    /// Durable URL of the video file.
    pub video_file: String,

    /// Durable URL of the thumbnail image.
    pub thumbnail: String,

    pub title: String,

    pub description: String,

    /// Length in whole seconds, derived from the uploaded media.
    pub duration: i64,

    /// View counter.
    pub views: i64,

    pub is_published: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
