//! Represents an ordered, duplicate-free collection of videos.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: ObjectId,

    /// User the playlist belongs to. Immutable after creation.
    pub owner: ObjectId,

    pub name: String,

    pub description: String,

    /// Ordered video references. Duplicates are rejected on insert.
    pub videos: Vec<ObjectId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
