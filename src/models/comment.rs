//! Represents a comment left on a video.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: ObjectId,

    /// Author of the comment. Immutable after creation.
    pub owner: ObjectId,

    /// Video the comment was left on.
    pub video: ObjectId,

    /// Non-empty comment text.
    pub content: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
