//! Represents a short text post on a user's channel page.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: ObjectId,

    /// Author of the post. Immutable after creation.
    pub owner: ObjectId,

    pub content: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
