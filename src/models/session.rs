//! Represents a live access-token session.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session document in the `sessions` collection.
///
/// One document per issued access token. Expired sessions are rejected at
/// the auth boundary; they are not actively garbage-collected.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: ObjectId,

    /// Opaque access token presented by the client.
    pub token: String,

    pub user: ObjectId,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}
