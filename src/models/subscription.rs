//! Represents one user subscribing to another user's channel.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscription document in the `subscriptions` collection.
///
/// At most one subscription may exist per `(subscriber, channel)` pair,
/// enforced by the storage layer through [`Subscription::unique_key`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: ObjectId,

    pub subscriber: ObjectId,

    /// The channel (user) being subscribed to.
    pub channel: ObjectId,

    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn unique_key(subscriber: ObjectId, channel: ObjectId) -> String {
        format!("{subscriber}:{channel}")
    }
}
