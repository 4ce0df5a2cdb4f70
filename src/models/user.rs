//! Represents a registered account, which doubles as a channel.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user document as persisted in the `users` collection.
///
/// `password` holds the argon2 hash and `refresh_token` the server-side
/// session material; neither may ever reach a response body. Use
/// [`UserPublic`] for anything client-facing.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: ObjectId,

    pub fullname: String,

    pub email: String,

    /// Unique handle, always stored lower-cased.
    pub username: String,

    /// Argon2 password hash.
    pub password: String,

    /// Durable URL of the avatar image.
    pub avatar: String,

    /// Durable URL of the cover image, if one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    /// Opaque refresh token persisted while a session is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// The client-visible projection of a [`User`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: ObjectId,
    pub fullname: String,
    pub email: String,
    pub username: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            cover_image: user.cover_image.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl User {
    /// Unique keys enforced by the storage layer for this document.
    pub fn unique_keys(username: &str, email: &str) -> Vec<String> {
        vec![format!("username:{username}"), format!("email:{email}")]
    }
}
