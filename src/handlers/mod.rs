//! HTTP handlers, one module per entity controller.
//!
//! Handlers stay thin: validate identifiers and bodies, enforce ownership,
//! call the storage/media collaborators, and shape the response envelope.
//! The authenticated actor always arrives as an explicit [`crate::auth::AuthUser`]
//! argument.

use crate::errors::ApiError;
use crate::models::ObjectId;

pub mod comment_handlers;
pub mod dashboard_handlers;
pub mod health_handlers;
pub mod like_handlers;
pub mod media_handlers;
pub mod multipart;
pub mod playlist_handlers;
pub mod subscription_handlers;
pub mod tweet_handlers;
pub mod user_handlers;
pub mod video_handlers;

/// Validate a request-supplied identifier before any query runs.
/// `label` names the parameter in the 400 message ("video ID", ...).
pub(crate) fn parse_id(raw: &str, label: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse(raw).map_err(|_| ApiError::bad_request(format!("Invalid {label}")))
}
