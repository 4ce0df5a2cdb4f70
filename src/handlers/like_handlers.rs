//! Like handlers: idempotent toggles over the polymorphic like target.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::parse_id;
use crate::models::{Like, LikeTarget, ObjectId, TargetKind};
use crate::services::document_store::{StoreError, collections};
use crate::services::pipeline::{Filter, Lookup, Projection, Stage};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde_json::json;

/// POST /api/v1/likes/toggle/v/{videoId}
pub async fn toggle_video_like(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    let target_id = parse_id(&video_id, "video ID")?;
    toggle_like(&state, &auth, TargetKind::Video, target_id).await
}

/// POST /api/v1/likes/toggle/c/{commentId}
pub async fn toggle_comment_like(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(comment_id): Path<String>,
) -> Result<Response, ApiError> {
    let target_id = parse_id(&comment_id, "comment ID")?;
    toggle_like(&state, &auth, TargetKind::Comment, target_id).await
}

/// POST /api/v1/likes/toggle/t/{tweetId}
pub async fn toggle_tweet_like(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tweet_id): Path<String>,
) -> Result<Response, ApiError> {
    let target_id = parse_id(&tweet_id, "tweet ID")?;
    toggle_like(&state, &auth, TargetKind::Tweet, target_id).await
}

/// The toggle contract: remove the like if it exists, create it otherwise.
///
/// Two concurrent creates for the same `(actor, target)` race at the store's
/// unique key; the loser observes `Duplicate` and reports the like as
/// already present instead of failing.
pub async fn toggle_like(
    state: &AppState,
    auth: &AuthUser,
    kind: TargetKind,
    target_id: ObjectId,
) -> Result<Response, ApiError> {
    let noun = kind.noun();
    let existing: Option<Like> = state
        .store
        .find_one(
            collections::LIKES,
            &Filter::new()
                .eq("likedBy", auth.user.id)
                .eq("kind", noun)
                .eq("targetId", target_id),
        )
        .await?;

    if let Some(like) = existing {
        let _: Option<Like> = state.store.delete_by_id(collections::LIKES, like.id).await?;
        return Ok(respond(
            StatusCode::OK,
            json!({}),
            format!("Like {noun} removed successfully"),
        ));
    }

    let target = LikeTarget { kind, target_id };
    let like = Like {
        id: ObjectId::new(),
        liked_by: auth.user.id,
        target,
        created_at: Utc::now(),
    };
    match state
        .store
        .insert(
            collections::LIKES,
            &like,
            &[Like::unique_key(auth.user.id, target)],
        )
        .await
    {
        Ok(()) => Ok(respond(
            StatusCode::CREATED,
            like,
            format!("Like {noun} successfully"),
        )),
        // Lost a concurrent toggle: the like already exists, which is the
        // state the caller asked for.
        Err(StoreError::Duplicate(_)) => {
            let current: Option<Like> = state
                .store
                .find_one(
                    collections::LIKES,
                    &Filter::new()
                        .eq("likedBy", auth.user.id)
                        .eq("kind", noun)
                        .eq("targetId", target_id),
                )
                .await?;
            Ok(respond(
                StatusCode::OK,
                current,
                format!("Like {noun} already recorded"),
            ))
        }
        Err(err) => {
            tracing::error!("like persistence failed: {err}");
            Err(ApiError::internal(format!(
                "Failed to create like on {noun}"
            )))
        }
    }
}

/// GET /api/v1/likes/videos
pub async fn get_liked_videos(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let stages = [
        Stage::Match(
            Filter::new()
                .eq("likedBy", auth.user.id)
                .eq("kind", TargetKind::Video.noun()),
        ),
        Stage::Lookup(Lookup {
            from: collections::VIDEOS,
            local_field: "targetId".to_string(),
            foreign_field: "id".to_string(),
            as_field: "video".to_string(),
        }),
        Stage::Unwind("video".to_string()),
        Stage::Project(
            Projection::new()
                .field("id")
                .sub_doc("video", &["id", "title", "thumbnail", "owner"]),
        ),
    ];
    let liked = state.store.run_pipeline(collections::LIKES, &stages).await?;

    if liked.is_empty() {
        return Ok(respond(
            StatusCode::NOT_FOUND,
            json!([]),
            "No liked videos found",
        ));
    }

    Ok(respond(
        StatusCode::OK,
        liked,
        "Liked videos retrieved successfully",
    ))
}
