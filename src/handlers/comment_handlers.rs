//! Comment handlers: the per-video paginated feed plus ownership-gated
//! mutations.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::parse_id;
use crate::models::{Comment, ObjectId};
use crate::services::document_store::collections;
use crate::services::feed::{self, FeedQuery};
use crate::services::pipeline::Projection;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

fn comment_projection() -> Projection {
    Projection::new()
        .field("id")
        .field("content")
        .field("createdAt")
        .sub_doc("owner", &["id", "fullname", "username"])
}

/// GET /api/v1/comments/{videoId}
pub async fn get_video_comments(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(params): Query<CommentsQuery>,
) -> Result<Response, ApiError> {
    let id = parse_id(&video_id, "video ID")?;
    let page = FeedQuery::new(collections::COMMENTS, comment_projection())
        .match_id("video", id)
        .fetch_page(&state.store, feed::page_request(params.page, params.limit))
        .await?;
    Ok(respond(StatusCode::OK, page, "Comments fetched successfully"))
}

/// POST /api/v1/comments/{videoId}
pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Response, ApiError> {
    let video = parse_id(&video_id, "video ID")?;
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    let now = Utc::now();
    let comment = Comment {
        id: ObjectId::new(),
        owner: auth.user.id,
        video,
        content: content.to_string(),
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .insert(collections::COMMENTS, &comment, &[])
        .await?;

    Ok(respond(
        StatusCode::CREATED,
        comment,
        "Comment added successfully",
    ))
}

async fn load_owned_comment(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    forbidden_message: &str,
) -> Result<Comment, ApiError> {
    let id = parse_id(raw_id, "comment ID")?;
    let comment: Comment = state
        .store
        .find_by_id(collections::COMMENTS, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.owner != auth.user.id {
        return Err(ApiError::forbidden(forbidden_message));
    }
    Ok(comment)
}

/// PATCH /api/v1/comments/c/{commentId}
pub async fn update_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(comment_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Response, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    let comment = load_owned_comment(
        &state,
        &auth,
        &comment_id,
        "You are not authorized to update this comment",
    )
    .await?;

    let updated: Comment = state
        .store
        .update_by_id(
            collections::COMMENTS,
            comment.id,
            &json!({ "content": content }),
        )
        .await?
        .ok_or_else(|| ApiError::internal("Failed to update comment"))?;

    Ok(respond(
        StatusCode::OK,
        updated,
        "Comment updated successfully",
    ))
}

/// DELETE /api/v1/comments/c/{commentId}
pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(comment_id): Path<String>,
) -> Result<Response, ApiError> {
    let comment = load_owned_comment(
        &state,
        &auth,
        &comment_id,
        "You are not authorized to delete this comment",
    )
    .await?;

    let deleted: Option<Comment> = state
        .store
        .delete_by_id(collections::COMMENTS, comment.id)
        .await?;
    if deleted.is_none() {
        return Err(ApiError::internal("Failed to delete comment"));
    }

    Ok(respond(
        StatusCode::OK,
        json!({}),
        "Comment deleted successfully",
    ))
}
