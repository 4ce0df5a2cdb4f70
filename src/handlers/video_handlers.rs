//! Video handlers: the paginated feed, media-backed publishing, and the
//! ownership-gated mutations.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::multipart::{self, FormData};
use crate::handlers::parse_id;
use crate::models::{ObjectId, Video};
use crate::services::document_store::collections;
use crate::services::feed::{self, FeedQuery};
use crate::services::pipeline::Projection;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

/// Sort fields a client may request on the video feed. Anything else falls
/// back to creation time.
const SORTABLE_FIELDS: &[&str] = &["createdAt", "views", "duration"];

#[derive(Debug, Deserialize)]
pub struct VideosQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub query: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortType")]
    pub sort_type: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// The public field set of a video row in feeds.
fn video_projection() -> Projection {
    Projection::new()
        .field("id")
        .field("videoFile")
        .field("thumbnail")
        .field("title")
        .field("description")
        .field("duration")
        .field("views")
        .field("isPublished")
        .field("createdAt")
        .sub_doc("owner", &["id", "fullname", "username"])
}

/// GET /api/v1/videos
pub async fn get_all_videos(
    State(state): State<AppState>,
    Query(params): Query<VideosQuery>,
) -> Result<Response, ApiError> {
    let mut feed = FeedQuery::new(collections::VIDEOS, video_projection()).sort(
        params.sort_by.as_deref(),
        SORTABLE_FIELDS,
        params.sort_type.as_deref(),
    );
    if let Some(raw) = params.user_id.as_deref() {
        feed = feed.match_id("owner", parse_id(raw, "user ID")?);
    }
    if let Some(query) = params.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        feed = feed.search("title", query);
    }

    let page = feed
        .fetch_page(&state.store, feed::page_request(params.page, params.limit))
        .await?;
    Ok(respond(StatusCode::OK, page, "Videos fetched successfully"))
}

/// POST /api/v1/videos (multipart)
pub async fn publish_video(
    State(state): State<AppState>,
    auth: AuthUser,
    mut body: Multipart,
) -> Result<Response, ApiError> {
    let form = multipart::collect(&mut body, &state.media).await?;
    publish_video_inner(&state, auth, form).await
}

pub async fn publish_video_inner(
    state: &AppState,
    auth: AuthUser,
    form: FormData,
) -> Result<Response, ApiError> {
    let title = form.text("title").map(str::trim).unwrap_or_default();
    let description = form.text("description").map(str::trim).unwrap_or_default();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::bad_request("Title and description are required"));
    }

    let video_file = form
        .file("videoFile")
        .ok_or_else(|| ApiError::bad_request("Video file is required"))?;
    let thumbnail_file = form
        .file("thumbnail")
        .ok_or_else(|| ApiError::bad_request("Thumbnail is required"))?;

    let video_asset = state.media.upload(video_file).await.map_err(|err| {
        tracing::error!("video upload failed: {err}");
        ApiError::internal("Failed to upload video")
    })?;
    let thumbnail_asset = state.media.upload(thumbnail_file).await.map_err(|err| {
        tracing::error!("thumbnail upload failed: {err}");
        ApiError::internal("Failed to upload video")
    })?;

    let now = Utc::now();
    let video = Video {
        id: ObjectId::new(),
        owner: auth.user.id,
        video_file: video_asset.url.clone(),
        thumbnail: thumbnail_asset.url.clone(),
        title: title.to_string(),
        description: description.to_string(),
        duration: video_asset.duration_seconds.unwrap_or(0),
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = state.store.insert(collections::VIDEOS, &video, &[]).await {
        state.media.delete(&video_asset.deletion_handle).await;
        state.media.delete(&thumbnail_asset.deletion_handle).await;
        tracing::error!("video persistence failed: {err}");
        return Err(ApiError::internal(
            "Something went wrong while creating video",
        ));
    }

    Ok(respond(
        StatusCode::CREATED,
        video,
        "Video created successfully",
    ))
}

/// GET /api/v1/videos/{videoId}
pub async fn get_video_by_id(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&video_id, "video ID")?;
    let found = FeedQuery::new(collections::VIDEOS, video_projection())
        .match_id("id", id)
        .fetch_all(&state.store)
        .await?;
    let video = found
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(respond(StatusCode::OK, video, "Video fetched successfully"))
}

/// Existence strictly before authorization: 404 for a missing video, 403
/// for somebody else's.
async fn load_owned_video(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    forbidden_message: &str,
) -> Result<Video, ApiError> {
    let id = parse_id(raw_id, "video ID")?;
    let video: Video = state
        .store
        .find_by_id(collections::VIDEOS, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    if video.owner != auth.user.id {
        return Err(ApiError::forbidden(forbidden_message));
    }
    Ok(video)
}

/// PATCH /api/v1/videos/{videoId} (multipart: title, description, thumbnail)
pub async fn update_video(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<String>,
    mut body: Multipart,
) -> Result<Response, ApiError> {
    let form = multipart::collect(&mut body, &state.media).await?;
    update_video_inner(&state, auth, &video_id, form).await
}

pub async fn update_video_inner(
    state: &AppState,
    auth: AuthUser,
    video_id: &str,
    form: FormData,
) -> Result<Response, ApiError> {
    let title = form.text("title").map(str::trim).unwrap_or_default();
    let description = form.text("description").map(str::trim).unwrap_or_default();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::bad_request("Title and description are required"));
    }

    let video = load_owned_video(
        state,
        &auth,
        video_id,
        "You are not authorized to update this video",
    )
    .await?;

    let thumbnail_file = form
        .file("thumbnail")
        .ok_or_else(|| ApiError::bad_request("Thumbnail is required"))?;
    let thumbnail_asset = state.media.upload(thumbnail_file).await.map_err(|err| {
        tracing::error!("thumbnail upload failed: {err}");
        ApiError::internal("Failed to upload thumbnail")
    })?;

    let patch = json!({
        "title": title,
        "description": description,
        "thumbnail": thumbnail_asset.url,
    });
    let updated = state
        .store
        .update_by_id::<Video>(collections::VIDEOS, video.id, &patch)
        .await;
    match updated {
        Ok(Some(video)) => Ok(respond(
            StatusCode::OK,
            json!({
                "id": video.id,
                "title": video.title,
                "description": video.description,
                "thumbnail": video.thumbnail,
            }),
            "Video updated successfully",
        )),
        Ok(None) => {
            state.media.delete(&thumbnail_asset.deletion_handle).await;
            Err(ApiError::not_found("Video not found"))
        }
        Err(err) => {
            state.media.delete(&thumbnail_asset.deletion_handle).await;
            Err(err.into())
        }
    }
}

/// DELETE /api/v1/videos/{videoId}
pub async fn delete_video(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    let video = load_owned_video(
        &state,
        &auth,
        &video_id,
        "You are not authorized to delete this video",
    )
    .await?;

    let deleted: Option<Video> = state
        .store
        .delete_by_id(collections::VIDEOS, video.id)
        .await?;
    if deleted.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    Ok(respond(
        StatusCode::OK,
        serde_json::Value::Null,
        "Video deleted successfully",
    ))
}

/// PATCH /api/v1/videos/toggle/publish/{videoId}
pub async fn toggle_publish_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<String>,
) -> Result<Response, ApiError> {
    let video = load_owned_video(
        &state,
        &auth,
        &video_id,
        "You are not authorized to modify this video",
    )
    .await?;

    let video: Video = state
        .store
        .update_by_id(
            collections::VIDEOS,
            video.id,
            &json!({ "isPublished": !video.is_published }),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    let publish_status = json!({
        "id": video.id,
        "owner": video.owner,
        "title": video.title,
        "description": video.description,
        "isPublished": video.is_published,
    });
    Ok(respond(
        StatusCode::OK,
        publish_status,
        "Video publish status toggled successfully",
    ))
}
