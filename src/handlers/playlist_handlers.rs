//! Playlist handlers: ordered, duplicate-free video collections.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::parse_id;
use crate::models::{ObjectId, Playlist};
use crate::services::document_store::collections;
use crate::services::pipeline::{Filter, Lookup, Projection, Stage};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct PlaylistBody {
    pub name: String,
    pub description: String,
}

/// Join the playlist's videos and owner, then shape the public fields.
fn playlist_stages(filter: Filter) -> Vec<Stage> {
    vec![
        Stage::Match(filter),
        Stage::Lookup(Lookup {
            from: collections::VIDEOS,
            local_field: "videos".to_string(),
            foreign_field: "id".to_string(),
            as_field: "videos".to_string(),
        }),
        Stage::Lookup(Lookup {
            from: collections::USERS,
            local_field: "owner".to_string(),
            foreign_field: "id".to_string(),
            as_field: "owner".to_string(),
        }),
        Stage::Unwind("owner".to_string()),
        Stage::Project(
            Projection::new()
                .field("id")
                .field("name")
                .field("description")
                .field("videos")
                .field("createdAt")
                .field("updatedAt")
                .sub_doc("owner", &["id", "fullname", "username", "email"]),
        ),
    ]
}

/// POST /api/v1/playlist
pub async fn create_playlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PlaylistBody>,
) -> Result<Response, ApiError> {
    let name = body.name.trim();
    let description = body.description.trim();
    if name.is_empty() || description.is_empty() {
        return Err(ApiError::bad_request("Name and description are required"));
    }

    let now = Utc::now();
    let playlist = Playlist {
        id: ObjectId::new(),
        owner: auth.user.id,
        name: name.to_string(),
        description: description.to_string(),
        videos: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .insert(collections::PLAYLISTS, &playlist, &[])
        .await?;

    Ok(respond(
        StatusCode::CREATED,
        playlist,
        "Playlist created successfully",
    ))
}

/// GET /api/v1/playlist/user/{userId}
pub async fn get_user_playlists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let owner = parse_id(&user_id, "user ID")?;
    let playlists = state
        .store
        .run_pipeline(
            collections::PLAYLISTS,
            &playlist_stages(Filter::new().eq("owner", owner)),
        )
        .await?;

    if playlists.is_empty() {
        return Err(ApiError::not_found("No playlists found for this user"));
    }

    Ok(respond(
        StatusCode::OK,
        playlists,
        "Playlists fetched successfully",
    ))
}

/// GET /api/v1/playlist/{playlistId}
pub async fn get_playlist_by_id(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&playlist_id, "playlist ID")?;
    let found = state
        .store
        .run_pipeline(
            collections::PLAYLISTS,
            &playlist_stages(Filter::new().eq("id", id)),
        )
        .await?;
    let playlist = found
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;

    Ok(respond(
        StatusCode::OK,
        playlist,
        "Playlist fetched successfully",
    ))
}

async fn load_owned_playlist(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    forbidden_message: &str,
) -> Result<Playlist, ApiError> {
    let id = parse_id(raw_id, "playlist ID")?;
    let playlist: Playlist = state
        .store
        .find_by_id(collections::PLAYLISTS, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    if playlist.owner != auth.user.id {
        return Err(ApiError::forbidden(forbidden_message));
    }
    Ok(playlist)
}

/// PATCH /api/v1/playlist/add/{videoId}/{playlistId}
pub async fn add_video_to_playlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let video = parse_id(&video_id, "video ID")?;
    let playlist = load_owned_playlist(
        &state,
        &auth,
        &playlist_id,
        "You are not authorized to modify this playlist",
    )
    .await?;

    if playlist.videos.contains(&video) {
        return Err(ApiError::bad_request("Video already exists in the playlist"));
    }

    let mut videos = playlist.videos.clone();
    videos.push(video);
    let updated: Playlist = state
        .store
        .update_by_id(
            collections::PLAYLISTS,
            playlist.id,
            &json!({ "videos": videos }),
        )
        .await?
        .ok_or_else(|| ApiError::internal("Failed to add video to playlist"))?;

    Ok(respond(
        StatusCode::OK,
        updated,
        "Video added to playlist successfully",
    ))
}

/// PATCH /api/v1/playlist/remove/{videoId}/{playlistId}
pub async fn remove_video_from_playlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let video = parse_id(&video_id, "video ID")?;
    let playlist = load_owned_playlist(
        &state,
        &auth,
        &playlist_id,
        "You are not authorized to remove videos from this playlist",
    )
    .await?;

    if !playlist.videos.contains(&video) {
        return Err(ApiError::not_found("Video not found in the playlist"));
    }

    let videos: Vec<ObjectId> = playlist
        .videos
        .iter()
        .copied()
        .filter(|v| *v != video)
        .collect();
    let updated: Playlist = state
        .store
        .update_by_id(
            collections::PLAYLISTS,
            playlist.id,
            &json!({ "videos": videos }),
        )
        .await?
        .ok_or_else(|| ApiError::internal("Failed to remove video from playlist"))?;

    Ok(respond(
        StatusCode::OK,
        updated,
        "Video removed from playlist successfully",
    ))
}

/// PATCH /api/v1/playlist/{playlistId}
pub async fn update_playlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(playlist_id): Path<String>,
    Json(body): Json<PlaylistBody>,
) -> Result<Response, ApiError> {
    let name = body.name.trim();
    let description = body.description.trim();
    if name.is_empty() || description.is_empty() {
        return Err(ApiError::bad_request("Name and description are required"));
    }

    let playlist = load_owned_playlist(
        &state,
        &auth,
        &playlist_id,
        "You are not authorized to update this playlist",
    )
    .await?;

    let updated: Playlist = state
        .store
        .update_by_id(
            collections::PLAYLISTS,
            playlist.id,
            &json!({ "name": name, "description": description }),
        )
        .await?
        .ok_or_else(|| ApiError::internal("Failed to update playlist"))?;

    Ok(respond(
        StatusCode::OK,
        updated,
        "Playlist updated successfully",
    ))
}

/// DELETE /api/v1/playlist/{playlistId}
pub async fn delete_playlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(playlist_id): Path<String>,
) -> Result<Response, ApiError> {
    let playlist = load_owned_playlist(
        &state,
        &auth,
        &playlist_id,
        "You are not authorized to delete this playlist",
    )
    .await?;

    let deleted: Option<Playlist> = state
        .store
        .delete_by_id(collections::PLAYLISTS, playlist.id)
        .await?;
    if deleted.is_none() {
        return Err(ApiError::internal("Failed to delete playlist"));
    }

    Ok(respond(
        StatusCode::OK,
        Value::Null,
        "Playlist deleted successfully",
    ))
}
