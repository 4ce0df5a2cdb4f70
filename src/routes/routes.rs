//! Defines routes for all API operations.
//!
//! ## Structure
//! - **Accounts** under `/api/v1/users`: registration, sessions, profile
//!   management, channel profile
//! - **Entities** under `/api/v1/{videos,comments,tweets,likes,playlist,subscriptions}`
//! - **Dashboard** under `/api/v1/dashboard`
//! - **Media** under `/media/{*path}`, streaming stored objects back out
//! - Health endpoints at `/healthz` and `/readyz`
//!
//! The router carries shared state (`AppState`) to all handlers.

use crate::handlers::{
    comment_handlers::{add_comment, delete_comment, get_video_comments, update_comment},
    dashboard_handlers::{get_channel_stats, get_channel_videos},
    health_handlers::{healthz, readyz},
    like_handlers::{get_liked_videos, toggle_comment_like, toggle_tweet_like, toggle_video_like},
    media_handlers::serve_media,
    playlist_handlers::{
        add_video_to_playlist, create_playlist, delete_playlist, get_playlist_by_id,
        get_user_playlists, remove_video_from_playlist, update_playlist,
    },
    subscription_handlers::{
        get_channel_subscribers, get_subscribed_channels, toggle_subscription,
    },
    tweet_handlers::{create_tweet, delete_tweet, get_user_tweets, update_tweet},
    user_handlers::{
        change_current_password, get_current_user, get_user_channel_profile, login_user,
        logout_user, refresh_access_token, register_user, update_account_details,
        update_user_avatar, update_user_cover_image,
    },
    video_handlers::{
        delete_video, get_all_videos, get_video_by_id, publish_video, toggle_publish_status,
        update_video,
    },
};
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};

/// Uploads carry whole video files; the default 2 MB body cap is far too
/// small.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Build and return the router for the whole API surface.
pub fn routes() -> Router<AppState> {
    let users = Router::new()
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/logout", post(logout_user))
        .route("/refresh-token", post(refresh_access_token))
        .route("/change-password", post(change_current_password))
        .route("/current-user", get(get_current_user))
        .route("/update-account", patch(update_account_details))
        .route("/avatar", patch(update_user_avatar))
        .route("/cover-image", patch(update_user_cover_image))
        .route("/c/{username}", get(get_user_channel_profile));

    let videos = Router::new()
        .route("/", get(get_all_videos).post(publish_video))
        .route(
            "/{videoId}",
            get(get_video_by_id).patch(update_video).delete(delete_video),
        )
        .route("/toggle/publish/{videoId}", patch(toggle_publish_status));

    let comments = Router::new()
        .route("/{videoId}", get(get_video_comments).post(add_comment))
        .route("/c/{commentId}", patch(update_comment).delete(delete_comment));

    let tweets = Router::new()
        .route("/", post(create_tweet))
        .route("/user/{userId}", get(get_user_tweets))
        .route("/{tweetId}", patch(update_tweet).delete(delete_tweet));

    let likes = Router::new()
        .route("/toggle/v/{videoId}", post(toggle_video_like))
        .route("/toggle/c/{commentId}", post(toggle_comment_like))
        .route("/toggle/t/{tweetId}", post(toggle_tweet_like))
        .route("/videos", get(get_liked_videos));

    let playlist = Router::new()
        .route("/", post(create_playlist))
        .route("/user/{userId}", get(get_user_playlists))
        .route("/add/{videoId}/{playlistId}", patch(add_video_to_playlist))
        .route(
            "/remove/{videoId}/{playlistId}",
            patch(remove_video_from_playlist),
        )
        .route(
            "/{playlistId}",
            get(get_playlist_by_id)
                .patch(update_playlist)
                .delete(delete_playlist),
        );

    let subscriptions = Router::new()
        .route(
            "/c/{channelId}",
            get(get_channel_subscribers).post(toggle_subscription),
        )
        .route("/u/{subscriberId}", get(get_subscribed_channels));

    let dashboard = Router::new()
        .route("/stats", get(get_channel_stats))
        .route("/videos", get(get_channel_videos));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // stored media
        .route("/media/{*path}", get(serve_media))
        // API surface
        .nest("/api/v1/users", users)
        .nest("/api/v1/videos", videos)
        .nest("/api/v1/comments", comments)
        .nest("/api/v1/tweets", tweets)
        .nest("/api/v1/likes", likes)
        .nest("/api/v1/playlist", playlist)
        .nest("/api/v1/subscriptions", subscriptions)
        .nest("/api/v1/dashboard", dashboard)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
