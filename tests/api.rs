//! End-to-end flows driven through the handlers against an in-memory store
//! and a temp-dir media library.

use axum::Json;
use axum::body::{Bytes, to_bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use vidtube::auth::{self, AuthUser};
use vidtube::handlers::multipart::FormData;
use vidtube::handlers::{
    comment_handlers, dashboard_handlers, like_handlers, playlist_handlers,
    subscription_handlers, tweet_handlers, user_handlers, video_handlers,
};
use vidtube::models::{ObjectId, Subscription, Tweet, User, Video};
use vidtube::services::document_store::{DocumentStore, collections};
use vidtube::services::media_library::{MediaLibrary, ScratchFile};
use vidtube::services::pipeline::Filter;
use vidtube::state::AppState;

struct TestApp {
    state: AppState,
    _media_dir: TempDir,
}

async fn test_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let store = DocumentStore::new(Arc::new(pool));
    store.ensure_schema().await.expect("schema");

    let media_dir = TempDir::new().expect("tempdir");
    let media = MediaLibrary::new(media_dir.path(), "http://localhost:3000");
    media.ensure_layout().await.expect("media layout");

    TestApp {
        state: AppState::new(store, media),
        _media_dir: media_dir,
    }
}

async fn envelope(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json envelope"))
}

async fn seed_user(state: &AppState, username: &str) -> User {
    let now = Utc::now();
    let user = User {
        id: ObjectId::new(),
        fullname: format!("{username} fullname"),
        email: format!("{username}@example.com"),
        username: username.to_string(),
        password: "unusable-hash".to_string(),
        avatar: "http://localhost:3000/media/aa/bb/avatar.png".to_string(),
        cover_image: None,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };
    state
        .store
        .insert(
            collections::USERS,
            &user,
            &User::unique_keys(&user.username, &user.email),
        )
        .await
        .expect("seed user");
    user
}

fn actor(user: &User) -> AuthUser {
    AuthUser {
        user: user.clone(),
        session_id: ObjectId::new(),
    }
}

async fn seed_video(state: &AppState, owner: ObjectId, title: &str, views: i64, offset_secs: i64) -> Video {
    let at = Utc::now() - Duration::hours(1) + Duration::seconds(offset_secs);
    let video = Video {
        id: ObjectId::new(),
        owner,
        video_file: "http://localhost:3000/media/aa/bb/clip.mp4".to_string(),
        thumbnail: "http://localhost:3000/media/aa/bb/thumb.png".to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        duration: 60,
        views,
        is_published: true,
        created_at: at,
        updated_at: at,
    };
    state
        .store
        .insert(collections::VIDEOS, &video, &[])
        .await
        .expect("seed video");
    video
}

fn form(fields: &[(&str, &str)], files: Vec<ScratchFile>) -> FormData {
    FormData {
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        files,
    }
}

fn spool(media: &MediaLibrary, field: &str, file_name: &str, bytes: &[u8]) -> ScratchFile {
    let path = media
        .scratch_dir()
        .join(format!("spool-{}", ObjectId::new()));
    std::fs::write(&path, bytes).expect("spool file");
    ScratchFile {
        field: field.to_string(),
        file_name: file_name.to_string(),
        path,
    }
}

fn scratch_is_empty(media: &MediaLibrary) -> bool {
    std::fs::read_dir(media.scratch_dir())
        .map(|entries| entries.count() == 0)
        .unwrap_or(true)
}

fn handle_of(url: &str) -> String {
    url.split("/media/").nth(1).expect("media url").to_string()
}

// --- Registration -------------------------------------------------------

#[tokio::test]
async fn register_rejects_missing_fields_without_side_effects() {
    let app = test_app().await;
    let avatar = spool(&app.state.media, "avatar", "a.png", b"png");
    let body = form(
        &[
            ("fullname", "   "),
            ("email", "new@example.com"),
            ("username", "newuser"),
            ("password", "pw"),
        ],
        vec![avatar],
    );

    let err = user_handlers::register_user_inner(&app.state, body)
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let users = app
        .state
        .store
        .count(collections::USERS, &Filter::new())
        .await
        .unwrap();
    assert_eq!(users, 0);
    assert!(scratch_is_empty(&app.state.media));
}

#[tokio::test]
async fn register_missing_avatar_is_rejected() {
    let app = test_app().await;
    let body = form(
        &[
            ("fullname", "New User"),
            ("email", "new@example.com"),
            ("username", "NewUser"),
            ("password", "pw"),
        ],
        vec![],
    );
    let err = user_handlers::register_user_inner(&app.state, body)
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.message, "Avatar file is missing");
}

#[tokio::test]
async fn register_creates_user_and_lowercases_username() {
    let app = test_app().await;
    let avatar = spool(&app.state.media, "avatar", "a.png", b"avatar bytes");
    let cover = spool(&app.state.media, "coverImage", "c.png", b"cover bytes");
    let body = form(
        &[
            ("fullname", "New User"),
            ("email", "new@example.com"),
            ("username", "NewUser"),
            ("password", "secret"),
        ],
        vec![avatar, cover],
    );

    let response = user_handlers::register_user_inner(&app.state, body)
        .await
        .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["username"], "newuser");
    assert!(body["data"].get("password").is_none());
    assert!(body["data"]["avatar"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:3000/media/"));

    // Registering the same username again stops at the conflict pre-check.
    let avatar2 = spool(&app.state.media, "avatar", "a2.png", b"other");
    let again = form(
        &[
            ("fullname", "Other"),
            ("email", "other@example.com"),
            ("username", "newuser"),
            ("password", "pw"),
        ],
        vec![avatar2],
    );
    let err = user_handlers::register_user_inner(&app.state, again)
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert!(scratch_is_empty(&app.state.media));
}

#[tokio::test]
async fn losing_the_registration_race_deletes_uploaded_media() {
    let app = test_app().await;
    let existing = seed_user(&app.state, "taken").await;

    // Uploads happened before the storage layer arbitrated the race.
    let avatar_file = spool(&app.state.media, "avatar", "a.png", b"avatar");
    let cover_file = spool(&app.state.media, "coverImage", "c.png", b"cover");
    let avatar = app.state.media.upload(&avatar_file).await.unwrap();
    let cover = app.state.media.upload(&cover_file).await.unwrap();

    let now = Utc::now();
    let loser = User {
        id: ObjectId::new(),
        fullname: "Loser".to_string(),
        email: existing.email.clone(),
        username: "different".to_string(),
        password: "hash".to_string(),
        avatar: avatar.url.clone(),
        cover_image: Some(cover.url.clone()),
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };

    let err = user_handlers::persist_new_user(&app.state, loser, &avatar, Some(&cover))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);

    // Every file uploaded in the failed request is gone again.
    assert!(app
        .state
        .media
        .open(&avatar.deletion_handle)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .state
        .media
        .open(&cover.deletion_handle)
        .await
        .unwrap()
        .is_none());
    let users = app
        .state
        .store
        .count(collections::USERS, &Filter::new())
        .await
        .unwrap();
    assert_eq!(users, 1);
}

// --- Sessions -----------------------------------------------------------

#[tokio::test]
async fn login_refresh_logout_flow() {
    let app = test_app().await;
    let mut user = seed_user(&app.state, "session").await;
    user = app
        .state
        .store
        .update_by_id(
            collections::USERS,
            user.id,
            &json!({ "password": auth::hash_password("secret").unwrap() }),
        )
        .await
        .unwrap()
        .unwrap();

    let err = user_handlers::login_user(
        State(app.state.clone()),
        Json(user_handlers::LoginRequest {
            username: Some("session".to_string()),
            email: None,
            password: "wrong".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);

    let response = user_handlers::login_user(
        State(app.state.clone()),
        Json(user_handlers::LoginRequest {
            username: Some("session".to_string()),
            email: None,
            password: "secret".to_string(),
        }),
    )
    .await
    .unwrap();
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert!(body["data"]["user"].get("password").is_none());

    // Refresh rotates both tokens.
    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&format!("refreshToken={refresh_token}")).unwrap(),
    );
    let response = user_handlers::refresh_access_token(
        State(app.state.clone()),
        headers.clone(),
        Bytes::new(),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh_token);

    // The superseded refresh token no longer resolves.
    let err = user_handlers::refresh_access_token(State(app.state.clone()), headers, Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);

    // Logout clears the stored refresh token and the session.
    let session = auth::issue_session(&app.state.store, user.id).await.unwrap();
    let response = user_handlers::logout_user(
        State(app.state.clone()),
        AuthUser {
            user: user.clone(),
            session_id: session.id,
        },
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    let after: User = app
        .state
        .store
        .find_by_id(collections::USERS, user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.refresh_token, None);
}

#[tokio::test]
async fn change_password_requires_the_old_one() {
    let app = test_app().await;
    let mut user = seed_user(&app.state, "pwchange").await;
    user = app
        .state
        .store
        .update_by_id(
            collections::USERS,
            user.id,
            &json!({ "password": auth::hash_password("old").unwrap() }),
        )
        .await
        .unwrap()
        .unwrap();

    let err = user_handlers::change_current_password(
        State(app.state.clone()),
        actor(&user),
        Json(user_handlers::ChangePasswordRequest {
            old_password: "nope".to_string(),
            new_password: "new".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    user_handlers::change_current_password(
        State(app.state.clone()),
        actor(&user),
        Json(user_handlers::ChangePasswordRequest {
            old_password: "old".to_string(),
            new_password: "new".to_string(),
        }),
    )
    .await
    .unwrap();

    let after: User = app
        .state
        .store
        .find_by_id(collections::USERS, user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(auth::verify_password("new", &after.password));
}

// --- Video feed ---------------------------------------------------------

fn videos_query(page: Option<i64>, limit: Option<i64>) -> video_handlers::VideosQuery {
    video_handlers::VideosQuery {
        page,
        limit,
        query: None,
        sort_by: None,
        sort_type: None,
        user_id: None,
    }
}

#[tokio::test]
async fn video_feed_pagination_scenario() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "creator").await;
    for i in 0..25 {
        seed_video(&app.state, owner.id, &format!("video {i}"), i, i).await;
    }

    let response = video_handlers::get_all_videos(
        State(app.state.clone()),
        Query(videos_query(Some(1), Some(10))),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["docs"].as_array().unwrap().len(), 10);
    assert_eq!(body["data"]["totalDocs"], 25);
    assert_eq!(body["data"]["totalPages"], 3);
    // Newest first by default.
    assert_eq!(body["data"]["docs"][0]["title"], "video 24");
    assert_eq!(body["data"]["docs"][0]["owner"]["username"], "creator");

    // A page past the end is a success with zero items.
    let response = video_handlers::get_all_videos(
        State(app.state.clone()),
        Query(videos_query(Some(4), Some(10))),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["docs"].as_array().unwrap().len(), 0);

    // Zero/negative paging inputs normalize to the defaults.
    let response = video_handlers::get_all_videos(
        State(app.state.clone()),
        Query(videos_query(Some(0), Some(-5))),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["docs"].as_array().unwrap().len(), 10);
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 10);
}

#[tokio::test]
async fn video_feed_filters_and_sorts() {
    let app = test_app().await;
    let alice = seed_user(&app.state, "alice").await;
    let bob = seed_user(&app.state, "bob").await;
    seed_video(&app.state, alice.id, "Learning Rust", 100, 0).await;
    seed_video(&app.state, alice.id, "Cooking pasta", 5, 1).await;
    seed_video(&app.state, bob.id, "RUST speedrun", 50, 2).await;

    // Case-insensitive title search.
    let mut params = videos_query(None, None);
    params.query = Some("rust".to_string());
    let response = video_handlers::get_all_videos(State(app.state.clone()), Query(params))
        .await
        .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["docs"].as_array().unwrap().len(), 2);

    // Owner filter combined with a views sort.
    let mut params = videos_query(None, None);
    params.user_id = Some(alice.id.to_string());
    params.sort_by = Some("views".to_string());
    params.sort_type = Some("asc".to_string());
    let response = video_handlers::get_all_videos(State(app.state.clone()), Query(params))
        .await
        .unwrap();
    let (_, body) = envelope(response).await;
    let docs = body["data"]["docs"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["title"], "Cooking pasta");

    // An unrecognized sort field silently falls back to creation time.
    let mut params = videos_query(None, None);
    params.sort_by = Some("password".to_string());
    let response = video_handlers::get_all_videos(State(app.state.clone()), Query(params))
        .await
        .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);

    // A malformed owner filter is rejected before any query runs.
    let mut params = videos_query(None, None);
    params.user_id = Some("not-an-id".to_string());
    let err = video_handlers::get_all_videos(State(app.state.clone()), Query(params))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.message, "Invalid user ID");
}

#[tokio::test]
async fn video_feed_excludes_dangling_owners() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "real").await;
    seed_video(&app.state, owner.id, "kept", 0, 0).await;
    seed_video(&app.state, ObjectId::new(), "orphaned", 0, 1).await;

    let response =
        video_handlers::get_all_videos(State(app.state.clone()), Query(videos_query(None, None)))
            .await
            .unwrap();
    let (_, body) = envelope(response).await;
    let docs = body["data"]["docs"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["title"], "kept");
}

// --- Video mutations ----------------------------------------------------

#[tokio::test]
async fn publish_update_toggle_delete_video() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "owner").await;
    let intruder = seed_user(&app.state, "intruder").await;

    let body = form(
        &[("title", "My clip"), ("description", "about things")],
        vec![
            spool(&app.state.media, "videoFile", "clip.mp4", b"mp4 bytes"),
            spool(&app.state.media, "thumbnail", "thumb.png", b"png bytes"),
        ],
    );
    let response = video_handlers::publish_video_inner(&app.state, actor(&owner), body)
        .await
        .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    let video_id = body["data"]["id"].as_str().unwrap().to_string();
    let video_url = body["data"]["videoFile"].as_str().unwrap().to_string();
    assert!(
        app.state
            .media
            .open(&handle_of(&video_url))
            .await
            .unwrap()
            .is_some()
    );

    // Non-owner updates are forbidden; the spooled thumbnail never lands.
    let err = video_handlers::update_video_inner(
        &app.state,
        actor(&intruder),
        &video_id,
        form(
            &[("title", "hijacked"), ("description", "nope")],
            vec![spool(&app.state.media, "thumbnail", "t.png", b"x")],
        ),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    let response = video_handlers::update_video_inner(
        &app.state,
        actor(&owner),
        &video_id,
        form(
            &[("title", "Renamed"), ("description", "still mine")],
            vec![spool(&app.state.media, "thumbnail", "new.png", b"new thumb")],
        ),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Renamed");

    // Publish toggle flips and flips back.
    let response = video_handlers::toggle_publish_status(
        State(app.state.clone()),
        actor(&owner),
        Path(video_id.clone()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["isPublished"], false);
    let response = video_handlers::toggle_publish_status(
        State(app.state.clone()),
        actor(&owner),
        Path(video_id.clone()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["isPublished"], true);

    let response = video_handlers::delete_video(
        State(app.state.clone()),
        actor(&owner),
        Path(video_id.clone()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);

    let err = video_handlers::delete_video(
        State(app.state.clone()),
        actor(&owner),
        Path(video_id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

// --- Comments -----------------------------------------------------------

#[tokio::test]
async fn comment_flow_with_ownership() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "commenter").await;
    let intruder = seed_user(&app.state, "lurker").await;
    let video = seed_video(&app.state, owner.id, "target", 0, 0).await;

    let err = comment_handlers::add_comment(
        State(app.state.clone()),
        actor(&owner),
        Path("bogus".to_string()),
        Json(comment_handlers::CommentBody {
            content: "hi".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let err = comment_handlers::add_comment(
        State(app.state.clone()),
        actor(&owner),
        Path(video.id.to_string()),
        Json(comment_handlers::CommentBody {
            content: "   ".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.message, "Content cannot be empty");

    let response = comment_handlers::add_comment(
        State(app.state.clone()),
        actor(&owner),
        Path(video.id.to_string()),
        Json(comment_handlers::CommentBody {
            content: "first!".to_string(),
        }),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = comment_handlers::get_video_comments(
        State(app.state.clone()),
        Path(video.id.to_string()),
        Query(comment_handlers::CommentsQuery {
            page: None,
            limit: None,
        }),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    let docs = body["data"]["docs"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["owner"]["username"], "commenter");
    assert!(docs[0]["owner"].get("password").is_none());

    let err = comment_handlers::update_comment(
        State(app.state.clone()),
        actor(&intruder),
        Path(comment_id.clone()),
        Json(comment_handlers::CommentBody {
            content: "defaced".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    comment_handlers::update_comment(
        State(app.state.clone()),
        actor(&owner),
        Path(comment_id.clone()),
        Json(comment_handlers::CommentBody {
            content: "edited".to_string(),
        }),
    )
    .await
    .unwrap();

    comment_handlers::delete_comment(
        State(app.state.clone()),
        actor(&owner),
        Path(comment_id),
    )
    .await
    .unwrap();
    let remaining = app
        .state
        .store
        .count(collections::COMMENTS, &Filter::new())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

// --- Tweets -------------------------------------------------------------

#[tokio::test]
async fn tweet_flow_with_ownership() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "tweeter").await;
    let intruder = seed_user(&app.state, "reply-guy").await;

    let response = tweet_handlers::create_tweet(
        State(app.state.clone()),
        actor(&owner),
        Json(tweet_handlers::TweetBody {
            content: "hello world".to_string(),
        }),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    let tweet_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = tweet_handlers::get_user_tweets(
        State(app.state.clone()),
        Path(owner.id.to_string()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"][0]["ownerDetails"], "tweeter");

    // A user with no tweets reads as 404 (observed upstream behavior).
    let err = tweet_handlers::get_user_tweets(
        State(app.state.clone()),
        Path(intruder.id.to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);

    // Updates are ownership-gated.
    let err = tweet_handlers::update_tweet(
        State(app.state.clone()),
        actor(&intruder),
        Path(tweet_id.clone()),
        Json(tweet_handlers::TweetBody {
            content: "mine now".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    // A missing tweet is a 404 before any ownership comparison.
    let err = tweet_handlers::update_tweet(
        State(app.state.clone()),
        actor(&intruder),
        Path(ObjectId::new().to_string()),
        Json(tweet_handlers::TweetBody {
            content: "ghost".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);

    tweet_handlers::delete_tweet(
        State(app.state.clone()),
        actor(&owner),
        Path(tweet_id),
    )
    .await
    .unwrap();
    let remaining: Vec<Tweet> = app
        .state
        .store
        .find(collections::TWEETS, &Filter::new(), false)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

// --- Likes --------------------------------------------------------------

#[tokio::test]
async fn like_toggle_sequence_is_idempotent() {
    let app = test_app().await;
    let user = seed_user(&app.state, "liker").await;
    let video = seed_video(&app.state, user.id, "likeable", 0, 0).await;

    let like_filter = Filter::new().eq("likedBy", user.id);

    // on / off / on
    let response = like_handlers::toggle_video_like(
        State(app.state.clone()),
        actor(&user),
        Path(video.id.to_string()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        app.state.store.count(collections::LIKES, &like_filter).await.unwrap(),
        1
    );

    let response = like_handlers::toggle_video_like(
        State(app.state.clone()),
        actor(&user),
        Path(video.id.to_string()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.state.store.count(collections::LIKES, &like_filter).await.unwrap(),
        0
    );

    let response = like_handlers::toggle_video_like(
        State(app.state.clone()),
        actor(&user),
        Path(video.id.to_string()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        app.state.store.count(collections::LIKES, &like_filter).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn liked_videos_listing() {
    let app = test_app().await;
    let user = seed_user(&app.state, "watcher").await;
    let video = seed_video(&app.state, user.id, "favorite", 0, 0).await;

    // Nothing liked yet: an empty 404 envelope, not a hard error.
    let response = like_handlers::get_liked_videos(State(app.state.clone()), actor(&user))
        .await
        .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["success"], false);

    like_handlers::toggle_video_like(
        State(app.state.clone()),
        actor(&user),
        Path(video.id.to_string()),
    )
    .await
    .unwrap();

    let response = like_handlers::get_liked_videos(State(app.state.clone()), actor(&user))
        .await
        .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["video"]["title"], "favorite");
}

// --- Subscriptions ------------------------------------------------------

#[tokio::test]
async fn subscription_toggle_and_counts() {
    let app = test_app().await;
    let fan = seed_user(&app.state, "fan").await;
    let channel = seed_user(&app.state, "channel").await;

    let response = subscription_handlers::toggle_subscription(
        State(app.state.clone()),
        actor(&fan),
        Path(channel.id.to_string()),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["channel"]["username"], "channel");
    assert_eq!(body["data"]["subscriber"]["username"], "fan");

    let response = subscription_handlers::get_channel_subscribers(
        State(app.state.clone()),
        Path(channel.id.to_string()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["subscriberCount"], 1);

    let response = subscription_handlers::get_subscribed_channels(
        State(app.state.clone()),
        Path(fan.id.to_string()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["subscribedChannelCount"], 1);

    // Toggling again unsubscribes.
    let response = subscription_handlers::toggle_subscription(
        State(app.state.clone()),
        actor(&fan),
        Path(channel.id.to_string()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    let remaining: Vec<Subscription> = app
        .state
        .store
        .find(collections::SUBSCRIPTIONS, &Filter::new(), false)
        .await
        .unwrap();
    assert!(remaining.is_empty());

    // Self-subscription is not guarded against.
    let response = subscription_handlers::toggle_subscription(
        State(app.state.clone()),
        actor(&channel),
        Path(channel.id.to_string()),
    )
    .await
    .unwrap();
    let (status, _) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
}

// --- Playlists ----------------------------------------------------------

#[tokio::test]
async fn playlist_flow() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "curator").await;
    let intruder = seed_user(&app.state, "grabber").await;
    let video = seed_video(&app.state, owner.id, "track one", 0, 0).await;

    let err = playlist_handlers::create_playlist(
        State(app.state.clone()),
        actor(&owner),
        Json(playlist_handlers::PlaylistBody {
            name: "  ".to_string(),
            description: "d".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let response = playlist_handlers::create_playlist(
        State(app.state.clone()),
        actor(&owner),
        Json(playlist_handlers::PlaylistBody {
            name: "Mix".to_string(),
            description: "favorites".to_string(),
        }),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::CREATED);
    let playlist_id = body["data"]["id"].as_str().unwrap().to_string();

    playlist_handlers::add_video_to_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path((video.id.to_string(), playlist_id.clone())),
    )
    .await
    .unwrap();

    // Duplicates are rejected.
    let err = playlist_handlers::add_video_to_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path((video.id.to_string(), playlist_id.clone())),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.message, "Video already exists in the playlist");

    // Non-owners cannot grow the playlist.
    let err = playlist_handlers::add_video_to_playlist(
        State(app.state.clone()),
        actor(&intruder),
        Path((video.id.to_string(), playlist_id.clone())),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    // The joined read shows the video and a credential-free owner.
    let response = playlist_handlers::get_playlist_by_id(
        State(app.state.clone()),
        Path(playlist_id.clone()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"]["videos"][0]["title"], "track one");
    assert!(body["data"]["owner"].get("password").is_none());

    let response = playlist_handlers::get_user_playlists(
        State(app.state.clone()),
        Path(owner.id.to_string()),
    )
    .await
    .unwrap();
    let (_, body) = envelope(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Removing a video that is not present is a 404.
    let err = playlist_handlers::remove_video_from_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path((ObjectId::new().to_string(), playlist_id.clone())),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);

    playlist_handlers::remove_video_from_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path((video.id.to_string(), playlist_id.clone())),
    )
    .await
    .unwrap();

    playlist_handlers::update_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path(playlist_id.clone()),
        Json(playlist_handlers::PlaylistBody {
            name: "Mix 2".to_string(),
            description: "still favorites".to_string(),
        }),
    )
    .await
    .unwrap();

    playlist_handlers::delete_playlist(
        State(app.state.clone()),
        actor(&owner),
        Path(playlist_id.clone()),
    )
    .await
    .unwrap();
    let err = playlist_handlers::get_playlist_by_id(
        State(app.state.clone()),
        Path(playlist_id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

// --- Dashboard ----------------------------------------------------------

#[tokio::test]
async fn dashboard_stats_aggregate_the_channel() {
    let app = test_app().await;
    let owner = seed_user(&app.state, "dash").await;
    let fan = seed_user(&app.state, "dashfan").await;
    let v1 = seed_video(&app.state, owner.id, "one", 10, 0).await;
    let v2 = seed_video(&app.state, owner.id, "two", 5, 1).await;
    // Another channel's numbers must not bleed in.
    seed_video(&app.state, fan.id, "unrelated", 99, 2).await;

    subscription_handlers::toggle_subscription(
        State(app.state.clone()),
        actor(&fan),
        Path(owner.id.to_string()),
    )
    .await
    .unwrap();

    for video in [&v1, &v2] {
        like_handlers::toggle_video_like(
            State(app.state.clone()),
            actor(&fan),
            Path(video.id.to_string()),
        )
        .await
        .unwrap();
    }

    for (video, n) in [(&v1, 2), (&v2, 1)] {
        for i in 0..n {
            comment_handlers::add_comment(
                State(app.state.clone()),
                actor(&fan),
                Path(video.id.to_string()),
                Json(comment_handlers::CommentBody {
                    content: format!("comment {i}"),
                }),
            )
            .await
            .unwrap();
        }
    }

    let response =
        dashboard_handlers::get_channel_stats(State(app.state.clone()), actor(&owner))
            .await
            .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalVideos"], 2);
    assert_eq!(body["data"]["totalSubscribers"], 1);
    assert_eq!(body["data"]["totalViews"], 15);
    assert_eq!(body["data"]["totalLikes"], 2);
    assert_eq!(body["data"]["totalComments"], 3);

    let response =
        dashboard_handlers::get_channel_videos(State(app.state.clone()), actor(&owner))
            .await
            .unwrap();
    let (_, body) = envelope(response).await;
    let docs = body["data"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    // Newest first.
    assert_eq!(docs[0]["title"], "two");
    assert_eq!(docs[0]["owner"]["username"], "dash");
}

// --- Channel profile ----------------------------------------------------

#[tokio::test]
async fn channel_profile_reports_subscription_counts() {
    let app = test_app().await;
    let fan = seed_user(&app.state, "profilefan").await;
    let channel = seed_user(&app.state, "profilechannel").await;

    subscription_handlers::toggle_subscription(
        State(app.state.clone()),
        actor(&fan),
        Path(channel.id.to_string()),
    )
    .await
    .unwrap();

    let response = user_handlers::get_user_channel_profile(
        State(app.state.clone()),
        actor(&fan),
        Path("ProfileChannel".to_string()),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscribersCount"], 1);
    assert_eq!(body["data"]["channelsSubscribedToCount"], 0);
    assert_eq!(body["data"]["isSubscribed"], true);
    assert!(body["data"].get("password").is_none());

    let err = user_handlers::get_user_channel_profile(
        State(app.state.clone()),
        actor(&fan),
        Path("ghost".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

// --- Account updates ----------------------------------------------------

#[tokio::test]
async fn update_account_enforces_email_uniqueness() {
    let app = test_app().await;
    let user = seed_user(&app.state, "mover").await;
    let other = seed_user(&app.state, "squatter").await;

    let err = user_handlers::update_account_details(
        State(app.state.clone()),
        actor(&user),
        Json(user_handlers::UpdateAccountRequest {
            fullname: "Moved".to_string(),
            email: other.email.clone(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);

    let response = user_handlers::update_account_details(
        State(app.state.clone()),
        actor(&user),
        Json(user_handlers::UpdateAccountRequest {
            fullname: "Moved".to_string(),
            email: "fresh@example.com".to_string(),
        }),
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "fresh@example.com");
    assert_eq!(body["data"]["fullname"], "Moved");
}

#[tokio::test]
async fn avatar_update_replaces_the_url() {
    let app = test_app().await;
    let user = seed_user(&app.state, "face").await;

    let err = user_handlers::update_user_image_inner(
        &app.state,
        actor(&user),
        form(&[], vec![]),
        "avatar",
        "Avatar file is missing",
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let response = user_handlers::update_user_image_inner(
        &app.state,
        actor(&user),
        form(
            &[],
            vec![spool(&app.state.media, "avatar", "new-face.png", b"newer")],
        ),
        "avatar",
        "Avatar file is missing",
    )
    .await
    .unwrap();
    let (status, body) = envelope(response).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["avatar"].as_str().unwrap();
    assert!(url.ends_with(".png"));
    assert_ne!(url, user.avatar);
}
