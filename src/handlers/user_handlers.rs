//! Account handlers: registration, sessions, profile management, and the
//! public channel profile.

use crate::auth::{
    self, ACCESS_COOKIE, ACCESS_TTL_SECS, AuthUser, REFRESH_COOKIE, REFRESH_TTL_SECS,
};
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::multipart::{self, FormData};
use crate::models::{ObjectId, User, UserPublic};
use crate::services::document_store::{StoreError, collections};
use crate::services::media_library::MediaAsset;
use crate::services::pipeline::Filter;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub fullname: String,
    pub email: String,
}

/// POST /api/v1/users/register (multipart)
pub async fn register_user(
    State(state): State<AppState>,
    mut body: Multipart,
) -> Result<Response, ApiError> {
    let form = multipart::collect(&mut body, &state.media).await?;
    register_user_inner(&state, form).await
}

pub async fn register_user_inner(state: &AppState, form: FormData) -> Result<Response, ApiError> {
    let fullname = required_text(&form, "fullname")?;
    let email = required_text(&form, "email")?;
    let username = required_text(&form, "username")?.to_lowercase();
    let password = required_text(&form, "password")?;

    let by_username: Option<User> = state
        .store
        .find_one(collections::USERS, &Filter::new().eq("username", username.clone()))
        .await?;
    let by_email: Option<User> = state
        .store
        .find_one(collections::USERS, &Filter::new().eq("email", email.clone()))
        .await?;
    if by_username.is_some() || by_email.is_some() {
        return Err(ApiError::conflict(
            "User with email or username already exists",
        ));
    }

    let avatar_file = form
        .file("avatar")
        .ok_or_else(|| ApiError::bad_request("Avatar file is missing"))?;
    let avatar = state.media.upload(avatar_file).await.map_err(|err| {
        tracing::error!("avatar upload failed: {err}");
        ApiError::internal("Failed to upload avatar image")
    })?;

    let cover = match form.file("coverImage") {
        Some(file) => Some(state.media.upload(file).await.map_err(|err| {
            tracing::error!("cover image upload failed: {err}");
            ApiError::internal("Failed to upload cover image")
        })?),
        None => None,
    };

    let password_hash = auth::hash_password(&password)?;
    let now = Utc::now();
    let user = User {
        id: ObjectId::new(),
        fullname,
        email,
        username,
        password: password_hash,
        avatar: avatar.url.clone(),
        cover_image: cover.as_ref().map(|c| c.url.clone()),
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };

    let created = persist_new_user(state, user, &avatar, cover.as_ref()).await?;
    Ok(respond(
        StatusCode::CREATED,
        created,
        "User created successfully",
    ))
}

/// Persist a fully validated registration.
///
/// If the storage layer rejects the document (a racing registration won the
/// unique keys, or the write failed outright), every file uploaded for this
/// request is deleted from the media library before the error surfaces.
pub async fn persist_new_user(
    state: &AppState,
    user: User,
    avatar: &MediaAsset,
    cover: Option<&MediaAsset>,
) -> Result<UserPublic, ApiError> {
    let keys = User::unique_keys(&user.username, &user.email);
    match state.store.insert(collections::USERS, &user, &keys).await {
        Ok(()) => Ok(UserPublic::from(&user)),
        Err(err) => {
            state.media.delete(&avatar.deletion_handle).await;
            if let Some(cover) = cover {
                state.media.delete(&cover.deletion_handle).await;
            }
            match err {
                StoreError::Duplicate(_) => Err(ApiError::conflict(
                    "User with email or username already exists",
                )),
                other => {
                    tracing::error!("user persistence failed: {other}");
                    Err(ApiError::internal(
                        "Something went wrong while registering a user",
                    ))
                }
            }
        }
    }
}

/// POST /api/v1/users/login
pub async fn login_user(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user: Option<User> = match (&body.username, &body.email) {
        (Some(username), _) if !username.trim().is_empty() => {
            state
                .store
                .find_one(
                    collections::USERS,
                    &Filter::new().eq("username", username.trim().to_lowercase()),
                )
                .await?
        }
        (_, Some(email)) if !email.trim().is_empty() => {
            state
                .store
                .find_one(collections::USERS, &Filter::new().eq("email", email.trim()))
                .await?
        }
        _ => return Err(ApiError::bad_request("Username or email is required")),
    };
    let user = user.ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !auth::verify_password(&body.password, &user.password) {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let refresh_token = auth::generate_token();
    let user: User = state
        .store
        .update_by_id(
            collections::USERS,
            user.id,
            &json!({ "refreshToken": refresh_token }),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    let session = auth::issue_session(&state.store, user.id).await?;

    let data = json!({
        "user": UserPublic::from(&user),
        "accessToken": session.token,
        "refreshToken": refresh_token,
    });
    let mut response = respond(StatusCode::OK, data, "User logged in successfully");
    append_session_cookies(&mut response, &session.token, &refresh_token)?;
    Ok(response)
}

/// POST /api/v1/users/logout
pub async fn logout_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let _: Option<crate::models::Session> = state
        .store
        .delete_by_id(collections::SESSIONS, auth.session_id)
        .await?;
    let _: Option<User> = state
        .store
        .update_by_id(
            collections::USERS,
            auth.user.id,
            &json!({ "refreshToken": null }),
        )
        .await?;

    let mut response = respond(StatusCode::OK, json!({}), "User logged out successfully");
    clear_session_cookies(&mut response)?;
    Ok(response)
}

/// POST /api/v1/users/refresh-token
///
/// Accepts the refresh token from the cookie or the JSON body and rotates
/// both tokens. The body is optional, so it is parsed leniently from the
/// raw bytes instead of through the `Json` extractor.
pub async fn refresh_access_token(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    let incoming = auth::read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| {
            serde_json::from_slice::<RefreshRequest>(&body)
                .ok()
                .and_then(|b| b.refresh_token)
        })
        .ok_or_else(|| ApiError::unauthorized("Refresh token is required"))?;

    let user: User = state
        .store
        .find_one(
            collections::USERS,
            &Filter::new().eq("refreshToken", incoming),
        )
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    let refresh_token = auth::generate_token();
    let _: Option<User> = state
        .store
        .update_by_id(
            collections::USERS,
            user.id,
            &json!({ "refreshToken": refresh_token }),
        )
        .await?;
    let session = auth::issue_session(&state.store, user.id).await?;

    let data = json!({
        "accessToken": session.token,
        "refreshToken": refresh_token,
    });
    let mut response = respond(StatusCode::OK, data, "Access token refreshed");
    append_session_cookies(&mut response, &session.token, &refresh_token)?;
    Ok(response)
}

/// POST /api/v1/users/change-password
pub async fn change_current_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    if !auth::verify_password(&body.old_password, &auth.user.password) {
        return Err(ApiError::bad_request("Invalid old password"));
    }
    if body.new_password.trim().is_empty() {
        return Err(ApiError::bad_request("New password is required"));
    }

    let password_hash = auth::hash_password(&body.new_password)?;
    let _: Option<User> = state
        .store
        .update_by_id(
            collections::USERS,
            auth.user.id,
            &json!({ "password": password_hash }),
        )
        .await?;
    Ok(respond(
        StatusCode::OK,
        json!({}),
        "Password changed successfully",
    ))
}

/// GET /api/v1/users/current-user
pub async fn get_current_user(auth: AuthUser) -> Response {
    respond(
        StatusCode::OK,
        UserPublic::from(&auth.user),
        "User fetched successfully",
    )
}

/// PATCH /api/v1/users/update-account
pub async fn update_account_details(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateAccountRequest>,
) -> Result<Response, ApiError> {
    let fullname = body.fullname.trim();
    let email = body.email.trim();
    if fullname.is_empty() || email.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    if email != auth.user.email {
        let taken: Option<User> = state
            .store
            .find_one(collections::USERS, &Filter::new().eq("email", email))
            .await?;
        if taken.is_some() {
            return Err(ApiError::conflict("User with email already exists"));
        }
        state
            .store
            .reset_unique_keys(
                collections::USERS,
                auth.user.id,
                &User::unique_keys(&auth.user.username, email),
            )
            .await?;
    }

    let updated: User = state
        .store
        .update_by_id(
            collections::USERS,
            auth.user.id,
            &json!({ "fullname": fullname, "email": email }),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    Ok(respond(
        StatusCode::OK,
        UserPublic::from(&updated),
        "Account details updated successfully",
    ))
}

/// PATCH /api/v1/users/avatar (multipart)
pub async fn update_user_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    mut body: Multipart,
) -> Result<Response, ApiError> {
    let form = multipart::collect(&mut body, &state.media).await?;
    update_user_image_inner(&state, auth, form, "avatar", "Avatar file is missing").await
}

/// PATCH /api/v1/users/cover-image (multipart)
pub async fn update_user_cover_image(
    State(state): State<AppState>,
    auth: AuthUser,
    mut body: Multipart,
) -> Result<Response, ApiError> {
    let form = multipart::collect(&mut body, &state.media).await?;
    update_user_image_inner(&state, auth, form, "coverImage", "Cover image file is missing").await
}

pub async fn update_user_image_inner(
    state: &AppState,
    auth: AuthUser,
    form: FormData,
    field: &str,
    missing_message: &str,
) -> Result<Response, ApiError> {
    let file = form
        .file(field)
        .ok_or_else(|| ApiError::bad_request(missing_message))?;
    let asset = state.media.upload(file).await.map_err(|err| {
        tracing::error!("image upload failed: {err}");
        ApiError::internal("Failed to upload image")
    })?;

    let mut patch = serde_json::Map::new();
    patch.insert(field.to_string(), json!(asset.url));
    let patch = serde_json::Value::Object(patch);
    let updated = state
        .store
        .update_by_id::<User>(collections::USERS, auth.user.id, &patch)
        .await;
    match updated {
        Ok(Some(user)) => Ok(respond(
            StatusCode::OK,
            UserPublic::from(&user),
            "Image updated successfully",
        )),
        Ok(None) => {
            state.media.delete(&asset.deletion_handle).await;
            Err(ApiError::not_found("User does not exist"))
        }
        Err(err) => {
            state.media.delete(&asset.deletion_handle).await;
            Err(err.into())
        }
    }
}

/// GET /api/v1/users/c/{username}
pub async fn get_user_channel_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }

    let channel: User = state
        .store
        .find_one(collections::USERS, &Filter::new().eq("username", username))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;

    let subscribers_count = state
        .store
        .count(
            collections::SUBSCRIPTIONS,
            &Filter::new().eq("channel", channel.id),
        )
        .await?;
    let subscribed_to_count = state
        .store
        .count(
            collections::SUBSCRIPTIONS,
            &Filter::new().eq("subscriber", channel.id),
        )
        .await?;
    let is_subscribed = state
        .store
        .find_one::<crate::models::Subscription>(
            collections::SUBSCRIPTIONS,
            &Filter::new()
                .eq("subscriber", auth.user.id)
                .eq("channel", channel.id),
        )
        .await?
        .is_some();

    let data = json!({
        "id": channel.id,
        "fullname": channel.fullname,
        "username": channel.username,
        "email": channel.email,
        "avatar": channel.avatar,
        "coverImage": channel.cover_image,
        "subscribersCount": subscribers_count,
        "channelsSubscribedToCount": subscribed_to_count,
        "isSubscribed": is_subscribed,
    });
    Ok(respond(
        StatusCode::OK,
        data,
        "User channel fetched successfully",
    ))
}

fn required_text(form: &FormData, name: &str) -> Result<String, ApiError> {
    form.text(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("All fields are required"))
}

fn append_session_cookies(
    response: &mut Response,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), ApiError> {
    for cookie in [
        auth::session_cookie(ACCESS_COOKIE, access_token, ACCESS_TTL_SECS),
        auth::session_cookie(REFRESH_COOKIE, refresh_token, REFRESH_TTL_SECS),
    ] {
        response.headers_mut().append(
            header::SET_COOKIE,
            cookie
                .parse()
                .map_err(|_| ApiError::internal("Failed to set session cookie"))?,
        );
    }
    Ok(())
}

fn clear_session_cookies(response: &mut Response) -> Result<(), ApiError> {
    for cookie in [auth::clear_cookie(ACCESS_COOKIE), auth::clear_cookie(REFRESH_COOKIE)] {
        response.headers_mut().append(
            header::SET_COOKIE,
            cookie
                .parse()
                .map_err(|_| ApiError::internal("Failed to clear session cookie"))?,
        );
    }
    Ok(())
}
