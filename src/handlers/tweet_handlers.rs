//! Tweet handlers: short channel posts.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::parse_id;
use crate::models::{ObjectId, Tweet};
use crate::services::document_store::collections;
use crate::services::feed::FeedQuery;
use crate::services::pipeline::Projection;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct TweetBody {
    pub content: String,
}

/// POST /api/v1/tweets
pub async fn create_tweet(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<TweetBody>,
) -> Result<Response, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }

    let now = Utc::now();
    let tweet = Tweet {
        id: ObjectId::new(),
        owner: auth.user.id,
        content: content.to_string(),
        created_at: now,
        updated_at: now,
    };
    state.store.insert(collections::TWEETS, &tweet, &[]).await?;

    Ok(respond(
        StatusCode::CREATED,
        tweet,
        "Tweet created successfully",
    ))
}

/// GET /api/v1/tweets/user/{userId}
pub async fn get_user_tweets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let owner = parse_id(&user_id, "user ID")?;
    let tweets = FeedQuery::new(
        collections::TWEETS,
        Projection::new()
            .field("id")
            .field("content")
            .field("createdAt")
            .field("updatedAt")
            .path("ownerDetails", "ownerDetails.username"),
    )
    .match_id("owner", owner)
    .join_owner_as("ownerDetails")
    .fetch_all(&state.store)
    .await?;

    if tweets.is_empty() {
        return Err(ApiError::not_found("No tweets found for this user"));
    }

    Ok(respond(
        StatusCode::OK,
        tweets,
        "User tweets retrieved successfully",
    ))
}

async fn load_owned_tweet(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    forbidden_message: &str,
) -> Result<Tweet, ApiError> {
    let id = parse_id(raw_id, "tweet ID")?;
    let tweet: Tweet = state
        .store
        .find_by_id(collections::TWEETS, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    if tweet.owner != auth.user.id {
        return Err(ApiError::forbidden(forbidden_message));
    }
    Ok(tweet)
}

/// PATCH /api/v1/tweets/{tweetId}
pub async fn update_tweet(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tweet_id): Path<String>,
    Json(body): Json<TweetBody>,
) -> Result<Response, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }

    let tweet = load_owned_tweet(
        &state,
        &auth,
        &tweet_id,
        "You are not authorized to update this tweet",
    )
    .await?;

    let updated: Tweet = state
        .store
        .update_by_id(collections::TWEETS, tweet.id, &json!({ "content": content }))
        .await?
        .ok_or_else(|| ApiError::not_found("Tweet not found"))?;

    Ok(respond(StatusCode::OK, updated, "Tweet updated successfully"))
}

/// DELETE /api/v1/tweets/{tweetId}
pub async fn delete_tweet(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tweet_id): Path<String>,
) -> Result<Response, ApiError> {
    let tweet = load_owned_tweet(
        &state,
        &auth,
        &tweet_id,
        "You are not authorized to delete this tweet",
    )
    .await?;

    let deleted: Option<Tweet> = state
        .store
        .delete_by_id(collections::TWEETS, tweet.id)
        .await?;
    if deleted.is_none() {
        return Err(ApiError::not_found("Tweet not found"));
    }

    Ok(respond(
        StatusCode::OK,
        json!({}),
        "Tweet deleted successfully",
    ))
}
