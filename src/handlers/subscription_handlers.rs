//! Subscription handlers: the subscribe toggle and the count endpoints.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::handlers::parse_id;
use crate::models::{ObjectId, Subscription, User};
use crate::services::document_store::{StoreError, collections};
use crate::services::pipeline::{Filter, Stage};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde_json::{Value, json};

/// POST /api/v1/subscriptions/c/{channelId}
///
/// Toggle: unsubscribe when a subscription exists, subscribe otherwise.
/// Losing a concurrent subscribe race resolves as "already subscribed",
/// not as an error. Nothing prevents a channel subscribing to itself.
pub async fn toggle_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
) -> Result<Response, ApiError> {
    let channel = parse_id(&channel_id, "channel ID")?;

    let existing: Option<Subscription> = state
        .store
        .find_one(
            collections::SUBSCRIPTIONS,
            &Filter::new()
                .eq("subscriber", auth.user.id)
                .eq("channel", channel),
        )
        .await?;

    if let Some(subscription) = existing {
        let _: Option<Subscription> = state
            .store
            .delete_by_id(collections::SUBSCRIPTIONS, subscription.id)
            .await?;
        return Ok(respond(
            StatusCode::OK,
            Value::Null,
            "Unsubscribed from channel successfully",
        ));
    }

    let subscription = Subscription {
        id: ObjectId::new(),
        subscriber: auth.user.id,
        channel,
        created_at: Utc::now(),
    };
    match state
        .store
        .insert(
            collections::SUBSCRIPTIONS,
            &subscription,
            &[Subscription::unique_key(auth.user.id, channel)],
        )
        .await
    {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Ok(respond(
                StatusCode::OK,
                Value::Null,
                "Already subscribed to channel",
            ));
        }
        Err(err) => {
            tracing::error!("subscription persistence failed: {err}");
            return Err(ApiError::internal("Failed to subscribe to channel"));
        }
    }

    let channel_user: Option<User> = state.store.find_by_id(collections::USERS, channel).await?;
    let data = json!({
        "subscriber": user_summary(Some(&auth.user)),
        "channel": user_summary(channel_user.as_ref()),
    });
    Ok(respond(
        StatusCode::CREATED,
        data,
        "Subscribed to channel successfully",
    ))
}

/// GET /api/v1/subscriptions/c/{channelId}: subscriber count of a channel.
pub async fn get_channel_subscribers(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Response, ApiError> {
    let channel = parse_id(&channel_id, "channel ID")?;

    let counted = state
        .store
        .run_pipeline(
            collections::SUBSCRIPTIONS,
            &[
                Stage::Match(Filter::new().eq("channel", channel)),
                Stage::Count("subscriberCount".to_string()),
            ],
        )
        .await?;
    let subscriber_count = count_from(&counted, "subscriberCount");
    let channel_user: Option<User> = state.store.find_by_id(collections::USERS, channel).await?;

    Ok(respond(
        StatusCode::OK,
        json!({
            "channel": user_summary(channel_user.as_ref()),
            "subscriberCount": subscriber_count,
        }),
        "Subscriber count fetched successfully",
    ))
}

/// GET /api/v1/subscriptions/u/{subscriberId}: how many channels a user
/// subscribes to.
pub async fn get_subscribed_channels(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
) -> Result<Response, ApiError> {
    let subscriber = parse_id(&subscriber_id, "subscriber ID")?;

    let counted = state
        .store
        .run_pipeline(
            collections::SUBSCRIPTIONS,
            &[
                Stage::Match(Filter::new().eq("subscriber", subscriber)),
                Stage::Count("subscribedChannelCount".to_string()),
            ],
        )
        .await?;
    let subscribed_count = count_from(&counted, "subscribedChannelCount");
    let user: Option<User> = state.store.find_by_id(collections::USERS, subscriber).await?;

    Ok(respond(
        StatusCode::OK,
        json!({
            "user": user_summary(user.as_ref()),
            "subscribedChannelCount": subscribed_count,
        }),
        "Subscribed channel count fetched successfully",
    ))
}

fn user_summary(user: Option<&User>) -> Value {
    match user {
        Some(user) => json!({
            "id": user.id,
            "fullname": user.fullname,
            "username": user.username,
        }),
        None => Value::Null,
    }
}

fn count_from(docs: &[Value], field: &str) -> i64 {
    docs.first()
        .and_then(|doc| doc.get(field))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
