//! Channel dashboard: aggregate stats and the owner's video list.

use crate::auth::AuthUser;
use crate::envelope::respond;
use crate::errors::ApiError;
use crate::models::ObjectId;
use crate::services::document_store::collections;
use crate::services::feed::FeedQuery;
use crate::services::pipeline::{Accumulator, Filter, Lookup, Projection, Stage};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Response};
use serde_json::{Value, json};

/// GET /api/v1/dashboard/stats
pub async fn get_channel_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let owner = auth.user.id;

    let total_videos = state
        .store
        .count(collections::VIDEOS, &Filter::new().eq("owner", owner))
        .await?;
    let total_subscribers = state
        .store
        .count(
            collections::SUBSCRIPTIONS,
            &Filter::new().eq("channel", owner),
        )
        .await?;

    let views = state
        .store
        .run_pipeline(
            collections::VIDEOS,
            &[
                Stage::Match(Filter::new().eq("owner", owner)),
                Stage::Group(Accumulator::Sum {
                    field: "views".to_string(),
                    into: "totalViews".to_string(),
                }),
            ],
        )
        .await?;

    let likes = state
        .store
        .run_pipeline(
            collections::VIDEOS,
            &joined_count_stages(owner, collections::LIKES, "targetId", "videoLikes", "totalLikes"),
        )
        .await?;

    let comments = state
        .store
        .run_pipeline(
            collections::VIDEOS,
            &joined_count_stages(
                owner,
                collections::COMMENTS,
                "video",
                "videoComments",
                "totalComments",
            ),
        )
        .await?;

    let stats = json!({
        "totalVideos": total_videos,
        "totalSubscribers": total_subscribers,
        "totalViews": total_from(&views, "totalViews"),
        "totalLikes": total_from(&likes, "totalLikes"),
        "totalComments": total_from(&comments, "totalComments"),
    });
    Ok(respond(
        StatusCode::OK,
        stats,
        "Channel stats fetched successfully",
    ))
}

/// GET /api/v1/dashboard/videos
pub async fn get_channel_videos(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let videos = FeedQuery::new(
        collections::VIDEOS,
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
            .sub_doc("owner", &["id", "username", "fullname", "avatar"]),
    )
    .match_id("owner", auth.user.id)
    .fetch_all(&state.store)
    .await?;

    Ok(respond(
        StatusCode::OK,
        videos,
        "Channel videos fetched successfully",
    ))
}

/// Per-video join against `from`, then a sum of the joined counts:
/// match owner -> lookup -> project array length -> group-sum.
fn joined_count_stages(
    owner: ObjectId,
    from: &'static str,
    foreign_field: &str,
    as_field: &str,
    into: &str,
) -> Vec<Stage> {
    let count_field = format!("{as_field}Count");
    vec![
        Stage::Match(Filter::new().eq("owner", owner)),
        Stage::Lookup(Lookup {
            from,
            local_field: "id".to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
        }),
        Stage::Project(Projection::new().array_len(count_field.clone(), as_field)),
        Stage::Group(Accumulator::Sum {
            field: count_field,
            into: into.to_string(),
        }),
    ]
}

fn total_from(docs: &[Value], field: &str) -> i64 {
    docs.first()
        .and_then(|doc| doc.get(field))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
