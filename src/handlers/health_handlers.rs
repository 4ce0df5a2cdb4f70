//! Liveness and readiness probes.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct Probe {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Probe {
    fn pass() -> Self {
        Self { ok: true, error: None }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Serialize)]
struct ReadyReport {
    status: &'static str,
    store: Probe,
    media: Probe,
}

/// GET /healthz
///
/// Liveness only. Cheap, no I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// GET /readyz
///
/// Probes both collaborators: a `SELECT 1` against the document store and a
/// write/read/delete round trip under the media root. 200 when both pass,
/// 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let store = probe_store(&state).await;
    let media = probe_media_dir(&state).await;

    let ready = store.ok && media.ok;
    let report = ReadyReport {
        status: if ready { "ok" } else { "error" },
        store,
        media,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn probe_store(state: &AppState) -> Probe {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.store.pool())
        .await
    {
        Ok(1) => Probe::pass(),
        Ok(other) => Probe::fail(format!("unexpected result: {other}")),
        Err(err) => Probe::fail(err.to_string()),
    }
}

/// Round-trips a marker file under the media root. Cleanup is best-effort;
/// a leftover marker does not fail the probe.
async fn probe_media_dir(state: &AppState) -> Probe {
    let marker = state
        .media
        .base_path()
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let outcome = match fs::write(&marker, b"readyz").await {
        Ok(()) => match fs::read(&marker).await {
            Ok(bytes) if bytes == b"readyz" => Probe::pass(),
            Ok(_) => Probe::fail("marker content mismatch"),
            Err(err) => Probe::fail(format!("could not read marker: {err}")),
        },
        Err(err) => return Probe::fail(format!("could not write marker: {err}")),
    };
    let _ = fs::remove_file(&marker).await;
    outcome
}
