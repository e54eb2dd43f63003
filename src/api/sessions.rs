//! Sessions API endpoints
//!
//! GET    /sessions                 - List session summaries, newest first
//! DELETE /sessions                 - Remove every session
//! GET    /sessions/active          - Active session pointer
//! POST   /sessions/active          - Point at a session
//! DELETE /sessions/active          - Clear the pointer
//! POST   /sessions/:id             - Save a snapshot (stamped by the client or now)
//! PUT    /sessions/:id             - Store a replicated record verbatim
//! GET    /sessions/:id             - Fetch a record
//! DELETE /sessions/:id             - Delete a session
//! GET    /sessions/:id/exists      - Existence check (404 when absent)


use super::ApiError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use labelsync_core::remote::wire::{ActiveSessionBody, ExistsResponse, SaveSessionBody};
use labelsync_core::{
    LocalAdapter, PersistedState, SessionMetadata, StorageAdapter, StorageOrigin, SyncResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store behind the session endpoints
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn StorageAdapter>,
}

impl SessionService {
    /// Serve sessions from `store`
    pub fn new(store: Arc<dyn StorageAdapter>) -> Self {
        Self { store }
    }

    /// Volatile service backed by memory (`serve --ephemeral`)
    pub fn in_memory() -> Self {
        Self::new(Arc::new(
            LocalAdapter::in_memory()
                .with_origin(StorageOrigin::Remote)
                .with_name("service"),
        ))
    }
}

/// Status for a write outcome; failures keep the body so clients see the reason
fn write_response(result: SyncResult) -> (StatusCode, Json<SyncResult>) {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result))
}

/// List sessions, newest first.
async fn list_sessions(
    State(service): State<SessionService>,
) -> Result<Json<Vec<SessionMetadata>>, ApiError> {
    let sessions = service.store.list_sessions().await?;
    debug!(count = sessions.len(), "Listed sessions");
    Ok(Json(sessions))
}

/// Remove every session.
async fn clear_sessions(State(service): State<SessionService>) -> (StatusCode, Json<SyncResult>) {
    let result = service.store.clear_all().await;
    if result.success {
        info!("All sessions cleared");
    }
    write_response(result)
}

/// Save a snapshot.
async fn save_session(
    State(service): State<SessionService>,
    Path(id): Path<String>,
    Json(body): Json<SaveSessionBody>,
) -> Result<(StatusCode, Json<SyncResult>), ApiError> {
    if body.session_id != id {
        return Err(ApiError::bad_request(format!(
            "session id mismatch: path {} body {}",
            id, body.session_id
        )));
    }

    let request = body.into_request();
    let result = service.store.save_state(&request).await;
    if result.success {
        info!(session_id = %id, updated_at = %request.stamped_at, "Session saved");
    } else {
        warn!(session_id = %id, error = result.error.as_deref().unwrap_or("unknown"), "Session save failed");
    }
    Ok(write_response(result))
}

/// Store a record replicated from a client, keeping its timestamps.
async fn replicate_session(
    State(service): State<SessionService>,
    Path(id): Path<String>,
    Json(record): Json<PersistedState>,
) -> Result<(StatusCode, Json<SyncResult>), ApiError> {
    if record.session_id != id {
        return Err(ApiError::bad_request(format!(
            "session id mismatch: path {} body {}",
            id, record.session_id
        )));
    }

    let result = service.store.save_record(&record).await;
    if result.success {
        info!(session_id = %id, updated_at = %record.updated_at, "Session replicated");
    }
    Ok(write_response(result))
}

/// Fetch a session record.
async fn get_session(
    State(service): State<SessionService>,
    Path(id): Path<String>,
) -> Result<Json<PersistedState>, ApiError> {
    service
        .store
        .load_state(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("session {} not found", id)))
}

/// Delete a session; deleting a missing one succeeds.
async fn delete_session(
    State(service): State<SessionService>,
    Path(id): Path<String>,
) -> (StatusCode, Json<SyncResult>) {
    write_response(service.store.delete_session(&id).await)
}

/// Whether a session exists. Absent sessions answer 404 with the same body.
async fn session_exists(
    State(service): State<SessionService>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ExistsResponse>), ApiError> {
    let exists = service.store.has_session(&id).await?;
    let status = if exists {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((
        status,
        Json(ExistsResponse {
            exists,
            session_id: id,
        }),
    ))
}

/// Current active session.
async fn get_active(
    State(service): State<SessionService>,
) -> Result<Json<ActiveSessionBody>, ApiError> {
    let session_id = service.store.active_session_id().await?;
    Ok(Json(ActiveSessionBody { session_id }))
}

/// Point at a session.
async fn set_active(
    State(service): State<SessionService>,
    Json(body): Json<ActiveSessionBody>,
) -> Result<Json<ActiveSessionBody>, ApiError> {
    let Some(session_id) = body.session_id else {
        return Err(ApiError::bad_request("sessionId is required"));
    };
    service.store.set_active_session_id(&session_id).await?;
    Ok(Json(ActiveSessionBody {
        session_id: Some(session_id),
    }))
}

/// Clear the active session pointer.
async fn clear_active(
    State(service): State<SessionService>,
) -> Result<Json<ActiveSessionBody>, ApiError> {
    service.store.clear_active_session_id().await?;
    Ok(Json(ActiveSessionBody::default()))
}

/// Create sessions routes.
pub fn sessions_routes(service: SessionService) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions).delete(clear_sessions))
        .route(
            "/sessions/active",
            get(get_active).post(set_active).delete(clear_active),
        )
        .route(
            "/sessions/:id",
            get(get_session)
                .post(save_session)
                .put(replicate_session)
                .delete(delete_session),
        )
        .route("/sessions/:id/exists", get(session_exists))
        .with_state(service)
}
