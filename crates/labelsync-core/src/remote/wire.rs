//! JSON bodies exchanged with the remote session service
//!
//! Shared by [`RemoteAdapter`](super::RemoteAdapter) and the service
//! handlers so both sides agree on field names.

use crate::model::{SaveKind, SaveRequest, SessionPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /sessions/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSessionBody {
    /// Session identifier (must match the path)
    pub session_id: String,
    /// Whole-session snapshot
    pub data_state: SessionPayload,
    /// Tab hint
    pub active_tab: String,
    /// What triggered the save
    #[serde(rename = "type", default)]
    pub kind: SaveKind,
    /// Client version stamp; the service stamps `now` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SaveSessionBody {
    /// Rebuild the request the service should apply
    #[must_use]
    pub fn into_request(self) -> SaveRequest {
        let request = SaveRequest::new(self.session_id, self.data_state, self.active_tab, self.kind);
        match self.updated_at {
            Some(at) => request.stamped(at),
            None => request,
        }
    }
}

impl From<&SaveRequest> for SaveSessionBody {
    fn from(request: &SaveRequest) -> Self {
        Self {
            session_id: request.session_id.clone(),
            data_state: request.payload.clone(),
            active_tab: request.active_tab.clone(),
            kind: request.kind,
            updated_at: Some(request.stamped_at),
        }
    }
}

/// Body of `GET /sessions/{id}/exists`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistsResponse {
    /// Whether the session is stored
    pub exists: bool,
    /// Session asked about
    pub session_id: String,
}

/// Body of `GET /sessions/active` and `POST /sessions/active`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionBody {
    /// Active session, `null` when none
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` when the service can serve requests
    pub status: String,
    /// Service version
    pub version: String,
}
