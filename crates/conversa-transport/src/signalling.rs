//! HTTP signalling
//!
//! SDP offer/answer exchange and trickle ICE over plain HTTP, matching the
//! shape browsers expect from `RTCPeerConnection.setRemoteDescription` /
//! `addIceCandidate`. Media and data-channel traffic never touches these
//! endpoints — only the one-time SDP negotiation and the ongoing ICE
//! candidate trickle.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct SdpOffer {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

#[derive(Debug, Serialize)]
pub struct SdpAnswer {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub candidate: String,
    pub sdp_mline_index: Option<u16>,
    pub sdp_mid: Option<String>,
}

/// Body of `PATCH /offer`: one or more trickled candidates for a session,
/// batched in a single request as the browser's ICE gatherer produces them.
#[derive(Debug, Deserialize)]
pub struct IcePatchRequest {
    pub session_id: String,
    pub candidates: Vec<IceCandidateRequest>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": detail.into() })))
}

/// Registers a connected peer and negotiates SDP; returns the str0m answer.
/// The signalling state itself — looking up or creating a session by id,
/// creating its [`crate::rtc_session::RtcSession`], wiring its pipeline
/// assembler — is supplied by the caller through `SignallingState`, which
/// the server binary owns.
#[async_trait::async_trait]
pub trait SignallingState: Send + Sync + 'static {
    async fn create_session(&self, offer_sdp: &str) -> Result<(String, String), ApiError>;
    async fn add_ice_candidate(&self, session_id: &str, candidate: IceCandidateRequest) -> Result<(), ApiError>;
    async fn session_exists(&self, session_id: &str) -> bool;
}

pub fn router<S: SignallingState>(state: Arc<S>) -> Router {
    Router::new()
        .route("/offer", post(handle_offer::<S>).patch(handle_ice_patch::<S>))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_offer<S: SignallingState>(State(state): State<Arc<S>>, Json(offer): Json<SdpOffer>) -> Result<Json<SdpAnswer>, ApiError> {
    if offer.sdp_type != "offer" {
        return Err(api_error(StatusCode::BAD_REQUEST, "expected sdp type 'offer'"));
    }
    let (session_id, answer_sdp) = state.create_session(&offer.sdp).await?;
    Ok(Json(SdpAnswer { sdp_type: "answer".into(), sdp: answer_sdp, session_id }))
}

/// `PATCH /offer` — trickle ICE. Candidates for one session arrive batched;
/// each is forwarded to the session individually so `SignallingState`
/// doesn't need to know about batching.
async fn handle_ice_patch<S: SignallingState>(
    State(state): State<Arc<S>>,
    Json(body): Json<IcePatchRequest>,
) -> Result<StatusCode, ApiError> {
    if !state.session_exists(&body.session_id).await {
        return Err(api_error(StatusCode::NOT_FOUND, "unknown session"));
    }
    for candidate in body.candidates {
        state.add_ice_candidate(&body.session_id, candidate).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}
