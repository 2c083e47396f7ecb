use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{MeetingDetails, MeetingStatus, WebexPlugin};

pub const ROUTE_API_MEETINGS: &str = "/api/v1/meetings";
/// Header the host sets to the authenticated caller's user ID.
pub const USER_ID_HEADER: &str = "Mattermost-User-Id";

#[derive(Debug, Deserialize)]
struct StartMeetingRequest {
    #[serde(default)]
    channel_id: String,
}

fn error(status: u16, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, message.into()).into_response()
}

impl WebexPlugin {
    /// HTTP surface of the plugin, relative to its mount point.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(ROUTE_API_MEETINGS, post(start_meeting))
            .with_state(Arc::clone(self))
    }
}

async fn start_meeting(
    State(plugin): State<Arc<WebexPlugin>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(user_id) = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return error(401, "Not authorized");
    };

    let request: StartMeetingRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed start meeting request");
            return error(400, "Malformed request body");
        }
    };
    if request.channel_id.is_empty() {
        return error(400, "channel_id is required");
    }

    if plugin
        .api()
        .get_channel_member(&request.channel_id, user_id)
        .await
        .is_err()
    {
        return error(403, "Forbidden");
    }

    let details = MeetingDetails {
        started_by_user_id: user_id.to_owned(),
        meeting_room_of_user_id: user_id.to_owned(),
        channel_id: request.channel_id,
        meeting_status: MeetingStatus::Started,
        room_url: None,
    };
    match plugin.post_meeting(details).await {
        Ok(post_id) => (StatusCode::OK, post_id).into_response(),
        Err(e) => {
            warn!(user_id = %user_id, status = e.status_code(), error = %e, "Start meeting request failed");
            error(e.status_code(), e.to_string())
        }
    }
}
