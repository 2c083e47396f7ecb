use plugin_core::{AppError, Post};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::{Active, RoomError, WebexPlugin};

pub const POST_TYPE_WEBEX: &str = "custom_webex";
const MEETING_TOPIC: &str = "Webex Meeting";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
    /// The starter opened their own room.
    Started,
    /// Someone else's room, or a room given by ID.
    Invited,
}

impl MeetingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Invited => "INVITED",
        }
    }
}

/// One meeting announcement, built per command or request.
#[derive(Debug, Clone)]
pub struct MeetingDetails {
    pub started_by_user_id: String,
    pub meeting_room_of_user_id: String,
    pub channel_id: String,
    pub meeting_status: MeetingStatus,
    /// Already-resolved room URL; resolved from `meeting_room_of_user_id`
    /// when `None`.
    pub room_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    #[error("Unable to setup a meeting; the Webex plugin has not been configured correctly.")]
    ConfigurationInvalid,

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Post(AppError),
}

impl MeetingError {
    /// HTTP status to report this failure with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ConfigurationInvalid => 500,
            Self::Room(e) if e.is_internal() => 500,
            Self::Room(_) => 400,
            Self::Post(e) => e.status_code,
        }
    }
}

const MEET_PATH: &str = "webex.com/meet/";

#[must_use]
pub fn make_join_url(meeting_url: &str, convert: bool) -> String {
    if convert {
        meeting_url.replacen(MEET_PATH, "webex.com/join/", 1)
    } else {
        meeting_url.to_owned()
    }
}

#[must_use]
pub fn make_start_url(meeting_url: &str, convert: bool) -> String {
    if convert {
        meeting_url.replacen(MEET_PATH, "webex.com/start/", 1)
    } else {
        meeting_url.to_owned()
    }
}

impl WebexPlugin {
    /// Announces a meeting in the channel and, for self-started meetings,
    /// privately sends the starter the host link. Returns the channel
    /// post's ID.
    pub async fn post_meeting(&self, details: MeetingDetails) -> Result<String, MeetingError> {
        let active = self.active().await;
        self.post_meeting_with(&active, details).await
    }

    /// [`Self::post_meeting`] against a snapshot the caller already holds,
    /// so validation, lookup and link conversion all see one configuration.
    pub async fn post_meeting_with(
        &self,
        active: &Active,
        details: MeetingDetails,
    ) -> Result<String, MeetingError> {
        let configuration = &active.configuration;
        if !configuration.is_valid() {
            return Err(MeetingError::ConfigurationInvalid);
        }

        let room_url = match details.room_url {
            Some(url) => url,
            None => {
                self.resolve_room_url(active, &details.meeting_room_of_user_id)
                    .await?
            }
        };
        let join_url = make_join_url(&room_url, configuration.url_conversion);
        let start_url = make_start_url(&room_url, configuration.url_conversion);

        let bot_user_id = self.api().bot_user_id().to_owned();
        let props: Map<String, Value> = [
            ("meeting_link", json!(join_url)),
            ("meeting_status", json!(details.meeting_status.as_str())),
            ("meeting_topic", json!(MEETING_TOPIC)),
            ("starting_user_id", json!(details.started_by_user_id)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();

        let join_post = Post {
            user_id: bot_user_id.clone(),
            channel_id: details.channel_id.clone(),
            message: format!("Meeting started at {join_url}."),
            post_type: POST_TYPE_WEBEX.to_owned(),
            props,
            ..Post::default()
        };
        let created = self.api().create_post(join_post).await.map_err(|e| {
            error!(channel_id = %details.channel_id, error = %e, "Failed to create meeting post");
            MeetingError::Post(e)
        })?;
        info!(
            post_id = %created.id,
            channel_id = %details.channel_id,
            status = details.meeting_status.as_str(),
            "Meeting posted"
        );

        if details.meeting_status == MeetingStatus::Started {
            let start_post = Post {
                user_id: bot_user_id,
                channel_id: details.channel_id,
                message: format!("To start the meeting, click here: {start_url}."),
                ..Post::default()
            };
            let _ = self
                .api()
                .send_ephemeral_post(&details.started_by_user_id, start_post)
                .await;
        }

        Ok(created.id)
    }
}
