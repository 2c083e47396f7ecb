use async_trait::async_trait;

use super::{MeetingRoomClient, RoomQuery, WebexError};
use crate::user::username_from_email;

/// Offline stand-in for [`super::XmlClient`]: every identifier has a room
/// at `https://<site_host>/meet/<name>`.
#[derive(Debug, Clone)]
pub struct MockClient {
    pub site_host: String,
}

#[async_trait]
impl MeetingRoomClient for MockClient {
    async fn personal_room_url(&self, query: &RoomQuery) -> Result<String, WebexError> {
        let room = match query {
            RoomQuery::RoomId(room) | RoomQuery::Username(room) => room.as_str(),
            RoomQuery::Email(email) => username_from_email(email).unwrap_or_default(),
        };
        Ok(format!("https://{}/meet/{room}", self.site_host))
    }
}
