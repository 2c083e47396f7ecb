//! Client for the Webex XML service, reduced to the one call the plugin
//! needs: looking up a personal meeting room URL.

mod client;
mod mock;
mod xml;

pub use client::XmlClient;
pub use mock::MockClient;

use core::fmt;

use async_trait::async_trait;

/// A single identifier to look a personal meeting room up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomQuery {
    RoomId(String),
    Username(String),
    Email(String),
}

impl RoomQuery {
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::RoomId(v) | Self::Username(v) | Self::Email(v) => v,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RoomId(_) => "room",
            Self::Username(_) => "userName",
            Self::Email(_) => "email",
        }
    }
}

impl fmt::Display for RoomQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: `{}`", self.label(), self.value())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebexError {
    #[error("failed request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("received status code {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Webex reported a failure: {0}")]
    Api(String),

    #[error("malformed XML response: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Resolves personal meeting room URLs. An empty URL means the room was not
/// found.
#[async_trait]
pub trait MeetingRoomClient: Send + Sync {
    async fn personal_room_url(&self, query: &RoomQuery) -> Result<String, WebexError>;
}
