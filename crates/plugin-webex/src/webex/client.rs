use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{MeetingRoomClient, RoomQuery, WebexError, xml};

const XML_SERVICE_PATH: &str = "/WBXService/XMLService";

/// Webex XML API client for one site.
#[derive(Debug, Clone)]
pub struct XmlClient {
    http: reqwest::Client,
    xml_url: String,
    site_name: String,
}

impl XmlClient {
    #[must_use]
    pub fn new(site_host: &str, site_name: &str) -> Self {
        Self::with_base_url(&format!("https://{site_host}"), site_name)
    }

    /// Client for a service rooted at `base_url` (scheme and authority),
    /// e.g. a local stand-in for the Webex site.
    #[must_use]
    pub fn with_base_url(base_url: &str, site_name: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            xml_url: format!("{}{XML_SERVICE_PATH}", base_url.trim_end_matches('/')),
            site_name: site_name.to_owned(),
        }
    }

    async fn round_trip(&self, payload: String) -> Result<String, WebexError> {
        let transport = |source| WebexError::Transport {
            url: self.xml_url.clone(),
            source,
        };

        let resp = self
            .http
            .post(&self.xml_url)
            .header(CONTENT_TYPE, "text/xml")
            .body(payload)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status.as_u16() >= 300 {
            return Err(WebexError::Status {
                url: self.xml_url.clone(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(transport)
    }
}

#[async_trait]
impl MeetingRoomClient for XmlClient {
    async fn personal_room_url(&self, query: &RoomQuery) -> Result<String, WebexError> {
        let payload = xml::user_card_request(&self.site_name, query);
        let body = self.round_trip(payload).await?;
        let url = xml::personal_room_url(&body)?;
        debug!(query = %query, found = !url.is_empty(), "Webex user card lookup");
        Ok(url)
    }
}
