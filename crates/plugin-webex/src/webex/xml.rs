use quick_xml::{Reader, escape::escape, events::Event};

use super::{RoomQuery, WebexError};

const RESULT_FAILURE: &str = "FAILURE";

/// Builds a `GetUserCard` request for `query` scoped to `site_name`.
pub(super) fn user_card_request(site_name: &str, query: &RoomQuery) -> String {
    let tag = match query {
        RoomQuery::RoomId(_) => "personalUrl",
        RoomQuery::Username(_) => "webExId",
        RoomQuery::Email(_) => "email",
    };
    let site_name = escape(site_name);
    let value = escape(query.value());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<serv:message xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <header>
        <securityContext>
            <siteName>{site_name}</siteName>
        </securityContext>
    </header>
    <body>
        <bodyContent xsi:type="java:com.webex.service.binding.user.GetUserCard">
            <{tag}>{value}</{tag}>
        </bodyContent>
    </body>
</serv:message>"#
    )
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Result,
    Reason,
    RoomUrl,
}

/// Text and CDATA sections inside a field, trimmed and concatenated.
#[derive(Debug, Default)]
struct Fields {
    result: String,
    reason: String,
    url: String,
}

impl Fields {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Result => &mut self.result,
            Field::Reason => &mut self.reason,
            Field::RoomUrl => &mut self.url,
        };
        target.push_str(text.trim());
    }
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"result" => Some(Self::Result),
            b"reason" => Some(Self::Reason),
            b"personalMeetingRoomURL" => Some(Self::RoomUrl),
            _ => None,
        }
    }
}

/// Extracts the personal meeting room URL from a `GetUserCard` response.
/// Namespace prefixes are ignored. A missing URL yields an empty string.
pub(super) fn personal_room_url(body: &str) -> Result<String, WebexError> {
    let mut reader = Reader::from_str(body);
    let mut current = None;
    let mut fields = Fields::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => current = Field::from_local_name(e.local_name().as_ref()),
            Event::Text(t) => {
                if let Some(field) = current {
                    fields.push(field, &t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(field) = current {
                    fields.push(field, &c.decode().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }

    if fields.result.eq_ignore_ascii_case(RESULT_FAILURE) {
        return Err(WebexError::Api(fields.reason));
    }
    Ok(fields.url)
}
