use tracing::{debug, error};

use crate::{
    Active, WebexPlugin,
    store::StoreError,
    user::{Identity, IdentityError, resolve_identity},
    webex::{MeetingRoomClient, RoomQuery},
};

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Error getting your room from the store, please contact your system administrator.")]
    Infrastructure(#[source] StoreError),

    #[error("Error getting your Webex identity, please contact your system administrator.")]
    IdentityLookupFailed(#[source] IdentityError),

    #[error("{}", no_room_message(.site_host, .tried))]
    NoRoomFound {
        site_host: String,
        tried: Vec<RoomQuery>,
    },
}

impl RoomError {
    /// Whether the failure is on our side rather than the user's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::IdentityLookupFailed(_))
    }
}

fn no_room_message(site_host: &str, tried: &[RoomQuery]) -> String {
    let names: Vec<String> = tried.iter().map(ToString::to_string).collect();
    let listed = match names.as_slice() {
        [] => "any identifier".to_owned(),
        [one] => one.clone(),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    };
    format!(
        "No Personal Room link found at `{site_host}` for {listed}. \
         You can set your room with the `room <room-id>` command."
    )
}

/// Candidates in lookup order: the stored room (if any), then the username,
/// then the email.
fn candidates(room_id: &str, identity: &Identity) -> Vec<RoomQuery> {
    let mut queries = Vec::with_capacity(3);
    if !room_id.is_empty() {
        queries.push(RoomQuery::RoomId(room_id.to_owned()));
    }
    if !identity.username.is_empty() {
        queries.push(RoomQuery::Username(identity.username.clone()));
    }
    if !identity.email.is_empty() {
        queries.push(RoomQuery::Email(identity.email.clone()));
    }
    queries
}

/// First non-empty URL among `queries`, or every query tried.
async fn first_room_url(
    client: &dyn MeetingRoomClient,
    queries: Vec<RoomQuery>,
) -> Result<String, Vec<RoomQuery>> {
    let mut tried = Vec::with_capacity(queries.len());
    for query in queries {
        match client.personal_room_url(&query).await {
            Ok(url) if !url.is_empty() => return Ok(url),
            Ok(_) => debug!(query = %query, "No personal room for identifier"),
            Err(e) => debug!(query = %query, error = %e, "Personal room lookup failed"),
        }
        tried.push(query);
    }
    Err(tried)
}

impl WebexPlugin {
    /// Finds the meeting URL for `user_id`'s personal room, preferring the
    /// stored room ID over the username over the email. Queries go to
    /// `active`'s client and misses name `active`'s site.
    pub async fn resolve_room_url(
        &self,
        active: &Active,
        user_id: &str,
    ) -> Result<String, RoomError> {
        let room_id = match self.store().load(user_id).await {
            Ok(info) => info.map(|info| info.room_id).unwrap_or_default(),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Error from the store when retrieving room");
                return Err(RoomError::Infrastructure(e));
            }
        };

        let identity = resolve_identity(self.api(), user_id)
            .await
            .map_err(RoomError::IdentityLookupFailed)?;

        first_room_url(active.client.as_ref(), candidates(&room_id, &identity))
            .await
            .map_err(|tried| RoomError::NoRoomFound {
                site_host: active.configuration.site_host.clone(),
                tried,
            })
    }

    /// Meeting URL for an explicit room ID.
    pub async fn room_url_for_room_id(
        &self,
        active: &Active,
        room_id: &str,
    ) -> Result<String, RoomError> {
        first_room_url(
            active.client.as_ref(),
            vec![RoomQuery::RoomId(room_id.to_owned())],
        )
        .await
        .map_err(|tried| RoomError::NoRoomFound {
            site_host: active.configuration.site_host.clone(),
            tried,
        })
    }

    /// The room `user_id` would meet in: the stored room ID, or the derived
    /// username when none is set.
    pub async fn room_or_default(&self, user_id: &str) -> Result<String, RoomError> {
        let stored = self.store().load(user_id).await.map_err(|e| {
            error!(user_id = %user_id, error = %e, "Error from the store when retrieving room");
            RoomError::Infrastructure(e)
        })?;
        if let Some(info) = stored
            && !info.room_id.is_empty()
        {
            return Ok(info.room_id);
        }

        let identity = resolve_identity(self.api(), user_id)
            .await
            .map_err(RoomError::IdentityLookupFailed)?;
        Ok(identity.username)
    }
}
