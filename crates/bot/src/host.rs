use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::{
    Client,
    room::Room,
    ruma::{
        RoomId, UserId,
        events::room::{member::MembershipState, message::RoomMessageEventContent},
    },
};
use plugin_core::{AppError, ChannelMember, PluginApi, Post, User};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{directory::Directory, kv::KvStore};

/// Content key carrying a post's type and props alongside the message body.
pub const MEETING_PROPS_KEY: &str = "webex.meeting";

/// Runs plugins against a Matrix account: rooms are channels and direct
/// messages stand in for ephemeral posts.
#[derive(Debug)]
pub struct MatrixHost {
    client: Client,
    bot_user_id: String,
    kv: KvStore,
    directory: Directory,
}

impl MatrixHost {
    pub const fn new(client: Client, bot_user_id: String, kv: KvStore, directory: Directory) -> Self {
        Self {
            client,
            bot_user_id,
            kv,
            directory,
        }
    }

    fn room(&self, channel_id: &str) -> Result<Room, AppError> {
        let room_id = RoomId::parse(channel_id)
            .map_err(|_| AppError::new(400, format!("`{channel_id}` is not a room ID")))?;
        self.client
            .get_room(&room_id)
            .ok_or_else(|| AppError::not_found(format!("room `{channel_id}` is not joined")))
    }

    async fn direct_room(&self, user_id: &UserId) -> Result<Room> {
        if let Some(room) = self.client.get_dm_room(user_id) {
            return Ok(room);
        }
        info!(user_id = %user_id, "Creating direct message room");
        Ok(self.client.create_dm(user_id).await?)
    }

    async fn notify(&self, user_id: &str, text: &str) -> Result<()> {
        let user_id = UserId::parse(user_id)?;
        let room = self.direct_room(&user_id).await?;
        room.send(RoomMessageEventContent::notice_plain(text)).await?;
        Ok(())
    }
}

fn post_content(post: &Post) -> serde_json::Value {
    let mut content = json!({
        "msgtype": "m.text",
        "body": post.message,
    });
    if !post.post_type.is_empty() || !post.props.is_empty() {
        content[MEETING_PROPS_KEY] = json!({
            "type": post.post_type,
            "props": post.props,
        });
    }
    content
}

#[async_trait]
impl PluginApi for MatrixHost {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.kv.get(key).await)
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), AppError> {
        self.kv
            .set(key, value)
            .await
            .map_err(|e| AppError::internal(format!("{e:#}")))
    }

    async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        self.directory
            .user(user_id)
            .ok_or_else(|| AppError::not_found(format!("unknown user `{user_id}`")))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, AppError> {
        self.directory
            .user_by_username(username)
            .ok_or_else(|| AppError::not_found(format!("unknown username `{username}`")))
    }

    async fn get_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelMember, AppError> {
        let room = self.room(channel_id)?;
        let member_id = UserId::parse(user_id)
            .map_err(|_| AppError::new(400, format!("`{user_id}` is not a user ID")))?;
        match room.get_member(&member_id).await {
            Ok(Some(member)) if *member.membership() == MembershipState::Join => Ok(ChannelMember {
                channel_id: channel_id.to_owned(),
                user_id: user_id.to_owned(),
            }),
            Ok(_) => Err(AppError::not_found(format!(
                "`{user_id}` is not a member of `{channel_id}`"
            ))),
            Err(e) => Err(AppError::internal(e.to_string())),
        }
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, AppError> {
        let room = self.room(&post.channel_id)?;
        let sent = room
            .send_raw("m.room.message", post_content(&post))
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        post.id = sent.event_id.to_string();
        debug!(post_id = %post.id, channel_id = %post.channel_id, "Post created");
        Ok(post)
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Post {
        if let Err(e) = self.notify(user_id, &post.message).await {
            warn!(user_id = %user_id, error = %e, "Failed to deliver direct message");
        }
        post
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value};

    use super::*;

    #[test]
    fn plain_posts_carry_only_the_body() {
        let post = Post {
            message: "hello".to_owned(),
            ..Post::default()
        };
        assert_eq!(post_content(&post), json!({"msgtype": "m.text", "body": "hello"}));
    }

    #[test]
    fn typed_posts_carry_props() {
        let mut props = Map::new();
        props.insert("meeting_status".to_owned(), Value::from("STARTED"));
        let post = Post {
            message: "Meeting started at https://acme.webex.com/join/jane.".to_owned(),
            post_type: "custom_webex".to_owned(),
            props,
            ..Post::default()
        };

        let content = post_content(&post);
        assert_eq!(content["body"], post.message);
        assert_eq!(content[MEETING_PROPS_KEY]["type"], "custom_webex");
        assert_eq!(
            content[MEETING_PROPS_KEY]["props"]["meeting_status"],
            "STARTED"
        );
    }
}
