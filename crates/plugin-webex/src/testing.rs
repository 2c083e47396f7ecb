//! In-memory host and Webex doubles shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use plugin_core::{AppError, ChannelMember, PluginApi, Post, User};

use crate::webex::{MeetingRoomClient, RoomQuery, WebexError};

pub const BOT_USER_ID: &str = "ason34aygl13nms0823nmastj3n99n";

#[derive(Debug, Default)]
pub struct MockApi {
    users: HashMap<String, User>,
    members: HashSet<(String, String)>,
    kv: Mutex<HashMap<String, Vec<u8>>>,
    posts: Mutex<Vec<Post>>,
    ephemeral: Mutex<Vec<(String, Post)>>,
    fail_kv: bool,
    fail_create_post: Option<AppError>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, username: &str, email: &str) -> Self {
        self.users.insert(
            id.to_owned(),
            User {
                id: id.to_owned(),
                username: username.to_owned(),
                email: email.to_owned(),
            },
        );
        self
    }

    pub fn with_member(mut self, channel_id: &str, user_id: &str) -> Self {
        self.members
            .insert((channel_id.to_owned(), user_id.to_owned()));
        self
    }

    pub const fn failing_kv(mut self) -> Self {
        self.fail_kv = true;
        self
    }

    pub fn failing_posts(mut self, err: AppError) -> Self {
        self.fail_create_post = Some(err);
        self
    }

    pub fn kv_put(&self, key: &str, value: &[u8]) {
        self.kv.lock().unwrap().insert(key.to_owned(), value.to_vec());
    }

    pub fn kv_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.kv.lock().unwrap().get(key).cloned()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn ephemeral(&self) -> Vec<(String, Post)> {
        self.ephemeral.lock().unwrap().clone()
    }

    /// Text of the last ephemeral reply.
    pub fn last_reply(&self) -> String {
        self.ephemeral
            .lock()
            .unwrap()
            .last()
            .map(|(_, post)| post.message.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PluginApi for MockApi {
    fn bot_user_id(&self) -> &str {
        BOT_USER_ID
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        if self.fail_kv {
            return Err(AppError::internal("kv unavailable"));
        }
        Ok(self.kv_raw(key))
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), AppError> {
        if self.fail_kv {
            return Err(AppError::internal("kv unavailable"));
        }
        self.kv_put(key, value);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, AppError> {
        self.users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    async fn get_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelMember, AppError> {
        if self
            .members
            .contains(&(channel_id.to_owned(), user_id.to_owned()))
        {
            Ok(ChannelMember {
                channel_id: channel_id.to_owned(),
                user_id: user_id.to_owned(),
            })
        } else {
            Err(AppError::not_found("channel member not found"))
        }
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, AppError> {
        if let Some(err) = &self.fail_create_post {
            return Err(err.clone());
        }
        let mut posts = self.posts.lock().unwrap();
        post.id = format!("post{}", posts.len() + 1);
        posts.push(post.clone());
        Ok(post)
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Post {
        self.ephemeral
            .lock()
            .unwrap()
            .push((user_id.to_owned(), post.clone()));
        post
    }
}

/// Answers only the queries it was given and records every call.
#[derive(Debug, Default)]
pub struct RecordingClient {
    answers: HashMap<RoomQuery, String>,
    calls: Mutex<Vec<RoomQuery>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(mut self, query: RoomQuery, url: &str) -> Self {
        self.answers.insert(query, url.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<RoomQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeetingRoomClient for RecordingClient {
    async fn personal_room_url(&self, query: &RoomQuery) -> Result<String, WebexError> {
        self.calls.lock().unwrap().push(query.clone());
        self.answers
            .get(query)
            .cloned()
            .ok_or_else(|| WebexError::Api("Corresponding User not found".to_owned()))
    }
}
