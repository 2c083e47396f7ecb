use plugin_core::CommandArgs;
use tracing::{debug, error};

use crate::{
    Active, MeetingDetails, MeetingError, MeetingStatus, WebexPlugin, user::UserInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Help,
    Info,
    Start,
    Room,
    RoomReset,
    Join,
}

/// Subcommands keyed by their `/`-joined tokens.
const HANDLERS: &[(&str, Handler)] = &[
    ("help", Handler::Help),
    ("info", Handler::Info),
    ("start", Handler::Start),
    ("room", Handler::Room),
    ("room-reset", Handler::RoomReset),
    ("reset-room", Handler::RoomReset),
    ("join", Handler::Join),
];

fn lookup(key: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|&(_, handler)| handler)
}

/// Longest registered prefix of `args` wins. Without a match, an empty
/// command asks for help and anything else is a room or user to join.
fn dispatch<'a, 'b>(args: &'a [&'b str]) -> (Handler, &'a [&'b str]) {
    for n in (1..=args.len()).rev() {
        if let Some(handler) = lookup(&args[..n].join("/")) {
            return (handler, &args[n..]);
        }
    }
    if args.is_empty() {
        (Handler::Help, args)
    } else {
        (Handler::Join, args)
    }
}

#[must_use]
pub fn help_text(trigger: &str) -> String {
    format!(
        "###### Webex - Slash Command Help\n\
         * `{trigger} help` - Show this help text\n\
         * `{trigger} info` - Show your Webex site and personal meeting room\n\
         * `{trigger} start` - Start a meeting in your personal room\n\
         * `{trigger} room <room-id>` - Set your personal meeting room\n\
         * `{trigger} room-reset` - Go back to the default room for your account\n\
         * `{trigger} join <room-id>` - Post a link to that room\n\
         * `{trigger} join @<username>` - Post a link to that user's personal room\n\
         * `{trigger} <room-id>` or `{trigger} @<username>` - Same as `join`"
    )
}

impl WebexPlugin {
    pub(crate) async fn handle_command(&self, header: &CommandArgs) {
        let args = header.args();
        let (handler, rest) = dispatch(&args);
        debug!(user_id = %header.user_id, handler = ?handler, args = ?rest, "Webex command");

        match handler {
            Handler::Help => self.reply(header, &help_text(header.trigger())).await,
            Handler::Info => self.execute_info(header).await,
            Handler::Start => self.execute_start(header, rest).await,
            Handler::Room => self.execute_room(header, rest).await,
            Handler::RoomReset => self.execute_room_reset(header).await,
            Handler::Join => self.execute_join(header, rest).await,
        }
    }

    async fn reply(&self, header: &CommandArgs, text: &str) {
        self.post_ephemeral(&header.user_id, &header.channel_id, text)
            .await;
    }

    async fn execute_info(&self, header: &CommandArgs) {
        let active = self.active().await;
        let text = match self.room_or_default(&header.user_id).await {
            Ok(room) => format!(
                "Webex site: `{}`\nYour personal meeting room: `{room}`",
                active.configuration.site_host
            ),
            Err(e) => e.to_string(),
        };
        self.reply(header, &text).await;
    }

    async fn execute_start(&self, header: &CommandArgs, args: &[&str]) {
        if !args.is_empty() {
            return self.reply(header, &help_text(header.trigger())).await;
        }
        let details = MeetingDetails {
            started_by_user_id: header.user_id.clone(),
            meeting_room_of_user_id: header.user_id.clone(),
            channel_id: header.channel_id.clone(),
            meeting_status: MeetingStatus::Started,
            room_url: None,
        };
        let active = self.active().await;
        self.start_meeting(header, &active, details).await;
    }

    async fn execute_room(&self, header: &CommandArgs, args: &[&str]) {
        let [room_id] = args else {
            let usage = format!(
                "Please enter one room ID, e.g. `{} room myroom`.",
                header.trigger()
            );
            return self.reply(header, &usage).await;
        };

        let info = UserInfo {
            email: String::new(),
            room_id: (*room_id).to_owned(),
        };
        let text = match self.store().store(&header.user_id, info).await {
            Ok(()) => format!("Room is set to: `{room_id}`"),
            Err(e) => {
                error!(user_id = %header.user_id, error = %e, "Error storing room");
                "Error setting your room, please contact your system administrator.".to_owned()
            }
        };
        self.reply(header, &text).await;
    }

    async fn execute_room_reset(&self, header: &CommandArgs) {
        if let Err(e) = self
            .store()
            .store(&header.user_id, UserInfo::default())
            .await
        {
            error!(user_id = %header.user_id, error = %e, "Error resetting room");
            return self
                .reply(
                    header,
                    "Error resetting your room, please contact your system administrator.",
                )
                .await;
        }

        let text = match self.room_or_default(&header.user_id).await {
            Ok(room) => format!("Room is reset to your default: `{room}`"),
            Err(e) => e.to_string(),
        };
        self.reply(header, &text).await;
    }

    async fn execute_join(&self, header: &CommandArgs, args: &[&str]) {
        let [target] = args else {
            return self.reply(header, &help_text(header.trigger())).await;
        };
        let name = target.trim_start_matches('@');
        if name.is_empty() {
            return self.reply(header, &help_text(header.trigger())).await;
        }

        let active = self.active().await;
        if !active.configuration.is_valid() {
            return self
                .reply(header, &MeetingError::ConfigurationInvalid.to_string())
                .await;
        }

        match self.api().get_user_by_username(name).await {
            Ok(user) => {
                let meeting_status = if user.id == header.user_id {
                    MeetingStatus::Started
                } else {
                    MeetingStatus::Invited
                };
                let details = MeetingDetails {
                    started_by_user_id: header.user_id.clone(),
                    meeting_room_of_user_id: user.id,
                    channel_id: header.channel_id.clone(),
                    meeting_status,
                    room_url: None,
                };
                self.start_meeting(header, &active, details).await;
            }
            Err(_) => match self.room_url_for_room_id(&active, name).await {
                Ok(url) => {
                    let details = MeetingDetails {
                        started_by_user_id: header.user_id.clone(),
                        meeting_room_of_user_id: header.user_id.clone(),
                        channel_id: header.channel_id.clone(),
                        meeting_status: MeetingStatus::Invited,
                        room_url: Some(url),
                    };
                    self.start_meeting(header, &active, details).await;
                }
                Err(e) => self.reply(header, &e.to_string()).await,
            },
        }
    }

    async fn start_meeting(
        &self,
        header: &CommandArgs,
        active: &Active,
        details: MeetingDetails,
    ) {
        let text = match self.post_meeting_with(active, details).await {
            Ok(_) => return,
            Err(MeetingError::Post(e)) => format!("Failed to post the meeting: {e}"),
            Err(e) => e.to_string(),
        };
        self.reply(header, &text).await;
    }
}
