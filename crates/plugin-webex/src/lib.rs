//! Start and join Webex personal meeting rooms from chat.

mod command;
pub mod config;
mod http;
mod meeting;
mod room;
pub mod store;
pub mod user;
pub mod webex;

#[cfg(test)]
mod testing;

pub use command::help_text;
pub use config::Configuration;
pub use http::{ROUTE_API_MEETINGS, USER_ID_HEADER};
pub use meeting::{MeetingDetails, MeetingError, MeetingStatus, make_join_url, make_start_url};
pub use room::RoomError;

use core::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use plugin_core::{CommandArgs, Plugin, PluginApi, PluginSpec, PluginTriggers, Post};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    store::UserStore,
    webex::{MeetingRoomClient, XmlClient},
};

pub const PLUGIN_ID: &str = "webex";

/// A configuration and the Webex client built for it. Installed and read
/// as one unit so a request never pairs one site's settings with another
/// site's client.
pub struct Active {
    pub configuration: Configuration,
    pub client: Arc<dyn MeetingRoomClient>,
}

impl fmt::Debug for Active {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Active")
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

pub struct WebexPlugin {
    api: Arc<dyn PluginApi>,
    store: UserStore,
    active: RwLock<Arc<Active>>,
}

impl fmt::Debug for WebexPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebexPlugin")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn xml_client_for(configuration: &Configuration) -> Arc<dyn MeetingRoomClient> {
    Arc::new(XmlClient::new(
        &configuration.site_host,
        configuration.site_name(),
    ))
}

impl WebexPlugin {
    #[must_use]
    pub fn new(api: Arc<dyn PluginApi>) -> Self {
        let configuration = Configuration::default();
        let client = xml_client_for(&configuration);
        Self {
            store: UserStore::new(Arc::clone(&api)),
            api,
            active: RwLock::new(Arc::new(Active {
                configuration,
                client,
            })),
        }
    }

    /// The active configuration and client. The returned snapshot never
    /// changes; a configuration change installs a new one.
    pub async fn active(&self) -> Arc<Active> {
        Arc::clone(&*self.active.read().await)
    }

    /// Installs `configuration` together with an XML client for its site.
    pub async fn set_configuration(&self, configuration: Configuration) {
        let client = xml_client_for(&configuration);
        self.install(configuration, client).await;
    }

    /// Installs `configuration` with a specific client, e.g. a
    /// [`webex::MockClient`].
    pub async fn install(&self, configuration: Configuration, client: Arc<dyn MeetingRoomClient>) {
        *self.active.write().await = Arc::new(Active {
            configuration,
            client,
        });
    }

    #[must_use]
    pub fn store(&self) -> &UserStore {
        &self.store
    }

    pub(crate) fn api(&self) -> &dyn PluginApi {
        self.api.as_ref()
    }

    pub(crate) async fn post_ephemeral(&self, user_id: &str, channel_id: &str, message: &str) {
        let post = Post {
            user_id: self.api.bot_user_id().to_owned(),
            channel_id: channel_id.to_owned(),
            message: message.to_owned(),
            ..Post::default()
        };
        let _ = self.api.send_ephemeral_post(user_id, post).await;
    }
}

#[async_trait]
impl Plugin for WebexPlugin {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn help(&self) -> &'static str {
        "Start or join Webex personal meeting rooms"
    }

    fn spec(&self, config: serde_yaml::Value) -> PluginSpec {
        PluginSpec {
            id: PLUGIN_ID.to_owned(),
            enabled: true,
            triggers: PluginTriggers {
                commands: vec!["!webex".to_owned()],
            },
            config,
        }
    }

    async fn on_configuration_change(&self, spec: &PluginSpec) -> Result<()> {
        let configuration = Configuration::from_value(spec.config.clone())?;
        if configuration.is_valid() {
            info!(site_host = %configuration.site_host, site_name = %configuration.site_name(), "Webex configuration loaded");
        } else {
            warn!(site_host = %configuration.site_host, "Webex site host is not a valid <site>.webex.com host; meetings are disabled");
        }

        self.set_configuration(configuration).await;
        Ok(())
    }

    async fn execute_command(&self, args: &CommandArgs) -> Result<()> {
        self.handle_command(args).await;
        Ok(())
    }
}
