mod directory;
mod host;
mod kv;
mod logging;
mod plugins;

use core::time::Duration;
use std::{fs, io::IsTerminal as _, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use axum::Router;
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::{MessageType, OriginalSyncRoomMessageEvent},
    },
};
use plugin_core::{CommandArgs, Plugin, PluginApi, PluginRegistry, PluginSpec, truncate};
use plugin_webex::WebexPlugin;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{directory::Directory, host::MatrixHost, kv::KvStore, logging::init_tracing};

#[derive(Parser, Debug)]
#[command(
    name = "webex-bot",
    version,
    about = "Matrix bot for starting and joining Webex meetings"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache, plugin KV)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "webex-bot")]
    device_name: String,

    /// Path to the YAML config holding plugin specs and the user directory
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Address the plugin HTTP API listens on
    #[arg(long, env = "WEBEX_HTTP_BIND", default_value = "127.0.0.1:8065")]
    http_bind: String,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct BotConfig {
    #[serde(default)]
    pub(crate) plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub(crate) users: Directory,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    login(&client, &args).await?;
    let bot_user_id = client
        .user_id()
        .ok_or_else(|| anyhow!("client has no user ID after login"))?
        .to_string();

    let config = load_config(&args.config)?;
    info!(users = config.users.user_count(), "Loaded user directory");
    let kv = KvStore::open(args.store.join("kv.json")).await?;
    let host: Arc<dyn PluginApi> = Arc::new(MatrixHost::new(
        client.clone(),
        bot_user_id,
        kv,
        config.users.clone(),
    ));

    let webex = Arc::new(WebexPlugin::new(host));
    let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::clone(&webex) as Arc<dyn Plugin>];
    let plugins_dir = plugins::plugins_dir();
    let registry = plugins::build_registry(&config.plugins, &plugins, &plugins_dir).await;

    serve_http(&args.http_bind, webex.router()).await?;
    spawn_config_reload(args.config.clone(), Arc::clone(&registry), plugins, plugins_dir);

    // Auto-join handler for invites
    if !args.no_autojoin {
        client.add_event_handler(
            async move |ev: StrippedRoomMemberEvent, room: Room, client: Client| {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    // Command handler: `!<trigger> ...` in any joined room
    client.add_event_handler(
        move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
            let registry = Arc::clone(&registry);
            async move {
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.sender == own_id {
                    return;
                }
                let MessageType::Text(text) = &ev.content.msgtype else {
                    return;
                };
                dispatch(&registry, &ev.sender.to_string(), room.room_id().as_str(), &text.body)
                    .await;
            }
        },
    );

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

async fn dispatch(registry: &PluginRegistry, sender: &str, room_id: &str, body: &str) {
    let body = body.trim();
    let Some(token) = body.split_whitespace().next().filter(|t| t.starts_with('!')) else {
        return;
    };
    let Some(entry) = registry.entry_by_command(token).await else {
        debug!(cmd = %token, "No plugin for command");
        return;
    };

    info!(room_id = %room_id, sender = %sender, plugin = %entry.spec.id, body = %truncate(body, 200), "Incoming command");
    let args = CommandArgs {
        command: body.to_owned(),
        user_id: sender.to_owned(),
        channel_id: room_id.to_owned(),
    };
    if let Err(e) = entry.plugin.execute_command(&args).await {
        warn!(error = %e, plugin = %entry.spec.id, "Plugin failed");
    }
}

async fn login(client: &Client, args: &Args) -> Result<()> {
    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        client
            .restore_session(matrix_session)
            .await
            .context("restoring session")?;
        return Ok(());
    }

    // Treat empty env/arg as missing; avoid prompting in non-interactive mode.
    let password = if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        p.to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!(
                "No MATRIX_PASSWORD provided and no stored session. In non-interactive mode, set MATRIX_PASSWORD or provide a session at {}",
                args.session_file.display()
            ));
        }
        warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
        #[cfg(feature = "rpassword")]
        {
            rpassword::prompt_password("Matrix password:")
                .map_err(|e| anyhow!("Failed to read password: {e}"))?
        }
        #[cfg(not(feature = "rpassword"))]
        {
            return Err(anyhow!(
                "rpassword feature is not enabled. Cannot prompt for password."
            ));
        }
    };

    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(
        "Logged in: user={} device={}",
        session.user_id, session.device_id
    );
    Ok(())
}

/// Binds `bind` and serves the plugin routes under `/plugins/webex`.
async fn serve_http(bind: &str, routes: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding HTTP API on {bind}"))?;
    let app = Router::new().nest(&format!("/plugins/{}", plugin_webex::PLUGIN_ID), routes);
    info!(bind = %bind, "Serving plugin HTTP API");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "HTTP API stopped");
        }
    });
    Ok(())
}

/// Re-reads the config file on SIGHUP and re-applies plugin specs.
#[cfg(unix)]
fn spawn_config_reload(
    path: PathBuf,
    registry: Arc<PluginRegistry>,
    plugins: Vec<Arc<dyn Plugin>>,
    plugins_dir: String,
) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Config reload on SIGHUP unavailable");
                return;
            }
        };
        while hangups.recv().await.is_some() {
            match load_config(&path) {
                Ok(config) => {
                    info!(file = %path.display(), "Reloading plugin configuration");
                    plugins::apply_specs(&registry, &config.plugins, &plugins, &plugins_dir).await;
                }
                Err(e) => warn!(error = %e, "Config reload failed; keeping current configuration"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_config_reload(
    _path: PathBuf,
    _registry: Arc<PluginRegistry>,
    _plugins: Vec<Arc<dyn Plugin>>,
    _plugins_dir: String,
) {
}

fn load_config(path: &PathBuf) -> Result<BotConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

fn load_session(path: &PathBuf) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &PathBuf, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}
