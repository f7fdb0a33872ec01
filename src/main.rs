use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use serde::Deserialize;
use teloxide::Bot;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

mod almanac;
mod coordinator;
mod debouncer;
mod dispatcher;
mod folders;
mod helpers;
mod parser;
mod transport;
mod watcher;


use almanac::*;
use coordinator::*;
use debouncer::*;
use dispatcher::*;
use folders::*;
use helpers::*;
use parser::*;
use transport::*;
use watcher::*;

const QUIET_PERIOD: Duration = Duration::from_secs(3);
const CHAT_SLOT: &str = "chat-responder";
const RECONNECT_PAUSE_SECS: u64 = 5;
// Must stay under the 17 s timeout of teloxide's default HTTP client.
const LONG_POLL_TIMEOUT_SECS: u32 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 600;
const CHAT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    token: String,
    bot_name: Option<String>,
    #[serde(default)]
    mention_style: MentionStyle,
    data_root: PathBuf,
    output_dir: PathBuf,
    announce_chat_id: Option<i64>,
    render_command: Vec<String>,
    render_timeout_seconds: Option<u64>,
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    watch: Vec<WatchEntry>,
}

#[derive(Debug, Deserialize)]
struct WatchEntry {
    root: PathBuf,
    family: ArtifactFamily,
    slot: Option<String>,
}

#[derive(Debug, Clone)]
struct Config {
    token: String,
    bot_name: Option<String>,
    mention_style: MentionStyle,
    data_root: PathBuf,
    output_dir: PathBuf,
    announce_chat_id: Option<i64>,
    render_command: Vec<String>,
    render_timeout: Option<Duration>,
    poll_interval: Duration,
    watch: Vec<WatchConfig>,
}

#[derive(Debug, Clone)]
struct WatchConfig {
    root: PathBuf,
    family: ArtifactFamily,
    slot: SlotId,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MentionStyle {
    #[default]
    Telegram,
    Slack,
}

impl MentionStyle {
    fn mention(self, id: &str) -> String {
        match self {
            MentionStyle::Telegram => format!("@{}", id),
            MentionStyle::Slack => format!("<@{}>", id),
        }
    }
}

/// Which reduction pipeline produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ArtifactFamily {
    Polarimetric,
    Spectral,
}

impl fmt::Display for ArtifactFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFamily::Polarimetric => write!(f, "polarimetric"),
            ArtifactFamily::Spectral => write!(f, "spectral"),
        }
    }
}

/// A producer's right to one outstanding render.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotId(String);

impl SlotId {
    fn new(name: impl Into<String>) -> Self {
        SlotId(name.into())
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct RenderJob {
    id: String,
    slot: SlotId,
    source: PathBuf,
    output: PathBuf,
    title: String,
}

/// A chat event as delivered by the transport. Any field may be missing.
#[derive(Debug, Clone, Default)]
struct ChatMessage {
    raw_text: Option<String>,
    sender_id: Option<String>,
    channel_id: Option<i64>,
    event_subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FilterSpec {
    object_name: String,
    date: Option<String>,
    band: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Intent {
    Show(FilterSpec),
    TellJoke,
    Time(String),
    Sunrise,
    Sunset,
    Moon,
    Help,
    Sarcasm(String),
}

/// A debounced, finished artifact ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Detection {
    path: PathBuf,
    family: ArtifactFamily,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Reply {
        channel: i64,
        text: String,
    },
    PostImage {
        channel: i64,
        path: PathBuf,
        caption: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    fs::create_dir_all(&config.output_dir).context("create output_dir")?;

    let bot = Bot::new(config.token.clone());
    let bot_name = resolve_bot_name(&bot, config.bot_name.as_deref()).await?;
    info!("running as {}", bot_name);

    let chat_slot = SlotId::new(CHAT_SLOT);
    let mut slots = vec![chat_slot.clone()];
    slots.extend(config.watch.iter().map(|watch| watch.slot.clone()));

    let renderer = CommandRenderer::new(config.render_command.clone())?;
    let coordinator = Arc::new(RenderCoordinator::start(
        &slots,
        renderer,
        config.render_timeout,
    )?);

    let dispatcher = Arc::new(Dispatcher::new(
        coordinator,
        DispatcherSettings {
            data_root: config.data_root.clone(),
            output_dir: config.output_dir.clone(),
            mention_style: config.mention_style,
            bot_name,
            chat_slot,
        },
    ));

    let (action_tx, action_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_action_sink(bot.clone(), action_rx));

    for watch in &config.watch {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let debouncer = Arc::new(EventDebouncer::new(
            watch.family,
            QUIET_PERIOD,
            ready_tx,
            tokio::runtime::Handle::current(),
        ));
        spawn_polling_watch(
            watch.root.clone(),
            config.poll_interval,
            move |path: &Path, kind: ChangeKind| {
                debug!("{:?} {}", kind, path.display());
                debouncer.on_file_event(path);
            },
        );
        tokio::spawn(run_watch_producer(
            dispatcher.clone(),
            watch.slot.clone(),
            ready_rx,
            config.announce_chat_id,
            action_tx.clone(),
        ));
        info!(
            "watching {} for {} artifacts as {}",
            watch.root.display(),
            watch.family,
            watch.slot
        );
    }

    let (message_tx, message_rx) = mpsc::channel(CHAT_QUEUE_DEPTH);
    tokio::spawn(run_chat_responder(dispatcher, message_rx, action_tx));

    tokio::select! {
        _ = run_chat_listener(bot, message_tx, config.poll_interval) => {
            warn!("chat listener exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
