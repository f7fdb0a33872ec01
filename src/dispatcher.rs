use super::*;

use chrono::Utc;
use rand::seq::SliceRandom;

const HELP_TEXT: &str = "Here's what I can do:\n\
    show me <object>[, date[, band[, mode]]] - preview the latest reduction\n\
    time [zone] - current time (e.g. time PDT)\n\
    sunrise / sunset - next sunrise or sunset at Gemini South\n\
    moon - current moon phase\n\
    tell me a joke\n\
    help - this message";

const JOKES: &[&str] = &[
    "Why did the astronomer hit his head? He wanted to see stars.",
    "How does the moon cut his hair? Eclipse it.",
    "What kind of music do planets like? Neptunes.",
    "Why didn't the Sun go to college? It already had a million degrees.",
    "How do you organize a space party? You planet.",
    "What did Earth say to the other planets? You guys have no life.",
    "I was up all night wondering where the Sun went. Then it dawned on me.",
];

pub(super) struct DispatcherSettings {
    pub(super) data_root: PathBuf,
    pub(super) output_dir: PathBuf,
    pub(super) mention_style: MentionStyle,
    pub(super) bot_name: String,
    pub(super) chat_slot: SlotId,
}

/// Turns chat messages and detections into render jobs and outbound actions.
pub(super) struct Dispatcher {
    coordinator: Arc<RenderCoordinator>,
    settings: DispatcherSettings,
    bot_mention: String,
}

impl Dispatcher {
    pub(super) fn new(coordinator: Arc<RenderCoordinator>, settings: DispatcherSettings) -> Self {
        let bot_mention = settings.mention_style.mention(&settings.bot_name);
        Dispatcher {
            coordinator,
            settings,
            bot_mention,
        }
    }

    pub(super) async fn handle_chat(&self, msg: &ChatMessage) -> Vec<Action> {
        if let Some(subtype) = &msg.event_subtype {
            debug!("ignoring {} event", subtype);
            return Vec::new();
        }
        let (Some(text), Some(sender), Some(channel)) =
            (msg.raw_text.as_deref(), msg.sender_id.as_deref(), msg.channel_id)
        else {
            debug!("ignoring malformed chat event {:?}", msg);
            return Vec::new();
        };
        if sender == self.settings.bot_name {
            return Vec::new();
        }
        let Some(intent) = parse_request(text, &self.bot_mention) else {
            return Vec::new();
        };
        info!("{} asked for {:?}", sender, intent);

        let reply = |text: String| Action::Reply {
            channel,
            text: format!("{} {}", self.settings.mention_style.mention(sender), text),
        };

        let now = Utc::now();
        match intent {
            Intent::Show(filter) => self.show(channel, &filter, reply).await,
            Intent::TellJoke => {
                let joke = JOKES
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .unwrap_or("I forgot the punchline.");
                vec![reply(joke.to_string())]
            }
            Intent::Time(zone) => vec![reply(time_response(&zone, now))],
            Intent::Sunrise => vec![reply(sunrise_response(now))],
            Intent::Sunset => vec![reply(sunset_response(now))],
            Intent::Moon => vec![reply(moon_response(now))],
            Intent::Help => vec![reply(HELP_TEXT.to_string())],
            Intent::Sarcasm(body) => vec![reply(sarcastic_reply(&body).to_string())],
        }
    }

    async fn show<F>(&self, channel: i64, filter: &FilterSpec, reply: F) -> Vec<Action>
    where
        F: Fn(String) -> Action,
    {
        let not_found = || {
            info!("nothing found for {:?}", filter);
            vec![reply(format!(
                "Sorry, I couldn't find {}.",
                describe_filter(filter)
            ))]
        };

        if filter.object_name.is_empty() {
            return not_found();
        }
        let base = object_dir(&self.settings.data_root, &filter.object_name);
        let candidates = match list_subdirectories(&base) {
            Ok(Some(candidates)) => candidates,
            Ok(None) => return not_found(),
            Err(err) => {
                warn!("listing {} failed: {:#}", base.display(), err);
                return not_found();
            }
        };
        let Some(folder) = select_folder(&candidates, filter) else {
            return not_found();
        };
        let Some(dataset) = DatasetName::parse(folder) else {
            return not_found();
        };
        let Some(source) = resolve_artifact(&base.join(folder), &dataset) else {
            return not_found();
        };

        let (file_name, caption) = preview_names(&filter.object_name, &dataset);
        let job = RenderJob {
            id: short_id(),
            slot: self.settings.chat_slot.clone(),
            source,
            output: self.settings.output_dir.join(file_name),
            title: caption.clone(),
        };
        match self.coordinator.render(job).await {
            Ok(path) => vec![
                reply(format!("Here's {}", caption)),
                Action::PostImage {
                    channel,
                    path,
                    caption,
                },
            ],
            Err(err) => {
                warn!("show {} failed: {}", caption, err);
                vec![reply(format!(
                    "Sorry, something went wrong rendering {}.",
                    caption
                ))]
            }
        }
    }

    /// Renders a freshly detected artifact under `slot` and announces it.
    pub(super) async fn handle_detection(
        &self,
        slot: &SlotId,
        detection: &Detection,
        announce: Option<i64>,
    ) -> Vec<Action> {
        let (file_name, caption) = match dataset_from_artifact_path(&detection.path) {
            Some((object, dataset)) => preview_names(&object, &dataset),
            None => {
                let stem = detection
                    .path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| "artifact".to_string());
                (format!("{}.png", stem), stem)
            }
        };
        let job = RenderJob {
            id: short_id(),
            slot: slot.clone(),
            source: detection.path.clone(),
            output: self.settings.output_dir.join(file_name),
            title: caption.clone(),
        };

        let outcome = self.coordinator.render(job).await;
        let Some(channel) = announce else {
            match outcome {
                Ok(path) => info!("rendered {} (no announce channel)", path.display()),
                Err(err) => warn!("render of {} failed: {}", detection.path.display(), err),
            }
            return Vec::new();
        };
        match outcome {
            Ok(path) => vec![
                Action::Reply {
                    channel,
                    text: format!("New {} reduction: {}", detection.family, caption),
                },
                Action::PostImage {
                    channel,
                    path,
                    caption,
                },
            ],
            Err(err) => {
                warn!("render of {} failed: {}", detection.path.display(), err);
                vec![Action::Reply {
                    channel,
                    text: format!("New {} reduction {} but the preview failed.", detection.family, caption),
                }]
            }
        }
    }
}

fn describe_filter(filter: &FilterSpec) -> String {
    let mut parts = vec![filter.object_name.as_str()];
    parts.extend(filter.date.as_deref());
    parts.extend(filter.band.as_deref());
    parts.extend(filter.mode.as_deref());
    let described = parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if described.is_empty() {
        "anything to show".to_string()
    } else {
        described
    }
}

/// One watch root's producer: renders its detections one at a time under its
/// own slot.
pub(super) async fn run_watch_producer(
    dispatcher: Arc<Dispatcher>,
    slot: SlotId,
    mut detections: mpsc::UnboundedReceiver<Detection>,
    announce: Option<i64>,
    actions: mpsc::UnboundedSender<Action>,
) {
    while let Some(detection) = detections.recv().await {
        for action in dispatcher.handle_detection(&slot, &detection, announce).await {
            if actions.send(action).is_err() {
                warn!("{}: action sink closed", slot);
                return;
            }
        }
    }
    debug!("{}: detection stream ended", slot);
}

pub(super) async fn run_chat_responder(
    dispatcher: Arc<Dispatcher>,
    mut messages: mpsc::Receiver<ChatMessage>,
    actions: mpsc::UnboundedSender<Action>,
) {
    while let Some(msg) = messages.recv().await {
        for action in dispatcher.handle_chat(&msg).await {
            if actions.send(action).is_err() {
                warn!("chat responder: action sink closed");
                return;
            }
        }
    }
    debug!("chat responder stopped");
}
