use super::*;

use teloxide::prelude::*;
use teloxide::types::{InputFile, Message, Update, UpdateKind};

pub(super) async fn resolve_bot_name(bot: &Bot, configured: Option<&str>) -> Result<String> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }
    let me = bot.get_me().await.context("fetch bot identity")?;
    me.user
        .username
        .clone()
        .ok_or_else(|| anyhow!("bot has no username; set bot_name in the config"))
}

fn chat_message_from(msg: &Message, edited: bool) -> ChatMessage {
    let from = msg.from();
    let event_subtype = if edited {
        Some("message_changed".to_string())
    } else if from.map_or(false, |user| user.is_bot) {
        Some("bot_message".to_string())
    } else {
        None
    };
    ChatMessage {
        raw_text: msg.text().map(str::to_string),
        sender_id: from.map(|user| {
            user.username
                .clone()
                .unwrap_or_else(|| user.id.0.to_string())
        }),
        channel_id: Some(msg.chat.id.0),
        event_subtype,
    }
}

pub(super) fn chat_message_from_update(update: &Update) -> Option<ChatMessage> {
    match &update.kind {
        UpdateKind::Message(msg) => Some(chat_message_from(msg, false)),
        UpdateKind::EditedMessage(msg) => Some(chat_message_from(msg, true)),
        _ => None,
    }
}

/// Pulls update batches forever. A failed pull pauses and reconnects; a
/// successful one is followed by a short sleep before the next batch.
pub(super) async fn run_chat_listener(
    bot: Bot,
    messages: mpsc::Sender<ChatMessage>,
    poll_interval: Duration,
) {
    let mut offset: i32 = 0;
    loop {
        let batch = bot
            .get_updates()
            .offset(offset)
            .timeout(LONG_POLL_TIMEOUT_SECS)
            .await;
        let updates = match batch {
            Ok(updates) => updates,
            Err(err) => {
                warn!(
                    "receiving chat events failed: {}; reconnecting in {}s",
                    err, RECONNECT_PAUSE_SECS
                );
                tokio::time::sleep(Duration::from_secs(RECONNECT_PAUSE_SECS)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.id + 1);
            let Some(msg) = chat_message_from_update(&update) else {
                continue;
            };
            if messages.send(msg).await.is_err() {
                error!("chat responder is gone; stopping listener");
                return;
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn deliver(bot: &Bot, action: &Action) -> Result<()> {
    match action {
        Action::Reply { channel, text } => {
            bot.send_message(ChatId(*channel), text.clone()).await?;
        }
        Action::PostImage {
            channel,
            path,
            caption,
        } => {
            bot.send_photo(ChatId(*channel), InputFile::file(path.clone()))
                .caption(caption.clone())
                .await?;
        }
    }
    Ok(())
}

/// Posts actions as they arrive. Failures are logged and dropped.
pub(super) async fn run_action_sink(bot: Bot, mut actions: mpsc::UnboundedReceiver<Action>) {
    while let Some(action) = actions.recv().await {
        if let Err(err) = deliver(&bot, &action).await {
            error!("delivering {:?} failed: {:#}", action, err);
        }
    }
}
