use super::*;

use std::sync::{Mutex, MutexGuard};

pub(super) fn resolve_config_path(path: &Path, config_dir: &Path) -> PathBuf {
    if path.is_relative() {
        config_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

pub(super) fn load_config(path: &Path) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config_file: ConfigFile = toml::from_str(&contents).context("parse config")?;
    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_config(config_file, config_dir)
}

pub(super) fn resolve_config(config_file: ConfigFile, config_dir: &Path) -> Result<Config> {
    if config_file.token.trim().is_empty() {
        return Err(anyhow!("token is empty"));
    }
    if config_file
        .render_command
        .first()
        .map_or(true, |program| program.trim().is_empty())
    {
        return Err(anyhow!("render_command is empty"));
    }

    let mut seen = HashSet::new();
    seen.insert(CHAT_SLOT.to_string());
    let mut watch = Vec::new();
    for (index, entry) in config_file.watch.into_iter().enumerate() {
        let slot = entry
            .slot
            .unwrap_or_else(|| default_watch_slot(index));
        if !seen.insert(slot.clone()) {
            return Err(anyhow!("duplicate or reserved watch slot {}", slot));
        }
        watch.push(WatchConfig {
            root: resolve_config_path(&entry.root, config_dir),
            family: entry.family,
            slot: SlotId::new(slot),
        });
    }

    let render_timeout = match config_file
        .render_timeout_seconds
        .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS)
    {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let poll_interval = Duration::from_millis(
        config_file
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1),
    );

    Ok(Config {
        token: config_file.token,
        bot_name: config_file
            .bot_name
            .map(|name| name.trim().trim_start_matches('@').to_string())
            .filter(|name| !name.is_empty()),
        mention_style: config_file.mention_style,
        data_root: resolve_config_path(&config_file.data_root, config_dir),
        output_dir: resolve_config_path(&config_file.output_dir, config_dir),
        announce_chat_id: config_file.announce_chat_id,
        render_command: config_file.render_command,
        render_timeout,
        poll_interval,
        watch,
    })
}

/// `watcher-A`, `watcher-B`, ... then `watcher-27` onwards.
pub(super) fn default_watch_slot(index: usize) -> String {
    if index < 26 {
        format!("watcher-{}", (b'A' + index as u8) as char)
    } else {
        format!("watcher-{}", index + 1)
    }
}

pub(super) fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}

pub(super) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
