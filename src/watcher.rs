use super::*;

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChangeKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

pub(super) type Snapshot = HashMap<PathBuf, FileStamp>;

pub(super) fn scan_tree(root: &Path) -> Snapshot {
    let mut snapshot = HashMap::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        snapshot.insert(
            entry.path().to_path_buf(),
            FileStamp {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
        );
    }
    snapshot
}

/// Files that appeared or changed between two scans.
pub(super) fn diff_snapshots(before: &Snapshot, after: &Snapshot) -> Vec<(PathBuf, ChangeKind)> {
    let mut changes: Vec<(PathBuf, ChangeKind)> = after
        .iter()
        .filter_map(|(path, stamp)| match before.get(path) {
            None => Some((path.clone(), ChangeKind::Created)),
            Some(previous) if previous != stamp => Some((path.clone(), ChangeKind::Modified)),
            Some(_) => None,
        })
        .collect();
    changes.sort_by(|a, b| a.0.cmp(&b.0));
    changes
}

/// Watches `root` recursively by rescanning it every `interval`, calling
/// `on_change` for each created or modified file. Files present at startup
/// are the baseline and are not reported.
pub(super) fn spawn_polling_watch<F>(
    root: PathBuf,
    interval: Duration,
    on_change: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(&Path, ChangeKind) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let scan_root = root.clone();
        let mut previous = match tokio::task::spawn_blocking(move || scan_tree(&scan_root)).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("initial scan of {} failed: {}", root.display(), err);
                return;
            }
        };
        debug!("{} files under {}", previous.len(), root.display());

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let scan_root = root.clone();
            let current = match tokio::task::spawn_blocking(move || scan_tree(&scan_root)).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("scan of {} failed: {}", root.display(), err);
                    continue;
                }
            };
            for (path, kind) in diff_snapshots(&previous, &current) {
                on_change(&path, kind);
            }
            previous = current;
        }
    })
}
