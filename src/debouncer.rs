use super::*;

use std::sync::Mutex;

struct ArtifactPattern {
    prefix: &'static str,
    suffixes: &'static [&'static str],
}

// The second suffix of each family is the secondary collection mode.
const SPECTRAL_ARTIFACT: ArtifactPattern = ArtifactPattern {
    prefix: "pyklip-S",
    suffixes: &["-KLmodes-all.fits", "-KLmodes-all-methane.fits"],
};

const POLARIMETRIC_ARTIFACT: ArtifactPattern = ArtifactPattern {
    prefix: "S",
    suffixes: &[
        "_podc_combined_rstokesdc.fits",
        "_podc_combined_rstokesdc_phot.fits",
    ],
};

pub(super) fn is_finished_artifact(family: ArtifactFamily, path: &Path) -> bool {
    let pattern = match family {
        ArtifactFamily::Spectral => &SPECTRAL_ARTIFACT,
        ArtifactFamily::Polarimetric => &POLARIMETRIC_ARTIFACT,
    };
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.starts_with(pattern.prefix)
        && pattern.suffixes.iter().any(|suffix| {
            name.len() > pattern.prefix.len() + suffix.len() && name.ends_with(suffix)
        })
}

/// Coalesces bursts of change notifications for one artifact into a single
/// [`Detection`], emitted once the path has been quiet for `quiet`.
pub(super) struct EventDebouncer {
    family: ArtifactFamily,
    quiet: Duration,
    // Path -> generation of the most recent event for it.
    pending: Arc<Mutex<HashMap<PathBuf, u64>>>,
    generation: AtomicU64,
    ready: mpsc::UnboundedSender<Detection>,
    runtime: tokio::runtime::Handle,
}

impl EventDebouncer {
    pub(super) fn new(
        family: ArtifactFamily,
        quiet: Duration,
        ready: mpsc::UnboundedSender<Detection>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        EventDebouncer {
            family,
            quiet,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            ready,
            runtime,
        }
    }

    /// Records a change to `path` and restarts its quiet-period timer.
    /// Returns false when the path is not a finished artifact of this family.
    /// Safe to call from any thread.
    pub(super) fn on_file_event(&self, path: &Path) -> bool {
        if !is_finished_artifact(self.family, path) {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let fresh = lock_unpoisoned(&self.pending)
            .insert(path.to_path_buf(), generation)
            .is_none();
        if fresh {
            debug!("pending {} artifact {}", self.family, path.display());
        }

        let pending = Arc::clone(&self.pending);
        let ready = self.ready.clone();
        let quiet = self.quiet;
        let family = self.family;
        let path = path.to_path_buf();
        self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;
            let settled = {
                let mut pending = lock_unpoisoned(&pending);
                if pending.get(&path) == Some(&generation) {
                    pending.remove(&path);
                    true
                } else {
                    false
                }
            };
            if settled {
                info!("detected finished {} artifact {}", family, path.display());
                if ready.send(Detection { path, family }).is_err() {
                    warn!("detection dropped: no consumer");
                }
            }
        });
        true
    }

    #[cfg(test)]
    pub(super) fn pending_count(&self) -> usize {
        lock_unpoisoned(&self.pending).len()
    }
}
