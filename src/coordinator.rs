use super::*;

use std::panic::{self, AssertUnwindSafe};
use std::process::Command;
use std::thread;

/// The rendering resource. It is only ever driven from the render worker
/// thread, so implementations need `Send` but not `Sync`.
pub(super) trait Renderer: Send + 'static {
    fn render(&mut self, source: &Path, output: &Path, title: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RenderError {
    Failed(String),
    TimedOut(Duration),
    SlotBusy(SlotId),
    UnknownSlot(SlotId),
    NothingPending(SlotId),
    WorkerGone,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Failed(reason) => write!(f, "render failed: {}", reason),
            RenderError::TimedOut(limit) => write!(f, "render timed out after {:?}", limit),
            RenderError::SlotBusy(slot) => write!(f, "slot {} already has a job in flight", slot),
            RenderError::UnknownSlot(slot) => write!(f, "unknown slot {}", slot),
            RenderError::NothingPending(slot) => write!(f, "slot {} has nothing pending", slot),
            RenderError::WorkerGone => write!(f, "render worker is gone"),
        }
    }
}

impl std::error::Error for RenderError {}

pub(super) type RenderOutcome = std::result::Result<PathBuf, RenderError>;

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Idle,
    Pending(u64),
    Done(u64, RenderOutcome),
}

struct QueuedJob {
    job: RenderJob,
    ticket: u64,
}

/// Serializes every render onto one worker thread. Each slot owns a watch
/// channel, so a waiter only ever wakes for its own slot.
pub(super) struct RenderCoordinator {
    jobs: mpsc::UnboundedSender<QueuedJob>,
    slots: Arc<HashMap<SlotId, watch::Sender<SlotState>>>,
    next_ticket: AtomicU64,
    timeout: Option<Duration>,
}

impl RenderCoordinator {
    pub(super) fn start<R: Renderer>(
        slot_ids: &[SlotId],
        renderer: R,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut slots = HashMap::new();
        for slot in slot_ids {
            let (tx, _rx) = watch::channel(SlotState::Idle);
            if slots.insert(slot.clone(), tx).is_some() {
                return Err(anyhow!("duplicate slot {}", slot));
            }
        }
        let slots = Arc::new(slots);

        let (jobs, queue) = mpsc::unbounded_channel();
        let worker_slots = Arc::clone(&slots);
        thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || run_render_worker(renderer, queue, worker_slots))
            .context("spawn render worker")?;

        Ok(RenderCoordinator {
            jobs,
            slots,
            next_ticket: AtomicU64::new(1),
            timeout,
        })
    }

    /// Queues `job` behind everything already submitted. Never blocks.
    pub(super) fn submit(&self, job: RenderJob) -> std::result::Result<(), RenderError> {
        let slot = self
            .slots
            .get(&job.slot)
            .ok_or_else(|| RenderError::UnknownSlot(job.slot.clone()))?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let claimed = slot.send_if_modified(|state| match state {
            SlotState::Pending(_) => false,
            _ => {
                *state = SlotState::Pending(ticket);
                true
            }
        });
        if !claimed {
            return Err(RenderError::SlotBusy(job.slot.clone()));
        }

        debug!("queued render {} for {}", job.id, job.slot);
        if self.jobs.send(QueuedJob { job, ticket }).is_err() {
            slot.send_replace(SlotState::Idle);
            return Err(RenderError::WorkerGone);
        }
        Ok(())
    }

    /// Waits until the job last submitted on `slot_id` has been rendered and
    /// consumes its result, leaving the slot free for the next job.
    pub(super) async fn await_completion(&self, slot_id: &SlotId) -> RenderOutcome {
        let slot = self
            .slots
            .get(slot_id)
            .ok_or_else(|| RenderError::UnknownSlot(slot_id.clone()))?;
        let mut rx = slot.subscribe();
        let settled = async {
            rx.wait_for(|state| !matches!(state, SlotState::Pending(_)))
                .await
                .map(|state| state.clone())
                .map_err(|_| RenderError::WorkerGone)
        };

        let state = match self.timeout {
            None => settled.await?,
            Some(limit) => match tokio::time::timeout(limit, settled).await {
                Ok(state) => state?,
                Err(_) => {
                    let abandoned = slot.send_if_modified(|state| {
                        if matches!(state, SlotState::Pending(_)) {
                            *state = SlotState::Idle;
                            true
                        } else {
                            false
                        }
                    });
                    if abandoned {
                        warn!("{} gave up waiting after {:?}", slot_id, limit);
                        return Err(RenderError::TimedOut(limit));
                    }
                    // The result landed between the timeout and the reset.
                    let state = slot.borrow().clone();
                    state
                }
            },
        };

        match state {
            SlotState::Done(ticket, outcome) => {
                slot.send_if_modified(|state| {
                    if matches!(state, SlotState::Done(current, _) if *current == ticket) {
                        *state = SlotState::Idle;
                        true
                    } else {
                        false
                    }
                });
                outcome
            }
            SlotState::Idle | SlotState::Pending(_) => {
                Err(RenderError::NothingPending(slot_id.clone()))
            }
        }
    }

    /// Submits and waits in one step.
    pub(super) async fn render(&self, job: RenderJob) -> RenderOutcome {
        let slot = job.slot.clone();
        self.submit(job)?;
        self.await_completion(&slot).await
    }
}

fn run_render_worker<R: Renderer>(
    mut renderer: R,
    mut queue: mpsc::UnboundedReceiver<QueuedJob>,
    slots: Arc<HashMap<SlotId, watch::Sender<SlotState>>>,
) {
    info!("render worker started");
    while let Some(QueuedJob { job, ticket }) = queue.blocking_recv() {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            renderer.render(&job.source, &job.output, &job.title)
        }));
        let outcome = match result {
            Ok(Ok(())) => {
                info!(
                    "rendered {} for {} in {:?}",
                    job.output.display(),
                    job.slot,
                    started.elapsed()
                );
                Ok(job.output.clone())
            }
            Ok(Err(err)) => {
                warn!("render {} for {} failed: {:#}", job.id, job.slot, err);
                Err(RenderError::Failed(format!("{:#}", err)))
            }
            Err(_) => {
                error!("renderer panicked on {}", job.source.display());
                Err(RenderError::Failed("renderer panicked".to_string()))
            }
        };

        let Some(slot) = slots.get(&job.slot) else {
            continue;
        };
        let delivered = slot.send_if_modified(|state| {
            if *state == SlotState::Pending(ticket) {
                *state = SlotState::Done(ticket, outcome);
                true
            } else {
                false
            }
        });
        if !delivered {
            debug!("dropping stale result of {} for {}", job.id, job.slot);
        }
    }
    info!("render worker stopped");
}

/// Renders by running an external program as `command... <source> <output> <title>`.
pub(super) struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub(super) fn new(command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|program| !program.trim().is_empty())
            .ok_or_else(|| anyhow!("render_command is empty"))?;
        Ok(CommandRenderer {
            program,
            args: parts.collect(),
        })
    }
}

impl Renderer for CommandRenderer {
    fn render(&mut self, source: &Path, output: &Path, title: &str) -> Result<()> {
        // Preview names repeat, so an old file must not pass for a new render.
        match fs::remove_file(output) {
            Ok(()) => debug!("removed stale {}", output.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove stale {}", output.display()));
            }
        }
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(output)
            .arg(title)
            .output()
            .with_context(|| format!("run render command {}", self.program))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stdout = String::from_utf8_lossy(&result.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                detail
            ));
        }
        if !output.exists() {
            return Err(anyhow!("{} produced no {}", self.program, output.display()));
        }
        Ok(())
    }
}
