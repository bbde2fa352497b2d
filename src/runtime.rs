//! Async driver: one task owns the tracker and sleeps until its earliest wake-up.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{Result, SolError};
use crate::scheduler::Tracker;
use crate::store::KeyValueStore;
use crate::types::SignalSnapshot;

const COMMAND_BUFFER: usize = 8;

#[derive(Debug)]
pub enum Command {
    Reconfigure(TrackerConfig),
    Shutdown,
}

/// Wall-clock time anchored to the runtime's monotonic clock, so paused
/// test time advances both together.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    base_utc: DateTime<Utc>,
    base_instant: Instant,
}

impl Clock {
    pub fn starting_at(base_utc: DateTime<Utc>) -> Self {
        Self {
            base_utc,
            base_instant: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.base_instant.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.base_utc + elapsed,
            Err(_) => self.base_utc,
        }
    }

    pub fn instant_at(&self, t: DateTime<Utc>) -> Instant {
        match (t - self.base_utc).to_std() {
            Ok(offset) => self.base_instant + offset,
            // already in the past
            Err(_) => self.base_instant,
        }
    }
}

pub struct TrackerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Vec<SignalSnapshot>>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub async fn reconfigure(&self, config: TrackerConfig) -> Result<()> {
        self.commands
            .send(Command::Reconfigure(config))
            .await
            .map_err(|_| SolError::Shutdown)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SignalSnapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Vec<SignalSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        // the task may already be gone; joining below still succeeds
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|_| SolError::Shutdown)
    }
}

/// Starts `tracker` on the current tokio runtime with wall time `start`.
pub fn spawn<S>(tracker: Tracker<S>, start: DateTime<Utc>) -> TrackerHandle
where
    S: KeyValueStore + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
    let clock = Clock::starting_at(start);
    let task = tokio::spawn(drive(tracker, clock, command_rx, snapshot_tx));
    TrackerHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
        task,
    }
}

async fn drive<S: KeyValueStore>(
    mut tracker: Tracker<S>,
    clock: Clock,
    mut commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Vec<SignalSnapshot>>,
) {
    tracker.start(clock.now());
    snapshots.send_replace(tracker.snapshots());

    loop {
        let wake = tracker.next_wakeup();
        let deadline = wake.map(|w| clock.instant_at(w.at));

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Reconfigure(config)) => tracker.reconfigure(config, clock.now()),
                Some(Command::Shutdown) | None => break,
            },
            _ = sleep_or_park(deadline) => {
                if let Some(wake) = wake {
                    let now = clock.now().max(wake.at);
                    let handled = tracker.handle(wake, now);
                    debug!(event = ?wake.event, handled, "wake-up");
                }
            }
        }

        snapshots.send_replace(tracker.snapshots());
    }

    info!("tracker task stopped");
}

async fn sleep_or_park(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
