//! Edit coordinator actor
//!
//! Each tab runs one coordinator task that owns its bus port. Callers talk
//! to it through an `EditCoordinator` handle; the task reacts to commands,
//! to bus traffic and to three timers (query window, heartbeat tick, stale
//! threshold).
//!
//! Claims are best-effort: two tabs claiming the same file inside one query
//! window can both succeed. The first foreign `CLAIM` a holder sees moves the
//! file to `Conflicted` and is reported, never resolved.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::bus::{BroadcastBus, BusPort};
use super::message::{LockMessage, MessageKind, TabId};
use crate::error::{CoreError, CoreResult};

/// Conflict notification hook, called with the file id
pub type ConflictCallback = Box<dyn Fn(&str) + Send + 'static>;

/// Timing of the lock protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How long a claim listens for a holder's heartbeat
    pub query_window: Duration,
    /// Period of heartbeats for held files
    pub heartbeat_interval: Duration,
    /// Silence after which a foreign holder is forgotten
    pub stale_threshold: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            query_window: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(3),
            stale_threshold: Duration::from_secs(10),
        }
    }
}

/// Lock state of one file as seen from this tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Nobody is known to hold the file
    Free,
    /// This tab holds the file
    Held,
    /// This tab holds the file but another tab claimed it too
    Conflicted,
    /// Another tab heartbeated or claimed within the stale threshold
    HeldElsewhere,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockStatus::Free => "free",
            LockStatus::Held => "held",
            LockStatus::Conflicted => "conflicted",
            LockStatus::HeldElsewhere => "held elsewhere",
        };
        write!(f, "{}", s)
    }
}

/// Events emitted by the coordinator task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A claim succeeded
    Claimed { file_id: String },
    /// A held file was released
    Released { file_id: String },
    /// A foreign claim hit a held file
    Conflict { file_id: String, peer: TabId },
    /// A claim saw another tab's heartbeat
    ClaimRejected { file_id: String, holder: TabId },
}

/// Commands sent to the coordinator task
enum Command {
    Claim {
        file_id: String,
        reply: oneshot::Sender<bool>,
    },
    Release {
        file_id: String,
    },
    Status {
        file_id: String,
        reply: oneshot::Sender<LockStatus>,
    },
    OnConflict(ConflictCallback),
    Shutdown,
}

/// Handle to one tab's coordinator task
///
/// Dropping the handle shuts the task down and releases every held file.
pub struct EditCoordinator {
    tab_id: TabId,
    commands: mpsc::UnboundedSender<Command>,
    events: Option<mpsc::UnboundedReceiver<CoordinatorEvent>>,
    task: Option<JoinHandle<()>>,
}

impl EditCoordinator {
    /// Connect a new tab to `bus` and start its coordinator task
    pub fn spawn(bus: &BroadcastBus, config: CoordinatorConfig) -> Self {
        Self::spawn_on(bus.connect(), config)
    }

    /// Start a coordinator task on an existing port
    pub fn spawn_on(port: BusPort, config: CoordinatorConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let tab_id = port.tab_id().to_string();

        let actor = Actor {
            port,
            config,
            held: HashMap::new(),
            pending: HashMap::new(),
            remote: HashMap::new(),
            events: event_tx,
            on_conflict: None,
        };
        let task = tokio::spawn(actor.run(command_rx));
        debug!("Coordinator {} started", tab_id);

        Self {
            tab_id,
            commands: command_tx,
            events: Some(event_rx),
            task: Some(task),
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Try to become the only editor of `file_id`
    ///
    /// Resolves after the query window, or earlier when a holder answers.
    pub async fn claim(&self, file_id: impl Into<String>) -> CoreResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Claim {
            file_id: file_id.into(),
            reply,
        })?;
        rx.await.map_err(|_| CoreError::CoordinatorClosed)
    }

    /// Give up `file_id`; does nothing when it is not held
    pub fn release(&self, file_id: impl Into<String>) -> CoreResult<()> {
        self.send(Command::Release {
            file_id: file_id.into(),
        })
    }

    /// Current lock state of `file_id`
    pub async fn status(&self, file_id: impl Into<String>) -> CoreResult<LockStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status {
            file_id: file_id.into(),
            reply,
        })?;
        rx.await.map_err(|_| CoreError::CoordinatorClosed)
    }

    /// Check that this tab may edit `file_id`
    pub async fn ensure_editable(&self, file_id: impl Into<String>) -> CoreResult<()> {
        let file_id = file_id.into();
        match self.status(file_id.clone()).await? {
            LockStatus::Held => Ok(()),
            LockStatus::Conflicted => Err(CoreError::EditConflict { file_id }),
            LockStatus::Free | LockStatus::HeldElsewhere => Err(CoreError::ReadOnly),
        }
    }

    /// Register the callback invoked when a held file becomes conflicted
    pub fn on_conflict<F>(&self, callback: F) -> CoreResult<()>
    where
        F: Fn(&str) + Send + 'static,
    {
        self.send(Command::OnConflict(Box::new(callback)))
    }

    /// Take the event receiver; only the first call returns it
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<CoordinatorEvent>> {
        self.events.take()
    }

    /// Release every held file and wait for the task to stop
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Coordinator {} task failed: {}", self.tab_id, e);
            }
        }
    }

    fn send(&self, command: Command) -> CoreResult<()> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::CoordinatorClosed)
    }
}

impl Drop for EditCoordinator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Local hold on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Held,
    Conflicted,
}

/// A claim waiting out its query window
struct PendingClaim {
    deadline: Instant,
    replies: Vec<oneshot::Sender<bool>>,
}

/// Last foreign sign of life for a file
struct RemoteHolder {
    tab_id: TabId,
    seen: Instant,
}

struct Actor {
    port: BusPort,
    config: CoordinatorConfig,
    held: HashMap<String, Hold>,
    pending: HashMap<String, PendingClaim>,
    remote: HashMap<String, RemoteHolder>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    on_conflict: Option<ConflictCallback>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = self.pending.values().map(|p| p.deadline).min();

            tokio::select! {
                biased;

                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                msg = self.port.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            warn!("Bus closed under coordinator {}", self.port.tab_id());
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                    if next_deadline.is_some() => {
                    self.finish_due_claims();
                }

                _ = heartbeat.tick() => {
                    self.send_heartbeats();
                }
            }
        }

        self.release_all();
        debug!("Coordinator {} stopped", self.port.tab_id());
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Claim { file_id, reply } => self.start_claim(file_id, reply),
            Command::Release { file_id } => self.release(&file_id),
            Command::Status { file_id, reply } => {
                let _ = reply.send(self.status(&file_id));
            }
            Command::OnConflict(callback) => self.on_conflict = Some(callback),
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn start_claim(&mut self, file_id: String, reply: oneshot::Sender<bool>) {
        match self.held.get(&file_id) {
            Some(Hold::Held) => {
                let _ = reply.send(true);
                return;
            }
            Some(Hold::Conflicted) => {
                let _ = reply.send(false);
                return;
            }
            None => {}
        }

        if let Some(pending) = self.pending.get_mut(&file_id) {
            pending.replies.push(reply);
            return;
        }

        self.post(LockMessage::query(&file_id, self.port.tab_id()));
        self.pending.insert(
            file_id,
            PendingClaim {
                deadline: Instant::now() + self.config.query_window,
                replies: vec![reply],
            },
        );
    }

    fn finish_due_claims(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(file_id, _)| file_id.clone())
            .collect();

        for file_id in due {
            let Some(pending) = self.pending.remove(&file_id) else {
                continue;
            };
            self.held.insert(file_id.clone(), Hold::Held);
            self.post(LockMessage::claim(&file_id, self.port.tab_id()));
            info!("{} claimed {}", self.port.tab_id(), file_id);
            self.emit(CoordinatorEvent::Claimed {
                file_id: file_id.clone(),
            });
            for reply in pending.replies {
                let _ = reply.send(true);
            }
        }
    }

    fn release(&mut self, file_id: &str) {
        if let Some(pending) = self.pending.remove(file_id) {
            for reply in pending.replies {
                let _ = reply.send(false);
            }
        }
        if self.held.remove(file_id).is_some() {
            self.post(LockMessage::release(file_id, self.port.tab_id()));
            info!("{} released {}", self.port.tab_id(), file_id);
            self.emit(CoordinatorEvent::Released {
                file_id: file_id.to_string(),
            });
        }
    }

    fn release_all(&mut self) {
        let files: Vec<String> = self
            .held
            .keys()
            .chain(self.pending.keys())
            .cloned()
            .collect();
        for file_id in files {
            self.release(&file_id);
        }
    }

    fn status(&mut self, file_id: &str) -> LockStatus {
        match self.held.get(file_id) {
            Some(Hold::Held) => return LockStatus::Held,
            Some(Hold::Conflicted) => return LockStatus::Conflicted,
            None => {}
        }
        match self.remote.get(file_id) {
            Some(holder) if holder.seen.elapsed() < self.config.stale_threshold => {
                LockStatus::HeldElsewhere
            }
            Some(holder) => {
                debug!("Forgetting stale holder {} of {}", holder.tab_id, file_id);
                self.remote.remove(file_id);
                LockStatus::Free
            }
            None => LockStatus::Free,
        }
    }

    fn handle_message(&mut self, message: LockMessage) {
        match message.kind {
            MessageKind::Query => {
                if self.held.contains_key(&message.file_id) {
                    self.post(LockMessage::heartbeat(&message.file_id, self.port.tab_id()));
                }
            }
            MessageKind::Heartbeat => {
                self.saw_holder(&message);
                if let Some(pending) = self.pending.remove(&message.file_id) {
                    info!(
                        "{} claim on {} rejected, held by {}",
                        self.port.tab_id(),
                        message.file_id,
                        message.sender
                    );
                    for reply in pending.replies {
                        let _ = reply.send(false);
                    }
                    self.emit(CoordinatorEvent::ClaimRejected {
                        file_id: message.file_id,
                        holder: message.sender,
                    });
                }
            }
            MessageKind::Claim => {
                self.saw_holder(&message);
                if self.held.get(&message.file_id) == Some(&Hold::Held) {
                    self.held.insert(message.file_id.clone(), Hold::Conflicted);
                    warn!(
                        "{} holds {} but {} claimed it too",
                        self.port.tab_id(),
                        message.file_id,
                        message.sender
                    );
                    if let Some(callback) = &self.on_conflict {
                        callback(&message.file_id);
                    }
                    self.emit(CoordinatorEvent::Conflict {
                        file_id: message.file_id,
                        peer: message.sender,
                    });
                }
            }
            MessageKind::Release => {
                if self
                    .remote
                    .get(&message.file_id)
                    .is_some_and(|holder| holder.tab_id == message.sender)
                {
                    self.remote.remove(&message.file_id);
                }
            }
        }
    }

    fn saw_holder(&mut self, message: &LockMessage) {
        self.remote.insert(
            message.file_id.clone(),
            RemoteHolder {
                tab_id: message.sender.clone(),
                seen: Instant::now(),
            },
        );
    }

    fn send_heartbeats(&mut self) {
        let files: Vec<String> = self.held.keys().cloned().collect();
        for file_id in files {
            self.post(LockMessage::heartbeat(file_id, self.port.tab_id()));
        }
        self.forget_stale_holders();
    }

    fn forget_stale_holders(&mut self) {
        let threshold = self.config.stale_threshold;
        self.remote.retain(|file_id, holder| {
            let live = holder.seen.elapsed() < threshold;
            if !live {
                debug!("Forgetting stale holder {} of {}", holder.tab_id, file_id);
            }
            live
        });
    }

    fn post(&self, message: LockMessage) {
        if let Err(e) = self.port.post(&message) {
            warn!("{} failed to post {:?}: {}", self.port.tab_id(), message.kind, e);
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }
}
