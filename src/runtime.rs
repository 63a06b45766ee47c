//! Event loop driving the coordinator
//!
//! One task owns the coordinator. It waits on three things: the next
//! controller event, the earliest component deadline, and shutdown. Backend
//! calls are the only work spawned off the loop; their answers come back as
//! events.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::Result;
use crate::backend::{ReplyBackend, ReplyRequest};
use crate::coordinator::{Action, ControllerEvent, InteractionCoordinator};
use crate::platform::{FeatureLauncher, ReminderStore};

/// Sending half handed to platform adapters
pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;

/// Channel carrying controller events into the runtime
pub struct EventChannel {
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl EventChannel {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A sender for adapters; clone freely
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    /// Drop the channel's own sender and keep the receiving half
    ///
    /// The receiver reports closed once every adapter sender is gone.
    #[must_use]
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<ControllerEvent> {
        self.rx
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators that carry out coordinator actions
pub struct Services {
    pub backend: Arc<dyn ReplyBackend>,
    pub launcher: Box<dyn FeatureLauncher>,
    pub reminders: Box<dyn ReminderStore>,
}

/// Current time on the runtime clock
///
/// Follows tokio's clock so paused-time tests advance component deadlines.
#[must_use]
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Single-task runtime for the voice controller
pub struct VoiceRuntime {
    coordinator: InteractionCoordinator,
    services: Services,
    reply_timeout: Duration,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl VoiceRuntime {
    /// Create a runtime around an assembled coordinator
    #[must_use]
    pub fn new(
        coordinator: InteractionCoordinator,
        channel: EventChannel,
        services: Services,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            services,
            reply_timeout,
            tx: channel.tx,
            rx: channel.rx,
        }
    }

    /// Sender for injecting events
    #[must_use]
    pub fn event_sender(&self) -> EventSender {
        self.tx.clone()
    }

    #[must_use]
    pub const fn coordinator(&self) -> &InteractionCoordinator {
        &self.coordinator
    }

    /// Process events and timers until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Currently infallible; reserved for adapter failures that should stop the loop
    #[allow(clippy::future_not_send)]
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("voice runtime started");

        loop {
            let deadline = self.coordinator.next_deadline();

            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = self.rx.recv() => {
                    // The runtime holds a sender, so the channel never closes
                    let Some(event) = event else { break };
                    tracing::trace!(?event, "controller event");
                    let actions = self.coordinator.dispatch(event, now());
                    self.execute(actions);
                }
                () = sleep_until(deadline) => {
                    let actions = self.coordinator.poll(now());
                    self.execute(actions);
                }
            }
        }

        tracing::info!(phase = ?self.coordinator.phase(), "voice runtime stopped");
        Ok(())
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::RequestReply {
                    request_id,
                    request,
                } => self.spawn_reply(request_id, request),
                Action::LaunchFeature(token) => self.services.launcher.launch(&token),
                Action::CreateReminder(reminder) => {
                    match self
                        .services
                        .reminders
                        .create(&reminder.title, reminder.time.as_deref())
                    {
                        Ok(id) => tracing::info!(id = %id, title = %reminder.title, "reminder created"),
                        Err(e) => tracing::error!(error = %e, "failed to create reminder"),
                    }
                }
            }
        }
    }

    fn spawn_reply(&self, request_id: u64, request: ReplyRequest) {
        let backend = Arc::clone(&self.services.backend);
        let tx = self.tx.clone();
        let timeout = self.reply_timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, backend.reply(&request)).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no reply within {}ms", timeout.as_millis())),
            };
            // Runtime gone means nobody is waiting
            let _ = tx.send(ControllerEvent::Reply { request_id, result });
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
