use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::error::{PowerError, ServiceError};

/// Which power operations a service actually supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub resume: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        pause: true,
        resume: true,
    };
}

/// A long-running background service the coordinator can put to sleep
#[async_trait]
pub trait PowerControl: Send + Sync {
    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    async fn pause(&self) -> Result<(), ServiceError>;

    async fn resume(&self) -> Result<(), ServiceError>;
}

/// Coordinator mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Active,
    Paused,
}

/// Side effect a mode change requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Pause,
    Resume,
}

impl PowerMode {
    pub fn on_activity(self) -> (PowerMode, Transition) {
        match self {
            PowerMode::Active => (PowerMode::Active, Transition::None),
            PowerMode::Paused => (PowerMode::Active, Transition::Resume),
        }
    }

    pub fn on_inactivity(self) -> (PowerMode, Transition) {
        match self {
            PowerMode::Active => (PowerMode::Paused, Transition::Pause),
            PowerMode::Paused => (PowerMode::Paused, Transition::None),
        }
    }
}

enum PowerCommand {
    Activity,
    Register {
        name: String,
        service: Arc<dyn PowerControl>,
        reply: oneshot::Sender<Result<(), PowerError>>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// Pauses registered services after a period without client activity and
/// resumes them on the next signal
pub struct PowerCoordinator {
    inactivity_timeout: Duration,
    services: Vec<(String, Arc<dyn PowerControl>)>,
    mode: PowerMode,
    mode_tx: watch::Sender<PowerMode>,
    commands: mpsc::UnboundedReceiver<PowerCommand>,
}

impl PowerCoordinator {
    /// Start the coordinator in the active state with its inactivity timer armed
    pub fn start(inactivity_timeout: Duration) -> PowerHandle {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (mode_tx, mode_rx) = watch::channel(PowerMode::Active);

        let coordinator = Self {
            inactivity_timeout,
            services: Vec::new(),
            mode: PowerMode::Active,
            mode_tx,
            commands,
        };
        tokio::spawn(coordinator.run());
        info!("Power coordinator initialized (inactivity timeout {:?})", inactivity_timeout);

        PowerHandle {
            commands: command_tx,
            mode: mode_rx,
        }
    }

    async fn run(mut self) {
        let mut deadline = Some(Instant::now() + self.inactivity_timeout);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PowerCommand::Activity) => {
                        let (mode, transition) = self.mode.on_activity();
                        self.apply(mode, transition).await;
                        deadline = Some(Instant::now() + self.inactivity_timeout);
                    }
                    Some(PowerCommand::Register { name, service, reply }) => {
                        let _ = reply.send(self.register(name, service));
                    }
                    Some(PowerCommand::Stop { ack }) => {
                        let _ = ack.send(());
                        break;
                    }
                    None => break,
                },
                _ = sleep_until_deadline(deadline) => {
                    deadline = None;
                    let (mode, transition) = self.mode.on_inactivity();
                    self.apply(mode, transition).await;
                }
            }
        }
        debug!("Power coordinator stopped");
    }

    fn register(&mut self, name: String, service: Arc<dyn PowerControl>) -> Result<(), PowerError> {
        if self.services.iter().any(|(existing, _)| *existing == name) {
            return Err(PowerError::DuplicateService(name));
        }
        self.services.push((name.clone(), service));
        info!("Registered service: {}", name);
        Ok(())
    }

    async fn apply(&mut self, mode: PowerMode, transition: Transition) {
        self.mode = mode;
        match transition {
            Transition::None => return,
            Transition::Pause => {
                info!("Entering power-saving mode");
                for (name, service) in &self.services {
                    match service.pause().await {
                        Ok(()) => info!("Paused service: {}", name),
                        Err(e) => error!("Failed to pause service {}: {}", name, e),
                    }
                }
            }
            Transition::Resume => {
                info!("Resuming from power-saving mode");
                for (name, service) in &self.services {
                    match service.resume().await {
                        Ok(()) => info!("Resumed service: {}", name),
                        Err(e) => error!("Failed to resume service {}: {}", name, e),
                    }
                }
            }
        }
        self.mode_tx.send_replace(mode);
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cloneable access to the coordinator
#[derive(Clone)]
pub struct PowerHandle {
    commands: mpsc::UnboundedSender<PowerCommand>,
    mode: watch::Receiver<PowerMode>,
}

impl PowerHandle {
    /// Register a service. Services that cannot both pause and resume are
    /// rejected before they reach the coordinator.
    pub async fn register_service(&self, name: &str, service: Arc<dyn PowerControl>) -> Result<(), PowerError> {
        let capabilities = service.capabilities();
        if !capabilities.pause {
            return Err(PowerError::MissingCapability {
                name: name.to_string(),
                missing: "pause",
            });
        }
        if !capabilities.resume {
            return Err(PowerError::MissingCapability {
                name: name.to_string(),
                missing: "resume",
            });
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PowerCommand::Register {
                name: name.to_string(),
                service,
                reply,
            })
            .map_err(|_| PowerError::Stopped)?;
        rx.await.map_err(|_| PowerError::Stopped)?
    }

    /// Signal that a client is around. Never blocks.
    pub fn handle_client_activity(&self) {
        let _ = self.commands.send(PowerCommand::Activity);
    }

    pub fn mode(&self) -> PowerMode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PowerMode> {
        self.mode.clone()
    }

    /// Stop the coordinator and release its timer
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self.commands.send(PowerCommand::Stop { ack }).is_ok() {
            let _ = rx.await;
        }
    }
}
