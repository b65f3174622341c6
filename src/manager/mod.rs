//! Connection Manager - runs commands against bound remote endpoints.
//!
//! The manager owns one binding per destination and drives every submitted
//! command through `prepare → bind → execute → finalize` on its own task:
//!
//! ```text
//! submit ─► worker task ─► prepare ─┬─ Abort ─────────────► Outcome::Aborted
//!                                   └─ Continue ─► attempt task
//!                                                   permit ► bind ► execute
//!           deadline ─────────────── races the attempt ───► exactly one of
//!                                     on_timeout | on_binding_failed | deliver + finalize
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pmp_ipc::{ConnectionManager, ManagerConfig, RegistrationCommand};
//!
//! let manager = ConnectionManager::new(ManagerConfig::default(), Arc::new(binder))?;
//! let command = RegistrationCommand::new(None, "org.example.app", manager.config().default_timeout)?;
//! let outcome = manager.submit(command).wait().await?;
//! ```

mod binding;
mod worker;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::binder::Binder;
use crate::command::{Command, Outcome, Target};
use crate::config::ManagerConfig;
use crate::error::{PmpError, Result};
use crate::intent::IntentResolver;

use binding::Bindings;

pub use binding::BindingStatus;

/// State shared by the manager and its workers.
pub(crate) struct Shared {
    config: ManagerConfig,
    bindings: Arc<Bindings>,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl Shared {
    fn destination<'a>(&'a self, target: &'a Target) -> &'a str {
        match target {
            Target::Pmp => &self.config.pmp_identifier,
            Target::App(app) => app,
        }
    }
}

/// Dispatches commands and manages the bindings they run on.
///
/// Cloning is cheap; clones share bindings and the in-flight cap.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager on the current tokio runtime.
    ///
    /// Fails if `config` is invalid or no runtime is running.
    pub fn new(config: ManagerConfig, binder: Arc<dyn Binder>) -> Result<Self> {
        Self::build(config, binder, None)
    }

    /// Create a manager that pins implicit descriptors through `resolver`
    /// before binding.
    pub fn with_resolver(
        config: ManagerConfig,
        binder: Arc<dyn Binder>,
        resolver: Arc<dyn IntentResolver>,
    ) -> Result<Self> {
        Self::build(config, binder, Some(resolver))
    }

    fn build(
        config: ManagerConfig,
        binder: Arc<dyn Binder>,
        resolver: Option<Arc<dyn IntentResolver>>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            PmpError::InvalidConfiguration(format!("connection manager needs a tokio runtime: {e}"))
        })?;

        let bindings = Arc::new(Bindings::new(
            binder,
            resolver,
            config.linger,
            runtime.clone(),
        ));
        let permits = Arc::new(Semaphore::new(config.max_in_flight));

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                bindings,
                permits,
                runtime,
            }),
        })
    }

    /// The configuration this manager runs with.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Start `command` on a worker task and return immediately.
    pub fn submit<C: Command>(&self, command: C) -> CommandTicket {
        tracing::debug!(
            "submitting {} from {}",
            command.header().kind(),
            command.header().source()
        );
        let handle = self
            .shared
            .runtime
            .spawn(worker::run(Arc::new(command), Arc::clone(&self.shared)));
        CommandTicket { handle }
    }

    /// Destination identifier `target` resolves to.
    pub fn destination<'a>(&'a self, target: &'a Target) -> &'a str {
        self.shared.destination(target)
    }

    /// Current state of the binding to `destination`.
    pub fn binding_status(&self, destination: &str) -> BindingStatus {
        self.shared.bindings.status(destination)
    }

    /// Commands currently holding the binding to `destination`.
    pub fn pending(&self, destination: &str) -> usize {
        self.shared.bindings.pending(destination)
    }
}

/// Handle to one submitted command.
///
/// Dropping the ticket does not cancel the command.
#[derive(Debug)]
pub struct CommandTicket {
    handle: JoinHandle<Result<Outcome>>,
}

impl CommandTicket {
    /// Wait for the command's terminal outcome.
    pub async fn wait(self) -> Result<Outcome> {
        self.handle
            .await
            .map_err(|e| PmpError::Worker(e.to_string()))?
    }

    /// Whether the command has reached its terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
