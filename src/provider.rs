//! Broker-side delayed rollout of service-feature verdicts.
//!
//! While an update session is open, verdicts computed for apps are only
//! queued. Closing the outermost session (or queueing with no session open)
//! pushes every queued verdict to its app as a
//! [`ServiceFeatureRolloutCommand`]. Sessions nest.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::command::ServiceFeatureRolloutCommand;
use crate::error::{PmpError, Result};
use crate::facade::ServiceFeatureStates;
use crate::manager::{CommandTicket, ConnectionManager};

#[derive(Debug, Default)]
struct Pending {
    depth: usize,
    queue: BTreeMap<String, ServiceFeatureStates>,
}

/// Queues verdicts per app and rolls them out through a [`ConnectionManager`].
pub struct UpdateProvider {
    manager: ConnectionManager,
    source: String,
    timeout: Duration,
    pending: Mutex<Pending>,
}

impl UpdateProvider {
    /// Create a provider that pushes as the configured broker identity.
    pub fn new(manager: ConnectionManager) -> Self {
        let source = manager.config().pmp_identifier.clone();
        let timeout = manager.config().default_timeout;
        Self {
            manager,
            source,
            timeout,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Use `timeout` for each rollout command.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(PmpError::InvalidConfiguration(
                "rollout timeout must be positive".to_string(),
            ));
        }
        self.timeout = timeout;
        Ok(self)
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a (possibly nested) update session.
    pub fn start_update(&self) {
        let mut pending = self.pending();
        pending.depth += 1;
        tracing::debug!("update session layer {} started", pending.depth);
    }

    /// Close one session layer; closing the last one rolls out.
    pub fn end_update(&self) -> Vec<CommandTicket> {
        let drained = {
            let mut pending = self.pending();
            tracing::debug!("update session layer {} ended", pending.depth);
            pending.depth = pending.depth.saturating_sub(1);
            if pending.depth > 0 {
                return Vec::new();
            }
            std::mem::take(&mut pending.queue)
        };
        self.rollout(drained)
    }

    /// Queue `states` for `app`, replacing any verdict still pending for it.
    ///
    /// Rolls out right away when no session is open.
    pub fn queue(
        &self,
        app: impl Into<String>,
        states: ServiceFeatureStates,
    ) -> Result<Vec<CommandTicket>> {
        let app = app.into();
        if app.is_empty() {
            return Err(PmpError::InvalidConfiguration(
                "rollout needs a destination app".to_string(),
            ));
        }

        let drained = {
            let mut pending = self.pending();
            pending.queue.insert(app, states);
            if pending.depth > 0 {
                tracing::debug!("rollout queued until the update session ends");
                return Ok(Vec::new());
            }
            std::mem::take(&mut pending.queue)
        };
        Ok(self.rollout(drained))
    }

    /// Current session nesting depth.
    pub fn session_depth(&self) -> usize {
        self.pending().depth
    }

    /// Apps with a verdict waiting for rollout.
    pub fn queued_apps(&self) -> Vec<String> {
        self.pending().queue.keys().cloned().collect()
    }

    fn rollout(&self, queue: BTreeMap<String, ServiceFeatureStates>) -> Vec<CommandTicket> {
        if queue.is_empty() {
            return Vec::new();
        }
        tracing::debug!("rolling out service features to {} apps", queue.len());

        let mut tickets = Vec::with_capacity(queue.len());
        for (app, states) in queue {
            match ServiceFeatureRolloutCommand::new(
                app.as_str(),
                states,
                None,
                self.source.as_str(),
                self.timeout,
            ) {
                Ok(command) => tickets.push(self.manager.submit(command)),
                Err(e) => tracing::error!("cannot roll out to {}: {}", app, e),
            }
        }
        tickets
    }
}
