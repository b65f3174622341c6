//! Command module - one cross-process request with its handler and timeout.
//!
//! A [`Command`] is immutable once built. Its [`CommandHeader`] carries the
//! parts every kind shares (kind, source identity, target, timeout) and is
//! validated at construction, so malformed input fails before submission.
//!
//! Execution is split in two so the manager can keep terminal hooks
//! exactly-once: [`Command::execute_on_remote`] performs the remote calls and
//! returns a typed reply; [`Command::deliver`] maps that reply onto the
//! handler's outcome hooks. The manager only delivers (and then finalizes)
//! after winning the command's [`OutcomeGuard`](crate::handler::OutcomeGuard).

mod registration;
mod resource;
mod rollout;
mod service_features;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BindError, PmpError, RemoteError, Result};
use crate::facade::Facade;
use crate::handler::Handler;

pub use registration::{RegistrationCommand, RegistrationReply};
pub use resource::{RequestResourceCommand, ResourceReply};
pub use rollout::ServiceFeatureRolloutCommand;
pub use service_features::{RequestServiceFeaturesCommand, ServiceFeatureUpdateCommand};

/// The operation a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// App → broker: register the app.
    Registration,
    /// App → broker: ask for a push of service-feature verdicts.
    ServiceFeatureUpdate,
    /// App → broker: ask the user to enable service features.
    RequestServiceFeatures,
    /// App → broker: obtain a resource handle.
    RequestResource,
    /// Broker → app: push service-feature verdicts.
    ServiceFeatureRollout,
}

impl CommandKind {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Registration => "registration",
            CommandKind::ServiceFeatureUpdate => "service-feature-update",
            CommandKind::RequestServiceFeatures => "request-service-features",
            CommandKind::RequestResource => "request-resource",
            CommandKind::ServiceFeatureRollout => "service-feature-rollout",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The broker; its identifier comes from the manager's configuration.
    Pmp,
    /// The app with the given identifier.
    App(String),
}

/// Validated common part of every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    kind: CommandKind,
    source: String,
    target: Target,
    timeout: Duration,
}

impl CommandHeader {
    /// Build a header, rejecting an empty source or app identifier and a
    /// zero timeout.
    pub fn new(
        kind: CommandKind,
        source: impl Into<String>,
        target: Target,
        timeout: Duration,
    ) -> Result<Self> {
        let source = source.into();
        if source.is_empty() {
            return Err(PmpError::InvalidConfiguration(format!(
                "{kind} command needs a source identity"
            )));
        }
        if let Target::App(app) = &target {
            if app.is_empty() {
                return Err(PmpError::InvalidConfiguration(format!(
                    "{kind} command needs a destination app"
                )));
            }
        }
        if timeout.is_zero() {
            return Err(PmpError::InvalidConfiguration(format!(
                "{kind} command needs a positive timeout"
            )));
        }
        Ok(Self {
            kind,
            source,
            target,
            timeout,
        })
    }

    /// The command kind.
    #[inline]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Identity of the calling principal, as declared to the remote side.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Where the command goes.
    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Time allowed for bind plus execution.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// What delivering a reply amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The remote side granted the request.
    Success,
    /// The remote side answered with a business-level refusal.
    DomainFailure(String),
}

/// Terminal outcome of one submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `prepare` declined; nothing was bound or called.
    Aborted,
    /// The destination could not be bound or was lost mid-call.
    BindingFailed(BindError),
    /// The deadline elapsed first.
    TimedOut(Duration),
    /// The remote side answered and the reply was delivered.
    Executed(Delivery),
}

impl Outcome {
    /// Whether the remote side answered.
    pub fn is_executed(&self) -> bool {
        matches!(self, Outcome::Executed(_))
    }

    /// Convert into the error taxonomy. Only a granted request is `Ok`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Outcome::Executed(Delivery::Success) => Ok(()),
            Outcome::Executed(Delivery::DomainFailure(message)) => {
                Err(PmpError::DomainFailure(message))
            }
            Outcome::Aborted => Err(PmpError::AbortRequested),
            Outcome::BindingFailed(err) => Err(PmpError::BindingFailed(err)),
            Outcome::TimedOut(timeout) => Err(PmpError::Timeout(timeout)),
        }
    }
}

/// A typed cross-process request.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Handler kind the outcome hooks are defined on.
    type Handler: Handler + ?Sized;

    /// Typed answer of the remote side.
    type Reply: Send + 'static;

    /// Common descriptor.
    fn header(&self) -> &CommandHeader;

    /// The handler driven by this command.
    fn handler(&self) -> &Self::Handler;

    /// The no-op handler used when the caller supplies none.
    fn null_handler() -> Arc<Self::Handler>
    where
        Self: Sized;

    /// Perform the remote call(s) against a bound facade.
    ///
    /// Progress hooks may fire here; terminal hooks must not.
    async fn execute_on_remote(&self, facade: &Facade) -> std::result::Result<Self::Reply, RemoteError>;

    /// Map a reply onto the outcome hooks.
    fn deliver(&self, reply: Self::Reply) -> Delivery;
}
