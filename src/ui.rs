//! UI-facing handlers.
//!
//! The crate draws nothing. A UI surface implements [`RegistrationUi`] and
//! receives [`RegistrationEvent`]s from [`DefaultRegistrationHandler`];
//! [`ConfirmingRequestHandler`] holds a service-feature request in `prepare`
//! until the user decides through its [`Confirmation`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::handler::{Handler, Prepare, RegistrationHandler, RequestServiceFeaturesHandler};

/// Steps of the registration flow shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationEvent {
    /// Registration with the broker has begun.
    StartRegistration,
    /// The broker could not be bound.
    PmpNotInstalled,
    /// The broker accepted the app.
    RegistrationSucceeded,
    /// The broker refused the app or did not answer in time.
    RegistrationFailed,
    /// The app was registered before.
    AlreadyRegistered,
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationEvent::StartRegistration => "start-registration",
            RegistrationEvent::PmpNotInstalled => "pmp-not-installed",
            RegistrationEvent::RegistrationSucceeded => "registration-succeeded",
            RegistrationEvent::RegistrationFailed => "registration-failed",
            RegistrationEvent::AlreadyRegistered => "already-registered",
        };
        f.write_str(name)
    }
}

/// A surface that can present the registration flow.
pub trait RegistrationUi: Send + Sync + 'static {
    /// Platform context the surface lives in.
    type Context;
    /// Handle to one element of the surface.
    type View;

    /// The platform context.
    fn context(&self) -> &Self::Context;

    /// Look up an element of the surface.
    fn find_view_by_id(&self, id: u32) -> Option<Self::View>;

    /// Show `event`; `parameters` carries e.g. the broker's failure message.
    fn invoke_event(&self, event: RegistrationEvent, parameters: &[String]);

    /// Dismiss the surface.
    fn close(&self);
}

/// Registration handler that forwards every step to a [`RegistrationUi`].
pub struct DefaultRegistrationHandler<U> {
    ui: Arc<U>,
}

impl<U: RegistrationUi> DefaultRegistrationHandler<U> {
    /// Forward registration steps to `ui`.
    pub fn new(ui: Arc<U>) -> Self {
        Self { ui }
    }

    /// The surface events are sent to.
    pub fn ui(&self) -> &Arc<U> {
        &self.ui
    }
}

impl<U: RegistrationUi> Handler for DefaultRegistrationHandler<U> {
    fn on_binding_failed(&self) {
        self.ui.invoke_event(RegistrationEvent::PmpNotInstalled, &[]);
    }

    fn on_timeout(&self) {
        self.ui.invoke_event(
            RegistrationEvent::RegistrationFailed,
            &["privacy broker did not answer in time".to_string()],
        );
    }
}

impl<U: RegistrationUi> RegistrationHandler for DefaultRegistrationHandler<U> {
    fn on_registration(&self) {
        self.ui.invoke_event(RegistrationEvent::StartRegistration, &[]);
    }

    fn on_already_registered(&self) {
        self.ui.invoke_event(RegistrationEvent::AlreadyRegistered, &[]);
        self.ui.close();
    }

    fn on_success(&self) {
        self.ui.invoke_event(RegistrationEvent::RegistrationSucceeded, &[]);
    }

    fn on_failure(&self, message: &str) {
        self.ui
            .invoke_event(RegistrationEvent::RegistrationFailed, &[message.to_string()]);
    }
}

/// Service-feature request handler that waits for the user in `prepare`.
///
/// The request goes out only if the paired [`Confirmation`] approves it.
/// Declining, or dropping the confirmation, aborts the command before any
/// bind.
pub struct ConfirmingRequestHandler {
    decision: Mutex<Option<oneshot::Receiver<bool>>>,
}

/// The user's side of a [`ConfirmingRequestHandler`].
#[derive(Debug)]
pub struct Confirmation {
    tx: oneshot::Sender<bool>,
}

impl ConfirmingRequestHandler {
    /// Create the handler and the confirmation that releases it.
    pub fn new() -> (Self, Confirmation) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                decision: Mutex::new(Some(rx)),
            },
            Confirmation { tx },
        )
    }
}

impl Confirmation {
    /// Let the request go out.
    pub fn approve(self) {
        let _ = self.tx.send(true);
    }

    /// Kill the request; nothing is sent to the broker.
    pub fn decline(self) {
        let _ = self.tx.send(false);
    }
}

#[async_trait]
impl Handler for ConfirmingRequestHandler {
    async fn prepare(&self) -> Prepare {
        let decision = self
            .decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(decision) = decision else {
            tracing::warn!("confirmation already consumed, aborting request");
            return Prepare::Abort;
        };

        match decision.await {
            Ok(true) => Prepare::Continue,
            Ok(false) => {
                tracing::debug!("user declined the service feature request");
                Prepare::Abort
            }
            Err(_) => {
                tracing::debug!("confirmation dropped without a decision");
                Prepare::Abort
            }
        }
    }
}

impl RequestServiceFeaturesHandler for ConfirmingRequestHandler {
    fn on_request_failed(&self) {
        tracing::warn!("service feature request could not be placed");
    }
}
