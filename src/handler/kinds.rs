//! Command-specific handler extensions.
//!
//! Each kind adds the outcome hooks of one command on top of [`Handler`].
//! The command decides which of them fires; the base lifecycle never
//! assumes one.

use super::{Handler, NullHandler};
use crate::facade::{ResourceHandle, ResourceIdentifier, ServiceFeatureStates};

/// Hooks of the registration command.
pub trait RegistrationHandler: Handler {
    /// The app is not registered yet and registration is about to start.
    fn on_registration(&self) {}

    /// The app was registered before; nothing was done.
    fn on_already_registered(&self) {}

    /// Registration succeeded.
    fn on_success(&self) {}

    /// The broker refused the registration.
    fn on_failure(&self, _message: &str) {}
}

/// Hooks of the service-feature update command.
pub trait ServiceFeatureUpdateHandler: Handler {
    /// The broker refused to schedule the update.
    fn on_update_failed(&self) {}

    /// The broker's pushed verdicts arrived.
    fn on_update(&self, _states: &ServiceFeatureStates) {}
}

/// Hooks of the service-feature request command.
pub trait RequestServiceFeaturesHandler: Handler {
    /// The request could not be placed.
    fn on_request_failed(&self) {}
}

/// Hooks of the resource request command.
pub trait RequestResourceHandler: Handler {
    /// The broker answered the resource request.
    ///
    /// `handle` is `None` when access was denied.
    fn on_receive_resource(
        &self,
        _resource: &ResourceIdentifier,
        _handle: Option<&ResourceHandle>,
        _mocked: bool,
    ) {
    }
}

impl RegistrationHandler for NullHandler {}
impl ServiceFeatureUpdateHandler for NullHandler {}
impl RequestServiceFeaturesHandler for NullHandler {}
impl RequestResourceHandler for NullHandler {}
