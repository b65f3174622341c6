//! Remote service facades.
//!
//! A [`Facade`] is what a successful bind hands to the commands: the typed
//! proxy for whatever sits on the other side of the IPC boundary. The broker
//! exposes [`PmpService`]; every app exposes [`AppService`] so the broker can
//! push service-feature verdicts back.
//!
//! Every operation returns a [`RemoteError`] on transport-level failure.
//! Business-level refusals are ordinary return values (`false`, a failed
//! [`RegistrationResult`]) and never errors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Enabled state per service-feature identifier.
pub type ServiceFeatureStates = BTreeMap<String, bool>;

/// Outcome of asking the broker to register an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    /// Whether the registration went through.
    pub success: bool,
    /// Reason given by the broker, usually present on failure.
    pub message: Option<String>,
}

impl RegistrationResult {
    /// A successful registration.
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A refused registration with the broker's reason.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Identifies one resource inside a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Package of the resource group.
    pub resource_group: String,
    /// Resource name within the group.
    pub resource: String,
}

impl ResourceIdentifier {
    /// Create a new identifier.
    pub fn new(resource_group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.resource)
    }
}

/// Access handle the broker hands out for a granted resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// The resource this handle grants.
    pub resource: ResourceIdentifier,
    /// Address the app uses to talk to the resource.
    pub endpoint: String,
}

/// Operations the broker exposes to apps.
#[async_trait]
pub trait PmpService: Send + Sync + 'static {
    /// Whether `app` is already registered.
    async fn is_registered(&self, app: &str) -> Result<bool, RemoteError>;

    /// Register `app` with the broker.
    async fn register_app(&self, app: &str) -> Result<RegistrationResult, RemoteError>;

    /// Ask the broker to push the current service-feature verdicts to `app`.
    ///
    /// Returns `false` if the broker refuses to schedule the update.
    async fn get_service_feature_update(&self, app: &str) -> Result<bool, RemoteError>;

    /// Ask the user to enable `features` for `app`.
    ///
    /// Returns `false` if the request could not be placed.
    async fn request_service_features(
        &self,
        app: &str,
        features: &[String],
    ) -> Result<bool, RemoteError>;

    /// Obtain an access handle for a resource, if `app` may use it.
    async fn get_resource(
        &self,
        app: &str,
        resource: &ResourceIdentifier,
    ) -> Result<Option<ResourceHandle>, RemoteError>;

    /// Whether the resource group serves mocked data to `app`.
    async fn is_mocked(&self, app: &str, resource_group: &str) -> Result<bool, RemoteError>;
}

/// Operations every app exposes to the broker.
#[async_trait]
pub trait AppService: Send + Sync + 'static {
    /// Deliver the current service-feature verdicts.
    async fn update_service_features(
        &self,
        states: ServiceFeatureStates,
    ) -> Result<(), RemoteError>;
}

/// A bound remote endpoint.
///
/// Cloning is cheap; all clones talk to the same binding.
#[derive(Clone)]
pub enum Facade {
    /// The broker.
    Pmp(Arc<dyn PmpService>),
    /// An app.
    App(Arc<dyn AppService>),
}

impl Facade {
    /// Interface descriptor of the broker facade.
    pub const PMP_INTERFACE: &'static str = "pmp";

    /// Interface descriptor of the app facade.
    pub const APP_INTERFACE: &'static str = "app";

    /// The interface descriptor of this facade.
    pub fn interface(&self) -> &'static str {
        match self {
            Facade::Pmp(_) => Self::PMP_INTERFACE,
            Facade::App(_) => Self::APP_INTERFACE,
        }
    }

    /// Borrow the broker interface, or report what was bound instead.
    pub fn as_pmp(&self) -> Result<&dyn PmpService, RemoteError> {
        match self {
            Facade::Pmp(pmp) => Ok(pmp.as_ref()),
            other => Err(RemoteError::WrongInterface {
                expected: Self::PMP_INTERFACE,
                found: other.interface(),
            }),
        }
    }

    /// Borrow the app interface, or report what was bound instead.
    pub fn as_app(&self) -> Result<&dyn AppService, RemoteError> {
        match self {
            Facade::App(app) => Ok(app.as_ref()),
            other => Err(RemoteError::WrongInterface {
                expected: Self::APP_INTERFACE,
                found: other.interface(),
            }),
        }
    }
}

impl fmt::Debug for Facade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Facade").field(&self.interface()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl AppService for Silent {
        async fn update_service_features(
            &self,
            _states: ServiceFeatureStates,
        ) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[test]
    fn test_interface_mismatch_is_reported() {
        let facade = Facade::App(Arc::new(Silent));
        assert_eq!(facade.interface(), "app");
        assert!(facade.as_app().is_ok());

        let err = facade.as_pmp().err().unwrap();
        assert_eq!(
            err,
            RemoteError::WrongInterface {
                expected: "pmp",
                found: "app"
            }
        );
    }

    #[test]
    fn test_registration_result_constructors() {
        assert!(RegistrationResult::success().success);
        let failed = RegistrationResult::failure("quota");
        assert!(!failed.success);
        assert_eq!(failed.message.as_deref(), Some("quota"));
    }

    #[test]
    fn test_resource_identifier_display() {
        let id = ResourceIdentifier::new("rg.location", "absoluteLocation");
        assert_eq!(id.to_string(), "rg.location/absoluteLocation");
    }
}
