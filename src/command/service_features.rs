//! Service-feature commands sent to the broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Command, CommandHeader, CommandKind, Delivery, Target};
use crate::error::{PmpError, RemoteError, Result};
use crate::facade::Facade;
use crate::handler::{NullHandler, RequestServiceFeaturesHandler, ServiceFeatureUpdateHandler};

/// Asks the broker to push the app's current service-feature verdicts.
///
/// The verdicts themselves arrive later through
/// [`AppService::update_service_features`](crate::facade::AppService::update_service_features);
/// this command only reports whether the broker agreed to send them.
pub struct ServiceFeatureUpdateCommand {
    header: CommandHeader,
    handler: Arc<dyn ServiceFeatureUpdateHandler>,
}

impl ServiceFeatureUpdateCommand {
    /// Create an update command for `source`.
    pub fn new(
        handler: Option<Arc<dyn ServiceFeatureUpdateHandler>>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            header: CommandHeader::new(
                CommandKind::ServiceFeatureUpdate,
                source,
                Target::Pmp,
                timeout,
            )?,
            handler: handler.unwrap_or_else(<Self as Command>::null_handler),
        })
    }
}

#[async_trait]
impl Command for ServiceFeatureUpdateCommand {
    type Handler = dyn ServiceFeatureUpdateHandler;
    type Reply = bool;

    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn handler(&self) -> &Self::Handler {
        self.handler.as_ref()
    }

    fn null_handler() -> Arc<Self::Handler> {
        Arc::new(NullHandler)
    }

    async fn execute_on_remote(&self, facade: &Facade) -> std::result::Result<bool, RemoteError> {
        facade
            .as_pmp()?
            .get_service_feature_update(self.header.source())
            .await
    }

    fn deliver(&self, scheduled: bool) -> Delivery {
        if scheduled {
            Delivery::Success
        } else {
            self.handler.on_update_failed();
            Delivery::DomainFailure("broker refused the service feature update".to_string())
        }
    }
}

/// Asks the broker to let the user enable a set of service features.
pub struct RequestServiceFeaturesCommand {
    header: CommandHeader,
    features: Vec<String>,
    handler: Arc<dyn RequestServiceFeaturesHandler>,
}

impl RequestServiceFeaturesCommand {
    /// Create a request for `features` on behalf of `source`.
    ///
    /// An empty feature list is rejected.
    pub fn new(
        features: Vec<String>,
        handler: Option<Arc<dyn RequestServiceFeaturesHandler>>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(PmpError::InvalidConfiguration(
                "service feature request needs at least one feature".to_string(),
            ));
        }
        Ok(Self {
            header: CommandHeader::new(
                CommandKind::RequestServiceFeatures,
                source,
                Target::Pmp,
                timeout,
            )?,
            features,
            handler: handler.unwrap_or_else(<Self as Command>::null_handler),
        })
    }

    /// The requested service features.
    pub fn features(&self) -> &[String] {
        &self.features
    }
}

#[async_trait]
impl Command for RequestServiceFeaturesCommand {
    type Handler = dyn RequestServiceFeaturesHandler;
    type Reply = bool;

    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn handler(&self) -> &Self::Handler {
        self.handler.as_ref()
    }

    fn null_handler() -> Arc<Self::Handler> {
        Arc::new(NullHandler)
    }

    async fn execute_on_remote(&self, facade: &Facade) -> std::result::Result<bool, RemoteError> {
        facade
            .as_pmp()?
            .request_service_features(self.header.source(), &self.features)
            .await
    }

    fn deliver(&self, placed: bool) -> Delivery {
        if placed {
            Delivery::Success
        } else {
            self.handler.on_request_failed();
            Delivery::DomainFailure(format!(
                "request for {} service features was not placed",
                self.features.len()
            ))
        }
    }
}
