//! Broker-to-app push of service-feature verdicts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Command, CommandHeader, CommandKind, Delivery, Target};
use crate::error::{RemoteError, Result};
use crate::facade::{Facade, ServiceFeatureStates};
use crate::handler::{Handler, NullHandler};

/// Pushes service-feature verdicts to one app.
///
/// Only the base lifecycle hooks apply; the app acknowledges or the call
/// fails at transport level.
pub struct ServiceFeatureRolloutCommand {
    header: CommandHeader,
    states: ServiceFeatureStates,
    handler: Arc<dyn Handler>,
}

impl ServiceFeatureRolloutCommand {
    /// Create a rollout from `source` (the broker) to `app`.
    pub fn new(
        app: impl Into<String>,
        states: ServiceFeatureStates,
        handler: Option<Arc<dyn Handler>>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            header: CommandHeader::new(
                CommandKind::ServiceFeatureRollout,
                source,
                Target::App(app.into()),
                timeout,
            )?,
            states,
            handler: handler.unwrap_or_else(<Self as Command>::null_handler),
        })
    }

    /// Verdicts being pushed.
    pub fn states(&self) -> &ServiceFeatureStates {
        &self.states
    }
}

#[async_trait]
impl Command for ServiceFeatureRolloutCommand {
    type Handler = dyn Handler;
    type Reply = ();

    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn handler(&self) -> &Self::Handler {
        self.handler.as_ref()
    }

    fn null_handler() -> Arc<Self::Handler> {
        Arc::new(NullHandler)
    }

    async fn execute_on_remote(&self, facade: &Facade) -> std::result::Result<(), RemoteError> {
        facade
            .as_app()?
            .update_service_features(self.states.clone())
            .await
    }

    fn deliver(&self, _reply: ()) -> Delivery {
        Delivery::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApp, FakePmp};

    fn states() -> ServiceFeatureStates {
        [("sf.read".to_string(), true), ("sf.write".to_string(), false)]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_rollout_pushes_states() {
        let app = FakeApp::new();
        let cmd =
            ServiceFeatureRolloutCommand::new("app.one", states(), None, "pmp", Duration::from_secs(1))
                .unwrap();

        assert_eq!(cmd.header().target(), &Target::App("app.one".to_string()));
        cmd.execute_on_remote(&app.facade()).await.unwrap();
        assert_eq!(app.received(), vec![states()]);
    }

    #[tokio::test]
    async fn test_rollout_to_broker_facade_fails() {
        let cmd =
            ServiceFeatureRolloutCommand::new("app.one", states(), None, "pmp", Duration::from_secs(1))
                .unwrap();
        let err = cmd
            .execute_on_remote(&FakePmp::new().facade())
            .await
            .unwrap_err();
        assert!(err.invalidates_binding());
    }

    #[test]
    fn test_empty_app_rejected() {
        assert!(ServiceFeatureRolloutCommand::new(
            "",
            states(),
            None,
            "pmp",
            Duration::from_secs(1)
        )
        .is_err());
    }
}
