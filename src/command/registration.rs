//! Command to register an app with the broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Command, CommandHeader, CommandKind, Delivery, Target};
use crate::error::{RemoteError, Result};
use crate::facade::Facade;
use crate::handler::{NullHandler, RegistrationHandler};

/// Reply of the broker to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationReply {
    /// The app was registered before this command.
    AlreadyRegistered,
    /// The app is now registered.
    Registered,
    /// The broker refused, with its reason.
    Refused(String),
}

/// Registers the source app with the broker.
///
/// Asks the broker first whether the app is registered; only if not does it
/// fire [`RegistrationHandler::on_registration`] and register.
pub struct RegistrationCommand {
    header: CommandHeader,
    handler: Arc<dyn RegistrationHandler>,
}

impl RegistrationCommand {
    /// Create a registration command for `source`.
    pub fn new(
        handler: Option<Arc<dyn RegistrationHandler>>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            header: CommandHeader::new(CommandKind::Registration, source, Target::Pmp, timeout)?,
            handler: handler.unwrap_or_else(<Self as Command>::null_handler),
        })
    }
}

#[async_trait]
impl Command for RegistrationCommand {
    type Handler = dyn RegistrationHandler;
    type Reply = RegistrationReply;

    fn header(&self) -> &CommandHeader {
        &self.header
    }

    fn handler(&self) -> &Self::Handler {
        self.handler.as_ref()
    }

    fn null_handler() -> Arc<Self::Handler> {
        Arc::new(NullHandler)
    }

    async fn execute_on_remote(
        &self,
        facade: &Facade,
    ) -> std::result::Result<RegistrationReply, RemoteError> {
        let pmp = facade.as_pmp()?;
        let source = self.header.source();

        if pmp.is_registered(source).await? {
            return Ok(RegistrationReply::AlreadyRegistered);
        }

        self.handler.on_registration();

        let result = pmp.register_app(source).await?;
        if result.success {
            Ok(RegistrationReply::Registered)
        } else {
            Ok(RegistrationReply::Refused(result.message.unwrap_or_default()))
        }
    }

    fn deliver(&self, reply: RegistrationReply) -> Delivery {
        match reply {
            RegistrationReply::AlreadyRegistered => {
                self.handler.on_already_registered();
                Delivery::Success
            }
            RegistrationReply::Registered => {
                self.handler.on_success();
                Delivery::Success
            }
            RegistrationReply::Refused(message) => {
                self.handler.on_failure(&message);
                Delivery::DomainFailure(message)
            }
        }
    }
}
