//! Resource request command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Command, CommandHeader, CommandKind, Delivery, Target};
use crate::error::{RemoteError, Result};
use crate::facade::{Facade, ResourceHandle, ResourceIdentifier};
use crate::handler::{NullHandler, RequestResourceHandler};

/// Broker answer to a resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReply {
    /// Access handle, `None` if access was denied.
    pub handle: Option<ResourceHandle>,
    /// Whether the resource group serves mocked data to this app.
    pub mocked: bool,
}

/// Obtains an access handle for one resource.
pub struct RequestResourceCommand {
    header: CommandHeader,
    resource: ResourceIdentifier,
    handler: Arc<dyn RequestResourceHandler>,
}

impl RequestResourceCommand {
    /// Request `resource` on behalf of `source`.
    pub fn new(
        resource: ResourceIdentifier,
        handler: Option<Arc<dyn RequestResourceHandler>>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            header: CommandHeader::new(CommandKind::RequestResource, source, Target::Pmp, timeout)?,
            resource,
            handler: handler.unwrap_or_else(<Self as Command>::null_handler),
        })
    }

    /// The requested resource.
    pub fn resource(&self) -> &ResourceIdentifier {
        &self.resource
    }
}

#[async_trait]
impl Command for RequestResourceCommand {
    type Handler = dyn RequestResourceHandler;
    type Reply = ResourceReply;

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
    ) -> std::result::Result<ResourceReply, RemoteError> {
        let pmp = facade.as_pmp()?;
        let source = self.header.source();

        let handle = pmp.get_resource(source, &self.resource).await?;
        // Mock state only matters for a granted handle.
        let mocked = match handle {
            Some(_) => pmp.is_mocked(source, &self.resource.resource_group).await?,
            None => false,
        };

        Ok(ResourceReply { handle, mocked })
    }

    fn deliver(&self, reply: ResourceReply) -> Delivery {
        self.handler
            .on_receive_resource(&self.resource, reply.handle.as_ref(), reply.mocked);
        match reply.handle {
            Some(_) => Delivery::Success,
            None => Delivery::DomainFailure(format!("access to {} denied", self.resource)),
        }
    }
}
