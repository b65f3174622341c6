//! The platform's service-binding primitive.
//!
//! The [`ConnectionManager`](crate::ConnectionManager) is the only caller.
//! It adapts the asynchronous bind result into its per-destination state
//! machine and calls [`Binder::unbind`] once a binding has been idle for the
//! configured linger.

use async_trait::async_trait;

use crate::error::BindError;
use crate::facade::Facade;
use crate::intent::ServiceDescriptor;

/// Establishes sessions to remote processes.
#[async_trait]
pub trait Binder: Send + Sync + 'static {
    /// Bind to `destination`, described by `descriptor`.
    ///
    /// Resolves once the remote side is connected (with its facade) or the
    /// bind has definitely failed.
    async fn bind(
        &self,
        destination: &str,
        descriptor: &ServiceDescriptor,
    ) -> Result<Facade, BindError>;

    /// Release the session to `destination`.
    fn unbind(&self, _destination: &str) {}
}
