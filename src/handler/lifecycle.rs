//! Base lifecycle hooks.
//!
//! Hooks run on the manager's worker task, never inline in
//! [`ConnectionManager::submit`](crate::ConnectionManager::submit). For one
//! command they are totally ordered:
//!
//! ```text
//! prepare ─┬─ Abort ──────────────────────────────► (nothing else)
//!          └─ Continue ─┬─ on_binding_failed
//!                       ├─ on_timeout
//!                       └─ <outcome hook> ─► finalize
//! ```

use async_trait::async_trait;

/// Decision returned by [`Handler::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepare {
    /// Go on with the command.
    Continue,
    /// Cancel the command before any bind or remote call.
    Abort,
}

/// Lifecycle hooks shared by every command kind.
///
/// All hooks default to doing nothing. Implementations that need state use
/// interior mutability; a handler belongs to exactly one command.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Called before the connection is established.
    ///
    /// May wait (for example on a confirmation dialog). Returning
    /// [`Prepare::Abort`] ends the command silently.
    async fn prepare(&self) -> Prepare {
        Prepare::Continue
    }

    /// Called after the remote side answered, whatever it answered.
    fn finalize(&self) {}

    /// Called when the destination cannot be bound or was lost mid-call.
    fn on_binding_failed(&self) {}

    /// Called when the command deadline elapsed first.
    fn on_timeout(&self) {}
}

/// Handler that performs no operation whatsoever.
///
/// Implements every handler kind, so any command can fall back to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl Handler for NullHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_prepare_continues() {
        assert_eq!(NullHandler.prepare().await, Prepare::Continue);
    }

    #[tokio::test]
    async fn test_null_handler_hooks_are_noops() {
        let handler = NullHandler;
        handler.finalize();
        handler.on_binding_failed();
        handler.on_timeout();
    }
}
