//! # pmp-ipc
//!
//! Command dispatch core for the Privacy Management Platform.
//!
//! Apps never touch sensitive resources directly; they ask a central broker
//! ("PMP") across a process boundary. This crate carries those requests:
//! typed [`Command`]s with caller-supplied handlers are submitted to a
//! [`ConnectionManager`], which binds to the destination, runs the command
//! on a worker task and fires exactly one terminal handler hook.
//!
//! ## Architecture
//!
//! - **Commands** ([`command`]): registration, service-feature update and
//!   request, resource request, and the broker's rollout to apps
//! - **Handlers** ([`handler`]): lifecycle hooks plus per-kind outcome hooks
//! - **Connection Manager** ([`manager`]): one shared binding per
//!   destination, timeouts, in-flight cap, idle linger
//! - **Facades** ([`facade`]): the typed remote interfaces, bound through a
//!   [`Binder`]
//! - **Client API** ([`Pmp`]) and **rollout** ([`UpdateProvider`])
//! - **Wire transport** ([`wire`]): MessagePack frames over Unix sockets
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pmp_ipc::{ConnectionManager, ManagerConfig, Pmp};
//! use pmp_ipc::wire::PipeBinder;
//!
//! #[tokio::main]
//! async fn main() -> pmp_ipc::Result<()> {
//!     let binder = Arc::new(PipeBinder::new("/run/pmp", "org.example.app"));
//!     let manager = ConnectionManager::new(ManagerConfig::default(), binder)?;
//!     let pmp = Pmp::new("org.example.app", manager)?;
//!
//!     pmp.register(None, None)?.wait().await?.into_result()?;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod command;
pub mod config;
pub mod error;
pub mod facade;
pub mod handler;
pub mod intent;
pub mod manager;
pub mod ui;
pub mod wire;

mod api;
mod provider;

#[cfg(test)]
mod testing;

pub use api::Pmp;
pub use binder::Binder;
pub use command::{
    Command, CommandHeader, CommandKind, Delivery, Outcome, RegistrationCommand,
    RequestResourceCommand, RequestServiceFeaturesCommand, ServiceFeatureRolloutCommand,
    ServiceFeatureUpdateCommand, Target,
};
pub use config::ManagerConfig;
pub use error::{BindError, PmpError, RemoteError, Result};
pub use facade::{AppService, Facade, PmpService};
pub use handler::{Handler, NullHandler, Prepare};
pub use manager::{BindingStatus, CommandTicket, ConnectionManager};
pub use provider::UpdateProvider;
