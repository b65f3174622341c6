//! Handler module - caller-supplied callbacks for a command's lifecycle.
//!
//! Provides:
//! - [`Handler`] - the base lifecycle hooks every command drives
//! - per-kind extensions ([`RegistrationHandler`], [`ServiceFeatureUpdateHandler`],
//!   [`RequestServiceFeaturesHandler`], [`RequestResourceHandler`])
//! - [`NullHandler`] - the no-op stand-in when a caller passes no handler
//! - [`OutcomeGuard`] - the one-shot claim that keeps terminal hooks exactly-once
//!
//! # Example
//!
//! ```
//! use pmp_ipc::handler::{Handler, RegistrationHandler};
//!
//! struct Logging;
//!
//! impl Handler for Logging {
//!     fn on_timeout(&self) {
//!         eprintln!("broker did not answer");
//!     }
//! }
//!
//! impl RegistrationHandler for Logging {
//!     fn on_failure(&self, message: &str) {
//!         eprintln!("registration refused: {message}");
//!     }
//! }
//! ```

mod guard;
mod kinds;
mod lifecycle;

pub use guard::OutcomeGuard;
pub use kinds::{
    RegistrationHandler, RequestResourceHandler, RequestServiceFeaturesHandler,
    ServiceFeatureUpdateHandler,
};
pub use lifecycle::{Handler, NullHandler, Prepare};
