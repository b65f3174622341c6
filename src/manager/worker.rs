//! The per-command worker.
//!
//! Runs `prepare`, then races the attempt (permit, bind, execute) against
//! the command's deadline. Whichever side claims the [`OutcomeGuard`] first
//! fires the one terminal hook; the other side's result is dropped.

use std::sync::Arc;

use tokio::time::Instant;

use super::Shared;
use crate::command::{Command, Outcome};
use crate::error::{BindError, PmpError, Result};
use crate::handler::{Handler, OutcomeGuard, Prepare};

pub(crate) async fn run<C: Command>(command: Arc<C>, shared: Arc<Shared>) -> Result<Outcome> {
    let kind = command.header().kind();

    if let Prepare::Abort = command.handler().prepare().await {
        tracing::debug!("{} from {} aborted in prepare", kind, command.header().source());
        return Ok(Outcome::Aborted);
    }

    let timeout = command.header().timeout();
    // A timeout past the clock's range never expires.
    let expiry = async {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    let guard = OutcomeGuard::new();

    let mut attempt = shared.runtime.spawn(attempt(
        Arc::clone(&command),
        Arc::clone(&shared),
        guard.clone(),
    ));

    tokio::select! {
        joined = &mut attempt => joined.map_err(|e| PmpError::Worker(e.to_string())),
        _ = expiry => {
            if guard.claim() {
                attempt.abort();
                tracing::warn!("{} from {} timed out after {:?}", kind, command.header().source(), timeout);
                command.handler().on_timeout();
                Ok(Outcome::TimedOut(timeout))
            } else {
                // The attempt claimed first and is delivering.
                attempt.await.map_err(|e| PmpError::Worker(e.to_string()))
            }
        }
    }
}

async fn attempt<C: Command>(command: Arc<C>, shared: Arc<Shared>, guard: OutcomeGuard) -> Outcome {
    let header = command.header();
    let destination = shared.destination(header.target()).to_string();

    let _permit = match Arc::clone(&shared.permits).try_acquire_owned() {
        Ok(permit) => Ok(permit),
        Err(_) => {
            tracing::debug!("in-flight cap reached, {} waits for a permit", header.kind());
            Arc::clone(&shared.permits).acquire_owned().await
        }
    };
    let _lease = shared.bindings.lease(&destination);

    let result = match shared.bindings.acquire(&destination).await {
        Ok(facade) => match command.execute_on_remote(&facade).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if err.invalidates_binding() {
                    shared.bindings.invalidate(&destination, &facade);
                }
                Err(BindError::from(err))
            }
        },
        Err(err) => Err(err),
    };

    if !guard.claim() {
        tracing::debug!("late result of {} to {} discarded", header.kind(), destination);
        return Outcome::TimedOut(header.timeout());
    }

    match result {
        Ok(reply) => {
            let delivery = command.deliver(reply);
            command.handler().finalize();
            Outcome::Executed(delivery)
        }
        Err(err) => {
            tracing::warn!("{} to {} failed: {}", header.kind(), destination, err);
            command.handler().on_binding_failed();
            Outcome::BindingFailed(err)
        }
    }
}
