//! Per-destination binding table.
//!
//! One entry per destination moves through `Unbound → Binding → Bound`. The
//! first command that finds a destination unbound starts the bind on its own
//! task; every later command joins the same attempt through a `watch`
//! channel, so one result (success or failure) reaches all of them.
//!
//! Commands hold a [`BindingLease`] while they need the binding. When the
//! last lease is dropped the binding lingers for the configured period and
//! is then released through [`Binder::unbind`], unless a new lease arrived.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::binder::Binder;
use crate::error::BindError;
use crate::facade::Facade;
use crate::intent::{upgrade_descriptor, IntentResolver, ServiceDescriptor};

type BindResult = Result<Facade, BindError>;

/// Observable state of one destination's binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStatus {
    /// No session and no attempt in progress.
    Unbound,
    /// A bind attempt is in progress.
    Binding,
    /// A facade is available.
    Bound,
}

enum BindingState {
    Unbound,
    Binding(watch::Receiver<Option<BindResult>>),
    Bound(Facade),
}

struct Entry {
    state: BindingState,
    /// Leases currently held.
    pending: usize,
    /// Restamped on every lease and idle transition; a linger timer only
    /// fires if the epoch it captured is still current.
    epoch: u64,
    /// Identifies the bind attempt allowed to settle this entry.
    attempt: u64,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            state: BindingState::Unbound,
            pending: 0,
            epoch: 0,
            attempt: 0,
        }
    }
}

impl Entry {
    fn status(&self) -> BindingStatus {
        match self.state {
            BindingState::Unbound => BindingStatus::Unbound,
            BindingState::Binding(_) => BindingStatus::Binding,
            BindingState::Bound(_) => BindingStatus::Bound,
        }
    }
}

/// What to do once the table lock is released.
enum Idle {
    Nothing,
    UnbindNow,
    Linger(u64),
}

pub(crate) struct Bindings {
    binder: Arc<dyn Binder>,
    resolver: Option<Arc<dyn IntentResolver>>,
    linger: Duration,
    runtime: Handle,
    table: Mutex<HashMap<String, Entry>>,
    /// Source of epoch and attempt stamps. Stamps stay unique across entries
    /// that are removed and recreated.
    stamps: AtomicU64,
}

impl Bindings {
    pub(crate) fn new(
        binder: Arc<dyn Binder>,
        resolver: Option<Arc<dyn IntentResolver>>,
        linger: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            binder,
            resolver,
            linger,
            runtime,
            table: Mutex::new(HashMap::new()),
            stamps: AtomicU64::new(0),
        }
    }

    fn stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self, destination: &str) -> BindingStatus {
        self.table()
            .get(destination)
            .map_or(BindingStatus::Unbound, Entry::status)
    }

    pub(crate) fn pending(&self, destination: &str) -> usize {
        self.table().get(destination).map_or(0, |e| e.pending)
    }

    /// Register interest in `destination`; cancels any pending linger.
    pub(crate) fn lease(self: &Arc<Self>, destination: &str) -> BindingLease {
        let mut table = self.table();
        let entry = table.entry(destination.to_string()).or_default();
        entry.pending += 1;
        entry.epoch = self.stamp();
        BindingLease {
            bindings: Arc::clone(self),
            destination: destination.to_string(),
        }
    }

    /// Get the facade for `destination`, binding or joining a bind if needed.
    pub(crate) async fn acquire(self: &Arc<Self>, destination: &str) -> BindResult {
        let (mut rx, attempt) = {
            let mut table = self.table();
            let entry = table.entry(destination.to_string()).or_default();
            match entry.state {
                BindingState::Bound(ref facade) => return Ok(facade.clone()),
                BindingState::Binding(ref rx) => {
                    tracing::debug!(destination, "joining bind in progress");
                    (rx.clone(), entry.attempt)
                }
                BindingState::Unbound => {
                    let (tx, rx) = watch::channel(None);
                    entry.attempt = self.stamp();
                    entry.state = BindingState::Binding(rx.clone());
                    let attempt = entry.attempt;
                    self.runtime.spawn(Arc::clone(self).run_bind(
                        destination.to_string(),
                        attempt,
                        tx,
                    ));
                    (rx, attempt)
                }
            }
        };

        let settled = rx
            .wait_for(Option::is_some)
            .await
            .map(|result| (*result).clone());
        match settled {
            Ok(Some(result)) => result,
            _ => {
                tracing::warn!(destination, "bind task ended without a result");
                self.abandon(destination, attempt);
                Err(BindError::Abandoned)
            }
        }
    }

    async fn run_bind(
        self: Arc<Self>,
        destination: String,
        attempt: u64,
        tx: watch::Sender<Option<BindResult>>,
    ) {
        let mut descriptor = ServiceDescriptor::new(destination.clone());
        if let Some(resolver) = &self.resolver {
            upgrade_descriptor(resolver.as_ref(), &mut descriptor);
        }

        tracing::debug!(destination = %destination, "binding");
        let result = self.binder.bind(&destination, &descriptor).await;

        let idle = {
            let mut table = self.table();
            let idle = match table.get_mut(&destination) {
                Some(entry) if entry.attempt == attempt => match &result {
                    Ok(facade) => {
                        tracing::debug!(destination = %destination, interface = facade.interface(), "bound");
                        entry.state = BindingState::Bound(facade.clone());
                        if entry.pending == 0 {
                            self.go_idle(entry)
                        } else {
                            Idle::Nothing
                        }
                    }
                    Err(err) => {
                        tracing::warn!(destination = %destination, error = %err, "bind failed");
                        entry.state = BindingState::Unbound;
                        Idle::Nothing
                    }
                },
                _ => Idle::Nothing,
            };
            prune(&mut table, &destination);
            idle
        };
        self.apply(&destination, idle);

        tx.send_replace(Some(result));
    }

    /// Drop a binding that failed mid-call. Only the facade that failed is
    /// torn down; a newer binding is left alone.
    pub(crate) fn invalidate(&self, destination: &str, facade: &Facade) {
        let dropped = {
            let mut table = self.table();
            let dropped = match table.get_mut(destination) {
                Some(entry)
                    if matches!(&entry.state, BindingState::Bound(bound) if same_endpoint(bound, facade)) =>
                {
                    entry.state = BindingState::Unbound;
                    true
                }
                _ => false,
            };
            prune(&mut table, destination);
            dropped
        };
        if dropped {
            tracing::warn!(destination, "binding lost, unbinding");
            self.binder.unbind(destination);
        }
    }

    fn abandon(&self, destination: &str, attempt: u64) {
        let mut table = self.table();
        if let Some(entry) = table.get_mut(destination) {
            if entry.attempt == attempt && matches!(entry.state, BindingState::Binding(_)) {
                entry.state = BindingState::Unbound;
            }
        }
        prune(&mut table, destination);
    }

    fn release(self: &Arc<Self>, destination: &str) {
        let idle = {
            let mut table = self.table();
            let idle = match table.get_mut(destination) {
                Some(entry) => {
                    entry.pending = entry.pending.saturating_sub(1);
                    if entry.pending == 0 && matches!(entry.state, BindingState::Bound(_)) {
                        self.go_idle(entry)
                    } else {
                        Idle::Nothing
                    }
                }
                None => Idle::Nothing,
            };
            prune(&mut table, destination);
            idle
        };
        self.apply(destination, idle);
    }

    /// Decide what an idle bound entry does. Called with the lock held.
    fn go_idle(&self, entry: &mut Entry) -> Idle {
        entry.epoch = self.stamp();
        if self.linger.is_zero() {
            entry.state = BindingState::Unbound;
            Idle::UnbindNow
        } else {
            Idle::Linger(entry.epoch)
        }
    }

    fn apply(self: &Arc<Self>, destination: &str, idle: Idle) {
        match idle {
            Idle::Nothing => {}
            Idle::UnbindNow => {
                tracing::debug!(destination, "unbinding idle destination");
                self.binder.unbind(destination);
            }
            Idle::Linger(epoch) => {
                let bindings = Arc::clone(self);
                let destination = destination.to_string();
                self.runtime.spawn(async move {
                    tokio::time::sleep(bindings.linger).await;
                    bindings.expire(&destination, epoch);
                });
            }
        }
    }

    fn expire(&self, destination: &str, epoch: u64) {
        let expired = {
            let mut table = self.table();
            match table.get_mut(destination) {
                Some(entry)
                    if entry.epoch == epoch
                        && entry.pending == 0
                        && matches!(entry.state, BindingState::Bound(_)) =>
                {
                    table.remove(destination);
                    true
                }
                _ => false,
            }
        };
        if expired {
            tracing::debug!(destination, linger = ?self.linger, "linger elapsed, unbinding");
            self.binder.unbind(destination);
        }
    }
}

/// Drop an entry nobody holds and nothing is bound for.
fn prune(table: &mut HashMap<String, Entry>, destination: &str) {
    if matches!(
        table.get(destination),
        Some(entry) if entry.pending == 0 && matches!(entry.state, BindingState::Unbound)
    ) {
        table.remove(destination);
    }
}

fn same_endpoint(a: &Facade, b: &Facade) -> bool {
    match (a, b) {
        (Facade::Pmp(a), Facade::Pmp(b)) => Arc::ptr_eq(a, b),
        (Facade::App(a), Facade::App(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Interest of one command in a destination's binding.
///
/// Dropping the lease (including when the command's task is aborted) lets
/// the binding go idle.
pub(crate) struct BindingLease {
    bindings: Arc<Bindings>,
    destination: String,
}

impl Drop for BindingLease {
    fn drop(&mut self) {
        self.bindings.release(&self.destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{ComponentName, StaticResolver};
    use crate::testing::{FakeBinder, FakePmp};

    fn bindings(binder: Arc<FakeBinder>, linger: Duration) -> Arc<Bindings> {
        Arc::new(Bindings::new(binder, None, linger, Handle::current()))
    }

    fn entries(bindings: &Bindings) -> usize {
        bindings.table().len()
    }

    #[tokio::test]
    async fn test_bind_once_then_reuse() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let _lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        bindings.acquire("pmp").await.unwrap();

        assert_eq!(binder.binds(), 1);
        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);
        assert_eq!(bindings.pending("pmp"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquirers_share_attempt() {
        let binder = Arc::new(
            FakeBinder::new()
                .with("pmp", FakePmp::new().facade())
                .delay(Duration::from_millis(50)),
        );
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let _a = bindings.lease("pmp");
        let _b = bindings.lease("pmp");
        let (first, second) = tokio::join!(bindings.acquire("pmp"), bindings.acquire("pmp"));

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(binder.binds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fans_out_and_resets() {
        let binder = Arc::new(
            FakeBinder::new()
                .failing(BindError::Rejected("denied".into()))
                .delay(Duration::from_millis(10)),
        );
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let _a = bindings.lease("pmp");
        let (first, second) = tokio::join!(bindings.acquire("pmp"), bindings.acquire("pmp"));

        assert_eq!(first.unwrap_err(), BindError::Rejected("denied".into()));
        assert_eq!(second.unwrap_err(), BindError::Rejected("denied".into()));
        assert_eq!(bindings.status("pmp"), BindingStatus::Unbound);
        assert_eq!(binder.binds(), 1);
    }

    #[tokio::test]
    async fn test_failed_destinations_leave_no_entries() {
        let binder = Arc::new(FakeBinder::new());
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        for app in ["app.one", "app.two", "app.three"] {
            let lease = bindings.lease(app);
            assert!(matches!(
                bindings.acquire(app).await,
                Err(BindError::NotInstalled(_))
            ));
            assert_eq!(entries(&bindings), 1);
            drop(lease);
        }

        assert_eq!(entries(&bindings), 0);
        assert_eq!(binder.binds(), 3);
    }

    #[tokio::test]
    async fn test_invalidated_entry_removed_once_released() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let lease = bindings.lease("pmp");
        let facade = bindings.acquire("pmp").await.unwrap();
        bindings.invalidate("pmp", &facade);
        assert_eq!(entries(&bindings), 1);

        drop(lease);
        assert_eq!(entries(&bindings), 0);

        let _lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);
        assert_eq!(binder.binds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_linger_spares_recreated_entry() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        // Idle binding with a linger timer armed, then dropped and rebound.
        let lease = bindings.lease("pmp");
        let facade = bindings.acquire("pmp").await.unwrap();
        drop(lease);
        bindings.invalidate("pmp", &facade);
        assert_eq!(entries(&bindings), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        drop(lease);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);
        assert_eq!(binder.unbinds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linger_then_unbind() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        drop(lease);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);
        assert_eq!(binder.unbinds(), 0);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(bindings.status("pmp"), BindingStatus::Unbound);
        assert_eq!(binder.unbinds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_lease_cancels_linger() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        drop(lease);

        tokio::time::sleep(Duration::from_secs(20)).await;
        let _again = bindings.lease("pmp");
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);
        assert_eq!(binder.unbinds(), 0);
        assert_eq!(binder.binds(), 1);
    }

    #[tokio::test]
    async fn test_zero_linger_unbinds_immediately() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::ZERO);

        let lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();
        drop(lease);

        assert_eq!(bindings.status("pmp"), BindingStatus::Unbound);
        assert_eq!(binder.unbinds(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_matching_facade() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let bindings = bindings(binder.clone(), Duration::from_secs(30));

        let _lease = bindings.lease("pmp");
        let facade = bindings.acquire("pmp").await.unwrap();

        bindings.invalidate("pmp", &FakePmp::new().facade());
        assert_eq!(bindings.status("pmp"), BindingStatus::Bound);

        bindings.invalidate("pmp", &facade);
        assert_eq!(bindings.status("pmp"), BindingStatus::Unbound);
        assert_eq!(binder.unbinds(), 1);
    }

    #[tokio::test]
    async fn test_resolver_upgrades_descriptor() {
        let binder = Arc::new(FakeBinder::new().with("pmp", FakePmp::new().facade()));
        let resolver = StaticResolver::new().install("pmp", ComponentName::new("de.pmp", "PMPService"));
        let bindings = Arc::new(Bindings::new(
            binder.clone(),
            Some(Arc::new(resolver)),
            Duration::from_secs(30),
            Handle::current(),
        ));

        let _lease = bindings.lease("pmp");
        bindings.acquire("pmp").await.unwrap();

        let descriptors = binder.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].is_explicit());
    }
}
