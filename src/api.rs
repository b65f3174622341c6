//! App-side client API.
//!
//! [`Pmp`] is what an app talks to: it builds the app's commands with its
//! own identity, submits them through a [`ConnectionManager`], and keeps a
//! cache of the service-feature verdicts and resource handles the broker
//! handed out. It also implements [`AppService`], so it can be served to the
//! broker and receive pushed verdicts directly.
//!
//! # Example
//!
//! ```ignore
//! let pmp = Pmp::new("org.example.app", manager)?;
//! pmp.register(None, None)?.wait().await?;
//! pmp.update_service_features(None, None)?;
//! if pmp.is_service_feature_enabled("sf.location") {
//!     // ...
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{
    RegistrationCommand, RequestResourceCommand, RequestServiceFeaturesCommand,
    ServiceFeatureUpdateCommand,
};
use crate::error::{PmpError, RemoteError, Result};
use crate::facade::{AppService, ResourceHandle, ResourceIdentifier, ServiceFeatureStates};
use crate::handler::{
    Handler, NullHandler, Prepare, RegistrationHandler, RequestResourceHandler,
    RequestServiceFeaturesHandler, ServiceFeatureUpdateHandler,
};
use crate::manager::{CommandTicket, ConnectionManager};

/// Client API of one app.
///
/// Cloning is cheap; clones share caches.
#[derive(Clone)]
pub struct Pmp {
    inner: Arc<Inner>,
    default_timeout: Duration,
}

struct Inner {
    app_id: String,
    manager: ConnectionManager,
    features: RwLock<ServiceFeatureStates>,
    resources: RwLock<HashMap<ResourceIdentifier, ResourceHandle>>,
    on_update: Mutex<VecDeque<Arc<dyn ServiceFeatureUpdateHandler>>>,
}

impl Pmp {
    /// Create the API for `app_id`, using the manager's default timeout.
    pub fn new(app_id: impl Into<String>, manager: ConnectionManager) -> Result<Self> {
        let app_id = app_id.into();
        if app_id.is_empty() {
            return Err(PmpError::InvalidConfiguration(
                "app identifier must not be empty".to_string(),
            ));
        }
        let default_timeout = manager.config().default_timeout;
        Ok(Self {
            default_timeout,
            inner: Arc::new(Inner {
                app_id,
                manager,
                features: RwLock::new(ServiceFeatureStates::new()),
                resources: RwLock::new(HashMap::new()),
                on_update: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// Use `timeout` for calls that do not pass one.
    ///
    /// Only affects this handle; caches stay shared with its clones.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(PmpError::InvalidConfiguration(
                "default timeout must be positive".to_string(),
            ));
        }
        self.default_timeout = timeout;
        Ok(self)
    }

    /// Identifier this API registers and requests as.
    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    fn timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.default_timeout)
    }

    /// Register the app with the broker.
    pub fn register(
        &self,
        handler: Option<Arc<dyn RegistrationHandler>>,
        timeout: Option<Duration>,
    ) -> Result<CommandTicket> {
        let command = RegistrationCommand::new(handler, self.app_id(), self.timeout(timeout))?;
        Ok(self.inner.manager.submit(command))
    }

    /// Ask the broker to push the current service-feature verdicts.
    ///
    /// `handler` is additionally queued for
    /// [`on_update`](ServiceFeatureUpdateHandler::on_update) and called once
    /// the push arrives.
    pub fn update_service_features(
        &self,
        handler: Option<Arc<dyn ServiceFeatureUpdateHandler>>,
        timeout: Option<Duration>,
    ) -> Result<CommandTicket> {
        let command =
            ServiceFeatureUpdateCommand::new(handler.clone(), self.app_id(), self.timeout(timeout))?;
        if let Some(handler) = handler {
            self.inner
                .on_update
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(handler);
        }
        Ok(self.inner.manager.submit(command))
    }

    /// Ask the user, through the broker, to enable `features`.
    pub fn request_service_features(
        &self,
        features: Vec<String>,
        handler: Option<Arc<dyn RequestServiceFeaturesHandler>>,
        timeout: Option<Duration>,
    ) -> Result<CommandTicket> {
        let command = RequestServiceFeaturesCommand::new(
            features,
            handler,
            self.app_id(),
            self.timeout(timeout),
        )?;
        Ok(self.inner.manager.submit(command))
    }

    /// Request a resource handle. A granted handle is cached before
    /// `handler` sees it.
    pub fn get_resource(
        &self,
        resource: ResourceIdentifier,
        handler: Option<Arc<dyn RequestResourceHandler>>,
        timeout: Option<Duration>,
    ) -> Result<CommandTicket> {
        let caching = CachingResourceHandler {
            pmp: self.clone(),
            inner: handler.unwrap_or_else(|| Arc::new(NullHandler) as Arc<dyn RequestResourceHandler>),
        };
        let command = RequestResourceCommand::new(
            resource,
            Some(Arc::new(caching)),
            self.app_id(),
            self.timeout(timeout),
        )?;
        Ok(self.inner.manager.submit(command))
    }

    /// Snapshot of every cached verdict.
    pub fn service_features(&self) -> ServiceFeatureStates {
        self.features().clone()
    }

    /// Whether `id` is enabled. Unknown features count as disabled.
    pub fn is_service_feature_enabled(&self, id: &str) -> bool {
        self.features().get(id).copied().unwrap_or(false)
    }

    /// Whether every feature in `ids` is enabled.
    pub fn are_service_features_enabled<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        ids.iter().all(|id| self.is_service_feature_enabled(id.as_ref()))
    }

    /// Whether no feature in `ids` is enabled.
    pub fn are_service_features_disabled<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        !ids.iter().any(|id| self.is_service_feature_enabled(id.as_ref()))
    }

    /// The subset of `ids` that is enabled, in input order.
    pub fn list_enabled_service_features<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        self.partition(ids, true)
    }

    /// The subset of `ids` that is disabled or unknown, in input order.
    pub fn list_disabled_service_features<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        self.partition(ids, false)
    }

    /// Every feature the broker sent a verdict for.
    pub fn list_all_service_features(&self) -> Vec<String> {
        self.features().keys().cloned().collect()
    }

    /// The handle cached for `resource`, if one was granted.
    pub fn cached_resource(&self, resource: &ResourceIdentifier) -> Option<ResourceHandle> {
        self.inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }

    /// Whether a handle for `resource` is cached.
    pub fn is_resource_cached(&self, resource: &ResourceIdentifier) -> bool {
        self.cached_resource(resource).is_some()
    }

    fn features(&self) -> std::sync::RwLockReadGuard<'_, ServiceFeatureStates> {
        self.inner
            .features
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn partition<S: AsRef<str>>(&self, ids: &[S], enabled: bool) -> Vec<String> {
        let features = self.features();
        ids.iter()
            .map(|id| id.as_ref())
            .filter(|id| features.get(*id).copied().unwrap_or(false) == enabled)
            .map(str::to_string)
            .collect()
    }

    fn cache_resource(&self, handle: &ResourceHandle) {
        self.inner
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.resource.clone(), handle.clone());
    }
}

#[async_trait]
impl AppService for Pmp {
    async fn update_service_features(
        &self,
        states: ServiceFeatureStates,
    ) -> std::result::Result<(), RemoteError> {
        tracing::debug!("caching {} service feature verdicts", states.len());
        self.inner
            .features
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(states.iter().map(|(id, enabled)| (id.clone(), *enabled)));

        let waiting: Vec<_> = self
            .inner
            .on_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let states = Arc::new(states);
        for handler in waiting {
            let states = Arc::clone(&states);
            tokio::spawn(async move {
                handler.on_update(&states);
            });
        }
        Ok(())
    }
}

/// Caches granted handles, then forwards every hook to the caller's handler.
struct CachingResourceHandler {
    pmp: Pmp,
    inner: Arc<dyn RequestResourceHandler>,
}

#[async_trait]
impl Handler for CachingResourceHandler {
    async fn prepare(&self) -> Prepare {
        self.inner.prepare().await
    }

    fn finalize(&self) {
        self.inner.finalize();
    }

    fn on_binding_failed(&self) {
        self.inner.on_binding_failed();
    }

    fn on_timeout(&self) {
        self.inner.on_timeout();
    }
}

impl RequestResourceHandler for CachingResourceHandler {
    fn on_receive_resource(
        &self,
        resource: &ResourceIdentifier,
        handle: Option<&ResourceHandle>,
        mocked: bool,
    ) {
        if let Some(handle) = handle {
            self.pmp.cache_resource(handle);
        }
        self.inner.on_receive_resource(resource, handle, mocked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Delivery, Outcome};
    use crate::config::{ManagerConfig, DEFAULT_PMP_IDENTIFIER as PMP};
    use crate::testing::{FakeBinder, FakePmp, Recorder};

    fn pmp(broker: FakePmp) -> Pmp {
        let binder = Arc::new(FakeBinder::new().with(PMP, broker.facade()));
        let manager = ConnectionManager::new(ManagerConfig::default(), binder).unwrap();
        Pmp::new("app.one", manager).unwrap()
    }

    fn states(pairs: &[(&str, bool)]) -> ServiceFeatureStates {
        pairs.iter().map(|(id, on)| (id.to_string(), *on)).collect()
    }

    #[tokio::test]
    async fn test_feature_queries() {
        let api = pmp(FakePmp::new());
        AppService::update_service_features(&api, states(&[("sf.a", true), ("sf.b", false)]))
            .await
            .unwrap();

        assert!(api.is_service_feature_enabled("sf.a"));
        assert!(!api.is_service_feature_enabled("sf.b"));
        assert!(!api.is_service_feature_enabled("sf.unknown"));
        assert!(api.are_service_features_enabled(&["sf.a"]));
        assert!(!api.are_service_features_enabled(&["sf.a", "sf.b"]));
        assert!(api.are_service_features_disabled(&["sf.b", "sf.unknown"]));
        assert_eq!(
            api.list_enabled_service_features(&["sf.b", "sf.a"]),
            vec!["sf.a".to_string()]
        );
        assert_eq!(
            api.list_disabled_service_features(&["sf.b", "sf.a", "sf.c"]),
            vec!["sf.b".to_string(), "sf.c".to_string()]
        );
        assert_eq!(api.list_all_service_features(), vec!["sf.a", "sf.b"]);
    }

    #[tokio::test]
    async fn test_push_merges_into_cache() {
        let api = pmp(FakePmp::new());
        AppService::update_service_features(&api, states(&[("sf.a", true)]))
            .await
            .unwrap();
        AppService::update_service_features(&api, states(&[("sf.b", true)]))
            .await
            .unwrap();
        assert_eq!(api.service_features().len(), 2);
    }

    #[tokio::test]
    async fn test_update_handler_woken_on_push() {
        let api = pmp(FakePmp::new());
        let recorder = Arc::new(Recorder::new());

        let outcome = api
            .update_service_features(Some(recorder.clone()), None)
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Executed(Delivery::Success));
        assert_eq!(recorder.events(), vec!["finalize"]);

        AppService::update_service_features(&api, states(&[("sf.a", true), ("sf.b", true)]))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(recorder.events(), vec!["finalize", "update:2"]);

        // The queue was drained; a second push does not call it again.
        AppService::update_service_features(&api, states(&[("sf.c", true)]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.events(), vec!["finalize", "update:2"]);
    }

    #[tokio::test]
    async fn test_granted_resource_is_cached() {
        let api = pmp(FakePmp::new().grant_resource("unix:/tmp/location.sock"));
        let resource = ResourceIdentifier::new("rg.location", "absoluteLocation");
        let recorder = Arc::new(Recorder::new());

        let outcome = api
            .get_resource(resource.clone(), Some(recorder.clone()), None)
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(outcome.is_executed());
        assert_eq!(recorder.events(), vec!["resource:true:false", "finalize"]);
        assert!(api.is_resource_cached(&resource));
        assert_eq!(
            api.cached_resource(&resource).unwrap().endpoint,
            "unix:/tmp/location.sock"
        );
    }

    #[tokio::test]
    async fn test_denied_resource_not_cached() {
        let api = pmp(FakePmp::new());
        let resource = ResourceIdentifier::new("rg.location", "absoluteLocation");

        let outcome = api
            .get_resource(resource.clone(), None, None)
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Executed(Delivery::DomainFailure(_))));
        assert!(!api.is_resource_cached(&resource));
    }

    #[tokio::test]
    async fn test_explicit_zero_timeout_rejected() {
        let api = pmp(FakePmp::new());
        assert!(matches!(
            api.register(None, Some(Duration::ZERO)),
            Err(PmpError::InvalidConfiguration(_))
        ));
        assert!(api.clone().with_default_timeout(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_empty_app_id_rejected() {
        let binder = Arc::new(FakeBinder::new());
        let manager = ConnectionManager::new(ManagerConfig::default(), binder).unwrap();
        assert!(Pmp::new("", manager).is_err());
    }
}
