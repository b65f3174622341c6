//! In-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::binder::Binder;
use crate::error::{BindError, RemoteError};
use crate::facade::{
    AppService, Facade, PmpService, RegistrationResult, ResourceHandle, ResourceIdentifier,
    ServiceFeatureStates,
};
use crate::handler::{
    Handler, Prepare, RegistrationHandler, RequestResourceHandler, RequestServiceFeaturesHandler,
    ServiceFeatureUpdateHandler,
};
use crate::intent::ServiceDescriptor;

/// Handler that records every hook it sees.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<String>>,
    abort: bool,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn aborting() -> Self {
        Self {
            abort: true,
            ..Self::default()
        }
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    /// Recorded hooks, `prepare` excluded.
    pub(crate) fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() != "prepare")
            .cloned()
            .collect()
    }

    pub(crate) fn prepared(&self) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == "prepare")
    }

    /// Number of terminal hooks fired.
    pub(crate) fn terminal_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e.as_str(), "finalize" | "binding-failed" | "timeout"))
            .count()
    }
}

#[async_trait]
impl Handler for Recorder {
    async fn prepare(&self) -> Prepare {
        self.push("prepare");
        if self.abort {
            Prepare::Abort
        } else {
            Prepare::Continue
        }
    }

    fn finalize(&self) {
        self.push("finalize");
    }

    fn on_binding_failed(&self) {
        self.push("binding-failed");
    }

    fn on_timeout(&self) {
        self.push("timeout");
    }
}

impl RegistrationHandler for Recorder {
    fn on_registration(&self) {
        self.push("registration");
    }

    fn on_already_registered(&self) {
        self.push("already-registered");
    }

    fn on_success(&self) {
        self.push("success");
    }

    fn on_failure(&self, message: &str) {
        self.push(format!("failure:{message}"));
    }
}

impl ServiceFeatureUpdateHandler for Recorder {
    fn on_update_failed(&self) {
        self.push("update-failed");
    }

    fn on_update(&self, states: &ServiceFeatureStates) {
        self.push(format!("update:{}", states.len()));
    }
}

impl RequestServiceFeaturesHandler for Recorder {
    fn on_request_failed(&self) {
        self.push("request-failed");
    }
}

impl RequestResourceHandler for Recorder {
    fn on_receive_resource(
        &self,
        _resource: &ResourceIdentifier,
        handle: Option<&ResourceHandle>,
        mocked: bool,
    ) {
        self.push(format!("resource:{}:{}", handle.is_some(), mocked));
    }
}

/// Scriptable broker.
#[derive(Clone)]
pub(crate) struct FakePmp {
    registered: bool,
    register_result: RegistrationResult,
    grant: bool,
    endpoint: Option<String>,
    mocked: bool,
    delay: Option<Duration>,
    failure: Option<RemoteError>,
    calls: Arc<AtomicUsize>,
    registrations: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakePmp {
    pub(crate) fn new() -> Self {
        Self {
            registered: false,
            register_result: RegistrationResult::success(),
            grant: true,
            endpoint: None,
            mocked: false,
            delay: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
            registrations: Arc::new(AtomicUsize::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn registered(mut self, registered: bool) -> Self {
        self.registered = registered;
        self
    }

    pub(crate) fn register_result(mut self, result: RegistrationResult) -> Self {
        self.register_result = result;
        self
    }

    pub(crate) fn grant(mut self, grant: bool) -> Self {
        self.grant = grant;
        self
    }

    pub(crate) fn grant_resource(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub(crate) fn mocked(mut self, mocked: bool) -> Self {
        self.mocked = mocked;
        self
    }

    /// Every call sleeps this long before answering.
    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails with `err`.
    pub(crate) fn failing(mut self, err: RemoteError) -> Self {
        self.failure = Some(err);
        self
    }

    pub(crate) fn facade(&self) -> Facade {
        Facade::Pmp(Arc::new(self.clone()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub(crate) fn requested_features(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    async fn enter(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PmpService for FakePmp {
    async fn is_registered(&self, _app: &str) -> Result<bool, RemoteError> {
        self.enter().await?;
        Ok(self.registered)
    }

    async fn register_app(&self, _app: &str) -> Result<RegistrationResult, RemoteError> {
        self.enter().await?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(self.register_result.clone())
    }

    async fn get_service_feature_update(&self, _app: &str) -> Result<bool, RemoteError> {
        self.enter().await?;
        Ok(self.grant)
    }

    async fn request_service_features(
        &self,
        _app: &str,
        features: &[String],
    ) -> Result<bool, RemoteError> {
        self.enter().await?;
        self.requested.lock().unwrap().extend_from_slice(features);
        Ok(self.grant)
    }

    async fn get_resource(
        &self,
        _app: &str,
        resource: &ResourceIdentifier,
    ) -> Result<Option<ResourceHandle>, RemoteError> {
        self.enter().await?;
        Ok(self.endpoint.as_ref().map(|endpoint| ResourceHandle {
            resource: resource.clone(),
            endpoint: endpoint.clone(),
        }))
    }

    async fn is_mocked(&self, _app: &str, _resource_group: &str) -> Result<bool, RemoteError> {
        self.enter().await?;
        Ok(self.mocked)
    }
}

/// App that records pushed verdicts.
#[derive(Clone, Default)]
pub(crate) struct FakeApp {
    received: Arc<Mutex<Vec<ServiceFeatureStates>>>,
}

impl FakeApp {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn facade(&self) -> Facade {
        Facade::App(Arc::new(self.clone()))
    }

    pub(crate) fn received(&self) -> Vec<ServiceFeatureStates> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppService for FakeApp {
    async fn update_service_features(
        &self,
        states: ServiceFeatureStates,
    ) -> Result<(), RemoteError> {
        self.received.lock().unwrap().push(states);
        Ok(())
    }
}

/// Binder over a fixed table of facades.
#[derive(Default)]
pub(crate) struct FakeBinder {
    facades: HashMap<String, Facade>,
    failure: Option<BindError>,
    delay: Option<Duration>,
    binds: AtomicUsize,
    unbinds: AtomicUsize,
    descriptors: Mutex<Vec<ServiceDescriptor>>,
}

impl FakeBinder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, destination: &str, facade: Facade) -> Self {
        self.facades.insert(destination.to_string(), facade);
        self
    }

    pub(crate) fn failing(mut self, err: BindError) -> Self {
        self.failure = Some(err);
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub(crate) fn unbinds(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    pub(crate) fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.descriptors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Binder for FakeBinder {
    async fn bind(
        &self,
        destination: &str,
        descriptor: &ServiceDescriptor,
    ) -> Result<Facade, BindError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        self.descriptors.lock().unwrap().push(descriptor.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.facades
            .get(destination)
            .cloned()
            .ok_or_else(|| BindError::NotInstalled(destination.to_string()))
    }

    fn unbind(&self, _destination: &str) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}
