//! Payload types exchanged on the wire.
//!
//! A request frame carries a [`WireRequest`], its response a [`WireReply`].
//! The host greets every new connection with a [`Hello`] naming the
//! interface it serves.

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::facade::{
    Facade, RegistrationResult, ResourceHandle, ResourceIdentifier, ServiceFeatureStates,
};

/// Operation ids carried in the frame header.
pub mod op {
    /// Handshake announcing the served interface.
    pub const HELLO: u16 = 0;
    /// Broker: registration check.
    pub const IS_REGISTERED: u16 = 1;
    /// Broker: register an app.
    pub const REGISTER_APP: u16 = 2;
    /// Broker: schedule a verdict push.
    pub const GET_SERVICE_FEATURE_UPDATE: u16 = 3;
    /// Broker: ask the user for features.
    pub const REQUEST_SERVICE_FEATURES: u16 = 4;
    /// Broker: obtain a resource handle.
    pub const GET_RESOURCE: u16 = 5;
    /// Broker: mocked-data check.
    pub const IS_MOCKED: u16 = 6;
    /// App: deliver verdicts.
    pub const UPDATE_SERVICE_FEATURES: u16 = 7;
}

/// Handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// `pmp` or `app`.
    pub interface: String,
}

/// One remote operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    IsRegistered { app: String },
    RegisterApp { app: String },
    GetServiceFeatureUpdate { app: String },
    RequestServiceFeatures { app: String, features: Vec<String> },
    GetResource { app: String, resource: ResourceIdentifier },
    IsMocked { app: String, resource_group: String },
    UpdateServiceFeatures { states: ServiceFeatureStates },
}

impl Call {
    /// Operation id carried in the frame header.
    pub fn op_id(&self) -> u16 {
        match self {
            Call::IsRegistered { .. } => op::IS_REGISTERED,
            Call::RegisterApp { .. } => op::REGISTER_APP,
            Call::GetServiceFeatureUpdate { .. } => op::GET_SERVICE_FEATURE_UPDATE,
            Call::RequestServiceFeatures { .. } => op::REQUEST_SERVICE_FEATURES,
            Call::GetResource { .. } => op::GET_RESOURCE,
            Call::IsMocked { .. } => op::IS_MOCKED,
            Call::UpdateServiceFeatures { .. } => op::UPDATE_SERVICE_FEATURES,
        }
    }

    /// Interface that implements this call.
    pub fn interface(&self) -> &'static str {
        match self {
            Call::UpdateServiceFeatures { .. } => Facade::APP_INTERFACE,
            _ => Facade::PMP_INTERFACE,
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Identity of the caller.
    pub source: String,
    /// How long the caller waits for the answer.
    pub timeout_ms: u64,
    pub call: Call,
}

/// Typed result value of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyValue {
    Unit,
    Bool(bool),
    Registration(RegistrationResult),
    Resource(Option<ResourceHandle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyOutcome {
    Ok,
    Failed,
}

/// Response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireReply {
    pub outcome: ReplyOutcome,
    /// Failure reason when `outcome` is `Failed`.
    pub message: Option<String>,
    pub payload: ReplyValue,
}

impl WireReply {
    /// A successful reply.
    pub fn ok(payload: ReplyValue) -> Self {
        Self {
            outcome: ReplyOutcome::Ok,
            message: None,
            payload,
        }
    }

    /// A failed reply with the remote side's message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: ReplyOutcome::Failed,
            message: Some(message.into()),
            payload: ReplyValue::Unit,
        }
    }

    /// Unpack into the value or the remote side's failure.
    pub fn into_result(self) -> Result<ReplyValue, RemoteError> {
        match self.outcome {
            ReplyOutcome::Ok => Ok(self.payload),
            ReplyOutcome::Failed => Err(RemoteError::Remote(
                self.message.unwrap_or_else(|| "unspecified failure".to_string()),
            )),
        }
    }
}
