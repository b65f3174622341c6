//! Client side of the Unix-socket transport.
//!
//! [`PipeBinder`] implements [`Binder`]: destination `d` is served at
//! `<socket_dir>/d.sock`. After connecting it waits for the host's HELLO
//! frame and wraps the connection in the facade proxy matching the
//! advertised interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::codec::MsgPackCodec;
use super::frame::{encode_frame, Frame, FrameBuffer};
use super::message::{Call, Hello, ReplyValue, WireReply, WireRequest};
use super::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};
use super::WireConfig;
use crate::binder::Binder;
use crate::error::{BindError, PmpError, RemoteError, Result};
use crate::facade::{
    AppService, Facade, PmpService, RegistrationResult, ResourceHandle, ResourceIdentifier,
    ServiceFeatureStates,
};
use crate::intent::ServiceDescriptor;

type PendingCalls = Arc<Mutex<HashMap<u32, oneshot::Sender<Frame>>>>;

/// Binds destinations to Unix sockets in one directory.
#[derive(Debug, Clone)]
pub struct PipeBinder {
    socket_dir: PathBuf,
    source: String,
    config: WireConfig,
}

impl PipeBinder {
    /// Create a binder calling as `source`.
    pub fn new(socket_dir: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            source: source.into(),
            config: WireConfig::default(),
        }
    }

    /// Override the transport limits.
    pub fn with_config(mut self, config: WireConfig) -> Self {
        self.config = config;
        self
    }

    /// Socket path serving `destination`.
    pub fn socket_path(&self, destination: &str) -> PathBuf {
        socket_path(&self.socket_dir, destination)
    }
}

/// Socket path convention shared with [`ServiceHost`](super::ServiceHost) users.
pub fn socket_path(socket_dir: &Path, destination: &str) -> PathBuf {
    socket_dir.join(format!("{destination}.sock"))
}

#[async_trait]
impl Binder for PipeBinder {
    async fn bind(
        &self,
        destination: &str,
        descriptor: &ServiceDescriptor,
    ) -> std::result::Result<Facade, BindError> {
        let path = self.socket_path(destination);
        if let Some(component) = &descriptor.component {
            tracing::debug!("binding {} via {}", destination, component);
        }

        let stream = UnixStream::connect(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BindError::NotInstalled(destination.to_string()),
            _ => BindError::Unreachable(format!("{}: {}", path.display(), e)),
        })?;

        let (mut reader, writer) = stream.into_split();
        let mut buffer = FrameBuffer::with_max_payload(self.config.max_payload_size);

        let hello = tokio::time::timeout(
            self.config.call_timeout,
            read_hello(&mut reader, &mut buffer),
        )
        .await
        .map_err(|_| BindError::Unreachable(format!("{destination}: no handshake")))?
        .map_err(|e| BindError::Rejected(format!("{destination}: {e}")))?;

        let (writer, _writer_task) = spawn_writer_task(writer, DEFAULT_CHANNEL_CAPACITY);
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = tokio::spawn(read_loop(reader, buffer, Arc::clone(&pending)));

        let connection = Arc::new(Connection {
            destination: destination.to_string(),
            source: self.source.clone(),
            config: self.config.clone(),
            writer,
            pending,
            next_id: AtomicU32::new(1),
            reader_task,
        });

        match hello.interface.as_str() {
            Facade::PMP_INTERFACE => Ok(Facade::Pmp(Arc::new(PmpProxy { connection }))),
            Facade::APP_INTERFACE => Ok(Facade::App(Arc::new(AppProxy { connection }))),
            other => Err(BindError::Rejected(format!(
                "{destination} serves unknown interface {other}"
            ))),
        }
    }

    fn unbind(&self, destination: &str) {
        // Connections close once the last facade clone is dropped.
        tracing::debug!("released binding to {}", destination);
    }
}

async fn read_hello<R>(reader: &mut R, buffer: &mut FrameBuffer) -> Result<Hello>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(PmpError::ConnectionClosed);
        }
        // The host writes nothing else until the first request arrives.
        if let Some(frame) = buffer.push(&chunk[..n])?.into_iter().next() {
            if !frame.header.is_hello() {
                return Err(PmpError::Protocol("expected HELLO frame".to_string()));
            }
            return MsgPackCodec::decode(frame.payload());
        }
    }
}

async fn read_loop<R>(mut reader: R, mut buffer: FrameBuffer, pending: PendingCalls)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Read error: {}", e);
                break;
            }
        };

        let frames = match buffer.push(&chunk[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!("Dropping connection: {}", e);
                break;
            }
        };

        for frame in frames {
            if !frame.header.is_response() {
                tracing::warn!("Received unexpected request frame");
                continue;
            }
            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&frame.request_id());
            match waiter {
                Some(tx) => {
                    let _ = tx.send(frame);
                }
                None => tracing::debug!("Response for unknown request {}", frame.request_id()),
            }
        }
    }

    // Dropping the senders fails every outstanding call.
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// One connected socket shared by a proxy and its clones.
struct Connection {
    destination: String,
    source: String,
    config: WireConfig,
    writer: WriterHandle,
    pending: PendingCalls,
    next_id: AtomicU32,
    reader_task: JoinHandle<()>,
}

impl Connection {
    async fn call(&self, call: Call) -> std::result::Result<ReplyValue, RemoteError> {
        if self.reader_task.is_finished() {
            return Err(RemoteError::Disconnected);
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let op_id = call.op_id();
        let request = WireRequest {
            source: self.source.clone(),
            timeout_ms: u64::try_from(self.config.call_timeout.as_millis()).unwrap_or(u64::MAX),
            call,
        };
        let payload =
            MsgPackCodec::encode(&request).map_err(|e| RemoteError::Codec(e.to_string()))?;
        let frame = encode_frame(op_id, 0, request_id, &payload)
            .map_err(|e| RemoteError::Codec(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, tx);
        // Also covers the caller dropping this future mid-call.
        let _pending = PendingGuard {
            connection: self,
            request_id,
        };

        if self.writer.send(frame).await.is_err() {
            return Err(RemoteError::Disconnected);
        }

        let frame = match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(RemoteError::Disconnected),
            Err(_) => {
                return Err(RemoteError::Transport(format!(
                    "no answer from {} within {:?}",
                    self.destination, self.config.call_timeout
                )));
            }
        };

        let reply: WireReply =
            MsgPackCodec::decode(frame.payload()).map_err(|e| RemoteError::Codec(e.to_string()))?;
        reply.into_result()
    }

    fn forget(&self, request_id: u32) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
    }
}

/// Removes a call's waiter from the pending map when the call ends.
struct PendingGuard<'a> {
    connection: &'a Connection,
    request_id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.connection.forget(self.request_id);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn unexpected(value: ReplyValue) -> RemoteError {
    RemoteError::Codec(format!("unexpected reply value {value:?}"))
}

/// Broker proxy over a socket connection.
struct PmpProxy {
    connection: Arc<Connection>,
}

#[async_trait]
impl PmpService for PmpProxy {
    async fn is_registered(&self, app: &str) -> std::result::Result<bool, RemoteError> {
        match self
            .connection
            .call(Call::IsRegistered { app: app.to_string() })
            .await?
        {
            ReplyValue::Bool(registered) => Ok(registered),
            other => Err(unexpected(other)),
        }
    }

    async fn register_app(
        &self,
        app: &str,
    ) -> std::result::Result<RegistrationResult, RemoteError> {
        match self
            .connection
            .call(Call::RegisterApp { app: app.to_string() })
            .await?
        {
            ReplyValue::Registration(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    async fn get_service_feature_update(
        &self,
        app: &str,
    ) -> std::result::Result<bool, RemoteError> {
        match self
            .connection
            .call(Call::GetServiceFeatureUpdate { app: app.to_string() })
            .await?
        {
            ReplyValue::Bool(scheduled) => Ok(scheduled),
            other => Err(unexpected(other)),
        }
    }

    async fn request_service_features(
        &self,
        app: &str,
        features: &[String],
    ) -> std::result::Result<bool, RemoteError> {
        let call = Call::RequestServiceFeatures {
            app: app.to_string(),
            features: features.to_vec(),
        };
        match self.connection.call(call).await? {
            ReplyValue::Bool(placed) => Ok(placed),
            other => Err(unexpected(other)),
        }
    }

    async fn get_resource(
        &self,
        app: &str,
        resource: &ResourceIdentifier,
    ) -> std::result::Result<Option<ResourceHandle>, RemoteError> {
        let call = Call::GetResource {
            app: app.to_string(),
            resource: resource.clone(),
        };
        match self.connection.call(call).await? {
            ReplyValue::Resource(handle) => Ok(handle),
            other => Err(unexpected(other)),
        }
    }

    async fn is_mocked(
        &self,
        app: &str,
        resource_group: &str,
    ) -> std::result::Result<bool, RemoteError> {
        let call = Call::IsMocked {
            app: app.to_string(),
            resource_group: resource_group.to_string(),
        };
        match self.connection.call(call).await? {
            ReplyValue::Bool(mocked) => Ok(mocked),
            other => Err(unexpected(other)),
        }
    }
}

/// App proxy over a socket connection.
struct AppProxy {
    connection: Arc<Connection>,
}

#[async_trait]
impl AppService for AppProxy {
    async fn update_service_features(
        &self,
        states: ServiceFeatureStates,
    ) -> std::result::Result<(), RemoteError> {
        match self
            .connection
            .call(Call::UpdateServiceFeatures { states })
            .await?
        {
            ReplyValue::Unit => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
