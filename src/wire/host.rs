//! Server side of the Unix-socket transport.
//!
//! A [`ServiceHost`] serves one local [`Facade`] at a socket path. Each
//! accepted connection is greeted with a HELLO frame naming the facade's
//! interface; every request on it runs on its own task, bounded by a
//! semaphore shared across connections.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;

use super::codec::MsgPackCodec;
use super::frame::{encode_frame, Frame, FrameBuffer};
use super::header::flags;
use super::message::{op, Call, Hello, ReplyOutcome, ReplyValue, WireReply, WireRequest};
use super::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};
use super::WireConfig;
use crate::error::{RemoteError, Result};
use crate::facade::Facade;

/// Serves a facade to remote callers.
pub struct ServiceHost {
    listener: UnixListener,
    path: PathBuf,
    facade: Facade,
    config: WireConfig,
}

impl ServiceHost {
    /// Bind `facade` at `path` with the default [`WireConfig`].
    ///
    /// Removes a stale socket file at `path` first.
    pub fn bind(path: impl AsRef<Path>, facade: Facade) -> Result<Self> {
        Self::bind_with_config(path, facade, WireConfig::default())
    }

    /// Like [`bind`](Self::bind) with explicit transport limits.
    pub fn bind_with_config(
        path: impl AsRef<Path>,
        facade: Facade,
        config: WireConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        tracing::debug!("serving {} at {}", facade.interface(), path.display());

        Ok(Self {
            listener,
            path,
            facade,
            config,
        })
    }

    /// The socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until an accept error occurs.
    pub async fn serve(&self) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        loop {
            let (stream, _addr) = self.listener.accept().await?;
            let facade = self.facade.clone();
            let config = self.config.clone();
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, facade, config, permits).await {
                    tracing::warn!("Connection ended: {}", e);
                }
            });
        }
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn serve_connection(
    stream: UnixStream,
    facade: Facade,
    config: WireConfig,
    permits: Arc<Semaphore>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let (writer, _writer_task) = spawn_writer_task(writer, DEFAULT_CHANNEL_CAPACITY);

    let hello = MsgPackCodec::encode(&Hello {
        interface: facade.interface().to_string(),
    })?;
    writer.send(encode_frame(op::HELLO, flags::HELLO, 0, &hello)?).await?;

    read_loop(reader, &facade, &config, &writer, &permits).await
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    facade: &Facade,
    config: &WireConfig,
    writer: &WriterHandle,
    permits: &Arc<Semaphore>,
) -> Result<()> {
    let mut buffer = FrameBuffer::with_max_payload(config.max_payload_size);
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            tracing::debug!("Peer closed connection");
            return Ok(());
        }

        for frame in buffer.push(&chunk[..n])? {
            dispatch_frame(frame, facade, writer, permits);
        }
    }
}

/// Run one request frame on its own task.
fn dispatch_frame(frame: Frame, facade: &Facade, writer: &WriterHandle, permits: &Arc<Semaphore>) {
    if frame.header.is_response() || frame.header.is_hello() {
        tracing::warn!("Received unexpected frame with flags {:#04x}", frame.header.flags);
        return;
    }

    let op_id = frame.header.op_id;
    let request_id = frame.request_id();
    let writer = writer.clone();

    let permit = match Arc::clone(permits).try_acquire_owned() {
        Ok(p) => p,
        Err(_) => {
            tracing::warn!("Request capacity reached, refusing request {}", request_id);
            tokio::spawn(async move {
                let reply = WireReply::failed("host at capacity");
                respond(&writer, op_id, request_id, &reply).await;
            });
            return;
        }
    };

    let facade = facade.clone();
    tokio::spawn(async move {
        let _permit = permit;
        let reply = handle_request(&facade, frame.payload.clone()).await;
        respond(&writer, op_id, request_id, &reply).await;
    });
}

async fn handle_request(facade: &Facade, payload: Bytes) -> WireReply {
    let request: WireRequest = match MsgPackCodec::decode(&payload) {
        Ok(r) => r,
        Err(e) => return WireReply::failed(format!("malformed request: {e}")),
    };
    tracing::debug!("{} calls op {}", request.source, request.call.op_id());

    let limit = Duration::from_millis(request.timeout_ms);
    match tokio::time::timeout(limit, invoke(facade, request.call)).await {
        Ok(Ok(value)) => WireReply::ok(value),
        Ok(Err(e)) => WireReply::failed(e.to_string()),
        Err(_) => WireReply::failed(format!("call exceeded {limit:?}")),
    }
}

/// Route a call onto the local facade.
async fn invoke(facade: &Facade, call: Call) -> std::result::Result<ReplyValue, RemoteError> {
    match (facade, call) {
        (Facade::Pmp(pmp), Call::IsRegistered { app }) => {
            pmp.is_registered(&app).await.map(ReplyValue::Bool)
        }
        (Facade::Pmp(pmp), Call::RegisterApp { app }) => {
            pmp.register_app(&app).await.map(ReplyValue::Registration)
        }
        (Facade::Pmp(pmp), Call::GetServiceFeatureUpdate { app }) => pmp
            .get_service_feature_update(&app)
            .await
            .map(ReplyValue::Bool),
        (Facade::Pmp(pmp), Call::RequestServiceFeatures { app, features }) => pmp
            .request_service_features(&app, &features)
            .await
            .map(ReplyValue::Bool),
        (Facade::Pmp(pmp), Call::GetResource { app, resource }) => pmp
            .get_resource(&app, &resource)
            .await
            .map(ReplyValue::Resource),
        (Facade::Pmp(pmp), Call::IsMocked { app, resource_group }) => pmp
            .is_mocked(&app, &resource_group)
            .await
            .map(ReplyValue::Bool),
        (Facade::App(app), Call::UpdateServiceFeatures { states }) => app
            .update_service_features(states)
            .await
            .map(|()| ReplyValue::Unit),
        (facade, call) => Err(RemoteError::WrongInterface {
            expected: call.interface(),
            found: facade.interface(),
        }),
    }
}

async fn respond(writer: &WriterHandle, op_id: u16, request_id: u32, reply: &WireReply) {
    let flags = match reply.outcome {
        ReplyOutcome::Ok => flags::RESPONSE,
        ReplyOutcome::Failed => flags::ERROR_RESPONSE,
    };
    let frame = match MsgPackCodec::encode(reply)
        .and_then(|payload| encode_frame(op_id, flags, request_id, &payload))
    {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("Cannot encode reply to request {}: {}", request_id, e);
            return;
        }
    };
    if let Err(e) = writer.send(frame).await {
        tracing::debug!("Reply to request {} dropped: {}", request_id, e);
    }
}
