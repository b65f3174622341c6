//! Framed MessagePack transport over Unix domain sockets.
//!
//! The reference [`Binder`](crate::binder::Binder) for processes on one host:
//!
//! - header and frame: 11-byte big-endian header plus payload, and the
//!   read-side [`FrameBuffer`]
//! - [`MsgPackCodec`]: `rmp-serde` struct-as-map payloads
//! - [`PipeBinder`]: connects, reads the HELLO handshake and hands out a
//!   proxy [`Facade`](crate::facade::Facade)
//! - [`ServiceHost`]: serves a local facade to remote callers
//!
//! # Example
//!
//! ```ignore
//! let host = ServiceHost::bind(socket_path(dir, "de.pmp.Service"), Facade::Pmp(broker))?;
//! tokio::spawn(async move { host.serve().await });
//!
//! let manager = ConnectionManager::new(config, Arc::new(PipeBinder::new(dir, "org.example.app")))?;
//! ```

use std::time::Duration;

mod codec;
mod frame;
mod header;
mod message;
mod writer;

#[cfg(unix)]
mod host;
#[cfg(unix)]
mod pipe;

pub use codec::MsgPackCodec;
pub use frame::{encode_frame, Frame, FrameBuffer};
pub use header::{flags, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
pub use message::{op, Call, Hello, ReplyOutcome, ReplyValue, WireReply, WireRequest};
pub use writer::{spawn_writer_task, WriterHandle};

#[cfg(unix)]
pub use host::ServiceHost;
#[cfg(unix)]
pub use pipe::{socket_path, PipeBinder};

/// Default per-call timeout on the client side.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of requests a host runs at once.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;

/// Transport settings shared by [`PipeBinder`] and [`ServiceHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireConfig {
    /// How long a proxy waits for each answer (also sent to the host as the
    /// call's budget).
    pub call_timeout: Duration,
    /// Largest accepted frame payload.
    pub max_payload_size: u32,
    /// Requests a host executes concurrently; excess requests are refused.
    pub max_concurrent_requests: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl WireConfig {
    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the largest accepted payload.
    pub fn with_max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set how many requests a host runs at once.
    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit;
        self
    }
}
