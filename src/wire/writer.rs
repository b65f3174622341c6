//! Dedicated writer task per connection.
//!
//! Request and reply tasks hand encoded frames to one writer task through an
//! mpsc channel instead of sharing the socket's write half behind a lock.
//! Frames that are ready together go out in one vectored write.
//!
//! ```text
//! call / reply task ─┐
//! call / reply task ─┼─► mpsc::Sender<Bytes> ─► writer task ─► socket
//! call / reply task ─┘
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PmpError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending encoded frames to the writer task.
///
/// Cheaply cloneable. The task exits once every handle is dropped.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one encoded frame.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| PmpError::ConnectionClosed)
    }

    /// Whether the writer task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task for `writer`.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Writer task failed: {}", e);
            return Err(e);
        }
    }
    // All handles dropped.
    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(Bytes::len).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(PmpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// Slices covering everything after the first `skip` bytes of `batch`.
fn remaining_slices(batch: &[Bytes], skip: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;
    for frame in batch {
        let end = offset + frame.len();
        if skip < end {
            slices.push(IoSlice::new(&frame[skip.saturating_sub(offset)..]));
        }
        offset = end;
    }
    slices
}
