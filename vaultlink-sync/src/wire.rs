//! Newline-framed JSON over TCP.
//!
//! Every protocol message is one JSON object terminated by `\n`. Reads are
//! size-capped and carry explicit timeouts so no suspension point can hang.

use crate::error::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

/// Maximum size of a single framed message (16 MB), matching the cap a full
/// entry-set exchange may plausibly need.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default bound for protocol reads.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for connection establishment.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads one newline-terminated JSON message within `limit`.
///
/// The read itself is capped: an oversized message is rejected after at most
/// `MAX_MESSAGE_SIZE + 1` bytes have been consumed, never buffered whole.
pub async fn read_message<T, R>(reader: &mut BufReader<R>, limit: Duration) -> SyncResult<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut bounded = (&mut *reader).take(MAX_MESSAGE_SIZE as u64 + 1);
    let n = timeout(limit, bounded.read_until(b'\n', &mut line)).await??;
    if n == 0 {
        return Err(SyncError::Network("connection closed by peer".into()));
    }
    if line.len() > MAX_MESSAGE_SIZE {
        return Err(SyncError::Protocol(format!(
            "message too large: over {MAX_MESSAGE_SIZE} bytes"
        )));
    }
    let text =
        std::str::from_utf8(&line).map_err(|e| SyncError::Protocol(e.to_string()))?;
    serde_json::from_str(text.trim_end()).map_err(|e| SyncError::Protocol(e.to_string()))
}

/// Writes one JSON message, newline-terminated, within `limit`.
pub async fn write_message<T, W>(writer: &mut W, message: &T, limit: Duration) -> SyncResult<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut data = serde_json::to_vec(message)?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(SyncError::Protocol(format!(
            "message too large: {} bytes",
            data.len()
        )));
    }
    data.push(b'\n');
    timeout(limit, async {
        writer.write_all(&data).await?;
        writer.flush().await
    })
    .await??;
    Ok(())
}
