//! Relay engine: flush a chunk to the peer of a handle.
//!
//! Short writes are not failures; the loop keeps writing until the whole
//! chunk is out or the socket errors. A write failure tells the caller to
//! tear the pair down.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("peer stopped accepting bytes after {written} of {total}")]
    WriteZero { written: usize, total: usize },
}

/// Write all of `buf` to `dst`, returning the number of bytes written.
pub async fn forward<W>(dst: &mut W, buf: &[u8]) -> Result<usize, RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut sent = 0;
    while sent < buf.len() {
        let n = dst.write(&buf[sent..]).await?;
        if n == 0 {
            return Err(RelayError::WriteZero {
                written: sent,
                total: buf.len(),
            });
        }
        sent += n;
    }
    dst.flush().await?;
    Ok(sent)
}
