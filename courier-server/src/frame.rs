//! Length-prefixed envelope framing.
//!
//! Every envelope on the wire is a 4-byte big-endian length followed by that
//! many bytes of MessagePack. Bulk data streams are raw bytes after a
//! metadata envelope and carry no framing of their own.

use crate::error::{FrameError, FrameResult};
use courier_types::Envelope;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Read one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> FrameResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_size {
        return Err(FrameError::TooLarge {
            size: len,
            limit: max_size,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len()).map_err(|_| FrameError::TooLarge {
        size: bytes.len(),
        limit: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one envelope within `deadline`.
pub async fn read_envelope<R>(reader: &mut R, max_size: usize, deadline: Duration) -> FrameResult<Envelope>
where
    R: AsyncRead + Unpin,
{
    let bytes = tokio::time::timeout(deadline, read_frame(reader, max_size))
        .await
        .map_err(|_| FrameError::Timeout {
            secs: deadline.as_secs(),
        })??;
    Ok(Envelope::from_bytes(&bytes)?)
}

/// Encode and write one envelope within `deadline`.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope, deadline: Duration) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = envelope.to_bytes()?;
    tokio::time::timeout(deadline, write_frame(writer, &bytes))
        .await
        .map_err(|_| FrameError::Timeout {
            secs: deadline.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::{Identity, MessageList};

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        assert_eq!(read_frame(&mut b, 1024).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading_body() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(10_000u32).to_be_bytes()).await.unwrap();

        let err = read_frame(&mut b, 100).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 10_000, limit: 100 }));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(8u32).to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b, 100).await, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn garbage_frame_fails_to_decode() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, &[0xc1, 0xc1, 0xc1]).await.unwrap();

        let err = read_envelope(&mut b, 100, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FrameError::Codec(_)));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_a, mut b) = tokio::io::duplex(64);
        let err = read_envelope(&mut b, 100, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout { .. }));
    }

    #[tokio::test]
    async fn envelope_roundtrip() {
        let alice = Identity::generate().unwrap();
        let signed = alice
            .sign_message(alice.address(), &MessageList { length: 1 })
            .unwrap();
        let envelope = Envelope::seal(&signed, &[alice.address().clone()]).unwrap();

        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        write_envelope(&mut a, &envelope, Duration::from_secs(1)).await.unwrap();
        let read = read_envelope(&mut b, 64 * 1024, Duration::from_secs(1)).await.unwrap();
        assert_eq!(read, envelope);
    }
}
