//! Writing a buffer fully into a stream, despite partial writes.

use bytes::{Buf, Bytes};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The result of a [`write_all`] or [`write_all_blocking`] call.
///
/// On success, `leftover` is empty and `error` is `None`. Otherwise, `error` holds the first error
/// encountered and `leftover` all bytes that were not yet written at that point.
#[derive(Debug)]
pub struct WriteOutcome {
    pub leftover: Bytes,
    pub error: Option<io::Error>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.leftover.is_empty()
    }

    /// Converts this outcome into a result, dropping the leftover bytes.
    pub fn into_result(self) -> io::Result<()> {
        match self.error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

fn write_zero() -> io::Error {
    io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer")
}

/// Writes `bytes` into `write`, re-issuing writes for the unwritten remainder after every partial
/// write, until either everything was written or an error occurred. The writer is flushed after
/// the last byte was written.
pub async fn write_all<W>(write: &mut W, mut bytes: Bytes) -> WriteOutcome
where
    W: AsyncWrite + Unpin + ?Sized,
{
    while bytes.has_remaining() {
        match write.write(bytes.chunk()).await {
            Ok(0) => {
                return WriteOutcome {
                    leftover: bytes,
                    error: Some(write_zero()),
                };
            }
            Ok(written) => bytes.advance(written),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return WriteOutcome {
                    leftover: bytes,
                    error: Some(err),
                };
            }
        }
    }
    let error = write.flush().await.err();
    WriteOutcome {
        leftover: bytes,
        error,
    }
}

/// Blocking variant of [`write_all`], usable without an async runtime.
pub fn write_all_blocking<W>(write: &mut W, mut bytes: Bytes) -> WriteOutcome
where
    W: io::Write + ?Sized,
{
    while bytes.has_remaining() {
        match write.write(bytes.chunk()) {
            Ok(0) => {
                return WriteOutcome {
                    leftover: bytes,
                    error: Some(write_zero()),
                };
            }
            Ok(written) => bytes.advance(written),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return WriteOutcome {
                    leftover: bytes,
                    error: Some(err),
                };
            }
        }
    }
    let error = write.flush().err();
    WriteOutcome {
        leftover: bytes,
        error,
    }
}
