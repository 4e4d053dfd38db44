//! Continuous, chunked reading of a single output stream.

use crate::num_bytes::{DEFAULT_CHUNK_SIZE, NumBytes};
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Options controlling how a stream is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// The maximum size of an individual chunk read from the stream.
    ///
    /// default: 16 * 1024 // 16 kb
    pub chunk_size: NumBytes,

    /// Whether reading should stop after the first failed read.
    ///
    /// When `false`, errors are still reported, but reading continues until EOF is reached.
    ///
    /// default: true
    pub stop_on_error: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stop_on_error: true,
        }
    }
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTermination {
    /// A zero-length read was observed.
    Eof,
    /// A read failed and the reader was configured to stop on errors.
    Error,
}

/// Statistics of a completed [`read_continuously`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    /// Number of `on_chunk` invocations, including the terminal one.
    pub chunks: usize,
    /// Total number of bytes delivered.
    pub bytes: usize,
    /// Number of failed reads.
    pub errors: usize,
    pub terminated_by: ReadTermination,
}

/// Reads `read` in chunks of at most `options.chunk_size` bytes until EOF or, when
/// `options.stop_on_error` is set, until the first error.
///
/// `on_chunk` is called once for every completed read, before the next read is issued. This
/// includes the terminal zero-length read at EOF and failed reads, for which an empty chunk is
/// passed along with the error. Interrupted reads are retried without being reported.
///
/// The reader is consumed, so every stream is read by exactly one reader.
pub async fn read_continuously<R>(
    mut read: R,
    options: ReadOptions,
    mut on_chunk: impl FnMut(Bytes, Option<&io::Error>),
) -> ReadSummary
where
    R: AsyncRead + Unpin,
{
    options.chunk_size.assert_non_zero("chunk_size");
    let chunk_size = options.chunk_size.bytes();

    let mut chunks = 0;
    let mut total_bytes = 0;
    let mut errors = 0;

    // A BytesMut may grow when used in a `read_buf` call. We bound each read with `take` instead,
    // so that no single chunk ever exceeds `chunk_size`.
    let mut buf = bytes::BytesMut::with_capacity(chunk_size);
    loop {
        buf.reserve(chunk_size);
        let result = (&mut read)
            .take(chunk_size as u64)
            .read_buf(&mut buf)
            .await;

        match result {
            Ok(0) => {
                chunks += 1;
                on_chunk(Bytes::new(), None);
                return ReadSummary {
                    chunks,
                    bytes: total_bytes,
                    errors,
                    terminated_by: ReadTermination::Eof,
                };
            }
            Ok(bytes_read) => {
                chunks += 1;
                total_bytes += bytes_read;
                on_chunk(buf.split_to(bytes_read).freeze(), None);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                chunks += 1;
                errors += 1;
                tracing::debug!(error = %err, "Read from stream failed");
                on_chunk(Bytes::new(), Some(&err));
                if options.stop_on_error {
                    return ReadSummary {
                        chunks,
                        bytes: total_bytes,
                        errors,
                        terminated_by: ReadTermination::Error,
                    };
                }
            }
        }
    }
}
