//! Error types for process operations.
//!
//! Only failures that make a meaningful result impossible are reported through these types.
//! Read errors on stdout / stderr and write errors on stdin are soft: they are part of the
//! captured events or reported to the input handler, and the run continues.

use crate::stream::StreamType;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Errors that can occur when spawning a process. No output is read when spawning failed.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Failed to spawn the process, for example because the executable does not exist.
    #[error("Failed to spawn process '{process_name}': {source}")]
    SpawnFailed {
        /// The name or description of the process being spawned.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The process was spawned, but one of its standard streams was not connected to a pipe.
    #[error("Process '{process_name}' was spawned without a piped {stream}")]
    MissingPipe {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The name of the missing stream ("stdin", "stdout" or "stderr").
        stream: &'static str,
    },
}

/// Errors that can occur when waiting for a process and its output.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Waiting for the process to exit failed.
    #[error("IO error occurred while waiting for process '{process_name}': {source}")]
    IoError {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A task reading the output of the process panicked or was cancelled.
    #[error("The {stream} reader of process '{process_name}' could not be joined: {source}")]
    ReaderFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The stream the failed reader was responsible for.
        stream: StreamType,
        /// The underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },

    /// A reader previously failed to be joined. Its output is lost.
    #[error("The {stream} reader of process '{process_name}' already failed")]
    ReaderLost {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The stream the failed reader was responsible for.
        stream: StreamType,
    },

    /// The task writing input to the process panicked or was cancelled.
    #[error("The stdin writer of process '{process_name}' could not be joined: {source}")]
    InputWriterFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Errors that can occur when sending a signal to a running process.
#[derive(Debug, Error)]
#[error("Failed to send '{signal}' signal to process '{process_name}': {source}")]
pub struct SignalError {
    /// The name of the process.
    pub process_name: Cow<'static, str>,
    /// The signal that could not be sent.
    pub signal: &'static str,
    /// The underlying IO error.
    #[source]
    pub source: io::Error,
}

/// Errors that can occur when executing a process end to end.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The process never ran.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The process ran, but could not be awaited.
    #[error(transparent)]
    Wait(#[from] WaitError),
}
