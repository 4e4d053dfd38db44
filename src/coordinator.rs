//! Fan-in of stdout and stderr into a single, ordered delivery.

use crate::error::WaitError;
use crate::event::{OutputEvent, ProcessEvent, ProcessRef};
use crate::exclusion::{Exclusive, MutexExclusive};
use crate::passthrough::PassthroughSinks;
use crate::policy::CapturePolicy;
use crate::reader::{ReadOptions, ReadSummary, read_continuously};
use crate::stream::{StreamError, StreamType};
use crate::response::concat;
use bytes::Bytes;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

/// A callback observing every event of a process.
///
/// Always invoked from within the coordinators exclusion, so it is never called concurrently.
pub type Observer = Box<dyn FnMut(&ProcessEvent) + Send>;

/// The state shared by both stream readers. Only ever accessed under the coordinators exclusion.
pub struct Delivery {
    process: ProcessRef,
    policy: CapturePolicy,
    sinks: PassthroughSinks,
    observer: Option<Observer>,
    events: Vec<OutputEvent>,
    terminated: bool,
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("process", &self.process)
            .field("policy", &self.policy)
            .field("sinks", &self.sinks)
            .field("observer", &self.observer.as_ref().map(|_| "non-debug < Observer >"))
            .field("events", &self.events.len())
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl Delivery {
    fn deliver(&mut self, event: OutputEvent) {
        let stream = event.stream();

        if let Some(observer) = self.observer.as_mut() {
            observer(&ProcessEvent::Output(event.clone()));
        }

        if self.policy.captures(stream) && !event.is_eof() {
            self.events.push(event.clone());
        }

        if self.policy.passes_through(stream) && !event.bytes().is_empty() {
            let outcome = self.sinks.forward(stream, event.bytes().clone());
            if let Some(err) = outcome.error {
                tracing::warn!(
                    process = %self.process,
                    %stream,
                    error = %err,
                    unwritten = outcome.leftover.len(),
                    "Could not pass output through"
                );
            }
        }
    }

    fn terminate(&mut self) {
        if self.terminated {
            tracing::error!(process = %self.process, "Process was already reported as terminated");
            return;
        }
        self.terminated = true;
        if let Some(observer) = self.observer.as_mut() {
            observer(&ProcessEvent::Terminated(self.process.clone()));
        }
    }
}

/// Everything captured by an [`OutputCoordinator`], available after both streams were drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    /// All captured events, in delivery order.
    pub events: Vec<OutputEvent>,
    pub stdout_summary: ReadSummary,
    pub stderr_summary: ReadSummary,
}

impl Drained {
    /// All bytes captured from stdout.
    pub fn stdout(&self) -> Bytes {
        self.stream_bytes(StreamType::Out)
    }

    /// All bytes captured from stderr.
    pub fn stderr(&self) -> Bytes {
        self.stream_bytes(StreamType::Err)
    }

    fn stream_bytes(&self, stream: StreamType) -> Bytes {
        concat(self.events.iter().filter(|event| event.stream() == stream))
    }
}

/// Reads stdout and stderr concurrently, delivering every chunk under a single exclusion.
///
/// For each chunk, in this order:
/// 1. the observer (if any) is notified,
/// 2. the chunk is captured, if the policy says so for its stream,
/// 3. the chunk is passed through, if the policy says so for its stream.
///
/// Chunks of one stream are always delivered in the order they were read. Chunks of different
/// streams are delivered in the order in which they acquired the exclusion, which is usually,
/// but not necessarily, the order in which the child process wrote them.
pub struct OutputCoordinator<X: Exclusive<Delivery> = MutexExclusive<Delivery>> {
    process: ProcessRef,
    shared: Arc<X>,
    stdout_reader: Option<JoinHandle<ReadSummary>>,
    stderr_reader: Option<JoinHandle<ReadSummary>>,
    stdout_summary: Option<ReadSummary>,
    stderr_summary: Option<ReadSummary>,
}

impl<X: Exclusive<Delivery>> Debug for OutputCoordinator<X> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCoordinator")
            .field("process", &self.process)
            .field("shared", &"non-debug < Arc<impl Exclusive<Delivery>> >")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<X: Exclusive<Delivery>> Drop for OutputCoordinator<X> {
    fn drop(&mut self) {
        for reader in [self.stdout_reader.take(), self.stderr_reader.take()]
            .into_iter()
            .flatten()
        {
            reader.abort();
        }
    }
}

impl OutputCoordinator {
    /// Starts reading both streams, using the default [`MutexExclusive`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<O, E>(
        process: ProcessRef,
        stdout: O,
        stderr: E,
        policy: CapturePolicy,
        options: ReadOptions,
        sinks: PassthroughSinks,
        observer: Option<Observer>,
    ) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        Self::start_with(process, stdout, stderr, policy, options, sinks, observer)
    }
}

impl<X: Exclusive<Delivery>> OutputCoordinator<X> {
    /// Starts reading both streams, serializing delivery with the exclusion `X`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with<O, E>(
        process: ProcessRef,
        stdout: O,
        stderr: E,
        policy: CapturePolicy,
        options: ReadOptions,
        sinks: PassthroughSinks,
        observer: Option<Observer>,
    ) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(X::new(Delivery {
            process: process.clone(),
            policy,
            sinks,
            observer,
            events: Vec::new(),
            terminated: false,
        }));

        tracing::debug!(
            %process,
            ?policy,
            chunk_size = %options.chunk_size,
            "Starting output readers"
        );

        let stdout_reader = tokio::spawn(drain(
            StreamType::Out,
            stdout,
            options,
            process.clone(),
            shared.clone(),
        ));
        let stderr_reader = tokio::spawn(drain(
            StreamType::Err,
            stderr,
            options,
            process.clone(),
            shared.clone(),
        ));

        Self {
            process,
            shared,
            stdout_reader: Some(stdout_reader),
            stderr_reader: Some(stderr_reader),
            stdout_summary: None,
            stderr_summary: None,
        }
    }

    pub fn process(&self) -> &ProcessRef {
        &self.process
    }

    /// Whether both readers are done, i.e. both streams reached EOF or stopped on an error.
    pub fn is_finished(&self) -> bool {
        let finished = |reader: &Option<JoinHandle<ReadSummary>>| {
            reader.as_ref().map(|r| r.is_finished()).unwrap_or(true)
        };
        finished(&self.stdout_reader) && finished(&self.stderr_reader)
    }

    /// Waits until both readers are done.
    ///
    /// Once this returned successfully, no further output will be delivered.
    /// Calling this again returns the same summaries immediately.
    pub async fn wait(&mut self) -> Result<(ReadSummary, ReadSummary), WaitError> {
        let stdout = self.join(StreamType::Out).await?;
        let stderr = self.join(StreamType::Err).await?;
        Ok((stdout, stderr))
    }

    async fn join(&mut self, stream: StreamType) -> Result<ReadSummary, WaitError> {
        let (reader, summary) = match stream {
            StreamType::Out => (&mut self.stdout_reader, &mut self.stdout_summary),
            StreamType::Err => (&mut self.stderr_reader, &mut self.stderr_summary),
        };
        if let Some(done) = *summary {
            return Ok(done);
        }
        let process_name = || self.process.name_cow();
        let Some(handle) = reader.take() else {
            return Err(WaitError::ReaderLost {
                process_name: process_name(),
                stream,
            });
        };
        match handle.await {
            Ok(read_summary) => {
                tracing::debug!(
                    process = %self.process,
                    %stream,
                    bytes = read_summary.bytes,
                    "Output reader joined"
                );
                *summary = Some(read_summary);
                Ok(read_summary)
            }
            Err(source) => Err(WaitError::ReaderFailed {
                process_name: process_name(),
                stream,
                source,
            }),
        }
    }

    /// Waits for both readers, reports the process as terminated and hands out everything that
    /// was captured.
    ///
    /// The [`ProcessEvent::Terminated`] event is delivered under the same exclusion as all output,
    /// strictly after the last output event. Only call this after the process itself exited.
    pub async fn finish(mut self) -> Result<Drained, WaitError> {
        let (stdout_summary, stderr_summary) = self.wait().await?;
        Ok(self.shared.exclusive(|delivery| {
            delivery.terminate();
            Drained {
                events: std::mem::take(&mut delivery.events),
                stdout_summary,
                stderr_summary,
            }
        }))
    }
}

async fn drain<R, X>(
    stream: StreamType,
    read: R,
    options: ReadOptions,
    process: ProcessRef,
    shared: Arc<X>,
) -> ReadSummary
where
    R: AsyncRead + Unpin,
    X: Exclusive<Delivery>,
{
    let summary = read_continuously(read, options, |bytes: Bytes, error| {
        if let Some(err) = error {
            tracing::warn!(%process, %stream, error = %err, "Could not read output");
        }
        let event = OutputEvent::new(stream, bytes, error.map(StreamError::from), process.clone());
        shared.exclusive(|delivery| delivery.deliver(event));
    })
    .await;
    tracing::debug!(%process, %stream, ?summary, "Output stream drained");
    summary
}
