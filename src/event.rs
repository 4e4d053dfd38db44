use crate::stream::{StreamError, StreamType};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Identifies the process an event originated from.
///
/// This is a cheap, shared description of the process, not a handle to it. Holding on to a
/// `ProcessRef` does not keep the process (or its pipes) alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRef(Arc<ProcessInfo>);

#[derive(Debug, PartialEq, Eq)]
struct ProcessInfo {
    name: Cow<'static, str>,
    pid: Option<u32>,
}

impl ProcessRef {
    pub fn new(name: impl Into<Cow<'static, str>>, pid: Option<u32>) -> Self {
        Self(Arc::new(ProcessInfo {
            name: name.into(),
            pid,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_cow(&self) -> Cow<'static, str> {
        self.0.name.clone()
    }

    /// The OS process id, if it was known when the process was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.0.pid
    }
}

impl Display for ProcessRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.pid {
            Some(pid) => write!(f, "{} (pid {pid})", self.0.name),
            None => f.write_str(&self.0.name),
        }
    }
}

/// One chunk of output delivered from either stdout or stderr.
///
/// An empty chunk without an error marks the end of the stream. An empty chunk with an error
/// marks a failed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    stream: StreamType,
    bytes: Bytes,
    error: Option<StreamError>,
    process: ProcessRef,
}

impl OutputEvent {
    pub fn new(
        stream: StreamType,
        bytes: Bytes,
        error: Option<StreamError>,
        process: ProcessRef,
    ) -> Self {
        Self {
            stream,
            bytes,
            error,
            process,
        }
    }

    pub fn stream(&self) -> StreamType {
        self.stream
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    /// The error code of a failed read, or `0` if the read succeeded.
    pub fn error_code(&self) -> i32 {
        self.error.as_ref().map(StreamError::code).unwrap_or(0)
    }

    pub fn process(&self) -> &ProcessRef {
        &self.process
    }

    pub fn is_eof(&self) -> bool {
        self.bytes.is_empty() && self.error.is_none()
    }
}

/// Everything observable about a running process, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputEvent),

    /// The process exited and all of its output was delivered.
    /// Emitted exactly once, after the last `Output` event of that process.
    Terminated(ProcessRef),
}

impl ProcessEvent {
    pub fn process(&self) -> &ProcessRef {
        match self {
            ProcessEvent::Output(event) => event.process(),
            ProcessEvent::Terminated(process) => process,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;
    use std::io;

    #[test]
    fn distinguishes_eof_from_read_failures() {
        let process = ProcessRef::new("test", Some(42));

        let eof = OutputEvent::new(StreamType::Out, Bytes::new(), None, process.clone());
        let failure = OutputEvent::new(
            StreamType::Err,
            Bytes::new(),
            Some(StreamError::from(io::Error::from_raw_os_error(5))),
            process.clone(),
        );

        assert_that(eof.is_eof()).is_true();
        assert_that(eof.error_code()).is_equal_to(0);
        assert_that(failure.is_eof()).is_false();
        assert_that(failure.error_code()).is_equal_to(5);
        assert_that(failure.stream()).is_equal_to(StreamType::Err);
    }

    #[test]
    fn process_ref_display() {
        assert_that(ProcessRef::new("ls", Some(7)).to_string()).is_equal_to("ls (pid 7)");
        assert_that(ProcessRef::new("ls", None).to_string()).is_equal_to("ls");
    }
}
