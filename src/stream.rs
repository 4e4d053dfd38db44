use std::fmt::{Display, Formatter};
use std::io;

/// Represents the type of the stream (stdout or stderr) a chunk of output originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Out,
    Err,
}

impl StreamType {
    pub fn name(&self) -> &'static str {
        match self {
            StreamType::Out => "stdout",
            StreamType::Err => "stderr",
        }
    }
}

impl Display for StreamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A snapshot of an `io::Error` observed while reading from a stream.
///
/// `io::Error` is neither `Clone` nor `Eq`, but output events are. We therefore only keep what is
/// needed to report and compare the failure later on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    kind: io::ErrorKind,
    raw_os_error: Option<i32>,
    message: String,
}

/// Error code reported for failures not backed by an OS error number.
pub const UNKNOWN_ERROR_CODE: i32 = -1;

impl StreamError {
    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.raw_os_error
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The numeric code of this error. Never `0`, as `0` denotes "no error".
    pub fn code(&self) -> i32 {
        match self.raw_os_error {
            Some(0) | None => UNKNOWN_ERROR_CODE,
            Some(code) => code,
        }
    }
}

impl From<&io::Error> for StreamError {
    fn from(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            raw_os_error: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

impl Display for StreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code())
    }
}

impl std::error::Error for StreamError {}
