use crate::stream::StreamType;
use crate::writer::{WriteOutcome, write_all_blocking};
use bytes::Bytes;
use std::fmt::{Debug, Formatter};
use std::io::{self, Write};

type Sink = Box<dyn Write + Send>;

/// The destinations of passed-through output.
///
/// By default, this is our own stdout and stderr. Every chunk is written fully and flushed
/// immediately, so output appears live.
pub struct PassthroughSinks {
    out: Sink,
    err: Sink,
}

impl PassthroughSinks {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            err: Box::new(err),
        }
    }

    /// Our own stdout and stderr.
    pub fn inherit() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    pub(crate) fn forward(&mut self, stream: StreamType, bytes: Bytes) -> WriteOutcome {
        let sink = match stream {
            StreamType::Out => &mut self.out,
            StreamType::Err => &mut self.err,
        };
        write_all_blocking(sink, bytes)
    }
}

impl Default for PassthroughSinks {
    fn default() -> Self {
        Self::inherit()
    }
}

impl Debug for PassthroughSinks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughSinks")
            .field("out", &"non-debug < Box<dyn Write + Send> >")
            .field("err", &"non-debug < Box<dyn Write + Send> >")
            .finish()
    }
}
