use crate::stream::StreamType;

/// A pair of flags, one for stdout and one for stderr.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Streams {
    pub out: bool,
    pub err: bool,
}

impl Streams {
    pub const NONE: Streams = Streams {
        out: false,
        err: false,
    };
    pub const OUT: Streams = Streams {
        out: true,
        err: false,
    };
    pub const ERR: Streams = Streams {
        out: false,
        err: true,
    };
    pub const ALL: Streams = Streams {
        out: true,
        err: true,
    };

    pub fn contains(&self, stream: StreamType) -> bool {
        match stream {
            StreamType::Out => self.out,
            StreamType::Err => self.err,
        }
    }

    pub fn any(&self) -> bool {
        self.out || self.err
    }
}

/// Decides, independently for stdout and stderr, whether output is captured into memory and
/// whether it is passed through to our own stdout / stderr.
///
/// All combinations are valid. A stream may be captured and passed through at the same time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapturePolicy {
    pub capture: Streams,
    pub passthrough: Streams,
}

impl CapturePolicy {
    /// Neither capture nor pass through anything. Output is still read (and discarded), so that
    /// the process can never block on a full pipe.
    pub const NONE: CapturePolicy = CapturePolicy::new(Streams::NONE, Streams::NONE);

    /// Capture and pass through both streams.
    pub const ALL: CapturePolicy = CapturePolicy::new(Streams::ALL, Streams::ALL);

    pub const fn new(capture: Streams, passthrough: Streams) -> Self {
        Self {
            capture,
            passthrough,
        }
    }

    pub const fn capture(capture: Streams) -> Self {
        Self::new(capture, Streams::NONE)
    }

    pub const fn passthrough(passthrough: Streams) -> Self {
        Self::new(Streams::NONE, passthrough)
    }

    pub fn captures(&self, stream: StreamType) -> bool {
        self.capture.contains(stream)
    }

    pub fn passes_through(&self, stream: StreamType) -> bool {
        self.passthrough.contains(stream)
    }

    /// The same policy with capturing disabled. Used when captured output would be discarded.
    pub fn without_capture(self) -> Self {
        Self::new(Streams::NONE, self.passthrough)
    }
}
