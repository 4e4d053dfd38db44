use crate::event::OutputEvent;
use crate::policy::CapturePolicy;
use crate::stream::StreamType;
use bytes::{Bytes, BytesMut};

/// Everything captured while running a process, in delivery order.
///
/// Only streams enabled in the policy's `capture` flags contribute events. Read failures of a
/// captured stream are part of the events (see [`OutputEvent::error_code`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    exit_status_code: i32,
    events: Vec<OutputEvent>,
    policy: CapturePolicy,
}

impl CapturedResponse {
    /// Builds a response from the exit code of a process and the events delivered for it.
    ///
    /// Events of streams not captured by `policy`, as well as end-of-stream markers, are dropped.
    /// The order of the remaining events is kept as is.
    pub fn assemble(exit_status_code: i32, policy: CapturePolicy, events: Vec<OutputEvent>) -> Self {
        let events = events
            .into_iter()
            .filter(|event| policy.captures(event.stream()) && !event.is_eof())
            .collect();
        Self {
            exit_status_code,
            events,
            policy,
        }
    }

    pub fn exit_status_code(&self) -> i32 {
        self.exit_status_code
    }

    pub fn success(&self) -> bool {
        self.exit_status_code == 0
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn policy(&self) -> CapturePolicy {
        self.policy
    }

    /// Events that carry a read failure.
    pub fn read_errors(&self) -> impl Iterator<Item = &OutputEvent> {
        self.events.iter().filter(|event| event.error().is_some())
    }

    /// All bytes captured from stdout, or `None` if stdout was not captured.
    pub fn stdout_bytes(&self) -> Option<Bytes> {
        self.stream_bytes(StreamType::Out)
    }

    /// All bytes captured from stderr, or `None` if stderr was not captured.
    pub fn stderr_bytes(&self) -> Option<Bytes> {
        self.stream_bytes(StreamType::Err)
    }

    /// All captured bytes of both streams, in delivery order, or `None` if nothing was captured.
    pub fn output_bytes(&self) -> Option<Bytes> {
        self.policy
            .capture
            .any()
            .then(|| concat(self.events.iter()))
    }

    fn stream_bytes(&self, stream: StreamType) -> Option<Bytes> {
        self.policy.captures(stream).then(|| {
            concat(
                self.events
                    .iter()
                    .filter(|event| event.stream() == stream),
            )
        })
    }

    /// Decodes the captured output as UTF-8.
    pub fn to_string_response(&self) -> StringResponse {
        StringResponse {
            exit_status_code: self.exit_status_code,
            out: self.stdout_bytes().and_then(decode),
            err: self.stderr_bytes().and_then(decode),
            output: self.output_bytes().and_then(decode),
        }
    }

    /// Converts into an [`Output`], holding the captured bytes of each stream in a `Vec<u8>`.
    pub fn into_output(self) -> Output {
        Output {
            exit_status_code: self.exit_status_code,
            stdout: self.stdout_bytes().map(Vec::from),
            stderr: self.stderr_bytes().map(Vec::from),
        }
    }
}

pub(crate) fn concat<'a>(events: impl Iterator<Item = &'a OutputEvent>) -> Bytes {
    let mut buf = BytesMut::new();
    for event in events {
        buf.extend_from_slice(event.bytes());
    }
    buf.freeze()
}

// Chunks may split multi-byte characters, so decoding only ever happens on concatenated bytes.
fn decode(bytes: Bytes) -> Option<String> {
    match String::from_utf8(Vec::from(bytes)) {
        Ok(string) => Some(string),
        Err(err) => {
            tracing::debug!(error = %err, "Captured output is not valid UTF-8");
            None
        }
    }
}

/// Captured output of a process, decoded as UTF-8.
///
/// A field is `None` if the corresponding stream was not captured, or if it was captured but is
/// not valid UTF-8. A captured stream which produced no output is `Some("")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringResponse {
    pub exit_status_code: i32,

    /// Everything the process wrote to stdout.
    pub out: Option<String>,

    /// Everything the process wrote to stderr.
    pub err: Option<String>,

    /// Everything captured from both streams, in delivery order.
    ///
    /// Present if at least one stream was captured.
    pub output: Option<String>,
}

impl From<&CapturedResponse> for StringResponse {
    fn from(response: &CapturedResponse) -> Self {
        response.to_string_response()
    }
}

/// Full output of a process that terminated, as raw bytes per stream.
///
/// Unlike [`CapturedResponse`], this no longer knows how the output of both streams interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Exit code of the process.
    pub exit_status_code: i32,

    /// The processes entire output on its `stdout` stream, if captured.
    pub stdout: Option<Vec<u8>>,

    /// The processes entire output on its `stderr` stream, if captured.
    pub stderr: Option<Vec<u8>>,
}

impl From<CapturedResponse> for Output {
    fn from(response: CapturedResponse) -> Self {
        response.into_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProcessRef;
    use crate::policy::Streams;
    use crate::stream::StreamError;
    use assertr::prelude::*;
    use std::io;

    fn event(stream: StreamType, bytes: &'static [u8]) -> OutputEvent {
        OutputEvent::new(
            stream,
            Bytes::from_static(bytes),
            None,
            ProcessRef::new("test", None),
        )
    }

    fn sample_events() -> Vec<OutputEvent> {
        vec![
            event(StreamType::Out, b"one "),
            event(StreamType::Err, b"warning "),
            event(StreamType::Out, b"two"),
            event(StreamType::Err, b""),
            event(StreamType::Out, b""),
        ]
    }

    #[test]
    fn decodes_per_stream_and_combined_output() {
        let response =
            CapturedResponse::assemble(0, CapturePolicy::capture(Streams::ALL), sample_events());

        let strings = response.to_string_response();

        assert_that(strings.out).is_equal_to(Some("one two".to_string()));
        assert_that(strings.err).is_equal_to(Some("warning ".to_string()));
        assert_that(strings.output).is_equal_to(Some("one warning two".to_string()));
        assert_that(response.events().len()).is_equal_to(3);
    }

    #[test]
    fn uncaptured_streams_are_absent_not_empty() {
        let response =
            CapturedResponse::assemble(1, CapturePolicy::capture(Streams::OUT), sample_events());

        let strings = StringResponse::from(&response);

        assert_that(strings.out).is_equal_to(Some("one two".to_string()));
        assert_that(strings.err).is_none();
        assert_that(strings.output).is_equal_to(Some("one two".to_string()));
        assert_that(strings.exit_status_code).is_equal_to(1);
    }

    #[test]
    fn captured_streams_without_output_are_empty_not_absent() {
        let response = CapturedResponse::assemble(0, CapturePolicy::capture(Streams::ALL), vec![]);

        let strings = response.to_string_response();

        assert_that(strings.out).is_equal_to(Some(String::new()));
        assert_that(strings.err).is_equal_to(Some(String::new()));
        assert_that(strings.output).is_equal_to(Some(String::new()));
    }

    #[test]
    fn nothing_captured_means_everything_absent() {
        let response = CapturedResponse::assemble(0, CapturePolicy::NONE, sample_events());

        let strings = response.to_string_response();

        assert_that(strings.out).is_none();
        assert_that(strings.err).is_none();
        assert_that(strings.output).is_none();
        assert_that(response.events().is_empty()).is_true();
    }

    #[test]
    fn multi_byte_characters_split_across_chunks_are_decoded() {
        // "ä" is encoded as 0xC3 0xA4.
        let events = vec![
            event(StreamType::Out, b"\xC3"),
            event(StreamType::Out, b"\xA4"),
        ];
        let response = CapturedResponse::assemble(0, CapturePolicy::capture(Streams::OUT), events);

        assert_that(response.to_string_response().out).is_equal_to(Some("ä".to_string()));
    }

    #[test]
    fn invalid_utf8_is_absent_only_where_it_occurs() {
        let events = vec![
            event(StreamType::Out, b"fine"),
            event(StreamType::Err, b"\xF0\x28\x8C\xBC"),
        ];
        let response = CapturedResponse::assemble(0, CapturePolicy::capture(Streams::ALL), events);

        let strings = response.to_string_response();

        assert_that(strings.out).is_equal_to(Some("fine".to_string()));
        assert_that(strings.err).is_none();
        assert_that(strings.output).is_none();
        assert_that(response.stderr_bytes().map(Vec::from))
            .is_equal_to(Some(b"\xF0\x28\x8C\xBC".to_vec()));
    }

    #[test]
    fn assembling_is_idempotent() {
        let policy = CapturePolicy::capture(Streams::ALL);

        let first = CapturedResponse::assemble(3, policy, sample_events());
        let second = CapturedResponse::assemble(3, policy, sample_events());
        let reassembled = CapturedResponse::assemble(3, policy, first.events().to_vec());

        assert_that(&first).is_equal_to(&second);
        assert_that(&first).is_equal_to(&reassembled);
        assert_that(first.to_string_response()).is_equal_to(second.to_string_response());
    }

    #[test]
    fn read_errors_are_kept_as_events() {
        let failure = OutputEvent::new(
            StreamType::Err,
            Bytes::new(),
            Some(StreamError::from(io::Error::from_raw_os_error(9))),
            ProcessRef::new("test", None),
        );
        let response = CapturedResponse::assemble(
            0,
            CapturePolicy::capture(Streams::ERR),
            vec![event(StreamType::Err, b"before"), failure],
        );

        let codes: Vec<i32> = response.read_errors().map(|e| e.error_code()).collect();
        assert_that(codes).is_equal_to(vec![9]);
        assert_that(response.to_string_response().err).is_equal_to(Some("before".to_string()));
    }

    #[test]
    fn converts_into_raw_output() {
        let response =
            CapturedResponse::assemble(2, CapturePolicy::capture(Streams::ERR), sample_events());

        let output = Output::from(response);

        assert_that(output).is_equal_to(Output {
            exit_status_code: 2,
            stdout: None,
            stderr: Some(b"warning ".to_vec()),
        });
    }
}
