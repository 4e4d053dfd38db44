mod coordinator;
mod error;
mod event;
mod exclusion;
mod execution;
mod num_bytes;
mod passthrough;
mod policy;
mod reader;
mod response;
mod signal;
mod stream;
mod writer;

pub use coordinator::{Delivery, Drained, Observer, OutputCoordinator};
pub use error::{ExecutionError, SignalError, SpawnError, WaitError};
pub use event::{OutputEvent, ProcessEvent, ProcessRef};
pub use exclusion::{Exclusive, FairExclusive, MutexExclusive};
pub use execution::{
    Execution, RunningExecution, RunningState, UNKNOWN_EXIT_CODE, exit_status_code,
};
pub use num_bytes::{DEFAULT_CHUNK_SIZE, NumBytes, NumBytesExt};
pub use passthrough::PassthroughSinks;
pub use policy::{CapturePolicy, Streams};
pub use reader::{ReadOptions, ReadSummary, ReadTermination, read_continuously};
pub use response::{CapturedResponse, Output, StringResponse};
pub use stream::{StreamError, StreamType, UNKNOWN_ERROR_CODE};
pub use writer::{WriteOutcome, write_all, write_all_blocking};

#[cfg(test)]
mod test {
    use crate::{CapturePolicy, Execution, PassthroughSinks, ProcessEvent, RunningState, Streams};
    use assertr::prelude::*;
    use std::io::{Read, Seek, SeekFrom};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn version_query() {
        let response = Execution::new("sh")
            .arg("-c")
            .arg("echo 'tool version 1.2.3'")
            .capture(Streams::OUT)
            .execute()
            .await
            .unwrap()
            .to_string_response();

        assert_that(response.exit_status_code).is_equal_to(0);
        assert_that(response.out.as_deref()).is_equal_to(Some("tool version 1.2.3\n"));
        assert_that(response.err).is_none();
    }

    #[tokio::test]
    async fn failing_listing_reports_its_error_output() {
        let response = Execution::new("ls")
            .arg("--definitely-not-a-flag")
            .capture(Streams::ERR)
            .execute()
            .await
            .unwrap()
            .to_string_response();

        assert_that(response.exit_status_code != 0).is_true();
        assert_that(response.out).is_none();
        assert_that(response.err.map(|err| !err.is_empty())).is_equal_to(Some(true));
    }

    #[tokio::test]
    async fn nothing_captured() {
        let response = Execution::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2")
            .policy(CapturePolicy::NONE)
            .execute()
            .await
            .unwrap();

        assert_that(response.success()).is_true();
        assert_that(response.events().is_empty()).is_true();
        assert_that(response.to_string_response().output).is_none();
    }

    #[tokio::test]
    async fn passthrough_mirrors_captured_output() {
        let mut out_file = tempfile::tempfile().unwrap();
        let mut err_file = tempfile::tempfile().unwrap();

        let response = Execution::new("sh")
            .arg("-c")
            .arg("echo building; echo 'error: oops' >&2; echo done; exit 1")
            .policy(CapturePolicy::ALL)
            .passthrough_to(PassthroughSinks::new(
                out_file.try_clone().unwrap(),
                err_file.try_clone().unwrap(),
            ))
            .execute()
            .await
            .unwrap()
            .to_string_response();

        let mut passed_out = String::new();
        out_file.seek(SeekFrom::Start(0)).unwrap();
        out_file.read_to_string(&mut passed_out).unwrap();
        let mut passed_err = String::new();
        err_file.seek(SeekFrom::Start(0)).unwrap();
        err_file.read_to_string(&mut passed_err).unwrap();

        assert_that(response.exit_status_code).is_equal_to(1);
        assert_that(response.out).is_equal_to(Some(passed_out));
        assert_that(response.err).is_equal_to(Some(passed_err));

        // Both streams are contained in the combined output, each in their own order.
        let output = response.output.unwrap();
        assert_that(output.len()).is_equal_to("building\nerror: oops\ndone\n".len());
        let building = output.find("building").unwrap();
        let done = output.find("done").unwrap();
        assert_that(building < done).is_true();
        assert_that(output.contains("error: oops\n")).is_true();
    }

    #[tokio::test]
    async fn is_running() {
        let terminated = Arc::new(Mutex::new(0));
        let seen = terminated.clone();

        let mut running = Execution::new("sleep")
            .arg("1")
            .on_event(move |event| {
                if let ProcessEvent::Terminated(_) = event {
                    *seen.lock().unwrap() += 1;
                }
            })
            .spawn()
            .unwrap();

        match running.is_running() {
            RunningState::Running => {}
            RunningState::Terminated(code) => {
                assert_that(code).fail("Process should be running");
            }
            RunningState::Uncertain(_) => {
                assert_that(running.id()).fail("Process state should not be uncertain");
            }
        };
        assert_that(*terminated.lock().unwrap()).is_equal_to(0);

        let response = running.wait().await.unwrap();

        assert_that(response.exit_status_code()).is_equal_to(0);
        assert_that(*terminated.lock().unwrap()).is_equal_to(1);
    }
}
