//! Builder API for running a process with captured and / or passed-through output.

use crate::coordinator::{Delivery, Observer, OutputCoordinator};
use crate::error::{ExecutionError, SignalError, SpawnError, WaitError};
use crate::event::{ProcessEvent, ProcessRef};
use crate::exclusion::{Exclusive, MutexExclusive};
use crate::num_bytes::NumBytes;
use crate::passthrough::PassthroughSinks;
use crate::policy::{CapturePolicy, Streams};
use crate::reader::ReadOptions;
use crate::response::CapturedResponse;
use crate::signal::Signal;
use crate::writer::{WriteOutcome, write_all};
use bytes::Bytes;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt::{Debug, Formatter};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Exit code reported for processes which neither exited with a code nor were killed by a signal.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Maps an exit status to a single code.
///
/// Processes killed by a signal (unix only) report the negated signal number, e.g. `-9` for
/// `SIGKILL`.
pub fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    UNKNOWN_EXIT_CODE
}

type InputHandler = Box<dyn FnOnce(WriteOutcome) + Send>;

/// A builder for configuring and running a process.
///
/// # Examples
///
/// ```no_run
/// use tokio_process_mux::{CapturePolicy, Execution, Streams};
///
/// # async fn example() -> Result<(), tokio_process_mux::ExecutionError> {
/// let response = Execution::new("git")
///     .arg("--version")
///     .policy(CapturePolicy::capture(Streams::OUT))
///     .execute()
///     .await?;
///
/// let output = response.to_string_response();
/// assert_eq!(output.exit_status_code, 0);
/// assert!(output.out.unwrap().starts_with("git version"));
/// assert!(output.err.is_none());
/// # Ok(())
/// # }
/// ```
pub struct Execution {
    cmd: Command,
    name: Option<Cow<'static, str>>,
    policy: CapturePolicy,
    input: Option<Bytes>,
    read_options: ReadOptions,
    sinks: Option<PassthroughSinks>,
    observer: Option<Observer>,
    on_input_written: Option<InputHandler>,
}

impl Debug for Execution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("cmd", &self.cmd)
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("input", &self.input.as_ref().map(|input| input.len()))
            .field("read_options", &self.read_options)
            .field("sinks", &self.sinks)
            .field("observer", &self.observer.as_ref().map(|_| "non-debug < Observer >"))
            .finish()
    }
}

impl Execution {
    /// Creates a builder running `program`.
    ///
    /// By default, nothing is captured or passed through. Output is still read and discarded.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a builder from an already configured tokio command.
    ///
    /// Its stdin, stdout and stderr configuration is overwritten when spawning.
    pub fn from_command(cmd: Command) -> Self {
        Self {
            cmd,
            name: None,
            policy: CapturePolicy::NONE,
            input: None,
            read_options: ReadOptions::default(),
            sinks: None,
            observer: None,
            on_input_written: None,
        }
    }

    /// Appends an argument to pass to the program.
    ///
    /// Arguments are passed as is, without any shell interpretation.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.cmd.arg(arg);
        self
    }

    /// Appends multiple arguments to pass to the program.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tokio_process_mux::{Execution, Streams};
    ///
    /// # async fn example() -> Result<(), tokio_process_mux::ExecutionError> {
    /// let response = Execution::new("ls")
    ///     .args(["-l", "-a"])
    ///     .capture(Streams::OUT)
    ///     .execute()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmd.args(args);
        self
    }

    /// Sets the working directory of the process. Defaults to our own working directory.
    ///
    /// A relative `dir` is interpreted relative to our own working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cmd.current_dir(dir);
        self
    }

    /// Sets an environment variable for the process, in addition to the inherited ones.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Sets multiple environment variables for the process.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tokio_process_mux::Execution;
    ///
    /// # async fn example() -> Result<(), tokio_process_mux::ExecutionError> {
    /// let exit_code = Execution::new("make")
    ///     .env_clear()
    ///     .envs([("PATH", "/usr/bin:/bin"), ("LANG", "C")])
    ///     .run()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.cmd.envs(vars);
        self
    }

    /// Removes an inherited or previously set environment variable.
    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Self {
        self.cmd.env_remove(key);
        self
    }

    /// Do not inherit any environment variables from our own process.
    pub fn env_clear(mut self) -> Self {
        self.cmd.env_clear();
        self
    }

    /// Sets an explicit process name, used in logs and in [`ProcessRef`]s.
    ///
    /// Defaults to the program followed by its quoted arguments, e.g. `ls "-la"`.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets which streams are captured and which are passed through.
    /// Default is [`CapturePolicy::NONE`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tokio_process_mux::{CapturePolicy, Execution, Streams};
    ///
    /// # async fn example() -> Result<(), tokio_process_mux::ExecutionError> {
    /// // Show the build output live, but only keep what was written to stderr.
    /// let response = Execution::new("cargo")
    ///     .arg("build")
    ///     .policy(CapturePolicy::new(Streams::ERR, Streams::ALL))
    ///     .execute()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets which streams are captured, keeping the passthrough configuration.
    pub fn capture(mut self, capture: Streams) -> Self {
        self.policy.capture = capture;
        self
    }

    /// Sets which streams are passed through, keeping the capture configuration.
    pub fn passthrough(mut self, passthrough: Streams) -> Self {
        self.policy.passthrough = passthrough;
        self
    }

    /// Writes `input` to the stdin of the process, closing stdin afterwards.
    ///
    /// Without input, the process's stdin is connected to the null device.
    pub fn input(mut self, input: impl Into<Bytes>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets the maximum size of a single chunk read from stdout or stderr.
    pub fn chunk_size(mut self, chunk_size: NumBytes) -> Self {
        chunk_size.assert_non_zero("chunk_size");
        self.read_options.chunk_size = chunk_size;
        self
    }

    /// Whether a stream is no longer read after the first read error. Defaults to `true`.
    ///
    /// Either way, the other stream is unaffected.
    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.read_options.stop_on_error = stop_on_error;
        self
    }

    /// Where passed-through output is written to. Defaults to our own stdout and stderr.
    pub fn passthrough_to(mut self, sinks: PassthroughSinks) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Registers a callback observing all output and the termination of the process.
    ///
    /// The callback is never invoked concurrently. It runs while output delivery is blocked, so
    /// it should return quickly.
    pub fn on_event(mut self, observer: impl FnMut(&ProcessEvent) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Registers a callback receiving the result of writing the configured input to stdin.
    pub fn on_input_written(mut self, handler: impl FnOnce(WriteOutcome) + Send + 'static) -> Self {
        self.on_input_written = Some(Box::new(handler));
        self
    }

    fn generate_name(&self) -> Cow<'static, str> {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let cmd = self.cmd.as_std();
        let mut name = cmd.get_program().to_string_lossy().to_string();
        for arg in cmd.get_args() {
            name.push_str(" \"");
            name.push_str(arg.to_string_lossy().as_ref());
            name.push('"');
        }
        name.into()
    }

    /// Spawns the process and starts reading its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<RunningExecution, SpawnError> {
        self.spawn_with::<MutexExclusive<Delivery>>()
    }

    /// Like [`Execution::spawn`], but serializes output delivery with the exclusion `X`.
    pub fn spawn_with<X: Exclusive<Delivery>>(mut self) -> Result<RunningExecution<X>, SpawnError> {
        let name = self.generate_name();

        self.cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(match self.input {
                Some(_) => Stdio::piped(),
                None => Stdio::null(),
            });

        let mut child = self.cmd.spawn().map_err(|source| SpawnError::SpawnFailed {
            process_name: name.clone(),
            source,
        })?;

        let process = ProcessRef::new(name, child.id());
        tracing::debug!(%process, policy = ?self.policy, "Spawned process");

        let missing_pipe = |child: &mut Child, stream: &'static str| {
            if let Err(err) = child.start_kill() {
                tracing::warn!(%process, error = %err, "Could not kill process without pipes");
            }
            SpawnError::MissingPipe {
                process_name: process.name_cow(),
                stream,
            }
        };
        let Some(stdout) = child.stdout.take() else {
            return Err(missing_pipe(&mut child, "stdout"));
        };
        let Some(stderr) = child.stderr.take() else {
            return Err(missing_pipe(&mut child, "stderr"));
        };
        let stdin = match self.input {
            Some(input) => match child.stdin.take() {
                Some(stdin) => Some((stdin, input)),
                None => return Err(missing_pipe(&mut child, "stdin")),
            },
            None => None,
        };

        let coordinator = OutputCoordinator::<X>::start_with(
            process.clone(),
            stdout,
            stderr,
            self.policy,
            self.read_options,
            self.sinks.unwrap_or_default(),
            self.observer,
        );

        let input_writer = stdin.map(|(mut stdin, input)| {
            let process = process.clone();
            let handler = self.on_input_written;
            tokio::spawn(async move {
                let outcome = write_all(&mut stdin, input).await;
                // Closes stdin, signalling EOF to the process.
                drop(stdin);
                match &outcome.error {
                    None => tracing::debug!(%process, "Wrote all input"),
                    Some(err) => tracing::warn!(
                        %process,
                        error = %err,
                        unwritten = outcome.leftover.len(),
                        "Could not write all input"
                    ),
                }
                if let Some(handler) = handler {
                    handler(outcome);
                }
            })
        });

        Ok(RunningExecution {
            process,
            policy: self.policy,
            child,
            coordinator,
            input_writer,
        })
    }

    /// Runs the process to completion, returning everything captured according to the policy.
    ///
    /// Fails without producing any output if the process could not be spawned.
    pub async fn execute(self) -> Result<CapturedResponse, ExecutionError> {
        let running = self.spawn()?;
        Ok(running.wait().await?)
    }

    /// Runs the process to completion, only applying the passthrough part of the policy.
    ///
    /// Returns the exit code of the process.
    pub async fn run(mut self) -> Result<i32, ExecutionError> {
        self.policy = self.policy.without_capture();
        let response = self.execute().await?;
        Ok(response.exit_status_code())
    }
}

/// Represents the running state of a process.
#[derive(Debug)]
pub enum RunningState {
    /// The process is still running.
    Running,

    /// The process exited with the given code. Its output may not be fully read yet.
    Terminated(i32),

    /// Failed to determine process state.
    Uncertain(io::Error),
}

impl RunningState {
    pub fn as_bool(&self) -> bool {
        match self {
            RunningState::Running => true,
            RunningState::Terminated(_) | RunningState::Uncertain(_) => false,
        }
    }
}

/// A spawned process whose output is being read.
///
/// Call [`RunningExecution::wait`] to obtain the captured output. Dropping this handle stops
/// reading output, but does not terminate the process.
pub struct RunningExecution<X: Exclusive<Delivery> = MutexExclusive<Delivery>> {
    process: ProcessRef,
    policy: CapturePolicy,
    child: Child,
    coordinator: OutputCoordinator<X>,
    input_writer: Option<JoinHandle<()>>,
}

impl<X: Exclusive<Delivery>> Debug for RunningExecution<X> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningExecution")
            .field("process", &self.process)
            .field("policy", &self.policy)
            .field("child", &self.child)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl<X: Exclusive<Delivery>> RunningExecution<X> {
    pub fn process(&self) -> &ProcessRef {
        &self.process
    }

    /// The OS process id. `None` once the process was awaited.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    //noinspection RsSelfConvention
    pub fn is_running(&mut self) -> RunningState {
        match self.child.try_wait() {
            Ok(None) => RunningState::Running,
            Ok(Some(status)) => RunningState::Terminated(exit_status_code(status)),
            Err(err) => RunningState::Uncertain(err),
        }
    }

    fn signal_error(&self, signal: &'static str, source: io::Error) -> SignalError {
        SignalError {
            process_name: self.process.name_cow(),
            signal,
            source,
        }
    }

    fn send(&self, signal: Signal) -> Result<(), SignalError> {
        signal
            .send(self.child.id())
            .map_err(|err| self.signal_error(signal.name(), err))
    }

    /// Sends `SIGINT` (unix) or `CTRL_C_EVENT` (windows) to the process.
    pub fn interrupt(&self) -> Result<(), SignalError> {
        self.send(Signal::Interrupt)
    }

    /// Sends `SIGTERM` (unix) or `CTRL_BREAK_EVENT` (windows) to the process.
    pub fn terminate(&self) -> Result<(), SignalError> {
        self.send(Signal::Terminate)
    }

    /// Forcefully kills the process. Does not wait for it to exit.
    pub fn kill(&mut self) -> Result<(), SignalError> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.signal_error("SIGKILL", err)),
        }
    }

    /// Waits for the process to exit and for all of its output to be delivered.
    ///
    /// The process is only reported as terminated (see [`ProcessEvent::Terminated`]) after both
    /// stdout and stderr were read until their end.
    pub async fn wait(mut self) -> Result<CapturedResponse, WaitError> {
        let status: ExitStatus =
            self.child
                .wait()
                .await
                .map_err(|source| WaitError::IoError {
                    process_name: self.process.name_cow(),
                    source,
                })?;
        let exit_status_code = exit_status_code(status);
        tracing::debug!(process = %self.process, exit_status_code, "Process exited");

        if let Some(input_writer) = self.input_writer.take() {
            input_writer
                .await
                .map_err(|source| WaitError::InputWriterFailed {
                    process_name: self.process.name_cow(),
                    source,
                })?;
        }

        let drained = self.coordinator.finish().await?;
        Ok(CapturedResponse::assemble(
            exit_status_code,
            self.policy,
            drained.events,
        ))
    }
}
