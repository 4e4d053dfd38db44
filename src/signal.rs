use std::io;

/// A request for a process to stop gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// What a terminal sends when the user presses `Ctrl+C`.
    ///
    /// `SIGINT` on unix, `CTRL_C_EVENT` on windows.
    Interrupt,

    /// What the operating system sends when it asks a process to shut down.
    ///
    /// `SIGTERM` on unix, `CTRL_BREAK_EVENT` on windows.
    Terminate,
}

impl Signal {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }

    /// Sends this signal to the process `pid`.
    ///
    /// A `pid` of `None` denotes a process that was already awaited. Nothing is sent then.
    ///
    /// Panics on platforms which are neither unix nor windows.
    pub(crate) fn send(self, pid: Option<u32>) -> io::Result<()> {
        let Some(pid) = pid else {
            return Ok(());
        };
        tracing::trace!(pid, signal = self.name(), "Sending signal");

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal as NixSignal, kill};
            use nix::unistd::Pid;

            let signal = match self {
                Signal::Interrupt => NixSignal::SIGINT,
                Signal::Terminate => NixSignal::SIGTERM,
            };
            kill(Pid::from_raw(pid as i32), signal).map_err(io::Error::other)
        }

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Console::{
                CTRL_BREAK_EVENT, CTRL_C_EVENT, GenerateConsoleCtrlEvent,
            };

            let event = match self {
                Signal::Interrupt => CTRL_C_EVENT,
                Signal::Terminate => CTRL_BREAK_EVENT,
            };
            match unsafe { GenerateConsoleCtrlEvent(event, pid) } {
                0 => Err(io::Error::last_os_error()),
                _ => Ok(()),
            }
        }

        #[cfg(all(not(windows), not(unix)))]
        {
            panic!(
                "Cannot send {} to process {pid}. Platform is unsupported.",
                self.name()
            )
        }
    }
}
